//! Identifier and phrase safety.
//!
//! Every identifier that reaches SQL text goes through [`double_wrap`]; user
//! scalars only ever travel as parameters. [`check_safe_phrase`] gates the few
//! externally supplied snippets (sort direction tokens) that are inlined.

use crate::error::{Result, SelqError};

/// Wrap an identifier in double quotes. Identifiers containing a double quote
/// are rejected outright rather than escaped: nothing legitimate in a domain
/// definition contains one, so treat it as an injection attempt.
pub fn double_wrap(ident: &str) -> Result<String> {
    if ident.contains('"') {
        return Err(SelqError::InvalidIdentifier(ident.to_string()));
    }
    Ok(format!("\"{ident}\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn single_wrap(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Accept only non-empty strings of alphanumerics, spaces and underscores.
pub fn check_safe_phrase(s: &str) -> Result<&str> {
    let ok = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_');
    if ok {
        Ok(s)
    } else {
        Err(SelqError::InvalidIdentifier(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_plain_identifiers() {
        assert_eq!(double_wrap("users").unwrap(), "\"users\"");
        assert_eq!(double_wrap("order items").unwrap(), "\"order items\"");
    }

    #[test]
    fn rejects_embedded_double_quote() {
        assert!(matches!(
            double_wrap("users\" --"),
            Err(SelqError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn double_wrap_is_idempotent_on_safe_names() {
        let once = double_wrap("users").unwrap();
        assert_eq!(once.trim_matches('"'), "users");
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(single_wrap("O'Brien"), "'O''Brien'");
        assert_eq!(single_wrap("plain"), "'plain'");
    }

    #[test]
    fn safe_phrase_accepts_direction_tokens() {
        assert!(check_safe_phrase("asc nulls first").is_ok());
        assert!(check_safe_phrase("desc").is_ok());
    }

    #[test]
    fn safe_phrase_rejects_punctuation_and_empty() {
        assert!(check_safe_phrase("asc; drop table users").is_err());
        assert!(check_safe_phrase("").is_err());
    }
}
