//! Field reference resolution.
//!
//! Accepted reference forms:
//! - `"name"` — source table field
//! - `"posts.title"` — joined field, qualified by join id
//! - `"posts[title]"` — legacy bracket form (deprecated, logs a notice)
//! - `"products:electronics:25.0:true.name"` — parameterized join reference;
//!   parameters bind positionally against the join's parameter definitions.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::domain::{
    ColumnEntry, ColumnKind, Domain, FieldType, JoinKind, ParamType, ResolvedJoin, ROOT_JOIN,
};
use crate::error::{FieldError, JoinParameterError, Result, SelqError};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub join: Option<String>,
    pub field: String,
    pub params: Vec<RawParam>,
    pub legacy_bracket: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawParam {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl RawParam {
    fn type_name(&self) -> &'static str {
        match self {
            RawParam::String(_) => "string",
            RawParam::Integer(_) => "integer",
            RawParam::Float(_) => "float",
            RawParam::Boolean(_) => "boolean",
        }
    }

    fn literal_form(&self) -> String {
        match self {
            RawParam::String(s) => s.clone(),
            RawParam::Integer(i) => i.to_string(),
            RawParam::Float(f) => f.to_string(),
            RawParam::Boolean(b) => b.to_string(),
        }
    }
}

/// A join parameter bound to its definition, after type checking.
#[derive(Debug, Clone)]
pub struct BoundParam {
    pub name: String,
    pub param_type: ParamType,
    pub value: Value,
}

/// A fully resolved field reference.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub name: String,
    pub qualified_name: String,
    pub source_join: String,
    pub table_alias: String,
    pub field_type: FieldType,
    pub kind: ColumnKind,
    pub parameters: Vec<BoundParam>,
    pub parameter_signature: Option<String>,
}

/// A parameterized join instantiated for one parameter signature. The planner
/// treats instances as additional joins keyed by their alias.
#[derive(Debug, Clone)]
pub struct JoinInstance {
    pub base_id: String,
    pub join: ResolvedJoin,
    pub bound: Vec<BoundParam>,
}

pub fn parse_field_ref(reference: &str) -> Result<FieldRef> {
    let invalid = |reason: &str| {
        SelqError::Field(FieldError::InvalidFormat {
            reference: reference.to_string(),
            reason: reason.to_string(),
        })
    };

    if reference.is_empty() {
        return Err(invalid("empty reference"));
    }

    // Legacy bracket form: join[field]
    if let Some(open) = reference.find('[') {
        let close = reference
            .rfind(']')
            .ok_or_else(|| invalid("unterminated bracket"))?;
        if close != reference.len() - 1 || close <= open + 1 || open == 0 {
            return Err(invalid("malformed bracket reference"));
        }
        let join = &reference[..open];
        let field = &reference[open + 1..close];
        tracing::warn!(
            reference,
            "bracket field notation is deprecated; use \"{join}.{field}\""
        );
        return Ok(FieldRef {
            join: Some(join.to_string()),
            field: field.to_string(),
            params: Vec::new(),
            legacy_bracket: true,
        });
    }

    // Parameterized form: the first ':' starts the parameter list, the final
    // unquoted '.' separates the field.
    if let Some(colon) = reference.find(':') {
        let join = &reference[..colon];
        if join.is_empty() {
            return Err(invalid("missing join name before ':'"));
        }
        let (params, field) = parse_params(&reference[colon + 1..]).map_err(|e| invalid(&e))?;
        return Ok(FieldRef {
            join: Some(join.to_string()),
            field,
            params,
            legacy_bracket: false,
        });
    }

    match reference.split_once('.') {
        Some((join, field)) => {
            if join.is_empty() || field.is_empty() {
                return Err(invalid("empty join or field segment"));
            }
            Ok(FieldRef {
                join: Some(join.to_string()),
                field: field.to_string(),
                params: Vec::new(),
                legacy_bracket: false,
            })
        }
        None => Ok(FieldRef {
            join: None,
            field: reference.to_string(),
            params: Vec::new(),
            legacy_bracket: false,
        }),
    }
}

/// Parse `p1:p2:...:pn.field`, honoring quoted strings with escapes.
fn parse_params(input: &str) -> std::result::Result<(Vec<RawParam>, String), String> {
    let mut params = Vec::new();
    let mut token = String::new();
    let mut chars = input.chars().peekable();
    let mut quote: Option<char> = None;
    let mut quoted_token = false;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => return Err("dangling escape in quoted parameter".to_string()),
                    }
                } else if c == q {
                    quote = None;
                } else {
                    token.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    quoted_token = true;
                }
                ':' => {
                    params.push(classify_param(&token, quoted_token)?);
                    token.clear();
                    quoted_token = false;
                }
                // A quoted token can never be a decimal, so any '.' after it
                // is the field separator.
                '.' if quoted_token || !looks_like_decimal(&token, chars.peek()) => {
                    params.push(classify_param(&token, quoted_token)?);
                    let field: String = chars.collect();
                    if field.is_empty() {
                        return Err("missing field after parameters".to_string());
                    }
                    return Ok((params, field));
                }
                other => token.push(other),
            },
        }
    }
    if quote.is_some() {
        return Err("unterminated quote in parameter".to_string());
    }
    Err("missing field segment after parameters".to_string())
}

/// An integer token followed by `.digits` is a decimal literal, not the field
/// separator.
fn looks_like_decimal(token: &str, next: Option<&char>) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c == '-')
        && token.chars().any(|c| c.is_ascii_digit())
        && matches!(next, Some(c) if c.is_ascii_digit())
        && !token.contains('.')
}

fn classify_param(token: &str, quoted: bool) -> std::result::Result<RawParam, String> {
    if quoted {
        return Ok(RawParam::String(token.to_string()));
    }
    if token.is_empty() {
        return Err("empty parameter".to_string());
    }
    match token {
        "true" => return Ok(RawParam::Boolean(true)),
        "false" => return Ok(RawParam::Boolean(false)),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Ok(RawParam::Integer(i));
    }
    if token.contains('.') {
        if let Ok(f) = token.parse::<f64>() {
            return Ok(RawParam::Float(f));
        }
    }
    Ok(RawParam::String(token.to_string()))
}

/// Resolution context over a configured plan's derived state.
pub struct Resolver<'a> {
    pub domain: &'a Domain,
    pub columns: &'a BTreeMap<String, ColumnEntry>,
    pub joins: &'a BTreeMap<String, ResolvedJoin>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        domain: &'a Domain,
        columns: &'a BTreeMap<String, ColumnEntry>,
        joins: &'a BTreeMap<String, ResolvedJoin>,
    ) -> Self {
        Resolver {
            domain,
            columns,
            joins,
        }
    }

    /// Resolve a reference. Parameterized references additionally produce a
    /// join instance the planner must include.
    pub fn resolve(&self, reference: &str) -> Result<(ResolvedField, Option<JoinInstance>)> {
        let parsed = parse_field_ref(reference)?;
        match (&parsed.join, parsed.params.is_empty()) {
            (Some(join), false) => self.resolve_parameterized(join, &parsed),
            (Some(join), true) => Ok((self.resolve_qualified(join, &parsed.field)?, None)),
            (None, _) => Ok((self.resolve_simple(&parsed.field)?, None)),
        }
    }

    fn resolve_simple(&self, field: &str) -> Result<ResolvedField> {
        // Source wins over joins for unqualified names.
        if let Some(entry) = self.columns.get(field) {
            return Ok(from_entry(entry));
        }
        let suffix = format!(".{field}");
        let matches: Vec<&ColumnEntry> = self
            .columns
            .values()
            .filter(|e| e.key.ends_with(&suffix))
            .collect();
        match matches.len() {
            0 => Err(SelqError::Field(FieldError::NotFound {
                field: field.to_string(),
                suggestions: self.suggestions(field),
            })),
            1 => Ok(from_entry(matches[0])),
            _ => Err(SelqError::Field(FieldError::Ambiguous {
                field: field.to_string(),
                options: matches.iter().map(|e| e.key.clone()).collect(),
            })),
        }
    }

    fn resolve_qualified(&self, join: &str, field: &str) -> Result<ResolvedField> {
        if !self.joins.contains_key(join) {
            return Err(SelqError::Field(FieldError::JoinNotFound {
                join: join.to_string(),
                available_joins: self.joins.keys().cloned().collect(),
            }));
        }
        let key = format!("{join}.{field}");
        match self.columns.get(&key) {
            Some(entry) => Ok(from_entry(entry)),
            None => Err(SelqError::Field(FieldError::FieldNotFoundInJoin {
                join: join.to_string(),
                field: field.to_string(),
                available_fields: self
                    .columns
                    .values()
                    .filter(|e| e.source_join == join)
                    .map(|e| e.name.clone())
                    .collect(),
            })),
        }
    }

    fn resolve_parameterized(
        &self,
        join_id: &str,
        parsed: &FieldRef,
    ) -> Result<(ResolvedField, Option<JoinInstance>)> {
        let join = self.joins.get(join_id).ok_or_else(|| {
            SelqError::Field(FieldError::JoinNotFound {
                join: join_id.to_string(),
                available_joins: self.joins.keys().cloned().collect(),
            })
        })?;
        let JoinKind::Parameterized(cfg) = &join.kind else {
            return Err(SelqError::Field(FieldError::InvalidFormat {
                reference: format!("{join_id}:..."),
                reason: format!("join {join_id} does not take parameters"),
            }));
        };

        if parsed.params.len() > cfg.parameters.len() {
            return Err(SelqError::JoinParameter(
                JoinParameterError::UnknownParameter {
                    join: join_id.to_string(),
                    position: cfg.parameters.len(),
                },
            ));
        }

        let mut bound = Vec::with_capacity(cfg.parameters.len());
        for (idx, def) in cfg.parameters.iter().enumerate() {
            match parsed.params.get(idx) {
                Some(raw) => bound.push(bind_param(join_id, &def.name, def.param_type, raw)?),
                None => match &def.default {
                    Some(default) => bound.push(BoundParam {
                        name: def.name.clone(),
                        param_type: def.param_type,
                        value: default.clone(),
                    }),
                    None if def.required => {
                        return Err(SelqError::JoinParameter(
                            JoinParameterError::MissingRequiredParameter {
                                join: join_id.to_string(),
                                parameter: def.name.clone(),
                            },
                        ))
                    }
                    None => bound.push(BoundParam {
                        name: def.name.clone(),
                        param_type: def.param_type,
                        value: Value::Null,
                    }),
                },
            }
        }

        let signature = parsed
            .params
            .iter()
            .map(RawParam::literal_form)
            .collect::<Vec<_>>()
            .join(":");
        let alias = format!("{join_id}_{}", signature_hash(&signature));

        // The base join's fields resolve against the instance alias.
        let base_key = format!("{join_id}.{field}", field = parsed.field);
        let entry = self.columns.get(&base_key).ok_or_else(|| {
            SelqError::Field(FieldError::FieldNotFoundInJoin {
                join: join_id.to_string(),
                field: parsed.field.clone(),
                available_fields: self
                    .columns
                    .values()
                    .filter(|e| e.source_join == join_id)
                    .map(|e| e.name.clone())
                    .collect(),
            })
        })?;

        let mut instance_join = join.clone();
        instance_join.id = alias.clone();

        let resolved = ResolvedField {
            name: entry.name.clone(),
            qualified_name: format!("{alias}.{}", entry.name),
            source_join: alias.clone(),
            table_alias: alias.clone(),
            field_type: entry.field_type,
            kind: entry.kind,
            parameters: bound.clone(),
            parameter_signature: Some(signature),
        };
        Ok((
            resolved,
            Some(JoinInstance {
                base_id: join_id.to_string(),
                join: instance_join,
                bound,
            }),
        ))
    }

    /// Up to five candidates for an unresolved name: prefix matches first,
    /// then close edit-distance matches.
    pub fn suggestions(&self, reference: &str) -> Vec<String> {
        let lower = reference.to_ascii_lowercase();
        let mut prefixed = Vec::new();
        let mut fuzzy: Vec<(usize, String)> = Vec::new();
        for key in self.columns.keys() {
            let candidate = key.to_ascii_lowercase();
            if candidate.starts_with(&lower) {
                prefixed.push(key.clone());
            } else {
                let distance = levenshtein(&lower, &candidate);
                if distance <= suggestion_threshold(&lower) {
                    fuzzy.push((distance, key.clone()));
                }
            }
        }
        fuzzy.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        prefixed.extend(fuzzy.into_iter().map(|(_, k)| k));
        prefixed.truncate(5);
        prefixed
    }
}

fn from_entry(entry: &ColumnEntry) -> ResolvedField {
    ResolvedField {
        name: entry.name.clone(),
        qualified_name: entry.qualified_name.clone(),
        source_join: entry.source_join.clone(),
        table_alias: entry.table_alias.clone(),
        field_type: entry.field_type,
        kind: entry.kind,
        parameters: Vec::new(),
        parameter_signature: None,
    }
}

fn bind_param(
    join: &str,
    name: &str,
    expected: ParamType,
    raw: &RawParam,
) -> Result<BoundParam> {
    let mismatch = || {
        SelqError::JoinParameter(JoinParameterError::TypeMismatch {
            join: join.to_string(),
            parameter: name.to_string(),
            expected: expected.as_str().to_string(),
            got: raw.type_name().to_string(),
        })
    };
    let value = match (expected, raw) {
        (ParamType::String, RawParam::String(s)) => Value::String(s.clone()),
        (ParamType::Atom, RawParam::String(s)) => Value::String(s.clone()),
        (ParamType::Integer, RawParam::Integer(i)) => Value::from(*i),
        (ParamType::Float, RawParam::Float(f)) => Value::from(*f),
        // integer widens to float
        (ParamType::Float, RawParam::Integer(i)) => Value::from(*i as f64),
        (ParamType::Boolean, RawParam::Boolean(b)) => Value::Bool(*b),
        // 1/0 and "true"/"false" widen to boolean
        (ParamType::Boolean, RawParam::Integer(1)) => Value::Bool(true),
        (ParamType::Boolean, RawParam::Integer(0)) => Value::Bool(false),
        (ParamType::Boolean, RawParam::String(s)) => match s.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(mismatch()),
        },
        _ => return Err(mismatch()),
    };
    Ok(BoundParam {
        name: name.to_string(),
        param_type: expected,
        value,
    })
}

fn signature_hash(signature: &str) -> String {
    let mut hasher = DefaultHasher::new();
    signature.hash(&mut hasher);
    hex::encode(hasher.finish().to_be_bytes())[..8].to_string()
}

fn suggestion_threshold(reference: &str) -> usize {
    (reference.len() / 3).max(2)
}

/// Wagner-Fischer edit distance with a rolling row.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.len() < b_chars.len() {
        return levenshtein(b, a);
    }
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, &ca) in a_chars.iter().enumerate() {
        let mut current = vec![i + 1];
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current.push(
                (previous[j + 1] + 1)
                    .min(current[j] + 1)
                    .min(previous[j] + cost),
            );
        }
        previous = current;
    }
    previous[b_chars.len()]
}

/// Root-field helper used by the planner to resolve key references that are
/// already known to live on the source table.
pub fn root_field(domain: &Domain, field: &str) -> ResolvedField {
    ResolvedField {
        name: field.to_string(),
        qualified_name: field.to_string(),
        source_join: ROOT_JOIN.to_string(),
        table_alias: ROOT_JOIN.to_string(),
        field_type: domain.source.field_type(field),
        kind: ColumnKind::Plain,
        parameters: Vec::new(),
        parameter_signature: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_and_qualified() {
        let f = parse_field_ref("name").unwrap();
        assert_eq!(f.join, None);
        assert_eq!(f.field, "name");

        let f = parse_field_ref("posts.title").unwrap();
        assert_eq!(f.join.as_deref(), Some("posts"));
        assert_eq!(f.field, "title");
    }

    #[test]
    fn parses_legacy_bracket() {
        let f = parse_field_ref("posts[title]").unwrap();
        assert_eq!(f.join.as_deref(), Some("posts"));
        assert_eq!(f.field, "title");
        assert!(f.legacy_bracket);
    }

    #[test]
    fn parses_parameterized_reference() {
        let f = parse_field_ref("products:electronics:25.0:true.name").unwrap();
        assert_eq!(f.join.as_deref(), Some("products"));
        assert_eq!(f.field, "name");
        assert_eq!(
            f.params,
            vec![
                RawParam::String("electronics".to_string()),
                RawParam::Float(25.0),
                RawParam::Boolean(true),
            ]
        );
    }

    #[test]
    fn parses_quoted_parameters() {
        let f = parse_field_ref("products:'mid range':10.name").unwrap();
        assert_eq!(
            f.params,
            vec![
                RawParam::String("mid range".to_string()),
                RawParam::Integer(10),
            ]
        );
        assert_eq!(f.field, "name");
    }

    #[test]
    fn quoted_parameter_directly_before_field() {
        let f = parse_field_ref("products:'a.b'.name").unwrap();
        assert_eq!(f.params, vec![RawParam::String("a.b".to_string())]);
        assert_eq!(f.field, "name");
    }

    #[test]
    fn signed_integers_and_decimals() {
        let f = parse_field_ref("j:-5:3.25.f").unwrap();
        assert_eq!(
            f.params,
            vec![RawParam::Integer(-5), RawParam::Float(3.25)]
        );
        assert_eq!(f.field, "f");
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(parse_field_ref("").is_err());
        assert!(parse_field_ref("posts[title").is_err());
        assert!(parse_field_ref("products:a").is_err());
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("email", "emial"), 2);
        assert_eq!(levenshtein("", ""), 0);
    }
}
