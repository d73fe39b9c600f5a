//! Executor implementations.
//!
//! Each backend lives in its own file behind a feature flag. The core never
//! depends on a concrete backend; it only sees the [`crate::executor::Executor`]
//! capability.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Stable 128-bit content digest, hex encoded. Used for pool identity and
/// prepared-statement tracing; never influences SQL generation.
pub fn content_digest(content: &str) -> String {
    let mut low = DefaultHasher::new();
    content.hash(&mut low);
    let mut high = DefaultHasher::new();
    content.hash(&mut high);
    0xa5a5_a5a5_a5a5_a5a5u64.hash(&mut high);
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&low.finish().to_be_bytes());
    bytes[8..].copy_from_slice(&high.finish().to_be_bytes());
    hex::encode(bytes)
}

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;

#[cfg(test)]
mod tests {
    use super::content_digest;

    #[test]
    fn digest_is_stable_and_distinct() {
        let a = content_digest("host=localhost dbname=app");
        let b = content_digest("host=localhost dbname=app");
        let c = content_digest("host=localhost dbname=other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }
}
