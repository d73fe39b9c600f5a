//! Execution capability.
//!
//! The composition engine is pure; all I/O lives behind [`Executor`]. The
//! engine hands over the finalized SQL, the ordered parameter vector, and an
//! opaque options map it never inspects.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Options passed through to the executor unchanged. Timeouts, cancellation
/// and retry policy are executor concerns.
pub type ExecuteOpts = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Result of executing a plan: rows and columns from the executor plus the
/// plan's alias mapping (output alias, originating expression).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub aliases: Vec<(String, String)>,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Check the connection is usable (pool reachable, credentials valid).
    async fn validate(&self) -> Result<()>;

    async fn execute(&self, sql: &str, params: &[Value], opts: &ExecuteOpts)
        -> Result<QueryResult>;
}
