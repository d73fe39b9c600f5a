pub mod backends;
pub mod builder;
pub mod domain;
pub mod error;
pub mod executor;
pub mod expr;
pub mod field;
pub mod ident;
pub mod plan;
pub mod registry;
pub mod sql_ir;
pub mod validation;

use std::path::Path;

use crate::error::Result;

/// Load domain definitions from disk and validate all of them.
pub fn load_and_validate<P: AsRef<Path>>(domain_dir: P) -> Result<DomainRegistry> {
    let registry = DomainRegistry::load_from_dir(domain_dir)?;
    registry
        .validate_all()
        .map_err(crate::error::SelqError::Validation)?;
    Ok(registry)
}

pub use builder::{build_hierarchy_cte, HierarchyCteOpts};
pub use domain::{Association, Domain, JoinKind, JoinSpec, SchemaDef, ROOT_JOIN};
pub use error::SelqError;
pub use executor::{ExecutionResult, Executor, QueryResult};
pub use expr::{
    AggFunc, CompareOp, Expr, FacetStrategy, FilterExpr, GroupBy, OrderDir, OrderItem, PivotOpts,
    PivotStrategy, SubselectFormat, SubselectSpec, WindowFrameSpec, WindowFunc,
};
pub use plan::{configure, ConfigureOpts, QueryPlan, SqlArtifact};
pub use registry::DomainRegistry;
pub use validation::{validate, DomainIssue};

#[cfg(feature = "postgres")]
pub use backends::PostgresExecutor;
