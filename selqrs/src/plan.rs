//! The immutable query plan.
//!
//! `configure` derives the column map and flattened join arena once; every
//! builder call consumes the plan and returns a new one, sharing the derived
//! state through `Arc`. Finalization reads the plan and emits SQL without
//! touching it, so a plan stays reusable after `to_sql`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::builder;
use crate::domain::{derive_columns, resolve_joins, ColumnEntry, Domain, ResolvedJoin};
use crate::error::{Result, SelqError};
use crate::executor::{ExecuteOpts, ExecutionResult, Executor};
use crate::expr::{
    Expr, FilterExpr, GroupBy, OrderItem, PivotOpts, PivotSpec, SubselectSpec, WindowFrameSpec,
    WindowFunc, WindowSpec,
};
use crate::field::{ResolvedField, Resolver};
use crate::validation;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigureOpts {
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub pool: bool,
    #[serde(default)]
    pub pool_options: Option<Value>,
}

#[derive(Clone)]
pub struct QueryPlan {
    pub(crate) domain: Arc<Domain>,
    pub(crate) columns: Arc<BTreeMap<String, ColumnEntry>>,
    pub(crate) joins: Arc<BTreeMap<String, ResolvedJoin>>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) set: QuerySet,
}

impl std::fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlan")
            .field("domain", &self.domain.name)
            .field("set", &self.set)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    pub selected: Vec<Expr>,
    pub filtered: Vec<FilterExpr>,
    pub order_by: Vec<OrderItem>,
    pub group_by: Vec<GroupBy>,
    pub having: Vec<FilterExpr>,
    pub window_functions: Vec<WindowSpec>,
    pub set_operations: Vec<SetOpSpec>,
    pub subselects: Vec<SubselectSpec>,
    pub pivot: Option<PivotState>,
    pub ctes: Vec<CteSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    Intersect,
    Except,
}

impl SetOperation {
    pub fn keyword(&self, all: bool) -> &'static str {
        match (self, all) {
            (SetOperation::Union, false) => "UNION",
            (SetOperation::Union, true) => "UNION ALL",
            (SetOperation::Intersect, false) => "INTERSECT",
            (SetOperation::Intersect, true) => "INTERSECT ALL",
            (SetOperation::Except, false) => "EXCEPT",
            (SetOperation::Except, true) => "EXCEPT ALL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetOpSpec {
    pub operation: SetOperation,
    pub right: Box<QueryPlan>,
    pub all: bool,
}

#[derive(Debug, Clone)]
pub struct PivotState {
    pub spec: PivotSpec,
    /// Filters accumulated before the pivot; they describe the original
    /// row set and move into the correlation subquery.
    pub original_filters: Vec<FilterExpr>,
}

#[derive(Debug, Clone)]
pub struct CteSpec {
    pub name: String,
    pub body: CteBody,
}

#[derive(Debug, Clone)]
pub enum CteBody {
    Plan(Box<QueryPlan>),
    Recursive {
        base: Box<QueryPlan>,
        step: Box<QueryPlan>,
    },
}

/// Finalized output: the SQL string, the ordered parameter vector, and the
/// output-alias mapping (alias, originating expression).
#[derive(Debug, Clone)]
pub struct SqlArtifact {
    pub sql: String,
    pub params: Vec<Value>,
    pub aliases: Vec<(String, String)>,
}

pub fn configure(
    domain: Domain,
    executor: Option<Arc<dyn Executor>>,
    opts: ConfigureOpts,
) -> Result<QueryPlan> {
    QueryPlan::configure(domain, executor, opts)
}

impl QueryPlan {
    pub fn configure(
        domain: Domain,
        executor: Option<Arc<dyn Executor>>,
        opts: ConfigureOpts,
    ) -> Result<QueryPlan> {
        if opts.validate {
            validation::validate(&domain).map_err(SelqError::Validation)?;
        }
        let joins = resolve_joins(&domain)?;
        let columns = derive_columns(&domain, &joins);
        tracing::debug!(
            domain = domain.name.as_deref().unwrap_or(&domain.source.table),
            joins = joins.len(),
            columns = columns.len(),
            "configured query plan"
        );
        Ok(QueryPlan {
            domain: Arc::new(domain),
            columns: Arc::new(columns),
            joins: Arc::new(joins),
            executor,
            set: QuerySet::default(),
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn set(&self) -> &QuerySet {
        &self.set
    }

    // ------------------------------------------------------------------
    // Builder surface. Every method returns a new plan; the receiver is
    // consumed but clones remain valid.
    // ------------------------------------------------------------------

    pub fn select<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        self.set.selected.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn filter<I, T>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FilterExpr>,
    {
        self.set.filtered.extend(filters.into_iter().map(Into::into));
        self
    }

    pub fn order_by<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OrderItem>,
    {
        self.set.order_by.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn group_by<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<GroupBy>,
    {
        self.set.group_by.extend(items.into_iter().map(Into::into));
        self
    }

    /// Post-aggregation filters; same shapes as `filter`.
    pub fn having<I, T>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FilterExpr>,
    {
        self.set.having.extend(filters.into_iter().map(Into::into));
        self
    }

    pub fn window_function(
        mut self,
        function: WindowFunc,
        arguments: Vec<Expr>,
        over: WindowFrameSpec,
        alias: Option<&str>,
    ) -> Self {
        self.set.window_functions.push(WindowSpec {
            function,
            arguments,
            over,
            alias: alias.map(str::to_string),
        });
        self
    }

    /// Rewrite the query around `target_schema`, correlating back to the
    /// current row set. Fails when no association path reaches the target.
    pub fn pivot(mut self, target_schema: &str, opts: PivotOpts) -> Result<Self> {
        let join_path = builder::pivot::find_join_path(&self.domain, target_schema)?;
        let original_filters = std::mem::take(&mut self.set.filtered);
        self.set.pivot = Some(PivotState {
            spec: PivotSpec {
                target_schema: target_schema.to_string(),
                join_path,
                preserve_filters: opts.preserve_filters,
                subquery_strategy: opts.subquery_strategy,
            },
            original_filters,
        });
        Ok(self)
    }

    pub fn subselect<I, T>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SubselectSpec>,
    {
        self.set.subselects.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn with_cte(mut self, name: &str, body: QueryPlan) -> Self {
        self.set.ctes.push(CteSpec {
            name: name.to_string(),
            body: CteBody::Plan(Box::new(body)),
        });
        self
    }

    pub fn with_recursive_cte(mut self, name: &str, base: QueryPlan, step: QueryPlan) -> Self {
        self.set.ctes.push(CteSpec {
            name: name.to_string(),
            body: CteBody::Recursive {
                base: Box::new(base),
                step: Box::new(step),
            },
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.set.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.set.offset = Some(offset);
        self
    }

    pub fn union(self, right: QueryPlan) -> Result<Self> {
        self.compose(SetOperation::Union, right, false)
    }

    pub fn union_all(self, right: QueryPlan) -> Result<Self> {
        self.compose(SetOperation::Union, right, true)
    }

    pub fn intersect(self, right: QueryPlan) -> Result<Self> {
        self.compose(SetOperation::Intersect, right, false)
    }

    pub fn except(self, right: QueryPlan) -> Result<Self> {
        self.compose(SetOperation::Except, right, false)
    }

    fn compose(mut self, operation: SetOperation, right: QueryPlan, all: bool) -> Result<Self> {
        builder::set_ops::validate_compatible(&self, &right)?;
        self.set.set_operations.push(SetOpSpec {
            operation,
            right: Box::new(right),
            all,
        });
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let artifact = self.gen_sql()?;
        Ok((artifact.sql, artifact.params))
    }

    pub fn gen_sql(&self) -> Result<SqlArtifact> {
        builder::build(self)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    pub async fn execute(&self, opts: ExecuteOpts) -> Result<ExecutionResult> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| SelqError::Execution("no executor configured".to_string()))?;
        let artifact = self.gen_sql()?;
        tracing::debug!(sql_len = artifact.sql.len(), params = artifact.params.len(), "executing plan");
        let result = executor
            .execute(&artifact.sql, &artifact.params, &opts)
            .await?;
        Ok(ExecutionResult {
            rows: result.rows,
            columns: result.columns,
            aliases: artifact.aliases,
        })
    }

    /// Execute expecting exactly one row.
    pub async fn execute_one(
        &self,
        opts: ExecuteOpts,
    ) -> Result<(serde_json::Map<String, Value>, Vec<(String, String)>)> {
        let mut result = self.execute(opts).await?;
        match result.rows.len() {
            0 => Err(SelqError::NoResults),
            1 => Ok((result.rows.remove(0), result.aliases)),
            _ => Err(SelqError::MultipleResults),
        }
    }

    // ------------------------------------------------------------------
    // Field helpers
    // ------------------------------------------------------------------

    pub fn resolve_field(&self, reference: &str) -> Result<ResolvedField> {
        let resolver = Resolver::new(&self.domain, &self.columns, &self.joins);
        resolver.resolve(reference).map(|(field, _)| field)
    }

    pub fn available_fields(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn field_suggestions(&self, prefix: &str) -> Vec<String> {
        let resolver = Resolver::new(&self.domain, &self.columns, &self.joins);
        resolver.suggestions(prefix)
    }
}
