//! Query building: from an immutable plan to finalized SQL.
//!
//! Building happens at the fragment level so parameter numbering stays a
//! single pass at the very end; composed queries (set operations, pivots,
//! CTE bodies) splice fragment trees, never finalized strings.

use std::collections::BTreeMap;

use crate::domain::{ColumnEntry, Domain, ResolvedJoin, ROOT_JOIN};
use crate::error::{Result, SelqError};
use crate::field::{JoinInstance, ResolvedField, Resolver};
use crate::ident::double_wrap;
use crate::plan::{QueryPlan, SqlArtifact};
use crate::sql_ir::{self, Frag};

pub(crate) mod cte;
pub(crate) mod filters;
pub(crate) mod group;
pub(crate) mod hierarchy;
pub(crate) mod joins;
pub(crate) mod olap;
pub(crate) mod pivot;
pub(crate) mod planner;
pub(crate) mod select;
pub(crate) mod set_ops;
pub(crate) mod subselect;
pub(crate) mod tagging;
pub(crate) mod window;

pub use cte::build_hierarchy_cte;
pub use hierarchy::HierarchyCteOpts;

pub(crate) fn build(plan: &QueryPlan) -> Result<SqlArtifact> {
    let (frag, aliases) = build_frag(plan)?;
    let (sql, params) = sql_ir::finalize(&frag);
    Ok(SqlArtifact {
        sql,
        params,
        aliases,
    })
}

/// Build the full fragment tree for a plan, dispatching on composition shape.
pub(crate) fn build_frag(plan: &QueryPlan) -> Result<(Frag, Vec<(String, String)>)> {
    if !plan.set.set_operations.is_empty() {
        return set_ops::build_frag(plan);
    }
    if plan.set.pivot.is_some() {
        return pivot::build_frag(plan);
    }
    build_plain_frag(plan)
}

/// Build a plan ignoring set operations and pivots; used for the left side of
/// a set operation and for CTE bodies.
pub(crate) fn build_plain_frag(plan: &QueryPlan) -> Result<(Frag, Vec<(String, String)>)> {
    let mut ctx = BuildContext::new(plan);

    let select_list = select::build_select_list(&mut ctx)?;
    let where_frag = filters::build_where(&mut ctx)?;
    let group = group::build_group_by(&mut ctx)?;
    let having_frag = filters::build_filter_set(&mut ctx, &plan.set.having.clone())?;
    let order_frag = group::build_order_by(&mut ctx, &plan.set.order_by.clone())?;

    let planned = planner::plan_joins(&ctx)?;
    let joins_frag = joins::build_joins(&ctx, &planned)?;

    let mut core = Vec::new();
    core.push(Frag::sql("SELECT "));
    core.push(Frag::join(
        select_list.iter().map(|item| item.frag.clone()).collect(),
        ", ",
    ));
    core.push(Frag::sql(" FROM "));
    core.push(Frag::sql(double_wrap(&plan.domain.source.table)?));
    core.push(Frag::sql(" "));
    core.push(Frag::sql(double_wrap(ROOT_JOIN)?));
    core.push(joins_frag);
    if !where_frag.is_empty() {
        core.push(Frag::sql(" WHERE "));
        core.push(where_frag);
    }
    if let Some(group_frag) = &group.clause {
        core.push(Frag::sql(" GROUP BY "));
        core.push(group_frag.clone());
    }
    if !having_frag.is_empty() {
        core.push(Frag::sql(" HAVING "));
        core.push(having_frag);
    }

    if !order_frag.is_empty() {
        core.push(Frag::sql(" ORDER BY "));
        core.push(order_frag);
    }
    if let Some(limit) = plan.set.limit {
        core.push(Frag::sql(format!(" LIMIT {limit}")));
    }
    if let Some(offset) = plan.set.offset {
        core.push(Frag::sql(format!(" OFFSET {offset}")));
    }

    let outer = if group.rollup {
        // ROLLUP output cannot be aliased in place; wrap so the outer query
        // exposes the select-list aliases.
        vec![
            Frag::sql("SELECT * FROM ("),
            Frag::Seq(core),
            Frag::sql(") AS rollupfix"),
        ]
    } else {
        core
    };

    let main = Frag::Seq(outer);
    let with_main = cte::attach_ctes(plan, main)?;

    let aliases = select_list
        .into_iter()
        .map(|item| (item.alias, item.description))
        .collect();
    Ok((with_main, aliases))
}

/// One rendered select-list entry.
pub(crate) struct SelectItemFrag {
    pub frag: Frag,
    pub alias: String,
    pub description: String,
}

pub(crate) struct BuildContext<'a> {
    pub plan: &'a QueryPlan,
    pub domain: &'a Domain,
    pub resolver: Resolver<'a>,
    /// Joins referenced by any expression, in first-seen order.
    pub used_joins: Vec<String>,
    /// Parameterized join instances keyed by instance alias.
    pub instances: BTreeMap<String, JoinInstance>,
    /// Aliases already taken in the select list.
    pub taken_aliases: Vec<String>,
}

impl<'a> BuildContext<'a> {
    pub fn new(plan: &'a QueryPlan) -> Self {
        BuildContext {
            plan,
            domain: &plan.domain,
            resolver: Resolver::new(&plan.domain, &plan.columns, &plan.joins),
            used_joins: Vec::new(),
            instances: BTreeMap::new(),
            taken_aliases: Vec::new(),
        }
    }

    /// Resolve a field reference, recording join usage and any parameterized
    /// join instance it produces.
    pub fn resolve(&mut self, reference: &str) -> Result<ResolvedField> {
        let (field, instance) = self.resolver.resolve(reference)?;
        if let Some(instance) = instance {
            self.mark_used(&instance.join.id);
            self.instances
                .entry(instance.join.id.clone())
                .or_insert(instance);
        } else {
            self.mark_used(&field.source_join);
        }
        Ok(field)
    }

    pub fn mark_used(&mut self, join_id: &str) {
        if join_id != ROOT_JOIN && !self.used_joins.iter().any(|j| j == join_id) {
            self.used_joins.push(join_id.to_string());
        }
    }

    /// Look up a planned join by id, checking instances first.
    pub fn join(&self, id: &str) -> Option<&ResolvedJoin> {
        self.instances
            .get(id)
            .map(|i| &i.join)
            .or_else(|| self.plan.joins.get(id))
    }

    pub fn column(&self, key: &str) -> Option<&ColumnEntry> {
        self.plan.columns.get(key)
    }

    /// Claim a unique output alias, suffixing on collision.
    pub fn claim_alias(&mut self, base: &str) -> String {
        let mut alias = base.to_string();
        let mut n = 1;
        while self.taken_aliases.iter().any(|a| a == &alias) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        self.taken_aliases.push(alias.clone());
        alias
    }
}

/// Render a resolved plain column as `"alias"."column"`. Custom columns owned
/// by advanced joins render through [`select::column_sql`].
pub(crate) fn plain_column(field: &ResolvedField) -> Result<Frag> {
    Ok(Frag::sql(format!(
        "{}.{}",
        double_wrap(&field.table_alias)?,
        double_wrap(&field.name)?
    )))
}

/// Resolve an association chain from the source schema, producing the target
/// schema key of the terminal association. Shared by subfilters, pivots and
/// subselects.
pub(crate) fn association_chain<'d>(
    domain: &'d Domain,
    path: &[String],
) -> Result<Vec<(&'d crate::domain::Association, &'d crate::domain::SchemaDef)>> {
    let mut chain = Vec::new();
    let mut associations = &domain.source.associations;
    for segment in path {
        let assoc = associations.get(segment).ok_or_else(|| {
            SelqError::Field(crate::error::FieldError::JoinNotFound {
                join: segment.clone(),
                available_joins: associations.keys().cloned().collect(),
            })
        })?;
        let schema = domain.schemas.get(&assoc.queryable).ok_or_else(|| {
            SelqError::Validation(vec![
                crate::validation::DomainIssue::AssociationInvalidQueryable {
                    association: segment.clone(),
                    queryable: assoc.queryable.clone(),
                },
            ])
        })?;
        chain.push((assoc, schema));
        associations = &schema.associations;
    }
    Ok(chain)
}
