//! Pivot: rewrite the query around a related schema.
//!
//! The pivoted query selects from the target schema and correlates back to
//! the original row set through a subquery over the source's FROM, joins and
//! filters. The association path from source to target is found by breadth
//! first search at pivot time.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::domain::{ColumnEntry, ColumnKind, Domain, ResolvedJoin, SchemaDef, ROOT_JOIN};
use crate::error::{FieldError, Result, SelqError};
use crate::expr::PivotStrategy;
use crate::field::Resolver;
use crate::ident::double_wrap;
use crate::plan::{PivotState, QueryPlan, QuerySet};
use crate::sql_ir::Frag;

use super::{association_chain, filters, group, joins, planner, select, BuildContext};

/// BFS over the association graph for the shortest path of association names
/// from the source schema to `target_schema`.
pub(crate) fn find_join_path(domain: &Domain, target_schema: &str) -> Result<Vec<String>> {
    if !domain.schemas.contains_key(target_schema) {
        return Err(SelqError::Field(FieldError::JoinNotFound {
            join: target_schema.to_string(),
            available_joins: domain.schemas.keys().cloned().collect(),
        }));
    }
    let mut queue: VecDeque<(Option<&SchemaDef>, Vec<String>)> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    queue.push_back((None, Vec::new()));
    while let Some((schema, path)) = queue.pop_front() {
        let associations = match schema {
            None => &domain.source.associations,
            Some(schema) => &schema.associations,
        };
        for (name, assoc) in associations {
            let mut next_path = path.clone();
            next_path.push(name.clone());
            if assoc.queryable == target_schema {
                return Ok(next_path);
            }
            if visited.insert(assoc.queryable.clone()) {
                if let Some(next) = domain.schemas.get(&assoc.queryable) {
                    queue.push_back((Some(next), next_path));
                }
            }
        }
    }
    Err(SelqError::Field(FieldError::JoinNotFound {
        join: target_schema.to_string(),
        available_joins: domain.schemas.keys().cloned().collect(),
    }))
}

pub(crate) fn build_frag(plan: &QueryPlan) -> Result<(Frag, Vec<(String, String)>)> {
    let state = plan
        .set
        .pivot
        .as_ref()
        .expect("pivot build requires a pivot state");
    let domain = &*plan.domain;
    let target_key = &state.spec.target_schema;
    let target = domain.schemas.get(target_key).ok_or_else(|| {
        SelqError::Field(FieldError::JoinNotFound {
            join: target_key.clone(),
            available_joins: domain.schemas.keys().cloned().collect(),
        })
    })?;

    // Post-pivot expressions resolve against the target schema only.
    let columns = pivot_columns(target, target_key);
    let no_joins: BTreeMap<String, ResolvedJoin> = BTreeMap::new();
    let mut ctx = BuildContext {
        plan,
        domain,
        resolver: Resolver::new(domain, &columns, &no_joins),
        used_joins: Vec::new(),
        instances: BTreeMap::new(),
        taken_aliases: Vec::new(),
    };

    let select_list = select::build_select_list(&mut ctx)?;
    let user_where = filters::build_filter_set(&mut ctx, &plan.set.filtered.clone())?;
    let group = group::build_group_by(&mut ctx)?;
    let having_frag = filters::build_filter_set(&mut ctx, &plan.set.having.clone())?;
    let order_frag = group::build_order_by(&mut ctx, &plan.set.order_by.clone())?;

    let correlation = correlation_frag(plan, state, target, target_key)?;

    let mut core = Vec::new();
    core.push(Frag::sql("SELECT "));
    core.push(Frag::join(
        select_list.iter().map(|item| item.frag.clone()).collect(),
        ", ",
    ));
    core.push(Frag::sql(" FROM "));
    core.push(Frag::sql(double_wrap(&target.table)?));
    core.push(Frag::sql(" "));
    core.push(Frag::sql(double_wrap(target_key)?));

    let mut where_parts = Vec::new();
    match correlation {
        Correlation::Where(frag) => where_parts.push(frag),
        Correlation::Join(frag) => core.push(frag),
    }
    if !user_where.is_empty() {
        where_parts.push(user_where);
    }
    if !where_parts.is_empty() {
        core.push(Frag::sql(" WHERE "));
        core.push(Frag::join(where_parts, " AND "));
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

    let aliases = select_list
        .into_iter()
        .map(|item| (item.alias, item.description))
        .collect();
    Ok((Frag::Seq(core), aliases))
}

enum Correlation {
    Where(Frag),
    Join(Frag),
}

/// Build the correlation between the pivoted target and the original rows.
fn correlation_frag(
    plan: &QueryPlan,
    state: &PivotState,
    _target: &SchemaDef,
    target_key: &str,
) -> Result<Correlation> {
    let domain = &*plan.domain;
    let chain = association_chain(domain, &state.spec.join_path)?;
    let terminal = chain
        .last()
        .map(|(assoc, _)| *assoc)
        .expect("join path is never empty");

    // Original row set rendered with its own context: source FROM, joins
    // pulled in by the preserved filters, and those filters.
    let shadow = QueryPlan {
        domain: plan.domain.clone(),
        columns: plan.columns.clone(),
        joins: plan.joins.clone(),
        executor: None,
        set: QuerySet {
            filtered: if state.spec.preserve_filters {
                state.original_filters.clone()
            } else {
                Vec::new()
            },
            ..QuerySet::default()
        },
    };
    let mut ictx = BuildContext::new(&shadow);
    let inner_where = filters::build_where(&mut ictx)?;
    let planned = planner::plan_joins(&ictx)?;
    let inner_joins = joins::build_joins(&ictx, &planned)?;

    // Walk the association chain (all but the terminal hop) inside the
    // subquery so the terminal owner key is selectable.
    let mut chain_joins = String::new();
    let mut owner_alias = double_wrap(ROOT_JOIN)?;
    for (idx, (assoc, schema)) in chain.iter().enumerate().take(chain.len() - 1) {
        let alias = format!("pv{}_{}", idx + 1, state.spec.join_path[idx]);
        chain_joins.push_str(&format!(
            " INNER JOIN {} {} ON {}.{} = {}.{}",
            double_wrap(&schema.table)?,
            alias,
            owner_alias,
            double_wrap(&assoc.owner_key)?,
            alias,
            double_wrap(&assoc.related_key)?
        ));
        owner_alias = alias;
    }
    let link = format!("{owner_alias}.{}", double_wrap(&terminal.owner_key)?);
    let outer = format!(
        "{}.{}",
        double_wrap(target_key)?,
        double_wrap(&terminal.related_key)?
    );

    let from = Frag::seq(vec![
        Frag::sql(format!(
            "FROM {} {}",
            double_wrap(&domain.source.table)?,
            double_wrap(ROOT_JOIN)?
        )),
        inner_joins,
        Frag::sql(chain_joins),
    ]);

    Ok(match state.spec.subquery_strategy {
        PivotStrategy::In => {
            let mut parts = vec![
                Frag::sql(format!("{outer} IN (SELECT DISTINCT {link} ")),
                from,
            ];
            if !inner_where.is_empty() {
                parts.push(Frag::sql(" WHERE "));
                parts.push(inner_where);
            }
            parts.push(Frag::sql(")"));
            Correlation::Where(Frag::Seq(parts))
        }
        PivotStrategy::Exists => {
            let mut parts = vec![Frag::sql("EXISTS (SELECT 1 "), from];
            parts.push(Frag::sql(format!(" WHERE {link} = {outer}")));
            if !inner_where.is_empty() {
                parts.push(Frag::sql(" AND "));
                parts.push(inner_where);
            }
            parts.push(Frag::sql(")"));
            Correlation::Where(Frag::Seq(parts))
        }
        PivotStrategy::Join => {
            let mut parts = vec![
                Frag::sql(format!(
                    " INNER JOIN (SELECT DISTINCT {link} AS pivot_key "
                )),
                from,
            ];
            if !inner_where.is_empty() {
                parts.push(Frag::sql(" WHERE "));
                parts.push(inner_where);
            }
            parts.push(Frag::sql(format!(
                ") \"pivot_source\" ON {outer} = \"pivot_source\".pivot_key"
            )));
            Correlation::Join(Frag::Seq(parts))
        }
    })
}

fn pivot_columns(target: &SchemaDef, target_key: &str) -> BTreeMap<String, ColumnEntry> {
    let mut columns = BTreeMap::new();
    for field in &target.fields {
        if target.is_redacted(field) {
            continue;
        }
        columns.insert(
            field.clone(),
            ColumnEntry {
                key: field.clone(),
                name: field.clone(),
                qualified_name: format!("{target_key}.{field}"),
                source_join: ROOT_JOIN.to_string(),
                table_alias: target_key.to_string(),
                field_type: target.field_type(field),
                kind: ColumnKind::Plain,
            },
        );
    }
    columns
}
