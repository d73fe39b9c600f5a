//! WHERE and HAVING building.
//!
//! Comparison values always travel as parameters; `IN` lists are passed as a
//! single array parameter used through `= ANY($k)`.

use serde_json::Value;

use crate::domain::JoinKind;
use crate::error::{FieldError, Result, SelqError};
use crate::expr::{
    CompareOp, Comparison, FacetStrategy, FilterExpr, SubfilterPredicate, SubfilterSpec,
    SubfilterStrategy,
};
use crate::ident::double_wrap;
use crate::sql_ir::Frag;

use super::{association_chain, select, tagging, BuildContext};

/// Required filters from the domain always apply, ahead of caller filters.
pub(crate) fn build_where(ctx: &mut BuildContext) -> Result<Frag> {
    let mut all = ctx.plan.domain.required_filters.clone();
    all.extend(ctx.plan.set.filtered.iter().cloned());
    build_filter_set(ctx, &all)
}

/// AND-join a filter list; empty input yields an empty fragment.
pub(crate) fn build_filter_set(ctx: &mut BuildContext, filters: &[FilterExpr]) -> Result<Frag> {
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        parts.push(filter_frag(ctx, filter)?);
    }
    Ok(Frag::join(parts, " AND "))
}

pub(crate) fn filter_frag(ctx: &mut BuildContext, filter: &FilterExpr) -> Result<Frag> {
    match filter {
        FilterExpr::Compare(comparison) => {
            let field = ctx.resolve(&comparison.field)?;
            let lhs = select::column_sql(ctx, &field)?;
            comparison_frag(lhs, comparison)
        }
        FilterExpr::And(children) => grouped(ctx, children, " AND "),
        FilterExpr::Or(children) => grouped(ctx, children, " OR "),
        FilterExpr::Facet {
            field,
            values,
            strategy,
        } => facet_frag(ctx, field, values, *strategy),
        FilterExpr::Subfilter(spec) => subfilter_frag(ctx, spec),
    }
}

fn grouped(ctx: &mut BuildContext, children: &[FilterExpr], sep: &'static str) -> Result<Frag> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        parts.push(filter_frag(ctx, child)?);
    }
    Ok(Frag::seq(vec![
        Frag::sql("("),
        Frag::join(parts, sep),
        Frag::sql(")"),
    ]))
}

/// Render `lhs <op> ...` for one comparison.
pub(crate) fn comparison_frag(lhs: Frag, comparison: &Comparison) -> Result<Frag> {
    let op = comparison.op;
    let value = &comparison.value;
    let invalid = |reason: &str| {
        SelqError::Field(FieldError::InvalidFormat {
            reference: comparison.field.clone(),
            reason: reason.to_string(),
        })
    };
    Ok(match op {
        CompareOp::IsNull => Frag::seq(vec![lhs, Frag::sql(" IS NULL")]),
        CompareOp::NotNull => Frag::seq(vec![lhs, Frag::sql(" IS NOT NULL")]),
        CompareOp::Eq if value.is_null() => Frag::seq(vec![lhs, Frag::sql(" IS NULL")]),
        CompareOp::Neq if value.is_null() => Frag::seq(vec![lhs, Frag::sql(" IS NOT NULL")]),
        CompareOp::In => {
            let Value::Array(_) = value else {
                return Err(invalid("IN requires an array value"));
            };
            Frag::seq(vec![
                lhs,
                Frag::sql(" = ANY("),
                Frag::Param(value.clone()),
                Frag::sql(")"),
            ])
        }
        CompareOp::Between => {
            let Value::Array(bounds) = value else {
                return Err(invalid("BETWEEN requires a two-element array"));
            };
            let [low, high] = bounds.as_slice() else {
                return Err(invalid("BETWEEN requires a two-element array"));
            };
            Frag::seq(vec![
                lhs,
                Frag::sql(" BETWEEN "),
                Frag::Param(low.clone()),
                Frag::sql(" AND "),
                Frag::Param(high.clone()),
            ])
        }
        other => {
            let Some(op_sql) = other.sql() else {
                return Err(invalid("unsupported operator"));
            };
            Frag::seq(vec![
                lhs,
                Frag::sql(format!(" {op_sql} ")),
                Frag::Param(value.clone()),
            ])
        }
    })
}

fn facet_frag(
    ctx: &mut BuildContext,
    field: &str,
    values: &[Value],
    strategy: FacetStrategy,
) -> Result<Frag> {
    // Resolve without marking the join used yet: the ALL strategy correlates
    // through its own subquery and never touches the main FROM clause.
    let (resolved, _) = ctx.resolver.resolve(field)?;
    let is_tagging = ctx
        .join(&resolved.source_join)
        .map(|j| matches!(j.kind, JoinKind::Tagging(_)))
        .unwrap_or(false);

    if is_tagging && strategy == FacetStrategy::All {
        let join = ctx.join(&resolved.source_join).cloned().ok_or_else(|| {
            SelqError::Field(FieldError::JoinNotFound {
                join: resolved.source_join.clone(),
                available_joins: ctx.plan.joins.keys().cloned().collect(),
            })
        })?;
        return tagging::facet_all_frag(ctx, &join, values);
    }

    ctx.mark_used(&resolved.source_join);
    let lhs = select::column_sql(ctx, &resolved)?;
    match strategy {
        FacetStrategy::Single => {
            let [value] = values else {
                return Err(SelqError::Field(FieldError::InvalidFormat {
                    reference: field.to_string(),
                    reason: "single facet takes exactly one value".to_string(),
                }));
            };
            Ok(Frag::seq(vec![
                lhs,
                Frag::sql(" = "),
                Frag::Param(value.clone()),
            ]))
        }
        FacetStrategy::Any | FacetStrategy::All => Ok(Frag::seq(vec![
            lhs,
            Frag::sql(" = ANY("),
            Frag::Param(Value::Array(values.to_vec())),
            Frag::sql(")"),
        ])),
    }
}

fn subfilter_frag(ctx: &mut BuildContext, spec: &SubfilterSpec) -> Result<Frag> {
    let segments: Vec<&str> = spec.path.split('.').collect();
    if segments.len() < 2 {
        return Err(SelqError::Field(FieldError::InvalidFormat {
            reference: spec.path.clone(),
            reason: "subfilter path needs association and field segments".to_string(),
        }));
    }
    let (field, assoc_path) = segments.split_last().expect("length checked");
    let path: Vec<String> = assoc_path.iter().map(|s| s.to_string()).collect();
    let chain = association_chain(ctx.domain, &path)?;

    let first_alias = sub_alias(&path[0], 1);
    let last_alias = sub_alias(&path[path.len() - 1], path.len());
    let terminal_field = format!("{last_alias}.{}", double_wrap(field)?);

    // FROM + INNER JOIN chain inside the subquery.
    let mut from = String::new();
    for (idx, (assoc, schema)) in chain.iter().enumerate() {
        let alias = sub_alias(&path[idx], idx + 1);
        if idx == 0 {
            from.push_str(&format!("{} {}", double_wrap(&schema.table)?, alias));
        } else {
            let prev_alias = sub_alias(&path[idx - 1], idx);
            from.push_str(&format!(
                " INNER JOIN {} {} ON {}.{} = {}.{}",
                double_wrap(&schema.table)?,
                alias,
                prev_alias,
                double_wrap(&assoc.owner_key)?,
                alias,
                double_wrap(&assoc.related_key)?
            ));
        }
    }

    let (first_assoc, _) = &chain[0];
    let correlation = format!(
        "{first_alias}.{} = {}.{}",
        double_wrap(&first_assoc.related_key)?,
        double_wrap(crate::domain::ROOT_JOIN)?,
        double_wrap(&first_assoc.owner_key)?
    );

    // An aggregation predicate always renders as an aggregation subquery.
    if let SubfilterPredicate::Aggregation { func, op, value } = &spec.predicate {
        let agg = match func {
            crate::expr::AggFunc::Count => "count".to_string(),
            other => other.sql_name().to_string(),
        };
        let comparison = Comparison {
            field: spec.path.clone(),
            op: *op,
            value: value.clone(),
        };
        let scalar = Frag::seq(vec![
            Frag::sql(format!("(SELECT {agg}({terminal_field}) FROM {from} WHERE {correlation})")),
        ]);
        return comparison_frag(scalar, &comparison);
    }

    let predicate = predicate_frag(Frag::sql(terminal_field), &spec.predicate)?;

    match spec.strategy {
        SubfilterStrategy::Exists => Ok(Frag::seq(vec![
            Frag::sql(format!("EXISTS (SELECT 1 FROM {from} WHERE {correlation} AND ")),
            predicate,
            Frag::sql(")"),
        ])),
        SubfilterStrategy::In => Ok(Frag::seq(vec![
            Frag::sql(format!(
                "{}.{} IN (SELECT {first_alias}.{} FROM {from} WHERE ",
                double_wrap(crate::domain::ROOT_JOIN)?,
                double_wrap(&first_assoc.owner_key)?,
                double_wrap(&first_assoc.related_key)?
            )),
            predicate,
            Frag::sql(")"),
        ])),
        SubfilterStrategy::Aggregation => {
            // Aggregation strategy with a plain predicate counts matching rows.
            Ok(Frag::seq(vec![
                Frag::sql(format!(
                    "(SELECT count(*) FROM {from} WHERE {correlation} AND "
                )),
                predicate,
                Frag::sql(") > 0"),
            ]))
        }
    }
}

fn predicate_frag(lhs: Frag, predicate: &SubfilterPredicate) -> Result<Frag> {
    let compare = |op: CompareOp, value: Value, lhs: Frag| {
        comparison_frag(
            lhs,
            &Comparison {
                field: String::new(),
                op,
                value,
            },
        )
    };
    match predicate {
        SubfilterPredicate::Value(value) => compare(CompareOp::Eq, value.clone(), lhs),
        SubfilterPredicate::Compare { op, value } => compare(*op, value.clone(), lhs),
        SubfilterPredicate::InList(values) => {
            compare(CompareOp::In, Value::Array(values.clone()), lhs)
        }
        SubfilterPredicate::Recent { years } => Ok(Frag::seq(vec![
            lhs,
            Frag::sql(" >= now() - ("),
            Frag::param(*years),
            Frag::sql(" * INTERVAL '1 year')"),
        ])),
        SubfilterPredicate::WithinDays { days } => Ok(Frag::seq(vec![
            lhs,
            Frag::sql(" >= now() - ("),
            Frag::param(*days),
            Frag::sql(" * INTERVAL '1 day')"),
        ])),
        SubfilterPredicate::SinceDate { date } => Ok(Frag::seq(vec![
            lhs,
            Frag::sql(" >= "),
            Frag::param(date.clone()),
        ])),
        SubfilterPredicate::Range { from, to } => compare(
            CompareOp::Between,
            Value::Array(vec![from.clone(), to.clone()]),
            lhs,
        ),
        SubfilterPredicate::Aggregation { op, value, .. } => {
            compare(*op, value.clone(), lhs)
        }
    }
}

fn sub_alias(assoc: &str, position: usize) -> String {
    format!("sf{position}_{assoc}")
}
