//! SELECT list building.
//!
//! Every expression gets a stable alias derived from its shape. Literals are
//! parameterized; only identifiers and builder-generated constants reach the
//! SQL text directly.

use serde_json::Value;

use crate::domain::{ColumnKind, HierarchyConfig, JoinKind};
use crate::error::{FieldError, Result, SelqError};
use crate::expr::{AggFunc, Expr, SqlFunc};
use crate::field::ResolvedField;
use crate::ident::{check_safe_phrase, double_wrap, single_wrap};
use crate::sql_ir::Frag;

use super::{filters, plain_column, subselect, window, BuildContext, SelectItemFrag};

pub(crate) fn build_select_list(ctx: &mut BuildContext) -> Result<Vec<SelectItemFrag>> {
    let mut selected = ctx.plan.set.selected.clone();
    if selected.is_empty() {
        selected = ctx
            .plan
            .domain
            .default_selected
            .iter()
            .map(|f| Expr::Field(f.clone()))
            .collect();
    }
    if selected.is_empty()
        && ctx.plan.set.window_functions.is_empty()
        && ctx.plan.set.subselects.is_empty()
    {
        return Err(SelqError::EmptySelect);
    }

    let mut items = Vec::new();
    for expr in &selected {
        items.push(render_item(ctx, expr)?);
    }
    for spec in &ctx.plan.set.window_functions.clone() {
        items.push(window::build_window_item(ctx, spec)?);
    }
    for spec in &ctx.plan.set.subselects.clone() {
        items.push(subselect::build_subselect_item(ctx, spec)?);
    }
    Ok(items)
}

fn render_item(ctx: &mut BuildContext, expr: &Expr) -> Result<SelectItemFrag> {
    let (inner, explicit_alias) = match expr {
        Expr::Aliased { expr, alias } => (expr.as_ref(), Some(alias.clone())),
        other => (other, None),
    };
    let frag = expr_frag(ctx, inner)?;
    let description = describe(ctx, inner)?;
    let alias = ctx.claim_alias(&explicit_alias.unwrap_or_else(|| derive_alias(inner)));
    let frag = Frag::seq(vec![
        frag,
        Frag::sql(" AS "),
        Frag::sql(double_wrap(&alias)?),
    ]);
    Ok(SelectItemFrag {
        frag,
        alias,
        description,
    })
}

/// Render an expression to a fragment, resolving field references as we go.
pub(crate) fn expr_frag(ctx: &mut BuildContext, expr: &Expr) -> Result<Frag> {
    match expr {
        Expr::Field(reference) => {
            let field = ctx.resolve(reference)?;
            column_sql(ctx, &field)
        }
        Expr::Literal(value) => Ok(Frag::Param(value.clone())),
        Expr::CountStar => Ok(Frag::sql("count(*)")),
        Expr::Aggregate { agg, expr } => {
            let inner = expr_frag(ctx, expr)?;
            Ok(match agg {
                AggFunc::CountDistinct => Frag::seq(vec![
                    Frag::sql("count(DISTINCT "),
                    inner,
                    Frag::sql(")"),
                ]),
                other => Frag::seq(vec![
                    Frag::sql(format!("{}(", other.sql_name())),
                    inner,
                    Frag::sql(")"),
                ]),
            })
        }
        Expr::Func { func, args } => func_frag(ctx, func, args),
        Expr::Case {
            branches,
            else_expr,
        } => {
            let mut parts = vec![Frag::sql("CASE")];
            for branch in branches {
                parts.push(Frag::sql(" WHEN "));
                parts.push(filters::filter_frag(ctx, &branch.when)?);
                parts.push(Frag::sql(" THEN "));
                parts.push(expr_frag(ctx, &branch.then)?);
            }
            if let Some(else_expr) = else_expr {
                parts.push(Frag::sql(" ELSE "));
                parts.push(expr_frag(ctx, else_expr)?);
            }
            parts.push(Frag::sql(" END"));
            Ok(Frag::Seq(parts))
        }
        Expr::Iif {
            condition,
            then_expr,
            else_expr,
        } => Ok(Frag::seq(vec![
            Frag::sql("CASE WHEN "),
            filters::filter_frag(ctx, condition)?,
            Frag::sql(" THEN "),
            expr_frag(ctx, then_expr)?,
            Frag::sql(" ELSE "),
            expr_frag(ctx, else_expr)?,
            Frag::sql(" END"),
        ])),
        Expr::Decode {
            expr,
            pairs,
            default,
        } => {
            let mut parts = vec![Frag::sql("CASE")];
            for (value, result) in pairs {
                parts.push(Frag::sql(" WHEN "));
                parts.push(expr_frag(ctx, expr)?);
                parts.push(Frag::sql(" = "));
                parts.push(Frag::Param(value.clone()));
                parts.push(Frag::sql(" THEN "));
                parts.push(expr_frag(ctx, result)?);
            }
            if let Some(default) = default {
                parts.push(Frag::sql(" ELSE "));
                parts.push(expr_frag(ctx, default)?);
            }
            parts.push(Frag::sql(" END"));
            Ok(Frag::Seq(parts))
        }
        Expr::Window { func, args, over } => window::window_frag(ctx, *func, args, over),
        Expr::CustomSql { template, fields } => custom_sql_frag(ctx, template, fields),
        Expr::Aliased { expr, .. } => expr_frag(ctx, expr),
    }
}

fn simple_call(ctx: &mut BuildContext, name: &str, args: &[Expr]) -> Result<Frag> {
    let mut rendered = Vec::with_capacity(args.len());
    for arg in args {
        rendered.push(expr_frag(ctx, arg)?);
    }
    Ok(Frag::seq(vec![
        Frag::sql(format!("{name}(")),
        Frag::join(rendered, ", "),
        Frag::sql(")"),
    ]))
}

fn func_frag(ctx: &mut BuildContext, func: &SqlFunc, args: &[Expr]) -> Result<Frag> {
    match func {
        SqlFunc::Substr => simple_call(ctx, "substr", args),
        SqlFunc::Trim => simple_call(ctx, "trim", args),
        SqlFunc::Upper => simple_call(ctx, "upper", args),
        SqlFunc::Lower => simple_call(ctx, "lower", args),
        SqlFunc::Length => simple_call(ctx, "length", args),
        SqlFunc::Replace => simple_call(ctx, "replace", args),
        SqlFunc::Concat => simple_call(ctx, "concat", args),
        SqlFunc::Abs => simple_call(ctx, "abs", args),
        SqlFunc::Round => simple_call(ctx, "round", args),
        SqlFunc::Power => simple_call(ctx, "power", args),
        SqlFunc::Sqrt => simple_call(ctx, "sqrt", args),
        SqlFunc::Random => Ok(Frag::sql("random()")),
        SqlFunc::Now => Ok(Frag::sql("now()")),
        SqlFunc::DateTrunc { unit } => {
            let unit = check_safe_phrase(unit)?;
            let mut parts = vec![Frag::sql(format!("date_trunc({}, ", single_wrap(unit)))];
            parts.push(expr_frag(ctx, first_arg(args, "date_trunc")?)?);
            parts.push(Frag::sql(")"));
            Ok(Frag::Seq(parts))
        }
        SqlFunc::Age => simple_call(ctx, "age", args),
        SqlFunc::Interval { amount, unit } => {
            let unit = check_safe_phrase(unit)?;
            Ok(Frag::sql(format!("INTERVAL '{amount} {unit}'")))
        }
        SqlFunc::ArrayAgg => simple_call(ctx, "array_agg", args),
        SqlFunc::ArrayLength => {
            let mut parts = vec![Frag::sql("array_length(")];
            parts.push(expr_frag(ctx, first_arg(args, "array_length")?)?);
            parts.push(Frag::sql(", 1)"));
            Ok(Frag::Seq(parts))
        }
        SqlFunc::ArrayToString => simple_call(ctx, "array_to_string", args),
        SqlFunc::Unnest => simple_call(ctx, "unnest", args),
        SqlFunc::Coalesce => simple_call(ctx, "coalesce", args),
        SqlFunc::Nullif => simple_call(ctx, "nullif", args),
        SqlFunc::Greatest => simple_call(ctx, "greatest", args),
        SqlFunc::Least => simple_call(ctx, "least", args),
        SqlFunc::Extract { field } => {
            let field = check_safe_phrase(field)?;
            let mut parts = vec![Frag::sql(format!("extract({field} FROM "))];
            parts.push(expr_frag(ctx, first_arg(args, "extract")?)?);
            parts.push(Frag::sql(")"));
            Ok(Frag::Seq(parts))
        }
    }
}

fn first_arg<'e>(args: &'e [Expr], func: &str) -> Result<&'e Expr> {
    args.first().ok_or_else(|| {
        SelqError::Field(FieldError::InvalidFormat {
            reference: func.to_string(),
            reason: "function requires an argument".to_string(),
        })
    })
}

/// Render a resolved field. Plain columns become `"alias"."column"`; custom
/// columns expand into the SQL their owning join defines.
pub(crate) fn column_sql(ctx: &BuildContext, field: &ResolvedField) -> Result<Frag> {
    match field.kind {
        ColumnKind::Plain
        | ColumnKind::HierarchyPath
        | ColumnKind::HierarchyLevel
        | ColumnKind::HierarchyPathArray => plain_column(field),
        ColumnKind::StarDisplay => {
            let join = expect_join(ctx, &field.source_join)?;
            let display = match &join.kind {
                JoinKind::StarDimension(cfg) => cfg.display().to_string(),
                JoinKind::SnowflakeDimension(cfg) => {
                    cfg.display_field.clone().unwrap_or_else(|| "name".to_string())
                }
                _ => "name".to_string(),
            };
            Ok(Frag::sql(format!(
                "{}.{}",
                double_wrap(&field.table_alias)?,
                double_wrap(&display)?
            )))
        }
        ColumnKind::TagList | ColumnKind::TagArray | ColumnKind::TagCount => {
            let join = expect_join(ctx, &field.source_join)?;
            let JoinKind::Tagging(cfg) = &join.kind else {
                return plain_column(field);
            };
            let tag = format!(
                "{}.{}",
                double_wrap(&field.table_alias)?,
                double_wrap(&cfg.tag_field)?
            );
            Ok(match field.kind {
                ColumnKind::TagList => Frag::seq(vec![
                    Frag::sql(format!("string_agg(DISTINCT {tag}, ")),
                    Frag::Param(Value::String(", ".to_string())),
                    Frag::sql(")"),
                ]),
                ColumnKind::TagArray => Frag::sql(format!("array_agg(DISTINCT {tag})")),
                _ => Frag::sql(format!("count(DISTINCT {tag})")),
            })
        }
        ColumnKind::ClosureDepth => {
            let join = expect_join(ctx, &field.source_join)?;
            let JoinKind::Hierarchical(HierarchyConfig::ClosureTable { depth_field, .. }) =
                &join.kind
            else {
                return plain_column(field);
            };
            Ok(Frag::sql(format!(
                "{}.{}",
                double_wrap(&format!("{}_closure", join.id))?,
                double_wrap(depth_field)?
            )))
        }
        ColumnKind::ClosureDescendantCount => {
            let join = expect_join(ctx, &field.source_join)?;
            let JoinKind::Hierarchical(HierarchyConfig::ClosureTable {
                closure_table,
                ancestor_field,
                ..
            }) = &join.kind
            else {
                return plain_column(field);
            };
            let closure = closure_key(&join.id, closure_table, ancestor_field)?;
            let schema = ctx.domain.schemas.get(&join.schema);
            let pk = schema
                .map(|s| s.primary_key.clone())
                .unwrap_or_else(|| "id".to_string());
            Ok(Frag::sql(format!(
                "(SELECT count(*) FROM {} dc WHERE dc.{} = {}.{})",
                closure.0, closure.1, double_wrap(&join.id)?, double_wrap(&pk)?
            )))
        }
    }
}

fn closure_key(
    join_id: &str,
    closure_table: &Option<String>,
    ancestor_field: &Option<String>,
) -> Result<(String, String)> {
    let table = closure_table.as_deref().ok_or_else(|| {
        SelqError::JoinConfig(crate::error::JoinConfigError {
            join: join_id.to_string(),
            join_type: "hierarchical/closure_table".to_string(),
            missing: "closure_table".to_string(),
        })
    })?;
    let ancestor = ancestor_field.as_deref().ok_or_else(|| {
        SelqError::JoinConfig(crate::error::JoinConfigError {
            join: join_id.to_string(),
            join_type: "hierarchical/closure_table".to_string(),
            missing: "ancestor_field".to_string(),
        })
    })?;
    Ok((double_wrap(table)?, double_wrap(ancestor)?))
}

fn expect_join<'c>(
    ctx: &'c BuildContext,
    join_id: &str,
) -> Result<&'c crate::domain::ResolvedJoin> {
    ctx.join(join_id).ok_or_else(|| {
        SelqError::Field(FieldError::JoinNotFound {
            join: join_id.to_string(),
            available_joins: ctx.plan.joins.keys().cloned().collect(),
        })
    })
}

fn custom_sql_frag(
    ctx: &mut BuildContext,
    template: &str,
    fields: &std::collections::BTreeMap<String, String>,
) -> Result<Frag> {
    let mut parts = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let close = rest[open..].find('}').map(|i| open + i).ok_or_else(|| {
            SelqError::Field(FieldError::InvalidFormat {
                reference: template.to_string(),
                reason: "unterminated placeholder".to_string(),
            })
        })?;
        if open > 0 {
            parts.push(Frag::sql(rest[..open].to_string()));
        }
        let name = &rest[open + 1..close];
        let reference = fields.get(name).ok_or_else(|| {
            SelqError::Field(FieldError::InvalidFormat {
                reference: template.to_string(),
                reason: format!("placeholder {{{name}}} has no field binding"),
            })
        })?;
        let field = ctx.resolve(reference)?;
        parts.push(column_sql(ctx, &field)?);
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        parts.push(Frag::sql(rest.to_string()));
    }
    Ok(Frag::Seq(parts))
}

/// Stable alias derived from the expression shape.
pub(crate) fn derive_alias(expr: &Expr) -> String {
    match expr {
        Expr::Field(reference) => reference
            .rsplit('.')
            .next()
            .unwrap_or(reference)
            .trim_end_matches(']')
            .rsplit('[')
            .next()
            .unwrap_or(reference)
            .to_string(),
        Expr::Literal(_) => "literal".to_string(),
        Expr::CountStar => "count".to_string(),
        Expr::Aggregate { agg, expr } => {
            format!("{}({})", agg.sql_name(), derive_alias(expr))
        }
        Expr::Func { func, .. } => func_alias(func).to_string(),
        Expr::Case { .. } => "case".to_string(),
        Expr::Iif { .. } => "iif".to_string(),
        Expr::Decode { .. } => "decode".to_string(),
        Expr::Window { func, .. } => func.sql_name().to_ascii_lowercase(),
        Expr::CustomSql { .. } => "custom".to_string(),
        Expr::Aliased { alias, .. } => alias.clone(),
    }
}

fn func_alias(func: &SqlFunc) -> &'static str {
    match func {
        SqlFunc::Substr => "substr",
        SqlFunc::Trim => "trim",
        SqlFunc::Upper => "upper",
        SqlFunc::Lower => "lower",
        SqlFunc::Length => "length",
        SqlFunc::Replace => "replace",
        SqlFunc::Concat => "concat",
        SqlFunc::Abs => "abs",
        SqlFunc::Round => "round",
        SqlFunc::Power => "power",
        SqlFunc::Sqrt => "sqrt",
        SqlFunc::Random => "random",
        SqlFunc::Now => "now",
        SqlFunc::DateTrunc { .. } => "date_trunc",
        SqlFunc::Age => "age",
        SqlFunc::Interval { .. } => "interval",
        SqlFunc::ArrayAgg => "array_agg",
        SqlFunc::ArrayLength => "array_length",
        SqlFunc::ArrayToString => "array_to_string",
        SqlFunc::Unnest => "unnest",
        SqlFunc::Coalesce => "coalesce",
        SqlFunc::Nullif => "nullif",
        SqlFunc::Greatest => "greatest",
        SqlFunc::Least => "least",
        SqlFunc::Extract { .. } => "extract",
    }
}

/// Human-readable description recorded in the alias map.
fn describe(ctx: &mut BuildContext, expr: &Expr) -> Result<String> {
    Ok(match expr {
        Expr::Field(reference) => {
            let field = ctx.resolve(reference)?;
            field.qualified_name
        }
        other => derive_alias(other),
    })
}
