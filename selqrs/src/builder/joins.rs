//! Join emission.
//!
//! One function per join pattern, dispatched on the join's kind. Unknown
//! kinds fall back to a basic left join with a warning; malformed known kinds
//! are hard errors.

use crate::domain::{
    JoinCondition, JoinKind, ParameterizedConfig, ResolvedJoin, TemplateFrag, ROOT_JOIN,
};
use crate::error::{FieldError, JoinConfigError, Result, SelqError};
use crate::ident::double_wrap;
use crate::sql_ir::Frag;

use super::{hierarchy, olap, select, tagging, BuildContext};

pub(crate) fn build_joins(ctx: &BuildContext, planned: &[ResolvedJoin]) -> Result<Frag> {
    let mut parts = Vec::with_capacity(planned.len());
    for join in planned {
        parts.push(build_join(ctx, join)?);
    }
    Ok(Frag::Seq(parts))
}

fn build_join(ctx: &BuildContext, join: &ResolvedJoin) -> Result<Frag> {
    match &join.kind {
        JoinKind::Left => basic_join(ctx, join, "LEFT JOIN"),
        JoinKind::Inner => basic_join(ctx, join, "INNER JOIN"),
        JoinKind::SelfJoin(cfg) => {
            let self_key = cfg.self_key.as_deref().unwrap_or(&join.owner_key);
            let target_key = cfg.target_key.as_deref().unwrap_or(&join.related_key);
            Ok(Frag::sql(format!(
                " {} {} {} ON {}.{} = {}.{}",
                cfg.condition_type.keyword(),
                double_wrap(&join.table)?,
                double_wrap(&join.id)?,
                double_wrap(&parent_alias(join))?,
                double_wrap(self_key)?,
                double_wrap(&join.id)?,
                double_wrap(target_key)?
            )))
        }
        JoinKind::Lateral(cfg) => {
            let query = cfg.lateral_query.as_deref().ok_or_else(|| missing(join, "lateral_query"))?;
            Ok(Frag::sql(format!(
                " LEFT JOIN LATERAL ({query}) {} ON true",
                double_wrap(&join.id)?
            )))
        }
        JoinKind::Cross => Ok(Frag::sql(format!(
            " CROSS JOIN {} {}",
            double_wrap(&join.table)?,
            double_wrap(&join.id)?
        ))),
        JoinKind::FullOuter(cfg) => {
            let left_key = cfg.left_key.as_deref().unwrap_or(&join.owner_key);
            let right_key = cfg.right_key.as_deref().unwrap_or(&join.related_key);
            Ok(Frag::sql(format!(
                " FULL OUTER JOIN {} {} ON {}.{} = {}.{}",
                double_wrap(&join.table)?,
                double_wrap(&join.id)?,
                double_wrap(&parent_alias(join))?,
                double_wrap(left_key)?,
                double_wrap(&join.id)?,
                double_wrap(right_key)?
            )))
        }
        JoinKind::Conditional(cfg) => {
            if cfg.conditions.is_empty() {
                return Err(missing(join, "conditions"));
            }
            let mut conditions = Vec::with_capacity(cfg.conditions.len());
            for condition in &cfg.conditions {
                conditions.push(condition_frag(ctx, join, condition)?);
            }
            Ok(Frag::seq(vec![
                Frag::sql(format!(
                    " {} {} {} ON ",
                    cfg.condition_type.keyword(),
                    double_wrap(&join.table)?,
                    double_wrap(&join.id)?
                )),
                Frag::join(conditions, " AND "),
            ]))
        }
        JoinKind::StarDimension(_) => olap::star_join(ctx, join),
        JoinKind::SnowflakeDimension(cfg) => olap::snowflake_join(ctx, join, cfg),
        JoinKind::Tagging(cfg) => tagging::tagging_join(ctx, join, cfg),
        JoinKind::Hierarchical(cfg) => hierarchy::hierarchical_join(ctx, join, cfg),
        JoinKind::Parameterized(cfg) => parameterized_join(ctx, join, cfg),
        JoinKind::Unknown(tag) => {
            tracing::warn!(
                join = %join.id,
                join_type = %tag,
                "unknown join type, falling back to basic left join"
            );
            basic_join(ctx, join, "LEFT JOIN")
        }
    }
}

fn missing(join: &ResolvedJoin, what: &str) -> SelqError {
    SelqError::JoinConfig(JoinConfigError {
        join: join.id.clone(),
        join_type: join.kind.tag().to_string(),
        missing: what.to_string(),
    })
}

fn basic_join(_ctx: &BuildContext, join: &ResolvedJoin, keyword: &str) -> Result<Frag> {
    Ok(Frag::sql(format!(
        " {keyword} {} {} ON {}.{} = {}.{}",
        double_wrap(&join.table)?,
        double_wrap(&join.id)?,
        double_wrap(&parent_alias(join))?,
        double_wrap(&join.owner_key)?,
        double_wrap(&join.id)?,
        double_wrap(&join.related_key)?
    )))
}

fn condition_frag(
    ctx: &BuildContext,
    join: &ResolvedJoin,
    condition: &JoinCondition,
) -> Result<Frag> {
    match condition {
        JoinCondition::FieldComparison { left, op, right } => {
            let op = comparison_operator(join, op)?;
            let (left_field, _) = ctx.resolver.resolve(left)?;
            let (right_field, _) = ctx.resolver.resolve(right)?;
            Ok(Frag::seq(vec![
                select::column_sql(ctx, &left_field)?,
                Frag::sql(format!(" {op} ")),
                select::column_sql(ctx, &right_field)?,
            ]))
        }
        JoinCondition::DateRange { field, from, to } => {
            let (resolved, _) = ctx.resolver.resolve(field)?;
            Ok(Frag::seq(vec![
                select::column_sql(ctx, &resolved)?,
                Frag::sql(" BETWEEN "),
                Frag::param(from.clone()),
                Frag::sql(" AND "),
                Frag::param(to.clone()),
            ]))
        }
        JoinCondition::CustomSql { fragment } => {
            if fragment.contains(';') || fragment.contains("--") {
                return Err(SelqError::Field(FieldError::InvalidFormat {
                    reference: fragment.clone(),
                    reason: "custom join condition contains statement punctuation".to_string(),
                }));
            }
            Ok(Frag::sql(fragment.clone()))
        }
    }
}

fn comparison_operator(join: &ResolvedJoin, op: &str) -> Result<&'static str> {
    Ok(match op {
        "=" | "eq" => "=",
        "!=" | "neq" => "!=",
        ">" | "gt" => ">",
        ">=" | "gte" => ">=",
        "<" | "lt" => "<",
        "<=" | "lte" => "<=",
        _ => {
            return Err(SelqError::JoinConfig(JoinConfigError {
                join: join.id.clone(),
                join_type: "conditional".to_string(),
                missing: format!("supported operator (got {op})"),
            }))
        }
    })
}

/// Instantiate a parameterized join: template literals inline, parameter
/// references become real placeholders bound to the validated values.
fn parameterized_join(
    ctx: &BuildContext,
    join: &ResolvedJoin,
    cfg: &ParameterizedConfig,
) -> Result<Frag> {
    let Some(instance) = ctx.instances.get(&join.id) else {
        // Referenced without parameters; a basic join on the association keys
        // still makes sense when the template is absent.
        if cfg.join_condition.is_none() {
            return basic_join(ctx, join, "LEFT JOIN");
        }
        return Err(SelqError::JoinParameter(
            crate::error::JoinParameterError::MissingRequiredParameter {
                join: join.id.clone(),
                parameter: cfg
                    .parameters
                    .first()
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
            },
        ));
    };

    let Some(template) = &join.condition_template else {
        return basic_join(ctx, join, "LEFT JOIN");
    };

    let mut on_parts = Vec::with_capacity(template.len());
    for frag in template {
        match frag {
            TemplateFrag::Literal(text) => {
                // Template text refers to the join by its declared name; the
                // instance carries a signature-specific alias.
                let rewritten = text.replace(
                    &format!("{}.", instance.base_id),
                    &format!("{}.", double_wrap(&join.id)?),
                );
                on_parts.push(Frag::sql(rewritten));
            }
            TemplateFrag::ParamRef(name) => {
                let bound = instance.bound.iter().find(|b| &b.name == name).ok_or_else(|| {
                    SelqError::JoinParameter(
                        crate::error::JoinParameterError::MissingRequiredParameter {
                            join: instance.base_id.clone(),
                            parameter: name.clone(),
                        },
                    )
                })?;
                on_parts.push(Frag::Param(bound.value.clone()));
            }
        }
    }

    Ok(Frag::seq(vec![
        Frag::sql(format!(
            " LEFT JOIN {} {} ON ",
            double_wrap(&join.table)?,
            double_wrap(&join.id)?
        )),
        Frag::Seq(on_parts),
    ]))
}

pub(crate) fn parent_alias(join: &ResolvedJoin) -> String {
    join.requires_join
        .clone()
        .unwrap_or_else(|| ROOT_JOIN.to_string())
}

/// Primary key of the join's parent, for joins correlating on it.
pub(crate) fn parent_primary_key(ctx: &BuildContext, join: &ResolvedJoin) -> String {
    match &join.requires_join {
        None => ctx.domain.source.primary_key.clone(),
        Some(parent_id) => ctx
            .join(parent_id)
            .and_then(|parent| ctx.domain.schemas.get(&parent.schema))
            .map(|schema| schema.primary_key.clone())
            .unwrap_or_else(|| "id".to_string()),
    }
}
