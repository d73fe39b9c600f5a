//! Star and snowflake dimension joins.
//!
//! A star dimension is a direct fact-to-dimension left join. A snowflake
//! dimension adds its normalization tables as a chain of left joins, each
//! keyed `current.fk = next.pk`.

use crate::domain::{ResolvedJoin, SnowflakeConfig};
use crate::error::{JoinConfigError, Result, SelqError};
use crate::ident::double_wrap;
use crate::sql_ir::Frag;

use super::joins::parent_alias;
use super::BuildContext;

pub(crate) fn star_join(_ctx: &BuildContext, join: &ResolvedJoin) -> Result<Frag> {
    Ok(Frag::sql(format!(
        " LEFT JOIN {} {} ON {}.{} = {}.{}",
        double_wrap(&join.table)?,
        double_wrap(&join.id)?,
        double_wrap(&parent_alias(join))?,
        double_wrap(&join.owner_key)?,
        double_wrap(&join.id)?,
        double_wrap(&join.related_key)?
    )))
}

pub(crate) fn snowflake_join(
    _ctx: &BuildContext,
    join: &ResolvedJoin,
    cfg: &SnowflakeConfig,
) -> Result<Frag> {
    if cfg.normalization_joins.is_empty() {
        return Err(SelqError::JoinConfig(JoinConfigError {
            join: join.id.clone(),
            join_type: "snowflake_dimension".to_string(),
            missing: "normalization_joins".to_string(),
        }));
    }
    let mut sql = format!(
        " LEFT JOIN {} {} ON {}.{} = {}.{}",
        double_wrap(&join.table)?,
        double_wrap(&join.id)?,
        double_wrap(&parent_alias(join))?,
        double_wrap(&join.owner_key)?,
        double_wrap(&join.id)?,
        double_wrap(&join.related_key)?
    );
    let mut previous = join.id.clone();
    for step in &cfg.normalization_joins {
        let alias = format!("{}_{}", join.id, step.table);
        sql.push_str(&format!(
            " LEFT JOIN {} {} ON {}.{} = {}.{}",
            double_wrap(&step.table)?,
            double_wrap(&alias)?,
            double_wrap(&previous)?,
            double_wrap(&step.owner_key)?,
            double_wrap(&alias)?,
            double_wrap(&step.my_key)?
        ));
        previous = alias;
    }
    Ok(Frag::sql(sql))
}
