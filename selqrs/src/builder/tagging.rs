//! Many-to-many tag joins.
//!
//! Emission goes through the join table first, then the tag table itself.
//! Faceted ALL filtering never touches the main FROM clause: it counts
//! distinct matches in a correlated subquery and compares against the number
//! of requested tags.

use serde_json::Value;

use crate::domain::{ResolvedJoin, TaggingConfig, ROOT_JOIN};
use crate::error::Result;
use crate::ident::double_wrap;
use crate::sql_ir::Frag;

use super::joins::{parent_alias, parent_primary_key};
use super::BuildContext;

pub(crate) fn tagging_join(
    ctx: &BuildContext,
    join: &ResolvedJoin,
    cfg: &TaggingConfig,
) -> Result<Frag> {
    let join_alias = format!("{}_join", join.id);
    let parent = parent_alias(join);
    let parent_pk = parent_primary_key(ctx, join);
    let tag_pk = ctx
        .domain
        .schemas
        .get(&join.schema)
        .map(|s| s.primary_key.clone())
        .unwrap_or_else(|| "id".to_string());
    Ok(Frag::sql(format!(
        " LEFT JOIN {jt} {jta} ON {p}.{ppk} = {jta}.{main_fk} LEFT JOIN {tt} {ta} ON {jta}.{tag_fk} = {ta}.{tpk}",
        jt = double_wrap(&cfg.join_table)?,
        jta = double_wrap(&join_alias)?,
        p = double_wrap(&parent)?,
        ppk = double_wrap(&parent_pk)?,
        main_fk = double_wrap(&cfg.main_foreign_key)?,
        tt = double_wrap(&join.table)?,
        ta = double_wrap(&join.id)?,
        tag_fk = double_wrap(&cfg.tag_foreign_key)?,
        tpk = double_wrap(&tag_pk)?,
    )))
}

/// `ALL` facet: every requested tag must be present on the row.
pub(crate) fn facet_all_frag(
    ctx: &BuildContext,
    join: &ResolvedJoin,
    values: &[Value],
) -> Result<Frag> {
    let crate::domain::JoinKind::Tagging(cfg) = &join.kind else {
        unreachable!("facet_all_frag is only called for tagging joins");
    };
    let tag_pk = ctx
        .domain
        .schemas
        .get(&join.schema)
        .map(|s| s.primary_key.clone())
        .unwrap_or_else(|| "id".to_string());
    let main_pk = ctx.domain.source.primary_key.clone();
    let count = values.len() as i64;
    Ok(Frag::seq(vec![
        Frag::sql(format!(
            "(SELECT COUNT(DISTINCT t.{tag_field}) FROM {jt} jt INNER JOIN {tt} t ON jt.{tag_fk} = t.{tpk} WHERE jt.{main_fk} = {root}.{root_pk} AND t.{tag_field} = ANY(",
            tag_field = double_wrap(&cfg.tag_field)?,
            jt = double_wrap(&cfg.join_table)?,
            tt = double_wrap(&join.table)?,
            tag_fk = double_wrap(&cfg.tag_foreign_key)?,
            tpk = double_wrap(&tag_pk)?,
            main_fk = double_wrap(&cfg.main_foreign_key)?,
            root = double_wrap(ROOT_JOIN)?,
            root_pk = double_wrap(&main_pk)?,
        )),
        Frag::Param(Value::Array(values.to_vec())),
        Frag::sql(")) = "),
        Frag::param(count),
    ]))
}
