//! GROUP BY and ORDER BY building.

use crate::error::Result;
use crate::expr::{GroupBy, OrderItem};
use crate::sql_ir::Frag;

use super::{select, BuildContext};

pub(crate) struct GroupResult {
    pub clause: Option<Frag>,
    pub rollup: bool,
}

pub(crate) fn build_group_by(ctx: &mut BuildContext) -> Result<GroupResult> {
    let group_by = ctx.plan.set.group_by.clone();
    if group_by.is_empty() {
        return Ok(GroupResult {
            clause: None,
            rollup: false,
        });
    }
    let mut rollup = false;
    let mut parts = Vec::with_capacity(group_by.len());
    for item in &group_by {
        match item {
            GroupBy::Expr(expr) => parts.push(select::expr_frag(ctx, expr)?),
            GroupBy::Rollup(fields) => {
                rollup = true;
                let mut rendered = Vec::with_capacity(fields.len());
                for field in fields {
                    rendered.push(select::expr_frag(ctx, field)?);
                }
                parts.push(Frag::seq(vec![
                    Frag::sql("ROLLUP ("),
                    Frag::join(rendered, ", "),
                    Frag::sql(")"),
                ]));
            }
        }
    }
    Ok(GroupResult {
        clause: Some(Frag::join(parts, ", ")),
        rollup,
    })
}

pub(crate) fn build_order_by(ctx: &mut BuildContext, items: &[OrderItem]) -> Result<Frag> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(Frag::seq(vec![
            select::expr_frag(ctx, &item.expr)?,
            Frag::sql(format!(" {}", item.direction.sql())),
        ]));
    }
    Ok(Frag::join(parts, ", "))
}
