//! Window function emission: `FUNC(args) OVER (PARTITION BY … ORDER BY …
//! frame)`.

use crate::error::Result;
use crate::expr::{Expr, Frame, FrameBound, FrameUnits, WindowFrameSpec, WindowFunc, WindowSpec};
use crate::ident::double_wrap;
use crate::sql_ir::Frag;

use super::{group, select, BuildContext, SelectItemFrag};

pub(crate) fn build_window_item(
    ctx: &mut BuildContext,
    spec: &WindowSpec,
) -> Result<SelectItemFrag> {
    let frag = window_frag(ctx, spec.function, &spec.arguments, &spec.over)?;
    let base = spec
        .alias
        .clone()
        .unwrap_or_else(|| spec.function.sql_name().to_ascii_lowercase());
    let alias = ctx.claim_alias(&base);
    let description = base.clone();
    Ok(SelectItemFrag {
        frag: Frag::seq(vec![frag, Frag::sql(" AS "), Frag::sql(double_wrap(&alias)?)]),
        alias,
        description,
    })
}

pub(crate) fn window_frag(
    ctx: &mut BuildContext,
    func: WindowFunc,
    args: &[Expr],
    over: &WindowFrameSpec,
) -> Result<Frag> {
    let mut parts = Vec::new();
    parts.push(Frag::sql(format!("{}(", func.sql_name())));
    let mut rendered_args = Vec::with_capacity(args.len());
    for arg in args {
        rendered_args.push(select::expr_frag(ctx, arg)?);
    }
    if rendered_args.is_empty() && matches!(func, WindowFunc::Count) {
        parts.push(Frag::sql("*"));
    } else {
        parts.push(Frag::join(rendered_args, ", "));
    }
    parts.push(Frag::sql(") OVER ("));

    let mut over_parts = Vec::new();
    if !over.partition_by.is_empty() {
        let mut partitions = Vec::with_capacity(over.partition_by.len());
        for expr in &over.partition_by {
            partitions.push(select::expr_frag(ctx, expr)?);
        }
        over_parts.push(Frag::seq(vec![
            Frag::sql("PARTITION BY "),
            Frag::join(partitions, ", "),
        ]));
    }
    if !over.order_by.is_empty() {
        over_parts.push(Frag::seq(vec![
            Frag::sql("ORDER BY "),
            group::build_order_by(ctx, &over.order_by)?,
        ]));
    }
    if let Some(frame) = &over.frame {
        over_parts.push(Frag::sql(frame_sql(frame)));
    }
    parts.push(Frag::join(over_parts, " "));
    parts.push(Frag::sql(")"));
    Ok(Frag::Seq(parts))
}

fn frame_sql(frame: &Frame) -> String {
    let units = match frame.units {
        FrameUnits::Rows => "ROWS",
        FrameUnits::Range => "RANGE",
    };
    format!(
        "{units} BETWEEN {} AND {}",
        bound_sql(&frame.start),
        bound_sql(&frame.end)
    )
}

fn bound_sql(bound: &FrameBound) -> String {
    match bound {
        FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
        FrameBound::Preceding(n) => format!("{n} PRECEDING"),
        FrameBound::CurrentRow => "CURRENT ROW".to_string(),
        FrameBound::Following(n) => format!("{n} FOLLOWING"),
        FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
    }
}
