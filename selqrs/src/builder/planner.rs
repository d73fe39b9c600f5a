//! Join planning.
//!
//! The planner is the only component deciding join inclusion and order: it
//! closes the set of referenced joins over `requires_join`, then orders the
//! result so every join appears after the join it depends on, breaking ties
//! by first reference.

use crate::domain::ResolvedJoin;
use crate::error::{FieldError, Result, SelqError};

use super::BuildContext;

pub(crate) fn plan_joins(ctx: &BuildContext) -> Result<Vec<ResolvedJoin>> {
    // Close the used set over requires_join, preserving first-seen order:
    // a join's dependency chain is inserted immediately before it.
    let mut closed: Vec<String> = Vec::new();
    for id in &ctx.used_joins {
        let mut chain = Vec::new();
        let mut current = Some(id.clone());
        while let Some(join_id) = current {
            if closed.iter().any(|j| j == &join_id) {
                break;
            }
            let join = ctx.join(&join_id).ok_or_else(|| {
                SelqError::Field(FieldError::JoinNotFound {
                    join: join_id.clone(),
                    available_joins: ctx.plan.joins.keys().cloned().collect(),
                })
            })?;
            chain.push(join_id.clone());
            current = join.requires_join.clone();
        }
        // The chain was collected leaf-first; dependencies come first.
        for join_id in chain.into_iter().rev() {
            if !closed.iter().any(|j| j == &join_id) {
                closed.push(join_id);
            }
        }
    }

    tracing::debug!(joins = ?closed, "planned join order");
    let mut planned = Vec::with_capacity(closed.len());
    for id in closed {
        // Presence was checked during closure.
        if let Some(join) = ctx.join(&id) {
            planned.push(join.clone());
        }
    }
    Ok(planned)
}
