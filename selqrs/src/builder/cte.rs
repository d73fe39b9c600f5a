//! Common table expression assembly.
//!
//! CTE fragments carry their parameters in place; hoisting them into the
//! `WITH` preamble happens before finalization, so the preamble's parameters
//! naturally number ahead of the main query's.

use serde_json::Value;

use crate::domain::Domain;
use crate::error::Result;
use crate::plan::{CteBody, QueryPlan};
use crate::sql_ir::{self, extract_ctes, Frag};

use super::hierarchy::{adjacency_cte, HierarchyCteOpts};

/// `name AS (body)`.
pub(crate) fn build_cte(name: &str, body: Frag) -> Frag {
    Frag::seq(vec![
        Frag::sql(name.to_string()),
        Frag::sql(" AS ("),
        body,
        Frag::sql(")"),
    ])
}

/// `name AS (base UNION ALL step)`; the `RECURSIVE` keyword is hoisted into
/// the `WITH` head by [`build_with_clause`].
pub(crate) fn build_recursive_cte(name: &str, base: Frag, step: Frag) -> Frag {
    build_cte(
        name,
        Frag::seq(vec![base, Frag::sql(" UNION ALL "), step]),
    )
}

/// Join CTE entries into a single `WITH … ` preamble. `RECURSIVE` belongs to
/// the clause head when any member is recursive.
pub(crate) fn build_with_clause(entries: Vec<(String, Frag, bool)>) -> Frag {
    let any_recursive = entries.iter().any(|(_, _, recursive)| *recursive);
    let mut parts = Vec::with_capacity(entries.len() * 2 + 2);
    parts.push(Frag::sql(if any_recursive {
        "WITH RECURSIVE "
    } else {
        "WITH "
    }));
    for (idx, (name, body, _)) in entries.into_iter().enumerate() {
        if idx > 0 {
            parts.push(Frag::sql(", "));
        }
        parts.push(build_cte(&name, body));
    }
    parts.push(Frag::sql(" "));
    Frag::Seq(parts)
}

/// Prepend a with-clause to the main query fragment.
pub(crate) fn integrate(entries: Vec<(String, Frag, bool)>, main: Frag) -> Frag {
    if entries.is_empty() {
        main
    } else {
        Frag::seq(vec![build_with_clause(entries), main])
    }
}

/// Collect the plan's declared CTEs and any CTE markers embedded by join
/// builders, and wire them ahead of the main query.
pub(crate) fn attach_ctes(plan: &QueryPlan, main: Frag) -> Result<Frag> {
    let mut entries: Vec<(String, Frag, bool)> = Vec::new();
    for spec in &plan.set.ctes {
        match &spec.body {
            CteBody::Plan(body) => {
                let (frag, _) = super::build_frag(body)?;
                entries.push((spec.name.clone(), frag, false));
            }
            CteBody::Recursive { base, step } => {
                let (base_frag, _) = super::build_frag(base)?;
                let (step_frag, _) = super::build_frag(step)?;
                entries.push((
                    spec.name.clone(),
                    Frag::seq(vec![base_frag, Frag::sql(" UNION ALL "), step_frag]),
                    true,
                ));
            }
        }
    }
    let (stripped, embedded) = extract_ctes(main);
    entries.extend(embedded);
    Ok(integrate(entries, stripped))
}

/// Build a standalone hierarchy CTE for the domain's source table and
/// finalize it on its own: `(sql, params)` with local `$1`-based numbering.
pub fn build_hierarchy_cte(
    name: &str,
    domain: &Domain,
    opts: HierarchyCteOpts,
) -> Result<(String, Vec<Value>)> {
    let cte = adjacency_cte(name, &domain.source.table, &opts)?;
    let Frag::Cte { body, .. } = cte else {
        unreachable!("adjacency_cte always returns a CTE fragment");
    };
    let clause = build_with_clause(vec![(name.to_string(), *body, true)]);
    Ok(sql_ir::finalize(&clause))
}
