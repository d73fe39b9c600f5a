//! Hierarchical joins.
//!
//! Recursion lives exclusively in CTEs; the join graph itself stays acyclic.
//! Adjacency lists become a `WITH RECURSIVE` walk bounded by a depth
//! parameter, materialized paths compute level and path_array from the path
//! column, closure tables join precomputed (ancestor, descendant, depth)
//! rows.

use serde_json::Value;

use crate::domain::{HierarchyConfig, ResolvedJoin};
use crate::error::{JoinConfigError, Result, SelqError};
use crate::ident::{double_wrap, single_wrap};
use crate::sql_ir::Frag;

use super::joins::parent_alias;
use super::BuildContext;

/// Options for building a standalone hierarchy CTE.
#[derive(Debug, Clone)]
pub struct HierarchyCteOpts {
    pub id_field: String,
    pub name_field: String,
    pub parent_field: String,
    pub depth_limit: u32,
    pub additional_fields: Vec<String>,
    pub root_condition: Option<String>,
}

impl Default for HierarchyCteOpts {
    fn default() -> Self {
        HierarchyCteOpts {
            id_field: "id".to_string(),
            name_field: "name".to_string(),
            parent_field: "parent_id".to_string(),
            depth_limit: 5,
            additional_fields: Vec::new(),
            root_condition: None,
        }
    }
}

pub(crate) fn hierarchical_join(
    ctx: &BuildContext,
    join: &ResolvedJoin,
    cfg: &HierarchyConfig,
) -> Result<Frag> {
    match cfg {
        HierarchyConfig::AdjacencyList {
            id_field,
            name_field,
            parent_field,
            depth_limit,
            root_condition,
            additional_fields,
        } => {
            let opts = HierarchyCteOpts {
                id_field: id_field.clone(),
                name_field: name_field.clone(),
                parent_field: parent_field.clone(),
                depth_limit: *depth_limit,
                additional_fields: additional_fields.clone(),
                root_condition: root_condition.clone(),
            };
            let cte_name = format!("{}_hierarchy", join.id);
            let cte = adjacency_cte(&cte_name, &join.table, &opts)?;
            let join_sql = Frag::sql(format!(
                " LEFT JOIN {} {} ON {}.{} = {}.{}",
                double_wrap(&cte_name)?,
                double_wrap(&join.id)?,
                double_wrap(&parent_alias(join))?,
                double_wrap(&join.owner_key)?,
                double_wrap(&join.id)?,
                double_wrap(&opts.id_field)?
            ));
            Ok(Frag::seq(vec![cte, join_sql]))
        }
        HierarchyConfig::MaterializedPath {
            path_field,
            separator,
            root_prefix,
        } => {
            let cte_name = format!("{}_hierarchy", join.id);
            let schema = ctx.domain.schemas.get(&join.schema);
            let fields = schema.map(|s| s.fields.clone()).unwrap_or_default();
            let cte = materialized_path_cte(
                &cte_name,
                &join.table,
                &fields,
                path_field,
                separator,
                root_prefix.as_deref(),
            )?;
            let join_sql = Frag::sql(format!(
                " LEFT JOIN {} {} ON {}.{} = {}.{}",
                double_wrap(&cte_name)?,
                double_wrap(&join.id)?,
                double_wrap(&parent_alias(join))?,
                double_wrap(&join.owner_key)?,
                double_wrap(&join.id)?,
                double_wrap(&join.related_key)?
            ));
            Ok(Frag::seq(vec![cte, join_sql]))
        }
        HierarchyConfig::ClosureTable {
            closure_table,
            ancestor_field,
            descendant_field,
            ..
        } => {
            let table = closure_table
                .as_deref()
                .ok_or_else(|| missing(join, "closure_table"))?;
            let ancestor = ancestor_field
                .as_deref()
                .ok_or_else(|| missing(join, "ancestor_field"))?;
            let descendant = descendant_field
                .as_deref()
                .ok_or_else(|| missing(join, "descendant_field"))?;
            let closure_alias = format!("{}_closure", join.id);
            let pk = ctx
                .domain
                .schemas
                .get(&join.schema)
                .map(|s| s.primary_key.clone())
                .unwrap_or_else(|| "id".to_string());
            Ok(Frag::sql(format!(
                " LEFT JOIN {ct} {ca} ON {ca}.{desc} = {p}.{fk} LEFT JOIN {tt} {ta} ON {ta}.{pk} = {ca}.{anc}",
                ct = double_wrap(table)?,
                ca = double_wrap(&closure_alias)?,
                desc = double_wrap(descendant)?,
                p = double_wrap(&parent_alias(join))?,
                fk = double_wrap(&join.owner_key)?,
                tt = double_wrap(&join.table)?,
                ta = double_wrap(&join.id)?,
                pk = double_wrap(&pk)?,
                anc = double_wrap(ancestor)?,
            )))
        }
    }
}

/// Recursive CTE over an adjacency list, depth-bounded by a parameter.
///
/// Output columns: the id/name/parent fields, any additional fields, then
/// `path`, `level`, `path_array`.
pub(crate) fn adjacency_cte(name: &str, table: &str, opts: &HierarchyCteOpts) -> Result<Frag> {
    let id = double_wrap(&opts.id_field)?;
    let nm = double_wrap(&opts.name_field)?;
    let parent = double_wrap(&opts.parent_field)?;
    let tbl = double_wrap(table)?;
    let extra_base: String = opts
        .additional_fields
        .iter()
        .map(|f| double_wrap(f).map(|w| format!(", t.{w}")))
        .collect::<Result<Vec<_>>>()?
        .join("");
    let extra_step: String = opts
        .additional_fields
        .iter()
        .map(|f| double_wrap(f).map(|w| format!(", c.{w}")))
        .collect::<Result<Vec<_>>>()?
        .join("");
    let root = match &opts.root_condition {
        Some(condition) => condition.clone(),
        None => format!("t.{parent} IS NULL"),
    };

    let base = Frag::sql(format!(
        "SELECT t.{id}, t.{nm}, t.{parent}{extra_base}, t.{nm}::text AS path, 0 AS level, \
         ARRAY[t.{nm}::text] AS path_array FROM {tbl} t WHERE {root}"
    ));
    let step = Frag::seq(vec![
        Frag::sql(format!(
            "SELECT c.{id}, c.{nm}, c.{parent}{extra_step}, h.path || '/' || c.{nm} AS path, \
             h.level + 1 AS level, h.path_array || c.{nm}::text AS path_array \
             FROM {tbl} c INNER JOIN {cte} h ON c.{parent} = h.{id} WHERE h.level < ",
            cte = double_wrap(name)?,
        )),
        Frag::param(opts.depth_limit as i64),
    ]);

    Ok(Frag::Cte {
        name: name.to_string(),
        body: Box::new(Frag::seq(vec![base, Frag::sql(" UNION ALL "), step])),
        recursive: true,
    })
}

/// Non-recursive CTE deriving `level` and `path_array` from a materialized
/// path column.
fn materialized_path_cte(
    name: &str,
    table: &str,
    fields: &[String],
    path_field: &str,
    separator: &str,
    root_prefix: Option<&str>,
) -> Result<Frag> {
    let path = double_wrap(path_field)?;
    let sep = single_wrap(separator);
    let mut select_list: Vec<String> = Vec::with_capacity(fields.len() + 3);
    for field in fields {
        select_list.push(format!("t.{}", double_wrap(field)?));
    }
    if !fields.iter().any(|f| f == "path") {
        select_list.push(format!("t.{path} AS path"));
    }
    select_list.push(format!(
        "length(t.{path}) - length(replace(t.{path}, {sep}, '')) AS level"
    ));
    select_list.push(format!("string_to_array(t.{path}, {sep}) AS path_array"));

    let mut parts = vec![Frag::sql(format!(
        "SELECT {} FROM {} t",
        select_list.join(", "),
        double_wrap(table)?
    ))];
    if let Some(prefix) = root_prefix {
        parts.push(Frag::sql(format!(" WHERE t.{path} LIKE ")));
        parts.push(Frag::Param(Value::String(format!("{prefix}/%"))));
    }

    Ok(Frag::Cte {
        name: name.to_string(),
        body: Box::new(Frag::Seq(parts)),
        recursive: false,
    })
}

fn missing(join: &ResolvedJoin, what: &str) -> SelqError {
    SelqError::JoinConfig(JoinConfigError {
        join: join.id.clone(),
        join_type: "hierarchical/closure_table".to_string(),
        missing: what.to_string(),
    })
}
