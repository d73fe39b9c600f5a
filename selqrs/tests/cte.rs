//! Tests for user-declared CTEs and the standalone hierarchy CTE builder.

use std::collections::BTreeMap;

use serde_json::json;

use selq::domain::{ColumnDef, Domain, FieldType, SchemaDef};
use selq::expr::FilterExpr;
use selq::plan::{ConfigureOpts, QueryPlan};
use selq::{build_hierarchy_cte, HierarchyCteOpts};

fn categories_domain() -> Domain {
    let fields = [
        ("id", FieldType::Integer),
        ("name", FieldType::String),
        ("parent_id", FieldType::Integer),
    ];
    Domain {
        name: None,
        source: SchemaDef {
            table: "categories".to_string(),
            primary_key: "id".to_string(),
            fields: fields.iter().map(|(f, _)| f.to_string()).collect(),
            redact_fields: Vec::new(),
            columns: fields
                .iter()
                .map(|(f, t)| (f.to_string(), ColumnDef { col_type: *t }))
                .collect(),
            associations: BTreeMap::new(),
        },
        schemas: BTreeMap::new(),
        joins: BTreeMap::new(),
        default_selected: Vec::new(),
        required_filters: Vec::new(),
        filters: BTreeMap::new(),
    }
}

fn plan() -> QueryPlan {
    QueryPlan::configure(categories_domain(), None, ConfigureOpts::default()).unwrap()
}

#[test]
fn plain_cte_prepends_a_with_clause() {
    let body = plan().select(["id", "name"]).filter([FilterExpr::eq("parent_id", 1)]);
    let main = plan().select(["name"]).with_cte("children", body);
    let (sql, params) = main.to_sql().unwrap();
    assert!(sql.starts_with("WITH children AS (SELECT"), "sql={sql}");
    // CTE params come first.
    assert_eq!(params, vec![json!(1)]);
}

#[test]
fn recursive_cte_hoists_the_keyword() {
    let base = plan().select(["id", "name"]).filter([FilterExpr::is_null("parent_id")]);
    let step = plan().select(["id", "name"]).filter([FilterExpr::eq("parent_id", 0)]);
    let main = plan().select(["name"]).with_recursive_cte("tree", base, step);
    let (sql, _) = main.to_sql().unwrap();
    assert!(sql.starts_with("WITH RECURSIVE tree AS ("), "sql={sql}");
    assert!(sql.contains(" UNION ALL "), "sql={sql}");
}

#[test]
fn multiple_ctes_join_with_commas() {
    let first = plan().select(["id"]);
    let second = plan().select(["name"]);
    let main = plan()
        .select(["name"])
        .with_cte("a", first)
        .with_cte("b", second);
    let (sql, _) = main.to_sql().unwrap();
    assert!(sql.starts_with("WITH a AS ("), "sql={sql}");
    assert!(sql.contains("), b AS ("), "sql={sql}");
}

#[test]
fn standalone_hierarchy_cte_defaults() {
    let (sql, params) = build_hierarchy_cte(
        "category_tree",
        &categories_domain(),
        HierarchyCteOpts::default(),
    )
    .unwrap();
    assert!(sql.starts_with("WITH RECURSIVE category_tree AS ("), "sql={sql}");
    assert!(sql.contains("t.\"parent_id\" IS NULL"), "sql={sql}");
    assert!(sql.contains("UNION ALL"), "sql={sql}");
    assert!(sql.contains("h.level < $1"), "sql={sql}");
    assert_eq!(params, vec![json!(5)]);
}

#[test]
fn hierarchy_cte_honors_custom_root_condition() {
    let opts = HierarchyCteOpts {
        root_condition: Some("t.\"parent_id\" = 0".to_string()),
        depth_limit: 3,
        ..HierarchyCteOpts::default()
    };
    let (sql, params) = build_hierarchy_cte("tree", &categories_domain(), opts).unwrap();
    assert!(sql.contains("WHERE t.\"parent_id\" = 0"), "sql={sql}");
    assert_eq!(params, vec![json!(3)]);
}
