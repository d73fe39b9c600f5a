//! Integration tests for the core composition pipeline: select, filter,
//! group, order, and the parameter finalizer invariants.

use std::collections::BTreeMap;

use serde_json::json;

use selq::domain::{Association, Cardinality, ColumnDef, Domain, FieldType, JoinKind, JoinSpec, SchemaDef};
use selq::expr::{CompareOp, Expr, FilterExpr, GroupBy, OrderDir};
use selq::plan::{ConfigureOpts, QueryPlan};

mod fixtures {
    use super::*;

    pub fn schema(table: &str, pk: &str, fields: &[(&str, FieldType)]) -> SchemaDef {
        SchemaDef {
            table: table.to_string(),
            primary_key: pk.to_string(),
            fields: fields.iter().map(|(f, _)| f.to_string()).collect(),
            redact_fields: Vec::new(),
            columns: fields
                .iter()
                .map(|(f, t)| (f.to_string(), ColumnDef { col_type: *t }))
                .collect(),
            associations: BTreeMap::new(),
        }
    }

    pub fn users_domain() -> Domain {
        Domain {
            name: Some("users".to_string()),
            source: schema(
                "users",
                "id",
                &[
                    ("id", FieldType::Integer),
                    ("name", FieldType::String),
                    ("email", FieldType::String),
                    ("active", FieldType::Boolean),
                ],
            ),
            schemas: BTreeMap::new(),
            joins: BTreeMap::new(),
            default_selected: Vec::new(),
            required_filters: vec![FilterExpr::eq("active", true)],
            filters: BTreeMap::new(),
        }
    }

    pub fn sales_domain() -> Domain {
        Domain {
            name: Some("sales".to_string()),
            source: schema(
                "sales",
                "id",
                &[
                    ("id", FieldType::Integer),
                    ("region", FieldType::String),
                    ("amount", FieldType::Decimal),
                ],
            ),
            schemas: BTreeMap::new(),
            joins: BTreeMap::new(),
            default_selected: Vec::new(),
            required_filters: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    pub fn blog_domain() -> Domain {
        let mut source = schema(
            "users",
            "id",
            &[("id", FieldType::Integer), ("name", FieldType::String)],
        );
        source.associations.insert(
            "posts".to_string(),
            Association {
                queryable: "posts".to_string(),
                field: None,
                owner_key: "id".to_string(),
                related_key: "user_id".to_string(),
                cardinality: Cardinality::Many,
            },
        );
        let posts = schema(
            "posts",
            "id",
            &[
                ("id", FieldType::Integer),
                ("user_id", FieldType::Integer),
                ("title", FieldType::String),
                ("body", FieldType::Text),
            ],
        );
        Domain {
            name: Some("blog".to_string()),
            source,
            schemas: BTreeMap::from([("posts".to_string(), posts)]),
            joins: BTreeMap::from([("posts".to_string(), JoinSpec::basic(JoinKind::Left))]),
            default_selected: vec!["name".to_string()],
            required_filters: Vec::new(),
            filters: BTreeMap::new(),
        }
    }

    pub fn plan(domain: Domain) -> QueryPlan {
        QueryPlan::configure(domain, None, ConfigureOpts::default()).unwrap()
    }
}

use fixtures::plan;

/// Numbers of `$k` placeholders in encounter order.
fn placeholder_numbers(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 {
                out.push(sql[i + 1..j].parse().unwrap());
            }
            i = j;
        } else {
            i += 1;
        }
    }
    out
}

#[test]
fn simple_filtered_select() {
    let plan = plan(fixtures::users_domain())
        .select(["name", "email"])
        .filter([
            FilterExpr::eq("id", 42),
            FilterExpr::compare("email", CompareOp::Like, "%@x"),
        ]);
    let artifact = plan.gen_sql().unwrap();

    assert!(artifact.sql.contains("FROM \"users\" \"selq_root\""), "sql={}", artifact.sql);
    assert!(artifact.sql.contains("WHERE"));
    assert!(artifact.sql.contains("$1"));
    assert!(artifact.sql.contains("$2"));
    assert!(artifact.sql.contains("$3"));
    // Required filters precede caller filters.
    assert_eq!(artifact.params, vec![json!(true), json!(42), json!("%@x")]);
    assert_eq!(artifact.aliases.len(), 2);
}

#[test]
fn placeholders_number_in_order_without_dedup() {
    let plan = plan(fixtures::users_domain())
        .select(["name"])
        .filter([
            FilterExpr::eq("id", 7),
            FilterExpr::eq("name", "x"),
            FilterExpr::eq("email", "x"),
        ]);
    let (sql, params) = plan.to_sql().unwrap();
    let numbers = placeholder_numbers(&sql);
    assert_eq!(numbers, (1..=params.len()).collect::<Vec<_>>());
    // Two identical literals still bind separately.
    assert_eq!(params.iter().filter(|p| **p == json!("x")).count(), 2);
}

#[test]
fn plans_are_reusable_after_finalization() {
    let plan = plan(fixtures::users_domain()).select(["name"]);
    let first = plan.to_sql().unwrap();
    let second = plan.to_sql().unwrap();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
}

#[test]
fn rollup_wraps_the_query() {
    let plan = plan(fixtures::sales_domain())
        .select([Expr::sum("amount")])
        .group_by([GroupBy::rollup(vec!["region"])])
        .order_by([("region", OrderDir::Asc)]);
    let (sql, _params) = plan.to_sql().unwrap();

    assert!(sql.contains("ROLLUP"), "sql={sql}");
    assert!(sql.contains("SELECT * FROM ("), "sql={sql}");
    assert!(sql.contains(") AS rollupfix"), "sql={sql}");
}

#[test]
fn group_by_and_having() {
    let plan = plan(fixtures::sales_domain())
        .select([Expr::field("region"), Expr::sum("amount")])
        .group_by(["region"])
        .having([FilterExpr::compare("region", CompareOp::Neq, "unknown")]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("GROUP BY \"selq_root\".\"region\""), "sql={sql}");
    assert!(sql.contains("HAVING"), "sql={sql}");
    assert_eq!(params, vec![json!("unknown")]);
}

#[test]
fn default_selection_applies_when_nothing_selected() {
    let plan = plan(fixtures::blog_domain());
    let artifact = plan.gen_sql().unwrap();
    assert!(artifact.sql.contains("\"selq_root\".\"name\" AS \"name\""));
    assert_eq!(artifact.aliases.len(), 1);
}

#[test]
fn empty_selection_is_rejected() {
    let plan = plan(fixtures::users_domain());
    assert!(matches!(
        plan.to_sql(),
        Err(selq::SelqError::EmptySelect)
    ));
}

#[test]
fn qualified_and_legacy_bracket_references_agree() {
    let dotted = plan(fixtures::blog_domain()).select(["posts.title"]);
    let bracket = plan(fixtures::blog_domain()).select(["posts[title]"]);
    assert_eq!(dotted.to_sql().unwrap().0, bracket.to_sql().unwrap().0);
}

#[test]
fn joins_are_not_duplicated() {
    let plan = plan(fixtures::blog_domain()).select(["posts.title", "posts.body", "name"]);
    let (sql, _) = plan.to_sql().unwrap();
    assert_eq!(sql.matches("LEFT JOIN \"posts\"").count(), 1, "sql={sql}");
    assert!(sql.contains("ON \"selq_root\".\"id\" = \"posts\".\"user_id\""), "sql={sql}");
}

#[test]
fn in_filter_binds_one_array_parameter() {
    let plan = plan(fixtures::users_domain()).select(["name"]).filter([
        FilterExpr::in_list("id", vec![json!(1), json!(2), json!(3)]),
    ]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("= ANY($2)"), "sql={sql}");
    assert_eq!(params[1], json!([1, 2, 3]));
}

#[test]
fn between_and_null_filters() {
    let plan = plan(fixtures::users_domain()).select(["name"]).filter([
        FilterExpr::between("id", 10, 20),
        FilterExpr::is_null("email"),
    ]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("BETWEEN $2 AND $3"), "sql={sql}");
    assert!(sql.contains("\"selq_root\".\"email\" IS NULL"), "sql={sql}");
    assert_eq!(params, vec![json!(true), json!(10), json!(20)]);
}

#[test]
fn and_or_trees_parenthesize() {
    let plan = plan(fixtures::users_domain()).select(["name"]).filter([
        FilterExpr::Or(vec![
            FilterExpr::eq("name", "ann"),
            FilterExpr::And(vec![
                FilterExpr::eq("name", "bob"),
                FilterExpr::compare("id", CompareOp::Gt, 10),
            ]),
        ]),
    ]);
    let (sql, _) = plan.to_sql().unwrap();
    assert!(sql.contains("($2"), "sql={sql}");
    assert!(sql.contains(" OR ("), "sql={sql}");
    assert!(sql.contains(" AND "), "sql={sql}");
}

#[test]
fn source_wins_over_joins_for_unqualified_names() {
    let mut domain = fixtures::blog_domain();
    // `name` now exists on both the source and the joined schema.
    let posts = domain.schemas.get_mut("posts").unwrap();
    posts.fields.push("name".to_string());
    posts.columns.insert(
        "name".to_string(),
        ColumnDef {
            col_type: FieldType::String,
        },
    );
    let plan = fixtures::plan(domain);
    let resolved = plan.resolve_field("name").unwrap();
    assert_eq!(resolved.table_alias, "selq_root");
}

#[test]
fn name_on_multiple_joins_is_ambiguous() {
    let mut domain = fixtures::blog_domain();
    let posts = domain.schemas.get("posts").unwrap().clone();
    domain.schemas.insert("drafts".to_string(), posts);
    domain.source.associations.insert(
        "drafts".to_string(),
        Association {
            queryable: "drafts".to_string(),
            field: None,
            owner_key: "id".to_string(),
            related_key: "user_id".to_string(),
            cardinality: Cardinality::Many,
        },
    );
    domain
        .joins
        .insert("drafts".to_string(), JoinSpec::basic(JoinKind::Left));
    let plan = fixtures::plan(domain);
    let err = plan.resolve_field("title").unwrap_err();
    let selq::SelqError::Field(selq::error::FieldError::Ambiguous { options, .. }) = err else {
        panic!("expected an ambiguity error");
    };
    assert!(options.contains(&"posts.title".to_string()));
    assert!(options.contains(&"drafts.title".to_string()));
}

#[test]
fn unresolved_field_yields_suggestions() {
    let plan = plan(fixtures::users_domain()).select(["emial"]);
    let err = plan.to_sql().unwrap_err();
    let selq::SelqError::Field(selq::error::FieldError::NotFound { suggestions, .. }) = err else {
        panic!("expected a not-found error");
    };
    assert!(suggestions.contains(&"email".to_string()), "{suggestions:?}");
    assert!(suggestions.len() <= 5);
}

#[test]
fn field_suggestions_prefer_prefix_matches() {
    let plan = plan(fixtures::users_domain());
    let suggestions = plan.field_suggestions("em");
    assert_eq!(suggestions.first().map(String::as_str), Some("email"));
}

#[test]
fn order_direction_tokens_are_phrase_checked() {
    assert!(OrderDir::parse("desc nulls last").is_ok());
    assert!(OrderDir::parse("asc; drop table users").is_err());
}

#[test]
fn literals_are_parameterized() {
    let plan = plan(fixtures::sales_domain()).select([Expr::literal("const"), Expr::field("region")]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("$1 AS \"literal\""), "sql={sql}");
    assert_eq!(params, vec![json!("const")]);
}

#[test]
fn redacted_fields_are_not_resolvable() {
    let mut domain = fixtures::users_domain();
    domain.source.redact_fields.push("email".to_string());
    let plan = fixtures::plan(domain);
    assert!(plan.resolve_field("email").is_err());
    assert!(!plan.available_fields().contains(&"email".to_string()));
}
