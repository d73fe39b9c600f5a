//! Integration tests for correlated subselects and pivots.

use std::collections::BTreeMap;

use serde_json::json;

use selq::domain::{
    Association, Cardinality, ColumnDef, Domain, FieldType, JoinKind, JoinSpec, SchemaDef,
};
use selq::expr::{FilterExpr, OrderItem, PivotOpts, PivotStrategy, SubselectFormat, SubselectSpec};
use selq::plan::{ConfigureOpts, QueryPlan};
use selq::CompareOp;

fn schema(table: &str, pk: &str, fields: &[(&str, FieldType)]) -> SchemaDef {
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

fn events_domain() -> Domain {
    let mut source = schema(
        "attendees",
        "id",
        &[
            ("id", FieldType::Integer),
            ("name", FieldType::String),
            ("email", FieldType::String),
            ("event_id", FieldType::Integer),
        ],
    );
    source.associations.insert(
        "orders".to_string(),
        Association {
            queryable: "orders".to_string(),
            field: None,
            owner_key: "id".to_string(),
            related_key: "attendee_id".to_string(),
            cardinality: Cardinality::Many,
        },
    );
    Domain {
        name: Some("attendees".to_string()),
        source,
        schemas: BTreeMap::from([(
            "orders".to_string(),
            schema(
                "orders",
                "id",
                &[
                    ("id", FieldType::Integer),
                    ("attendee_id", FieldType::Integer),
                    ("product_name", FieldType::String),
                    ("quantity", FieldType::Integer),
                ],
            ),
        )]),
        joins: BTreeMap::from([("orders".to_string(), JoinSpec::basic(JoinKind::Left))]),
        default_selected: Vec::new(),
        required_filters: Vec::new(),
        filters: BTreeMap::new(),
    }
}

fn plan(domain: Domain) -> QueryPlan {
    QueryPlan::configure(domain, None, ConfigureOpts::default()).unwrap()
}

#[test]
fn json_agg_subselect_correlates_to_the_outer_row() {
    let plan = plan(events_domain())
        .select(["name", "email"])
        .subselect([SubselectSpec {
            target_schema: "orders".to_string(),
            fields: vec!["product_name".to_string(), "quantity".to_string()],
            format: SubselectFormat::JsonAgg,
            alias: Some("order_items".to_string()),
            order_by: Vec::new(),
            filters: Vec::new(),
            separator: None,
        }])
        .filter([FilterExpr::eq("event_id", 123)]);
    let artifact = plan.gen_sql().unwrap();

    assert!(artifact.sql.contains("json_agg"), "sql={}", artifact.sql);
    assert!(artifact.sql.contains("json_build_object"), "sql={}", artifact.sql);
    assert!(
        artifact.sql.contains("'product_name', sub.\"product_name\""),
        "sql={}",
        artifact.sql
    );
    assert!(artifact.sql.contains("AS \"order_items\""), "sql={}", artifact.sql);
    assert!(artifact.sql.contains("FROM \"orders\" sub"), "sql={}", artifact.sql);
    assert!(
        artifact.sql.contains("sub.\"attendee_id\" = \"selq_root\".\"id\""),
        "sql={}",
        artifact.sql
    );
    assert!(artifact.sql.contains("WHERE"));
    assert_eq!(artifact.params, vec![json!(123)]);
    assert_eq!(artifact.aliases.len(), 3);
}

#[test]
fn string_agg_subselect_parameterizes_the_separator() {
    let plan = plan(events_domain()).select(["name"]).subselect([SubselectSpec {
        target_schema: "orders".to_string(),
        fields: vec!["product_name".to_string()],
        format: SubselectFormat::StringAgg,
        alias: None,
        order_by: vec![OrderItem::asc("product_name")],
        filters: Vec::new(),
        separator: Some("; ".to_string()),
    }]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("string_agg(sub.\"product_name\"::text, $1"), "sql={sql}");
    assert!(sql.contains("ORDER BY sub.\"product_name\" ASC"), "sql={sql}");
    assert_eq!(params, vec![json!("; ")]);
    // Default alias falls back to the target schema name.
    assert!(sql.contains("AS \"orders\""), "sql={sql}");
}

#[test]
fn count_subselect_and_subselect_filters() {
    let plan = plan(events_domain()).select(["name"]).subselect([SubselectSpec {
        target_schema: "orders".to_string(),
        fields: Vec::new(),
        format: SubselectFormat::Count,
        alias: Some("order_count".to_string()),
        order_by: Vec::new(),
        filters: vec![FilterExpr::compare("quantity", CompareOp::Gt, 1)],
        separator: None,
    }]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("(SELECT count(*) FROM \"orders\" sub"), "sql={sql}");
    assert!(sql.contains("AND sub.\"quantity\" > $1"), "sql={sql}");
    assert_eq!(params, vec![json!(1)]);
}

#[test]
fn subselect_accepts_schema_name_sugar() {
    let plan = plan(events_domain()).select(["name"]).subselect(["orders"]);
    let (sql, _) = plan.to_sql().unwrap();
    // All non-redacted target fields are aggregated.
    assert!(sql.contains("json_agg"), "sql={sql}");
    assert!(sql.contains("'quantity', sub.\"quantity\""), "sql={sql}");
}

#[test]
fn multiple_subselects_render_in_call_order() {
    let plan = plan(events_domain())
        .select(["name"])
        .subselect([
            SubselectSpec {
                target_schema: "orders".to_string(),
                fields: vec!["product_name".to_string()],
                format: SubselectFormat::ArrayAgg,
                alias: Some("products".to_string()),
                order_by: Vec::new(),
                filters: Vec::new(),
                separator: None,
            },
            SubselectSpec {
                target_schema: "orders".to_string(),
                fields: Vec::new(),
                format: SubselectFormat::Count,
                alias: Some("order_count".to_string()),
                order_by: Vec::new(),
                filters: Vec::new(),
                separator: None,
            },
        ]);
    let (sql, _) = plan.to_sql().unwrap();
    let products_at = sql.find("AS \"products\"").unwrap();
    let count_at = sql.find("AS \"order_count\"").unwrap();
    assert!(products_at < count_at, "sql={sql}");
    assert!(sql.contains("array_agg(sub.\"product_name\")"), "sql={sql}");
}

fn pivotable_domain() -> Domain {
    let mut domain = events_domain();
    domain.required_filters = vec![FilterExpr::eq("event_id", 7)];
    domain
}

#[test]
fn pivot_with_in_strategy_rewrites_from_and_correlates() {
    let plan = plan(pivotable_domain())
        .filter([FilterExpr::compare("name", CompareOp::Like, "%Conf%")])
        .pivot(
            "orders",
            PivotOpts {
                preserve_filters: true,
                subquery_strategy: PivotStrategy::In,
            },
        )
        .unwrap()
        .select(["product_name", "quantity"]);
    let artifact = plan.gen_sql().unwrap();

    assert!(artifact.sql.contains("FROM \"orders\" \"orders\""), "sql={}", artifact.sql);
    assert!(
        artifact.sql.contains(
            "\"orders\".\"attendee_id\" IN (SELECT DISTINCT \"selq_root\".\"id\" FROM \"attendees\" \"selq_root\""
        ),
        "sql={}",
        artifact.sql
    );
    // Required and preserved filters both land in the subquery.
    assert_eq!(artifact.params, vec![json!(7), json!("%Conf%")]);
    assert_eq!(artifact.aliases.len(), 2);
}

#[test]
fn pivot_exists_strategy_correlates_inside_the_subquery() {
    let plan = plan(pivotable_domain())
        .pivot(
            "orders",
            PivotOpts {
                preserve_filters: false,
                subquery_strategy: PivotStrategy::Exists,
            },
        )
        .unwrap()
        .select(["product_name"]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("EXISTS (SELECT 1 FROM \"attendees\" \"selq_root\""), "sql={sql}");
    assert!(
        sql.contains("\"selq_root\".\"id\" = \"orders\".\"attendee_id\""),
        "sql={sql}"
    );
    // preserve_filters: false still keeps the domain's required filters.
    assert_eq!(params, vec![json!(7)]);
}

#[test]
fn pivot_join_strategy_joins_a_derived_subquery() {
    let plan = plan(pivotable_domain())
        .pivot(
            "orders",
            PivotOpts {
                preserve_filters: false,
                subquery_strategy: PivotStrategy::Join,
            },
        )
        .unwrap()
        .select(["product_name"]);
    let (sql, _) = plan.to_sql().unwrap();
    assert!(sql.contains("INNER JOIN (SELECT DISTINCT"), "sql={sql}");
    assert!(sql.contains("\"pivot_source\""), "sql={sql}");
}

#[test]
fn post_pivot_filters_apply_to_the_target() {
    let plan = plan(pivotable_domain())
        .pivot("orders", PivotOpts::default())
        .unwrap()
        .select(["product_name"])
        .filter([FilterExpr::compare("quantity", CompareOp::Gte, 2)]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("\"orders\".\"quantity\" >= $2"), "sql={sql}");
    assert_eq!(params, vec![json!(7), json!(2)]);
}

#[test]
fn pivot_to_unreachable_schema_fails() {
    let err = plan(events_domain()).pivot("warehouses", PivotOpts::default());
    assert!(err.is_err());
}
