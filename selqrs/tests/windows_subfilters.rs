//! Integration tests for window functions and subfilters.

use std::collections::BTreeMap;

use serde_json::json;

use selq::domain::{Association, Cardinality, ColumnDef, Domain, FieldType, SchemaDef};
use selq::expr::{
    CompareOp, Expr, FilterExpr, Frame, FrameBound, FrameUnits, OrderDir, OrderItem,
    SubfilterPredicate, SubfilterSpec, SubfilterStrategy, WindowFrameSpec, WindowFunc,
};
use selq::plan::{ConfigureOpts, QueryPlan};
use selq::AggFunc;

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

fn sales_domain() -> Domain {
    let mut source = schema(
        "sales",
        "id",
        &[
            ("id", FieldType::Integer),
            ("region", FieldType::String),
            ("amount", FieldType::Decimal),
            ("sold_at", FieldType::UtcDatetime),
        ],
    );
    source.associations.insert(
        "line_items".to_string(),
        Association {
            queryable: "line_items".to_string(),
            field: None,
            owner_key: "id".to_string(),
            related_key: "sale_id".to_string(),
            cardinality: Cardinality::Many,
        },
    );
    Domain {
        name: None,
        source,
        schemas: BTreeMap::from([(
            "line_items".to_string(),
            schema(
                "line_items",
                "id",
                &[
                    ("id", FieldType::Integer),
                    ("sale_id", FieldType::Integer),
                    ("price", FieldType::Decimal),
                    ("shipped_at", FieldType::UtcDatetime),
                ],
            ),
        )]),
        joins: BTreeMap::new(),
        default_selected: Vec::new(),
        required_filters: Vec::new(),
        filters: BTreeMap::new(),
    }
}

fn plan() -> QueryPlan {
    QueryPlan::configure(sales_domain(), None, ConfigureOpts::default()).unwrap()
}

#[test]
fn window_function_with_partition_and_order() {
    let plan = plan().select(["region"]).window_function(
        WindowFunc::RowNumber,
        Vec::new(),
        WindowFrameSpec {
            partition_by: vec![Expr::field("region")],
            order_by: vec![OrderItem {
                expr: Expr::field("amount"),
                direction: OrderDir::Desc,
            }],
            frame: None,
        },
        Some("rn"),
    );
    let (sql, _) = plan.to_sql().unwrap();
    assert!(
        sql.contains("ROW_NUMBER() OVER (PARTITION BY \"selq_root\".\"region\" ORDER BY \"selq_root\".\"amount\" DESC) AS \"rn\""),
        "sql={sql}"
    );
}

#[test]
fn window_function_with_frame_bounds() {
    let plan = plan().select(["region"]).window_function(
        WindowFunc::Sum,
        vec![Expr::field("amount")],
        WindowFrameSpec {
            partition_by: vec![Expr::field("region")],
            order_by: vec![OrderItem::asc("sold_at")],
            frame: Some(Frame {
                units: FrameUnits::Rows,
                start: FrameBound::Preceding(3),
                end: FrameBound::CurrentRow,
            }),
        },
        Some("rolling_sum"),
    );
    let (sql, _) = plan.to_sql().unwrap();
    assert!(sql.contains("SUM(\"selq_root\".\"amount\") OVER ("), "sql={sql}");
    assert!(sql.contains("ROWS BETWEEN 3 PRECEDING AND CURRENT ROW"), "sql={sql}");
}

#[test]
fn window_count_without_arguments_counts_rows() {
    let plan = plan().select(["region"]).window_function(
        WindowFunc::Count,
        Vec::new(),
        WindowFrameSpec::default(),
        None,
    );
    let (sql, _) = plan.to_sql().unwrap();
    assert!(sql.contains("COUNT(*) OVER ()"), "sql={sql}");
}

#[test]
fn exists_subfilter() {
    let plan = plan().select(["region"]).filter([FilterExpr::Subfilter(SubfilterSpec {
        path: "line_items.price".to_string(),
        predicate: SubfilterPredicate::Compare {
            op: CompareOp::Gt,
            value: json!(100),
        },
        strategy: SubfilterStrategy::Exists,
    })]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("EXISTS (SELECT 1 FROM \"line_items\" sf1_line_items"), "sql={sql}");
    assert!(
        sql.contains("sf1_line_items.\"sale_id\" = \"selq_root\".\"id\""),
        "sql={sql}"
    );
    assert!(sql.contains("sf1_line_items.\"price\" > $1"), "sql={sql}");
    assert_eq!(params, vec![json!(100)]);
}

#[test]
fn in_subfilter_selects_the_related_key() {
    let plan = plan().select(["region"]).filter([FilterExpr::Subfilter(SubfilterSpec {
        path: "line_items.price".to_string(),
        predicate: SubfilterPredicate::Value(json!(10)),
        strategy: SubfilterStrategy::In,
    })]);
    let (sql, _) = plan.to_sql().unwrap();
    assert!(
        sql.contains("\"selq_root\".\"id\" IN (SELECT sf1_line_items.\"sale_id\" FROM \"line_items\" sf1_line_items WHERE "),
        "sql={sql}"
    );
}

#[test]
fn aggregation_subfilter_compares_the_aggregate() {
    let plan = plan().select(["region"]).filter([FilterExpr::Subfilter(SubfilterSpec {
        path: "line_items.price".to_string(),
        predicate: SubfilterPredicate::Aggregation {
            func: AggFunc::Sum,
            op: CompareOp::Gte,
            value: json!(500),
        },
        strategy: SubfilterStrategy::Aggregation,
    })]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(
        sql.contains("(SELECT sum(sf1_line_items.\"price\") FROM \"line_items\" sf1_line_items WHERE sf1_line_items.\"sale_id\" = \"selq_root\".\"id\") >= $1"),
        "sql={sql}"
    );
    assert_eq!(params, vec![json!(500)]);
}

#[test]
fn temporal_subfilter_shortcuts() {
    let recent = plan().select(["region"]).filter([FilterExpr::Subfilter(SubfilterSpec {
        path: "line_items.shipped_at".to_string(),
        predicate: SubfilterPredicate::Recent { years: 2 },
        strategy: SubfilterStrategy::Exists,
    })]);
    let (sql, params) = recent.to_sql().unwrap();
    assert!(sql.contains(">= now() - ($1 * INTERVAL '1 year')"), "sql={sql}");
    assert_eq!(params, vec![json!(2)]);

    let since = plan().select(["region"]).filter([FilterExpr::Subfilter(SubfilterSpec {
        path: "line_items.shipped_at".to_string(),
        predicate: SubfilterPredicate::SinceDate {
            date: "2024-06-01".to_string(),
        },
        strategy: SubfilterStrategy::Exists,
    })]);
    let (sql, params) = since.to_sql().unwrap();
    assert!(sql.contains(">= $1"), "sql={sql}");
    assert_eq!(params, vec![json!("2024-06-01")]);

    let range = plan().select(["region"]).filter([FilterExpr::Subfilter(SubfilterSpec {
        path: "line_items.shipped_at".to_string(),
        predicate: SubfilterPredicate::Range {
            from: json!("2024-01-01"),
            to: json!("2024-12-31"),
        },
        strategy: SubfilterStrategy::Exists,
    })]);
    let (sql, params) = range.to_sql().unwrap();
    assert!(sql.contains("BETWEEN $1 AND $2"), "sql={sql}");
    assert_eq!(params, vec![json!("2024-01-01"), json!("2024-12-31")]);
}

#[test]
fn case_iif_and_decode_expressions() {
    let plan = plan().select([
        Expr::Case {
            branches: vec![selq::expr::CaseBranch {
                when: FilterExpr::compare("amount", CompareOp::Gt, 1000),
                then: Expr::literal("large"),
            }],
            else_expr: Some(Box::new(Expr::literal("small"))),
        },
        Expr::Iif {
            condition: Box::new(FilterExpr::eq("region", "emea")),
            then_expr: Box::new(Expr::literal(1)),
            else_expr: Box::new(Expr::literal(0)),
        },
        Expr::Decode {
            expr: Box::new(Expr::field("region")),
            pairs: vec![(json!("emea"), Expr::literal("Europe"))],
            default: Some(Box::new(Expr::literal("Other"))),
        },
    ]);
    let (sql, params) = plan.to_sql().unwrap();
    assert!(sql.contains("CASE WHEN \"selq_root\".\"amount\" > $1 THEN $2 ELSE $3 END"), "sql={sql}");
    assert!(sql.contains("CASE WHEN \"selq_root\".\"region\" = $4 THEN $5 ELSE $6 END"), "sql={sql}");
    assert!(sql.contains("CASE WHEN \"selq_root\".\"region\" = $7 THEN $8 ELSE $9 END"), "sql={sql}");
    assert_eq!(params.len(), 9);
    assert_eq!(params[0], json!(1000));
}

#[test]
fn function_library_renders_postgres_forms() {
    use selq::expr::SqlFunc;
    let plan = plan().select([
        Expr::func(SqlFunc::Upper, vec![Expr::field("region")]),
        Expr::func(
            SqlFunc::DateTrunc {
                unit: "month".to_string(),
            },
            vec![Expr::field("sold_at")],
        ),
        Expr::func(SqlFunc::Round, vec![Expr::field("amount"), Expr::literal(2)]),
        Expr::extract("year", Expr::field("sold_at")),
        Expr::coalesce(vec![Expr::field("region"), Expr::literal("unknown")]),
    ]);
    let (sql, _) = plan.to_sql().unwrap();
    assert!(sql.contains("upper(\"selq_root\".\"region\")"), "sql={sql}");
    assert!(sql.contains("date_trunc('month', \"selq_root\".\"sold_at\")"), "sql={sql}");
    assert!(sql.contains("round(\"selq_root\".\"amount\", $"), "sql={sql}");
    assert!(sql.contains("extract(year FROM \"selq_root\".\"sold_at\")"), "sql={sql}");
    assert!(sql.contains("coalesce(\"selq_root\".\"region\", $"), "sql={sql}");
}

#[test]
fn custom_sql_templates_bind_fields() {
    let plan = plan().select([Expr::CustomSql {
        template: "round({amount} / 100.0, 2)".to_string(),
        fields: BTreeMap::from([("amount".to_string(), "amount".to_string())]),
    }]);
    let (sql, _) = plan.to_sql().unwrap();
    assert!(sql.contains("round(\"selq_root\".\"amount\" / 100.0, 2)"), "sql={sql}");
}
