//! User-facing expression types.
//!
//! Strings are accepted as sugar for field references everywhere an [`Expr`]
//! is expected; parsing and resolution happen at build time, not at builder
//! call time, so plans stay cheap to construct and clone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SelqError};
use crate::ident::check_safe_phrase;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Unresolved field reference: `"name"`, `"posts.title"`,
    /// `"products:electronics:25.0:true.name"`.
    Field(String),
    Literal(Value),
    CountStar,
    Aggregate {
        agg: AggFunc,
        expr: Box<Expr>,
    },
    Func {
        func: SqlFunc,
        args: Vec<Expr>,
    },
    Case {
        branches: Vec<CaseBranch>,
        #[serde(default)]
        else_expr: Option<Box<Expr>>,
    },
    Iif {
        condition: Box<FilterExpr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Oracle-style decode: compare `expr` to each value in turn.
    Decode {
        expr: Box<Expr>,
        pairs: Vec<(Value, Expr)>,
        #[serde(default)]
        default: Option<Box<Expr>>,
    },
    Window {
        func: WindowFunc,
        #[serde(default)]
        args: Vec<Expr>,
        over: WindowFrameSpec,
    },
    /// Raw SQL template with `{placeholder}` slots bound to field references.
    /// The template is domain-author input, never an end-user scalar.
    CustomSql {
        template: String,
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
    Aliased {
        expr: Box<Expr>,
        alias: String,
    },
}

impl Expr {
    pub fn field(reference: impl Into<String>) -> Expr {
        Expr::Field(reference.into())
    }

    pub fn field_as(reference: impl Into<String>, alias: impl Into<String>) -> Expr {
        Expr::Aliased {
            expr: Box::new(Expr::Field(reference.into())),
            alias: alias.into(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn aliased(self, alias: impl Into<String>) -> Expr {
        Expr::Aliased {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn count() -> Expr {
        Expr::CountStar
    }

    pub fn sum(expr: impl Into<Expr>) -> Expr {
        Expr::Aggregate {
            agg: AggFunc::Sum,
            expr: Box::new(expr.into()),
        }
    }

    pub fn avg(expr: impl Into<Expr>) -> Expr {
        Expr::Aggregate {
            agg: AggFunc::Avg,
            expr: Box::new(expr.into()),
        }
    }

    pub fn min(expr: impl Into<Expr>) -> Expr {
        Expr::Aggregate {
            agg: AggFunc::Min,
            expr: Box::new(expr.into()),
        }
    }

    pub fn max(expr: impl Into<Expr>) -> Expr {
        Expr::Aggregate {
            agg: AggFunc::Max,
            expr: Box::new(expr.into()),
        }
    }

    pub fn func(func: SqlFunc, args: Vec<Expr>) -> Expr {
        Expr::Func { func, args }
    }

    pub fn coalesce(args: Vec<Expr>) -> Expr {
        Expr::Func {
            func: SqlFunc::Coalesce,
            args,
        }
    }

    pub fn concat(args: Vec<Expr>) -> Expr {
        Expr::Func {
            func: SqlFunc::Concat,
            args,
        }
    }

    pub fn extract(field: impl Into<String>, expr: impl Into<Expr>) -> Expr {
        Expr::Func {
            func: SqlFunc::Extract {
                field: field.into(),
            },
            args: vec![expr.into()],
        }
    }
}

impl From<&str> for Expr {
    fn from(reference: &str) -> Expr {
        Expr::Field(reference.to_string())
    }
}

impl From<String> for Expr {
    fn from(reference: String) -> Expr {
        Expr::Field(reference)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: FilterExpr,
    pub then: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    StringAgg,
    ArrayAgg,
}

impl AggFunc {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggFunc::Count | AggFunc::CountDistinct => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::StringAgg => "string_agg",
            AggFunc::ArrayAgg => "array_agg",
        }
    }
}

/// Scalar SQL function library. Argument arity is checked at build time in
/// the select builder; extra configuration rides on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlFunc {
    // string
    Substr,
    Trim,
    Upper,
    Lower,
    Length,
    Replace,
    Concat,
    // math
    Abs,
    Round,
    Power,
    Sqrt,
    Random,
    // date/time
    Now,
    DateTrunc { unit: String },
    Age,
    Interval { amount: i64, unit: String },
    // array
    ArrayAgg,
    ArrayLength,
    ArrayToString,
    Unnest,
    // conditional
    Coalesce,
    Nullif,
    Greatest,
    Least,
    // extraction
    Extract { field: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    Compare(Comparison),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    /// Faceted filter against an advanced-join column (tag facets, star
    /// dimension display values).
    Facet {
        field: String,
        values: Vec<Value>,
        #[serde(default)]
        strategy: FacetStrategy,
    },
    Subfilter(SubfilterSpec),
}

impl FilterExpr {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> FilterExpr {
        FilterExpr::Compare(Comparison {
            field: field.into(),
            op: CompareOp::Eq,
            value: value.into(),
        })
    }

    pub fn compare(
        field: impl Into<String>,
        op: CompareOp,
        value: impl Into<Value>,
    ) -> FilterExpr {
        FilterExpr::Compare(Comparison {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    pub fn is_null(field: impl Into<String>) -> FilterExpr {
        FilterExpr::Compare(Comparison {
            field: field.into(),
            op: CompareOp::IsNull,
            value: Value::Null,
        })
    }

    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> FilterExpr {
        FilterExpr::Compare(Comparison {
            field: field.into(),
            op: CompareOp::Between,
            value: Value::Array(vec![low.into(), high.into()]),
        })
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> FilterExpr {
        FilterExpr::Compare(Comparison {
            field: field.into(),
            op: CompareOp::In,
            value: Value::Array(values),
        })
    }
}

impl<F: Into<String>, V: Into<Value>> From<(F, V)> for FilterExpr {
    fn from((field, value): (F, V)) -> FilterExpr {
        FilterExpr::eq(field, value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Between,
    IsNull,
    NotNull,
}

impl CompareOp {
    pub fn sql(&self) -> Option<&'static str> {
        match self {
            CompareOp::Eq => Some("="),
            CompareOp::Neq => Some("!="),
            CompareOp::Gt => Some(">"),
            CompareOp::Gte => Some(">="),
            CompareOp::Lt => Some("<"),
            CompareOp::Lte => Some("<="),
            CompareOp::Like => Some("LIKE"),
            CompareOp::Ilike => Some("ILIKE"),
            CompareOp::In | CompareOp::Between | CompareOp::IsNull | CompareOp::NotNull => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetStrategy {
    #[default]
    Single,
    Any,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubfilterSpec {
    /// `"association.field"` path from the source schema.
    pub path: String,
    pub predicate: SubfilterPredicate,
    #[serde(default)]
    pub strategy: SubfilterStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubfilterPredicate {
    Value(Value),
    Compare { op: CompareOp, value: Value },
    InList(Vec<Value>),
    Recent { years: u32 },
    WithinDays { days: u32 },
    SinceDate { date: String },
    Range { from: Value, to: Value },
    Aggregation { func: AggFunc, op: CompareOp, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubfilterStrategy {
    #[default]
    Exists,
    In,
    Aggregation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub expr: Expr,
    #[serde(default)]
    pub direction: OrderDir,
}

impl OrderItem {
    pub fn asc(field: impl Into<String>) -> OrderItem {
        OrderItem {
            expr: Expr::Field(field.into()),
            direction: OrderDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> OrderItem {
        OrderItem {
            expr: Expr::Field(field.into()),
            direction: OrderDir::Desc,
        }
    }
}

impl From<&str> for OrderItem {
    fn from(field: &str) -> OrderItem {
        OrderItem {
            expr: Expr::Field(field.to_string()),
            direction: OrderDir::default(),
        }
    }
}

impl<F: Into<String>> From<(F, OrderDir)> for OrderItem {
    fn from((field, direction): (F, OrderDir)) -> OrderItem {
        OrderItem {
            expr: Expr::Field(field.into()),
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDir {
    Asc,
    Desc,
    #[default]
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

impl OrderDir {
    pub fn sql(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
            OrderDir::AscNullsFirst => "ASC NULLS FIRST",
            OrderDir::AscNullsLast => "ASC NULLS LAST",
            OrderDir::DescNullsFirst => "DESC NULLS FIRST",
            OrderDir::DescNullsLast => "DESC NULLS LAST",
        }
    }

    /// Parse an externally supplied direction token. The token is phrase
    /// checked before matching so a bad value is reported as unsafe input
    /// rather than silently defaulted.
    pub fn parse(token: &str) -> Result<OrderDir> {
        let token = check_safe_phrase(token)?;
        match token.to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderDir::Asc),
            "desc" => Ok(OrderDir::Desc),
            "asc nulls first" => Ok(OrderDir::AscNullsFirst),
            "asc nulls last" => Ok(OrderDir::AscNullsLast),
            "desc nulls first" => Ok(OrderDir::DescNullsFirst),
            "desc nulls last" => Ok(OrderDir::DescNullsLast),
            other => Err(SelqError::InvalidIdentifier(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Expr(Expr),
    Rollup(Vec<Expr>),
}

impl GroupBy {
    pub fn rollup(fields: Vec<impl Into<Expr>>) -> GroupBy {
        GroupBy::Rollup(fields.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for GroupBy {
    fn from(field: &str) -> GroupBy {
        GroupBy::Expr(Expr::Field(field.to_string()))
    }
}

impl From<Expr> for GroupBy {
    fn from(expr: Expr) -> GroupBy {
        GroupBy::Expr(expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Ntile,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Stddev,
    Variance,
}

impl WindowFunc {
    pub fn sql_name(&self) -> &'static str {
        match self {
            WindowFunc::RowNumber => "ROW_NUMBER",
            WindowFunc::Rank => "RANK",
            WindowFunc::DenseRank => "DENSE_RANK",
            WindowFunc::Ntile => "NTILE",
            WindowFunc::Lag => "LAG",
            WindowFunc::Lead => "LEAD",
            WindowFunc::FirstValue => "FIRST_VALUE",
            WindowFunc::LastValue => "LAST_VALUE",
            WindowFunc::Sum => "SUM",
            WindowFunc::Avg => "AVG",
            WindowFunc::Count => "COUNT",
            WindowFunc::Min => "MIN",
            WindowFunc::Max => "MAX",
            WindowFunc::Stddev => "STDDEV",
            WindowFunc::Variance => "VARIANCE",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowFrameSpec {
    #[serde(default)]
    pub partition_by: Vec<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderItem>,
    #[serde(default)]
    pub frame: Option<Frame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: FrameBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameUnits {
    Rows,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u32),
    CurrentRow,
    Following(u32),
    UnboundedFollowing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub function: WindowFunc,
    #[serde(default)]
    pub arguments: Vec<Expr>,
    pub over: WindowFrameSpec,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotSpec {
    pub target_schema: String,
    /// Association names from the source to the target, BFS-derived.
    pub join_path: Vec<String>,
    pub preserve_filters: bool,
    pub subquery_strategy: PivotStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotStrategy {
    #[default]
    In,
    Exists,
    Join,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PivotOpts {
    #[serde(default)]
    pub preserve_filters: bool,
    #[serde(default)]
    pub subquery_strategy: PivotStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubselectSpec {
    pub target_schema: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub format: SubselectFormat,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub order_by: Vec<OrderItem>,
    #[serde(default)]
    pub filters: Vec<FilterExpr>,
    #[serde(default)]
    pub separator: Option<String>,
}

impl SubselectSpec {
    /// String sugar: `"orders"` aggregates every exposed field of the target
    /// as `json_agg`.
    pub fn from_schema(target_schema: impl Into<String>) -> SubselectSpec {
        SubselectSpec {
            target_schema: target_schema.into(),
            fields: Vec::new(),
            format: SubselectFormat::JsonAgg,
            alias: None,
            order_by: Vec::new(),
            filters: Vec::new(),
            separator: None,
        }
    }
}

impl From<&str> for SubselectSpec {
    fn from(target: &str) -> SubselectSpec {
        SubselectSpec::from_schema(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubselectFormat {
    #[default]
    JsonAgg,
    ArrayAgg,
    StringAgg,
    Count,
}
