//! Set operations: UNION [ALL], INTERSECT, EXCEPT.
//!
//! Compatibility is checked when the operation is composed, not at
//! finalization: column counts must match and each column pair must fall in
//! the same type class.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::FieldType;
use crate::error::{Result, SelqError, SetOpError};
use crate::expr::{AggFunc, Expr, SqlFunc, WindowFunc};
use crate::field::Resolver;
use crate::ident::double_wrap;
use crate::plan::QueryPlan;
use crate::sql_ir::Frag;

use super::select;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TypeClass {
    Int,
    Num,
    Text,
    Bool,
    Date,
    Datetime,
    Any,
}

static COMPATIBILITY: Lazy<HashMap<FieldType, TypeClass>> = Lazy::new(|| {
    use FieldType::*;
    HashMap::from([
        (Integer, TypeClass::Int),
        (Float, TypeClass::Num),
        (Decimal, TypeClass::Num),
        (Numeric, TypeClass::Num),
        (String, TypeClass::Text),
        (Text, TypeClass::Text),
        (Boolean, TypeClass::Bool),
        (Date, TypeClass::Date),
        (NaiveDatetime, TypeClass::Datetime),
        (UtcDatetime, TypeClass::Datetime),
        (Unknown, TypeClass::Any),
    ])
});

fn class(field_type: FieldType) -> TypeClass {
    COMPATIBILITY
        .get(&field_type)
        .copied()
        .unwrap_or(TypeClass::Any)
}

pub(crate) fn validate_compatible(left: &QueryPlan, right: &QueryPlan) -> Result<()> {
    let left_types = selection_types(left);
    let right_types = selection_types(right);
    if left_types.is_empty() {
        return Err(SelqError::SetOperation(SetOpError::EmptySelection {
            side: "left",
        }));
    }
    if right_types.is_empty() {
        return Err(SelqError::SetOperation(SetOpError::EmptySelection {
            side: "right",
        }));
    }
    if left_types.len() != right_types.len() {
        return Err(SelqError::SetOperation(SetOpError::ColumnCountMismatch {
            left: left_types.len(),
            right: right_types.len(),
        }));
    }
    for (position, (lt, rt)) in left_types.iter().zip(right_types.iter()).enumerate() {
        let (lc, rc) = (class(*lt), class(*rt));
        if lc != rc && lc != TypeClass::Any && rc != TypeClass::Any {
            return Err(SelqError::SetOperation(SetOpError::TypeMismatch {
                position,
                left: lt.as_str().to_string(),
                right: rt.as_str().to_string(),
            }));
        }
    }
    Ok(())
}

/// Inferred output type of every selected expression.
fn selection_types(plan: &QueryPlan) -> Vec<FieldType> {
    let selected: Vec<Expr> = if plan.set.selected.is_empty() {
        plan.domain
            .default_selected
            .iter()
            .map(|f| Expr::Field(f.clone()))
            .collect()
    } else {
        plan.set.selected.clone()
    };
    let resolver = Resolver::new(&plan.domain, &plan.columns, &plan.joins);
    selected
        .iter()
        .map(|expr| infer_type(&resolver, expr))
        .collect()
}

fn infer_type(resolver: &Resolver, expr: &Expr) -> FieldType {
    match expr {
        Expr::Field(reference) => resolver
            .resolve(reference)
            .map(|(field, _)| field.field_type)
            .unwrap_or(FieldType::Unknown),
        Expr::Literal(value) => match value {
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
            Value::Number(_) => FieldType::Float,
            Value::String(_) => FieldType::String,
            _ => FieldType::Unknown,
        },
        Expr::CountStar => FieldType::Integer,
        Expr::Aggregate { agg, expr } => match agg {
            AggFunc::Count | AggFunc::CountDistinct => FieldType::Integer,
            AggFunc::Sum | AggFunc::Avg => FieldType::Numeric,
            AggFunc::Min | AggFunc::Max => infer_type(resolver, expr),
            AggFunc::StringAgg => FieldType::Text,
            AggFunc::ArrayAgg => FieldType::Unknown,
        },
        Expr::Func { func, args } => match func {
            SqlFunc::Substr
            | SqlFunc::Trim
            | SqlFunc::Upper
            | SqlFunc::Lower
            | SqlFunc::Replace
            | SqlFunc::Concat
            | SqlFunc::ArrayToString => FieldType::String,
            SqlFunc::Length => FieldType::Integer,
            SqlFunc::Abs
            | SqlFunc::Round
            | SqlFunc::Power
            | SqlFunc::Sqrt
            | SqlFunc::Random
            | SqlFunc::Extract { .. } => FieldType::Numeric,
            SqlFunc::Now | SqlFunc::DateTrunc { .. } => FieldType::UtcDatetime,
            SqlFunc::Coalesce | SqlFunc::Nullif | SqlFunc::Greatest | SqlFunc::Least => args
                .first()
                .map(|arg| infer_type(resolver, arg))
                .unwrap_or(FieldType::Unknown),
            _ => FieldType::Unknown,
        },
        Expr::Case { branches, .. } => branches
            .first()
            .map(|b| infer_type(resolver, &b.then))
            .unwrap_or(FieldType::Unknown),
        Expr::Iif { then_expr, .. } => infer_type(resolver, then_expr),
        Expr::Decode { pairs, .. } => pairs
            .first()
            .map(|(_, e)| infer_type(resolver, e))
            .unwrap_or(FieldType::Unknown),
        Expr::Window { func, .. } => match func {
            WindowFunc::RowNumber
            | WindowFunc::Rank
            | WindowFunc::DenseRank
            | WindowFunc::Ntile
            | WindowFunc::Count => FieldType::Integer,
            _ => FieldType::Numeric,
        },
        Expr::CustomSql { .. } => FieldType::Unknown,
        Expr::Aliased { expr, .. } => infer_type(resolver, expr),
    }
}

/// Compose the plan's own query with its chained set operations. The plan's
/// ORDER BY / LIMIT / OFFSET apply to the whole composition and reference
/// output column names.
pub(crate) fn build_frag(plan: &QueryPlan) -> Result<(Frag, Vec<(String, String)>)> {
    let mut left = plan.clone();
    left.set.set_operations = Vec::new();
    let outer_order = std::mem::take(&mut left.set.order_by);
    let outer_limit = left.set.limit.take();
    let outer_offset = left.set.offset.take();

    let (left_frag, aliases) = super::build_frag(&left)?;
    let mut parts = vec![left_frag];

    for op in &plan.set.set_operations {
        parts.push(Frag::sql(format!(" {} ", op.operation.keyword(op.all))));
        let needs_parens = op.right.set.order_by.len() + op.right.set.set_operations.len() > 0
            || op.right.set.limit.is_some()
            || op.right.set.offset.is_some();
        let (right_frag, _) = super::build_frag(&op.right)?;
        if needs_parens {
            parts.push(Frag::sql("("));
            parts.push(right_frag);
            parts.push(Frag::sql(")"));
        } else {
            parts.push(right_frag);
        }
    }

    if !outer_order.is_empty() {
        let rendered: Result<Vec<String>> = outer_order
            .iter()
            .map(|item| {
                let alias = select::derive_alias(&item.expr);
                Ok(format!("{} {}", double_wrap(&alias)?, item.direction.sql()))
            })
            .collect();
        parts.push(Frag::sql(format!(" ORDER BY {}", rendered?.join(", "))));
    }
    if let Some(limit) = outer_limit {
        parts.push(Frag::sql(format!(" LIMIT {limit}")));
    }
    if let Some(offset) = outer_offset {
        parts.push(Frag::sql(format!(" OFFSET {offset}")));
    }

    Ok((Frag::Seq(parts), aliases))
}
