//! Correlated subselect aggregation.
//!
//! Each spec becomes one scalar subquery in the SELECT list, aggregating the
//! related schema's rows for the current outer row.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{ColumnEntry, ColumnKind, ResolvedJoin, SchemaDef, ROOT_JOIN};
use crate::error::{FieldError, Result, SelqError};
use crate::expr::{SubselectFormat, SubselectSpec};
use crate::field::Resolver;
use crate::ident::{double_wrap, single_wrap};
use crate::sql_ir::Frag;

use super::{association_chain, filters, group, pivot, BuildContext, SelectItemFrag};

pub(crate) fn build_subselect_item(
    ctx: &mut BuildContext,
    spec: &SubselectSpec,
) -> Result<SelectItemFrag> {
    let domain = ctx.domain;
    let path = pivot::find_join_path(domain, &spec.target_schema)?;
    let chain = association_chain(domain, &path)?;
    let (first_assoc, _) = chain.first().expect("join path is never empty");
    let (_, target) = chain.last().expect("join path is never empty");

    let fields: Vec<String> = if spec.fields.is_empty() {
        target
            .fields
            .iter()
            .filter(|f| !target.is_redacted(f))
            .cloned()
            .collect()
    } else {
        spec.fields.clone()
    };
    if fields.is_empty() && spec.format != SubselectFormat::Count {
        return Err(SelqError::EmptySelect);
    }

    // FROM chain: the terminal schema is aliased `sub`, intermediate hops get
    // positional aliases.
    let mut from = String::new();
    let mut prev_alias = String::new();
    for (idx, (assoc, schema)) in chain.iter().enumerate() {
        let alias = if idx == chain.len() - 1 {
            "sub".to_string()
        } else {
            format!("ss{}_{}", idx + 1, path[idx])
        };
        if idx == 0 {
            from.push_str(&format!("{} {}", double_wrap(&schema.table)?, alias));
        } else {
            from.push_str(&format!(
                " INNER JOIN {} {} ON {}.{} = {}.{}",
                double_wrap(&schema.table)?,
                alias,
                prev_alias,
                double_wrap(&assoc.owner_key)?,
                alias,
                double_wrap(&assoc.related_key)?
            ));
        }
        prev_alias = alias;
    }
    let first_alias = if chain.len() == 1 {
        "sub".to_string()
    } else {
        format!("ss1_{}", path[0])
    };
    let correlation = format!(
        "{first_alias}.{} = {}.{}",
        double_wrap(&first_assoc.related_key)?,
        double_wrap(ROOT_JOIN)?,
        double_wrap(&first_assoc.owner_key)?
    );

    // Sub-resolution context: fields and filters inside the subquery resolve
    // against the terminal schema under the `sub` alias.
    let sub_columns = sub_columns(target, &spec.target_schema);
    let no_joins: BTreeMap<String, ResolvedJoin> = BTreeMap::new();
    let mut sub_ctx = BuildContext {
        plan: ctx.plan,
        domain,
        resolver: Resolver::new(domain, &sub_columns, &no_joins),
        used_joins: Vec::new(),
        instances: BTreeMap::new(),
        taken_aliases: Vec::new(),
    };

    let order_frag = group::build_order_by(&mut sub_ctx, &spec.order_by)?;
    let filter_frag = filters::build_filter_set(&mut sub_ctx, &spec.filters)?;

    let aggregate = aggregate_frag(spec, &fields, order_frag)?;

    let mut parts = vec![Frag::sql("(SELECT ")];
    parts.push(aggregate);
    parts.push(Frag::sql(format!(" FROM {from} WHERE {correlation}")));
    if !filter_frag.is_empty() {
        parts.push(Frag::sql(" AND "));
        parts.push(filter_frag);
    }
    parts.push(Frag::sql(")"));

    let alias = ctx.claim_alias(
        spec.alias
            .as_deref()
            .unwrap_or(spec.target_schema.as_str()),
    );
    let description = format!("subselect({})", spec.target_schema);
    Ok(SelectItemFrag {
        frag: Frag::seq(vec![
            Frag::Seq(parts),
            Frag::sql(" AS "),
            Frag::sql(double_wrap(&alias)?),
        ]),
        alias,
        description,
    })
}

fn aggregate_frag(spec: &SubselectSpec, fields: &[String], order_frag: Frag) -> Result<Frag> {
    let order_suffix = |order_frag: Frag| -> Frag {
        if order_frag.is_empty() {
            Frag::empty()
        } else {
            Frag::seq(vec![Frag::sql(" ORDER BY "), order_frag])
        }
    };
    match spec.format {
        SubselectFormat::JsonAgg => {
            let pairs: Vec<String> = fields
                .iter()
                .map(|f| {
                    double_wrap(f).map(|w| format!("{}, sub.{w}", single_wrap(f)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Frag::seq(vec![
                Frag::sql(format!("json_agg(json_build_object({})", pairs.join(", "))),
                order_suffix(order_frag),
                Frag::sql(")"),
            ]))
        }
        SubselectFormat::ArrayAgg => {
            let field = single_field(spec, fields)?;
            Ok(Frag::seq(vec![
                Frag::sql(format!("array_agg(sub.{}", double_wrap(&field)?)),
                order_suffix(order_frag),
                Frag::sql(")"),
            ]))
        }
        SubselectFormat::StringAgg => {
            let field = single_field(spec, fields)?;
            let separator = spec.separator.clone().unwrap_or_else(|| ", ".to_string());
            Ok(Frag::seq(vec![
                Frag::sql(format!("string_agg(sub.{}::text, ", double_wrap(&field)?)),
                Frag::Param(Value::String(separator)),
                order_suffix(order_frag),
                Frag::sql(")"),
            ]))
        }
        SubselectFormat::Count => Ok(Frag::sql("count(*)")),
    }
}

fn single_field(spec: &SubselectSpec, fields: &[String]) -> Result<String> {
    fields.first().cloned().ok_or_else(|| {
        SelqError::Field(FieldError::InvalidFormat {
            reference: spec.target_schema.clone(),
            reason: "aggregation format requires a field".to_string(),
        })
    })
}

fn sub_columns(target: &SchemaDef, target_key: &str) -> BTreeMap<String, ColumnEntry> {
    let mut columns = BTreeMap::new();
    for field in &target.fields {
        if target.is_redacted(field) {
            continue;
        }
        columns.insert(
            field.clone(),
            ColumnEntry {
                key: field.clone(),
                name: field.clone(),
                qualified_name: format!("{target_key}.{field}"),
                source_join: ROOT_JOIN.to_string(),
                table_alias: "sub".to_string(),
                field_type: target.field_type(field),
                kind: ColumnKind::Plain,
            },
        );
    }
    columns
}
