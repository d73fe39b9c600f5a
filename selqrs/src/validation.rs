//! Domain validation.
//!
//! `validate` collects every problem it can find instead of stopping at the
//! first, so a caller fixing a domain definition sees the whole picture at
//! once. Runs at configure time when `validate: true` is set; otherwise the
//! same defects surface later as build errors.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::domain::{Domain, HierarchyConfig, JoinKind, JoinSpec, SchemaDef};
use crate::error::{Result, SelqError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainIssue {
    #[error("domain is missing required keys: {}", keys.join(", "))]
    MissingRequiredKeys { keys: Vec<String> },
    #[error("schema {schema} is missing {}", missing.join(", "))]
    SchemaMissingKeys {
        schema: String,
        missing: Vec<String>,
    },
    #[error("association {association} references unknown schema {queryable}")]
    AssociationInvalidQueryable {
        association: String,
        queryable: String,
    },
    #[error("join {join} has no matching association on schema {schema}")]
    JoinMissingAssociation { join: String, schema: String },
    #[error("join cycle detected: {}", path.join(" -> "))]
    JoinCycleDetected { path: Vec<String> },
    #[error("{join_type} join {join} is missing {missing}")]
    AdvancedJoinMissingKey {
        join: String,
        join_type: String,
        missing: String,
    },
}

/// Parse a raw domain value, reporting missing top-level keys as structured
/// issues before typed deserialization takes over.
pub fn parse_domain(value: Value) -> Result<Domain> {
    let Some(map) = value.as_object() else {
        return Err(SelqError::Validation(vec![
            DomainIssue::MissingRequiredKeys {
                keys: vec!["source".to_string(), "schemas".to_string()],
            },
        ]));
    };
    let missing: Vec<String> = ["source", "schemas"]
        .iter()
        .filter(|k| !map.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SelqError::Validation(vec![
            DomainIssue::MissingRequiredKeys { keys: missing },
        ]));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn validate(domain: &Domain) -> std::result::Result<(), Vec<DomainIssue>> {
    let mut issues = Vec::new();

    check_schema("source", &domain.source, &mut issues);
    for (name, schema) in &domain.schemas {
        check_schema(name, schema, &mut issues);
    }

    check_associations("source", &domain.source, domain, &mut issues);
    for (name, schema) in &domain.schemas {
        check_associations(name, schema, domain, &mut issues);
    }

    let mut path = Vec::new();
    check_joins(
        domain,
        "source",
        &domain.source.associations,
        &domain.joins,
        &mut path,
        &mut issues,
    );

    tracing::debug!(issues = issues.len(), "domain validation complete");
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn check_schema(name: &str, schema: &SchemaDef, issues: &mut Vec<DomainIssue>) {
    let mut missing = Vec::new();
    if schema.primary_key.is_empty() {
        missing.push("primary_key".to_string());
    }
    if schema.fields.is_empty() {
        missing.push("fields".to_string());
    }
    if schema.columns.is_empty() {
        missing.push("columns".to_string());
    }
    if !missing.is_empty() {
        issues.push(DomainIssue::SchemaMissingKeys {
            schema: name.to_string(),
            missing,
        });
    }
}

fn check_associations(
    _schema_name: &str,
    schema: &SchemaDef,
    domain: &Domain,
    issues: &mut Vec<DomainIssue>,
) {
    for (assoc_name, assoc) in &schema.associations {
        if !domain.schemas.contains_key(&assoc.queryable) {
            issues.push(DomainIssue::AssociationInvalidQueryable {
                association: assoc_name.clone(),
                queryable: assoc.queryable.clone(),
            });
        }
    }
}

fn check_joins(
    domain: &Domain,
    schema_name: &str,
    associations: &BTreeMap<String, crate::domain::Association>,
    joins: &BTreeMap<String, JoinSpec>,
    path: &mut Vec<String>,
    issues: &mut Vec<DomainIssue>,
) {
    for (join_id, spec) in joins {
        if path.iter().any(|p| p == join_id) {
            let mut cycle = path.clone();
            cycle.push(join_id.clone());
            issues.push(DomainIssue::JoinCycleDetected { path: cycle });
            continue;
        }

        check_join_config(join_id, spec, issues);

        let Some(assoc) = associations.get(join_id) else {
            issues.push(DomainIssue::JoinMissingAssociation {
                join: join_id.clone(),
                schema: schema_name.to_string(),
            });
            continue;
        };
        let Some(schema) = domain.schemas.get(&assoc.queryable) else {
            // Already reported by the association pass.
            continue;
        };

        path.push(join_id.clone());
        check_joins(
            domain,
            &assoc.queryable,
            &schema.associations,
            &spec.joins,
            path,
            issues,
        );
        path.pop();
    }
}

fn check_join_config(join_id: &str, spec: &JoinSpec, issues: &mut Vec<DomainIssue>) {
    let mut missing = |what: &str, join_type: &str| {
        issues.push(DomainIssue::AdvancedJoinMissingKey {
            join: join_id.to_string(),
            join_type: join_type.to_string(),
            missing: what.to_string(),
        });
    };
    match &spec.kind {
        JoinKind::SnowflakeDimension(cfg) => {
            if cfg.normalization_joins.is_empty() {
                missing("normalization_joins", "snowflake_dimension");
            }
        }
        JoinKind::Lateral(cfg) => {
            if cfg.lateral_query.as_deref().unwrap_or("").is_empty() {
                missing("lateral_query", "lateral");
            }
        }
        JoinKind::Conditional(cfg) => {
            if cfg.conditions.is_empty() {
                missing("conditions", "conditional");
            }
        }
        JoinKind::Hierarchical(HierarchyConfig::ClosureTable {
            closure_table,
            ancestor_field,
            descendant_field,
            ..
        }) => {
            if closure_table.as_deref().unwrap_or("").is_empty() {
                missing("closure_table", "hierarchical/closure_table");
            }
            if ancestor_field.as_deref().unwrap_or("").is_empty() {
                missing("ancestor_field", "hierarchical/closure_table");
            }
            if descendant_field.as_deref().unwrap_or("").is_empty() {
                missing("descendant_field", "hierarchical/closure_table");
            }
        }
        JoinKind::Parameterized(cfg) => {
            if cfg.parameters.is_empty() {
                missing("parameters", "parameterized");
            } else if cfg.parameters.iter().any(|p| p.name.is_empty()) {
                missing("parameter names", "parameterized");
            }
        }
        _ => {}
    }
}
