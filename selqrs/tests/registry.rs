//! Tests for the on-disk domain registry.

use std::fs;

use selq::plan::{ConfigureOpts, QueryPlan};
use selq::{DomainRegistry, SelqError};

const EVENTS_DOMAIN: &str = r#"
name: events
source:
  table: events
  primary_key: id
  fields: [id, name, starts_at, venue_id]
  columns:
    id: { type: integer }
    name: { type: string }
    starts_at: { type: utc_datetime }
    venue_id: { type: integer }
  associations:
    venue:
      queryable: venues
      owner_key: venue_id
      related_key: id
schemas:
  venues:
    table: venues
    primary_key: id
    fields: [id, name, city]
    columns:
      id: { type: integer }
      name: { type: string }
      city: { type: string }
joins:
  venue:
    type: left
default_selected: [name]
"#;

#[test]
fn loads_domains_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("events.yml"), EVENTS_DOMAIN).unwrap();

    let registry = DomainRegistry::load_from_dir(dir.path()).unwrap();
    assert_eq!(registry.domains.len(), 1);
    let domain = registry.get("events").unwrap().clone();

    let plan = QueryPlan::configure(domain, None, ConfigureOpts::default()).unwrap();
    let (sql, _) = plan.select(["name", "venue.city"]).to_sql().unwrap();
    assert!(sql.contains("FROM \"events\" \"selq_root\""), "sql={sql}");
    assert!(sql.contains("LEFT JOIN \"venues\" \"venue\""), "sql={sql}");
}

#[test]
fn load_and_validate_accepts_a_clean_registry() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("events.yaml"), EVENTS_DOMAIN).unwrap();
    let registry = selq::load_and_validate(dir.path()).unwrap();
    assert!(registry.get("events").is_some());
}

#[test]
fn load_and_validate_reports_domain_issues() {
    let broken = r#"
name: broken
source:
  table: things
  primary_key: id
  fields: [id]
  columns:
    id: { type: integer }
joins:
  phantom:
    type: left
"#;
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.yml"), broken).unwrap();
    let err = selq::load_and_validate(dir.path()).unwrap_err();
    assert!(matches!(err, SelqError::Validation(_)));
}

#[test]
fn missing_directory_is_an_error() {
    assert!(DomainRegistry::load_from_dir("/nonexistent/selq-domains").is_err());
}

#[test]
fn unknown_configure_options_are_rejected() {
    let opts = serde_json::json!({ "validate": true, "bogus": 1 });
    assert!(serde_json::from_value::<ConfigureOpts>(opts).is_err());
    let good = serde_json::json!({ "validate": true, "pool": false });
    assert!(serde_json::from_value::<ConfigureOpts>(good).is_ok());
}
