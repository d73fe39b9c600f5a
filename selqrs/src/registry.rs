use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glob::glob;

use crate::domain::Domain;
use crate::error::{Result, SelqError};
use crate::validation::{validate, DomainIssue};

/// On-disk domain definitions, keyed by domain name (falling back to the
/// source table name when unnamed).
#[derive(Debug, Default, Clone)]
pub struct DomainRegistry {
    pub domains: HashMap<String, Domain>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(SelqError::Validation(vec![
                DomainIssue::MissingRequiredKeys {
                    keys: vec![format!("domain directory {}", root.display())],
                },
            ]));
        }
        let mut registry = DomainRegistry::new();
        for pattern in ["*.yml", "*.yaml"] {
            for entry in glob(&format!("{}/{pattern}", root.display()))
                .map_err(|e| SelqError::Other(e.into()))?
                .flatten()
            {
                registry.load_file(&entry)?;
            }
        }
        tracing::info!(domains = registry.domains.len(), "domain registry loaded");
        Ok(registry)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let domain: Domain = serde_yaml::from_str(&contents)?;
        let name = domain
            .name
            .clone()
            .unwrap_or_else(|| domain.source.table.clone());
        tracing::debug!(domain = %name, path = %path.display(), "loaded domain definition");
        self.domains.insert(name, domain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    /// Validate every loaded domain, collecting issues across all of them.
    pub fn validate_all(&self) -> std::result::Result<(), Vec<DomainIssue>> {
        let mut all = Vec::new();
        for domain in self.domains.values() {
            if let Err(issues) = validate(domain) {
                all.extend(issues);
            }
        }
        if all.is_empty() {
            Ok(())
        } else {
            Err(all)
        }
    }
}
