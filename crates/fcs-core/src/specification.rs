//! Registry of the specifications the suite can test.
//!
//! Loaded once from the packaged table; enumeration order is registration
//! order. Lookup by schema URL is an exact string match.

use serde::{Deserialize, Serialize};

const SPECIFICATIONS_JSON: &str = include_str!("../data/specifications.json");

/// One Open-Banking specification release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    /// Stable short key, e.g. `account-transaction-v3.1`.
    pub identifier: String,
    pub name: String,
    pub version: String,
    /// URL of the OpenAPI document; unique across the registry.
    pub schema_version: String,
    /// Canonical documentation URL.
    pub url: String,
}

impl Specification {
    /// Pseudo-specification used to group a custom test sequence.
    pub fn custom(identifier: &str, name: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: name.to_string(),
            version: String::new(),
            schema_version: String::new(),
            url: String::new(),
        }
    }

    /// Payment specifications are exempt from mandatory-endpoint coverage.
    ///
    /// Review item: the exemption is inherited behaviour with no documented
    /// policy origin.
    pub fn is_payment(&self) -> bool {
        self.identifier.starts_with("payment")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no specification registered for schema version '{0}'")]
pub struct SpecificationNotFound(pub String);

#[derive(Debug, Clone)]
pub struct SpecRegistry {
    specs: Vec<Specification>,
}

impl SpecRegistry {
    pub fn new(specs: Vec<Specification>) -> Self {
        Self { specs }
    }

    /// The packaged registry.
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(SPECIFICATIONS_JSON)?))
    }

    pub fn all(&self) -> &[Specification] {
        &self.specs
    }

    pub fn from_schema_version(&self, url: &str) -> Result<&Specification, SpecificationNotFound> {
        self.specs
            .iter()
            .find(|s| s.schema_version == url)
            .ok_or_else(|| SpecificationNotFound(url.to_string()))
    }

    pub fn by_identifier(&self, identifier: &str) -> Option<&Specification> {
        self.specs.iter().find(|s| s.identifier == identifier)
    }
}
