//! Conditionality catalogue: (specification, method, path) → Mandatory,
//! Conditional or Optional.
//!
//! The packaged table is configuration data and is never mutated at runtime.
//! Validator and generator take the catalogue as `&dyn ConditionalityCatalogue`
//! so tests can substitute their own table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const CONDITIONALITY_JSON: &str = include_str!("../data/conditionality.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conditionality {
    Mandatory,
    Conditional,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionalityError {
    #[error("unknown endpoint: method={method} path={path} specification={specification}")]
    UnknownEndpoint {
        method: String,
        path: String,
        specification: String,
    },
}

/// An HTTP method + path template pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodPath {
    pub method: String,
    pub path: String,
}

impl MethodPath {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

pub trait ConditionalityCatalogue: Send + Sync {
    fn get_conditionality(
        &self,
        method: &str,
        path: &str,
        specification: &str,
    ) -> Result<Conditionality, ConditionalityError>;

    /// Mandatory endpoints of `specification`, in table order.
    fn mandatory(&self, specification: &str) -> Vec<MethodPath>;

    fn is_present(&self, method: &str, path: &str, specification: &str) -> bool {
        self.get_conditionality(method, path, specification).is_ok()
    }

    fn is_mandatory(
        &self,
        method: &str,
        path: &str,
        specification: &str,
    ) -> Result<bool, ConditionalityError> {
        Ok(self.get_conditionality(method, path, specification)? == Conditionality::Mandatory)
    }

    fn is_conditional(
        &self,
        method: &str,
        path: &str,
        specification: &str,
    ) -> Result<bool, ConditionalityError> {
        Ok(self.get_conditionality(method, path, specification)? == Conditionality::Conditional)
    }

    fn is_optional(
        &self,
        method: &str,
        path: &str,
        specification: &str,
    ) -> Result<bool, ConditionalityError> {
        Ok(self.get_conditionality(method, path, specification)? == Conditionality::Optional)
    }

    /// Mandatory endpoints of `specification` absent from `declared`
    /// (exact method + path match).
    fn missing_mandatory(&self, declared: &[MethodPath], specification: &str) -> Vec<MethodPath> {
        self.mandatory(specification)
            .into_iter()
            .filter(|m| !declared.contains(m))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogueRow {
    method: String,
    path: String,
    condition: Conditionality,
}

/// Catalogue backed by a JSON table keyed by specification identifier.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogue {
    rows: BTreeMap<String, Vec<CatalogueRow>>,
    index: HashMap<(String, String, String), Conditionality>,
}

impl StaticCatalogue {
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Self::from_json(CONDITIONALITY_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let rows: BTreeMap<String, Vec<CatalogueRow>> = serde_json::from_str(json)?;
        let mut index = HashMap::new();
        for (spec, entries) in &rows {
            for row in entries {
                index.insert(
                    (spec.clone(), row.method.clone(), row.path.clone()),
                    row.condition,
                );
            }
        }
        Ok(Self { rows, index })
    }

    /// Single-row insert; lets tests build a catalogue without JSON.
    pub fn with_entry(
        mut self,
        specification: &str,
        method: &str,
        path: &str,
        condition: Conditionality,
    ) -> Self {
        self.rows
            .entry(specification.to_string())
            .or_default()
            .push(CatalogueRow {
                method: method.to_string(),
                path: path.to_string(),
                condition,
            });
        self.index.insert(
            (
                specification.to_string(),
                method.to_string(),
                path.to_string(),
            ),
            condition,
        );
        self
    }
}

impl ConditionalityCatalogue for StaticCatalogue {
    fn get_conditionality(
        &self,
        method: &str,
        path: &str,
        specification: &str,
    ) -> Result<Conditionality, ConditionalityError> {
        self.index
            .get(&(
                specification.to_string(),
                method.to_string(),
                path.to_string(),
            ))
            .copied()
            .ok_or_else(|| ConditionalityError::UnknownEndpoint {
                method: method.to_string(),
                path: path.to_string(),
                specification: specification.to_string(),
            })
    }

    fn mandatory(&self, specification: &str) -> Vec<MethodPath> {
        self.rows
            .get(specification)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.condition == Conditionality::Mandatory)
                    .map(|r| MethodPath::new(r.method.clone(), r.path.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
