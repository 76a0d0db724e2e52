//! Discovery document: which specification endpoints a target implements.
//!
//! The document is validated once ([`DiscoveryValidator`]) and then frozen
//! inside the journey.

mod structural;
mod validate;

pub use validate::{DiscoveryError, DiscoveryValidator, Validation, ValidationFailure};

use crate::conditionality::MethodPath;
use crate::model::TestCase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recognised `discoveryVersion` values.
pub const SUPPORTED_VERSIONS: &[&str] = &["v0.3.0", "v0.4.0"];

/// Recognised `tokenAcquisition` values.
pub const TOKEN_ACQUISITION_METHODS: &[&str] = &["psu", "headless", "store"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub discovery_model: DiscoveryModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryModel {
    pub name: String,
    pub description: String,
    pub discovery_version: String,
    pub token_acquisition: String,
    pub discovery_items: Vec<DiscoveryItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_tests: Vec<CustomTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryItem {
    pub api_specification: ApiSpecification,
    pub openid_configuration_uri: String,
    pub resource_base_uri: String,
    /// Literal substitutions for `{Key}` path placeholders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_ids: BTreeMap<String, String>,
    pub endpoints: Vec<Endpoint>,
}

impl DiscoveryItem {
    pub fn declared(&self) -> Vec<MethodPath> {
        self.endpoints
            .iter()
            .map(|e| MethodPath::new(e.method.clone(), e.path.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpecification {
    pub name: String,
    pub url: String,
    pub version: String,
    pub schema_version: String,
    pub manifest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_properties: Vec<ConditionalProperty>,
}

/// Optional-property annotation carried through to generated cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalProperty {
    pub schema: String,
    pub property: String,
    pub path: String,
}

/// Inline, pre-baked test sequence (typically token acquisition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTest {
    #[serde(rename = "@id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub replace_parameters: BTreeMap<String, String>,
    pub sequence: Vec<TestCase>,
}
