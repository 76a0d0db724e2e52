use crate::context::Context;
use crate::specification::Specification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A specification paired with its ordered test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationTestCases {
    pub api_specification: Specification,
    pub test_cases: Vec<TestCase>,
}

/// One programmed HTTP interaction with its expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub input: Input,
    #[serde(default, skip_serializing_if = "Context::is_empty")]
    pub context: Context,
    pub expect: Expect,
    /// Response fields captured into the run context for later cases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_put: Vec<ContextPut>,
    /// Explicit permissions; when empty the permission table decides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_excluded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Case-local variables bound before `$variable` resolution.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replace_parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expect {
    pub status_code: u16,
    #[serde(default)]
    pub schema_validation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Match>,
}

/// JSON-path assertion: presence when `value` is absent, equality otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPut {
    pub name: String,
    pub json: String,
}

impl TestCase {
    /// Path portion of the endpoint (query string stripped).
    pub fn path(&self) -> &str {
        self.input
            .endpoint
            .split('?')
            .next()
            .unwrap_or(&self.input.endpoint)
    }
}
