//! Custom test blocks: operator-supplied sequences with `${key}` parameters.

use super::GenerationError;
use crate::context::replace_parameters;
use crate::discovery::CustomTest;
use crate::model::{SpecificationTestCases, TestCase};
use crate::specification::Specification;
use serde_json::Value;
use std::collections::BTreeMap;

/// Expand each custom test into its own block, parameters substituted in
/// every string field of every case.
pub(crate) fn expand(custom: &[CustomTest]) -> Result<Vec<SpecificationTestCases>, GenerationError> {
    custom.iter().map(expand_one).collect()
}

fn expand_one(test: &CustomTest) -> Result<SpecificationTestCases, GenerationError> {
    let test_cases = test
        .sequence
        .iter()
        .map(|case| substitute(case, &test.replace_parameters))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GenerationError::CustomTest {
            id: test.id.clone(),
            message: e.to_string(),
        })?;

    Ok(SpecificationTestCases {
        api_specification: Specification::custom(&test.id, &test.name),
        test_cases,
    })
}

fn substitute(case: &TestCase, params: &BTreeMap<String, String>) -> Result<TestCase, serde_json::Error> {
    if params.is_empty() {
        return Ok(case.clone());
    }
    let mut value = serde_json::to_value(case)?;
    replace_strings(&mut value, params);
    serde_json::from_value(value)
}

fn replace_strings(value: &mut Value, params: &BTreeMap<String, String>) {
    match value {
        Value::String(s) => *s = replace_parameters(s, params),
        Value::Array(items) => items.iter_mut().for_each(|v| replace_strings(v, params)),
        Value::Object(map) => map.values_mut().for_each(|v| replace_strings(v, params)),
        _ => {}
    }
}
