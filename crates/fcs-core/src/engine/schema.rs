use jsonschema::Draft;
use serde_json::Value;

const MAX_ERRORS: usize = 5;

/// Validate a response body against a swagger response schema.
///
/// Returns a compact message listing the first few violations.
pub(crate) fn validate_body(schema: &Value, instance: &Value) -> Result<(), String> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft4)
        .build(schema)
        .map_err(|e| format!("response schema does not compile: {e}"))?;

    if validator.is_valid(instance) {
        return Ok(());
    }

    let lines: Vec<String> = validator
        .iter_errors(instance)
        .take(MAX_ERRORS)
        .map(|e| e.to_string())
        .collect();
    Err(format!("response does not match schema: {}", lines.join("; ")))
}
