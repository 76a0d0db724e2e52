//! Single-case execution: prepare, sign, dispatch, evaluate, capture.

use super::events::{CaseFailure, FailureKind, TestCaseResult};
use super::schema::validate_body;
use crate::context::{Context, UnresolvedVariable};
use crate::json_path::{as_context_value, lookup};
use crate::model::TestCase;
use crate::permissions::PermissionTable;
use crate::signing::{RequestSigner, SIGNATURE_HEADER};
use crate::swagger::{HttpMethod, SwaggerDoc};
use crate::transport::{CapturedResponse, PreparedRequest, Transport};
use std::time::Instant;
use tracing::{debug, warn};

pub(crate) struct CaseExecutor<'a> {
    pub transport: &'a dyn Transport,
    pub signer: Option<&'a dyn RequestSigner>,
    pub permissions: &'a PermissionTable,
    pub http_trace: bool,
}

impl CaseExecutor<'_> {
    /// Run one case against the run context; captured values are written
    /// back into `context` for later cases.
    pub(crate) async fn execute(
        &self,
        case: &TestCase,
        specification: &str,
        swagger: Option<&SwaggerDoc>,
        schema_error: Option<&str>,
        context: &mut Context,
    ) -> TestCaseResult {
        let started = Instant::now();
        let mut result = TestCaseResult {
            id: case.id.clone(),
            name: case.name.clone(),
            specification: specification.to_string(),
            pass: false,
            fail: None,
            request: None,
            response: None,
            elapsed_ms: 0,
        };

        let outcome = self
            .run(case, swagger, schema_error, context, &mut result)
            .await;
        if let Err(failure) = outcome {
            debug!(test_id = %case.id, kind = ?failure.kind, "case failed: {}", failure.message);
            result.fail = Some(failure);
        } else {
            result.pass = true;
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run(
        &self,
        case: &TestCase,
        swagger: Option<&SwaggerDoc>,
        schema_error: Option<&str>,
        context: &mut Context,
        result: &mut TestCaseResult,
    ) -> Result<(), CaseFailure> {
        let mut request = prepare(case, context)?;

        if self
            .permissions
            .requires_signature(&case.input.method, case.path())
        {
            let signer = self.signer.ok_or_else(|| {
                CaseFailure::new(FailureKind::SigningFailed, "no signing material configured")
            })?;
            let body = request.body.as_deref().unwrap_or_default();
            let signature = signer
                .sign(body.as_bytes())
                .map_err(|e| CaseFailure::new(FailureKind::SigningFailed, e.to_string()))?;
            request.headers.insert(SIGNATURE_HEADER.to_string(), signature);
        }

        if self.http_trace {
            debug!(test_id = %case.id, request = ?request, "dispatching");
        }
        result.request = Some(request.clone());
        let response = self.transport.send(&request).await?;
        if self.http_trace {
            debug!(test_id = %case.id, response = ?response, "received");
        }
        result.response = Some(response.clone());

        if response.status != case.expect.status_code {
            return Err(CaseFailure::new(
                FailureKind::StatusMismatch,
                format!(
                    "expected status {}, got {}",
                    case.expect.status_code, response.status
                ),
            ));
        }

        let body = response.json();
        capture(case, body.as_ref(), context)?;

        if case.expect.schema_validation {
            check_schema(case, swagger, schema_error, &response, body.as_ref())?;
        }
        check_matches(case, body.as_ref())
    }
}

/// Resolve every `$variable` in the case against the run context, failing
/// with all unresolved names at once.
pub(crate) fn prepare(case: &TestCase, run: &Context) -> Result<PreparedRequest, CaseFailure> {
    let mut scope = run.clone();
    scope.extend(&case.context);
    scope.extend_pairs(&case.input.replace_parameters);
    scope.put("fapi_interaction_id", uuid::Uuid::new_v4().to_string());

    let mut missing = Vec::new();
    let endpoint = scope.resolve_collecting(&case.input.endpoint, &mut missing);
    let headers = case
        .input
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), scope.resolve_collecting(v, &mut missing)))
        .collect();
    let body = case
        .input
        .body
        .as_ref()
        .map(|b| scope.resolve_collecting(b, &mut missing));

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint
    } else {
        match scope.get("baseurl") {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), endpoint),
            None => {
                missing.push("baseurl".to_string());
                endpoint
            }
        }
    };

    if !missing.is_empty() {
        return Err(CaseFailure::new(
            FailureKind::UnresolvedVariable,
            UnresolvedVariable(missing).to_string(),
        ));
    }
    Ok(PreparedRequest {
        method: case.input.method.clone(),
        url,
        headers,
        body,
    })
}

fn capture(
    case: &TestCase,
    body: Option<&serde_json::Value>,
    context: &mut Context,
) -> Result<(), CaseFailure> {
    for put in &case.context_put {
        match body.and_then(|b| lookup(b, &put.json)) {
            Some(value) => {
                debug!(test_id = %case.id, name = %put.name, "captured context value");
                context.put(put.name.clone(), as_context_value(value));
            }
            None => {
                return Err(CaseFailure::new(
                    FailureKind::AssertionFailed,
                    format!("context value '{}' not found in response", put.json),
                ))
            }
        }
    }
    Ok(())
}

fn check_schema(
    case: &TestCase,
    swagger: Option<&SwaggerDoc>,
    schema_error: Option<&str>,
    response: &CapturedResponse,
    body: Option<&serde_json::Value>,
) -> Result<(), CaseFailure> {
    let Some(doc) = swagger else {
        return match schema_error {
            Some(reason) => Err(CaseFailure::new(FailureKind::SchemaMismatch, reason)),
            // no schema attached to this block (custom tests)
            None => Ok(()),
        };
    };
    let Some(method) = HttpMethod::parse(&case.input.method) else {
        return Ok(());
    };
    let Some((template, op)) = doc.find_operation(method, case.path()) else {
        warn!(test_id = %case.id, path = case.path(), "no swagger operation for case");
        return Ok(());
    };
    let Some(schema) = doc.response_schema(op, response.status) else {
        return Ok(());
    };
    let Some(instance) = body else {
        return Err(CaseFailure::new(
            FailureKind::SchemaMismatch,
            format!("{method} {template}: response body is not JSON"),
        ));
    };
    validate_body(&schema, instance).map_err(|e| CaseFailure::new(FailureKind::SchemaMismatch, e))
}

fn check_matches(case: &TestCase, body: Option<&serde_json::Value>) -> Result<(), CaseFailure> {
    for m in &case.expect.matches {
        let found = body.and_then(|b| lookup(b, &m.json));
        match (found, &m.value) {
            (None, _) => {
                return Err(CaseFailure::new(
                    FailureKind::AssertionFailed,
                    format!("'{}' not present in response", m.json),
                ))
            }
            (Some(actual), Some(expected)) if actual != expected => {
                return Err(CaseFailure::new(
                    FailureKind::AssertionFailed,
                    format!("'{}' is {actual}, expected {expected}", m.json),
                ))
            }
            _ => {}
        }
    }
    Ok(())
}
