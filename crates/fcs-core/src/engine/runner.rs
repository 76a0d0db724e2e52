use super::events::{CaseFailure, RunEvent, TestCaseResult};
use super::execute::CaseExecutor;
use crate::context::Context;
use crate::model::SpecificationTestCases;
use crate::permissions::PermissionTable;
use crate::signing::RequestSigner;
use crate::swagger::SwaggerSource;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Whole-run deadline; remaining cases are skipped when it expires.
    pub timeout: Duration,
    /// Log full request/response snapshots at debug level.
    pub http_trace: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            http_trace: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub results: Vec<TestCaseResult>,
    /// Run context after the last case, including captured values.
    pub context: Context,
    pub outcome: RunOutcome,
}

/// Executes a plan strictly in order, one case at a time.
pub struct Runner {
    pub transport: Arc<dyn Transport>,
    pub signer: Option<Arc<dyn RequestSigner>>,
    pub swagger: Arc<dyn SwaggerSource>,
    pub permissions: Arc<PermissionTable>,
    pub policy: RunPolicy,
}

impl Runner {
    /// Run every case, publishing one `Result` frame per finished case and a
    /// final `Ended` frame. Stopping via `cancel` reports the in-flight case
    /// as cancelled and starts nothing further; the run deadline reports the
    /// in-flight case and every remaining case as timed out.
    pub async fn run(
        &self,
        plan: &[SpecificationTestCases],
        mut context: Context,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> RunSummary {
        let deadline = tokio::time::Instant::now() + self.policy.timeout;
        let executor = CaseExecutor {
            transport: self.transport.as_ref(),
            signer: self.signer.as_deref(),
            permissions: self.permissions.as_ref(),
            http_trace: self.policy.http_trace,
        };
        let total: usize = plan.iter().map(|s| s.test_cases.len()).sum();
        info!(total, "test run started");

        let mut results = Vec::with_capacity(total);
        let mut outcome = RunOutcome::Completed;
        let mut dropped_frames = 0usize;
        let mut publish = |result: TestCaseResult, results: &mut Vec<TestCaseResult>| {
            if events.try_send(RunEvent::Result(result.clone())).is_err() {
                dropped_frames += 1;
            }
            results.push(result);
        };

        'specs: for spec in plan {
            let identifier = spec.api_specification.identifier.as_str();
            let schema_url = spec.api_specification.schema_version.as_str();

            let (swagger, schema_error) = if schema_url.is_empty() || outcome != RunOutcome::Completed {
                (None, None)
            } else {
                match self.swagger.load(schema_url).await {
                    Ok(doc) => (Some(doc), None),
                    Err(e) => {
                        warn!(spec = identifier, error = %e, "response schemas unavailable");
                        (None, Some(e.to_string()))
                    }
                }
            };

            for case in &spec.test_cases {
                if outcome == RunOutcome::TimedOut {
                    publish(
                        TestCaseResult::skipped(&case.id, &case.name, identifier, CaseFailure::run_timeout()),
                        &mut results,
                    );
                    continue;
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        outcome = RunOutcome::Cancelled;
                        TestCaseResult::skipped(&case.id, &case.name, identifier, CaseFailure::cancelled())
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        outcome = RunOutcome::TimedOut;
                        TestCaseResult::skipped(&case.id, &case.name, identifier, CaseFailure::run_timeout())
                    }
                    r = executor.execute(
                        case,
                        identifier,
                        swagger.as_deref(),
                        schema_error.as_deref(),
                        &mut context,
                    ) => r,
                };

                info!(
                    test_id = %result.id,
                    spec = identifier,
                    pass = result.pass,
                    elapsed_ms = result.elapsed_ms,
                    "test case finished"
                );
                publish(result, &mut results);

                if outcome == RunOutcome::Cancelled {
                    break 'specs;
                }
            }
        }

        if events.try_send(RunEvent::Ended).is_err() {
            dropped_frames += 1;
        }
        if dropped_frames > 0 {
            warn!(dropped_frames, "result stream consumer missing or full; frames dropped");
        }
        let passed = results.iter().filter(|r| r.pass).count();
        info!(passed, failed = results.len() - passed, outcome = ?outcome, "test run ended");

        RunSummary {
            results,
            context,
            outcome,
        }
    }
}
