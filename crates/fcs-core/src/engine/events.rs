use crate::transport::{CapturedResponse, PreparedRequest, TransportError};
use serde::{Deserialize, Serialize};

/// Why a case did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    UnresolvedVariable,
    StatusMismatch,
    SchemaMismatch,
    AssertionFailed,
    SigningFailed,
    TransportError,
    TlsError,
    /// The request itself exceeded the I/O timeout.
    TimedOut,
    /// Stopped by the operator.
    Cancelled,
    /// The overall run deadline expired.
    RunTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CaseFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Skipped: Cancelled")
    }

    pub fn run_timeout() -> Self {
        Self::new(FailureKind::RunTimeout, "Skipped: Timeout")
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.kind, FailureKind::Cancelled | FailureKind::RunTimeout)
    }
}

impl From<TransportError> for CaseFailure {
    fn from(err: TransportError) -> Self {
        let kind = match err {
            TransportError::Tls(_) => FailureKind::TlsError,
            TransportError::TimedOut => FailureKind::TimedOut,
            TransportError::Network(_) | TransportError::InvalidRequest(_) => {
                FailureKind::TransportError
            }
        };
        Self::new(kind, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub id: String,
    pub name: String,
    /// Identifier of the specification block the case belongs to.
    pub specification: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<CaseFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<PreparedRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CapturedResponse>,
    pub elapsed_ms: u64,
}

impl TestCaseResult {
    pub fn skipped(id: &str, name: &str, specification: &str, failure: CaseFailure) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            specification: specification.to_string(),
            pass: false,
            fail: Some(failure),
            request: None,
            response: None,
            elapsed_ms: 0,
        }
    }
}

/// Frames pushed to the live result stream; `Ended` is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    Result(TestCaseResult),
    Ended,
}
