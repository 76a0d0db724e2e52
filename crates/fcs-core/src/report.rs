//! Run report assembled at export time.

use crate::engine::TestCaseResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExportRequestInvalid(pub String);

/// Operator attestation accompanying an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub implementer: String,
    pub authorised_by: String,
    pub job_title: String,
    pub has_agreed: bool,
}

impl ExportRequest {
    pub fn validate(&self) -> Result<(), ExportRequestInvalid> {
        for (name, value) in [
            ("implementer", &self.implementer),
            ("authorised_by", &self.authorised_by),
            ("job_title", &self.job_title),
        ] {
            if value.trim().is_empty() {
                return Err(ExportRequestInvalid(format!("{name} is required")));
            }
        }
        if !self.has_agreed {
            return Err(ExportRequestInvalid("has_agreed must be true".to_string()));
        }
        Ok(())
    }
}

/// Token acquired for a consent bundle; the token value itself is never
/// exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredTokenSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub request: ExportRequest,
    pub has_passed: bool,
    pub results: Vec<TestCaseResult>,
    pub tokens: Vec<AcquiredTokenSummary>,
}

impl ExportReport {
    pub fn new(
        request: ExportRequest,
        results: Vec<TestCaseResult>,
        tokens: Vec<AcquiredTokenSummary>,
    ) -> Self {
        let has_passed = !results.is_empty() && results.iter().all(|r| r.pass);
        Self {
            request,
            has_passed,
            results,
            tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CaseFailure;

    fn request() -> ExportRequest {
        ExportRequest {
            implementer: "Ozone Bank".into(),
            authorised_by: "A. Tester".into(),
            job_title: "QA".into(),
            has_agreed: true,
        }
    }

    #[test]
    fn agreement_and_fields_are_required() {
        assert!(request().validate().is_ok());
        let mut r = request();
        r.has_agreed = false;
        assert_eq!(r.validate().unwrap_err().0, "has_agreed must be true");
        let mut r = request();
        r.job_title = " ".into();
        assert_eq!(r.validate().unwrap_err().0, "job_title is required");
    }

    #[test]
    fn passes_only_when_every_case_passes() {
        let ok = TestCaseResult {
            pass: true,
            fail: None,
            ..TestCaseResult::skipped("#t1001", "a", "s", CaseFailure::cancelled())
        };
        let bad = TestCaseResult::skipped("#t1002", "b", "s", CaseFailure::cancelled());
        assert!(ExportReport::new(request(), vec![ok.clone()], vec![]).has_passed);
        assert!(!ExportReport::new(request(), vec![ok, bad], vec![]).has_passed);
        assert!(!ExportReport::new(request(), vec![], vec![]).has_passed);
    }
}
