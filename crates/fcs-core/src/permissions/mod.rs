//! Per-endpoint OAuth permission table and the consent planner.

mod planner;

pub use planner::{
    weave_authorization, CodeSet, NamedPermission, PermissionPlanner, SpecConsentRequirements,
};

use crate::model::TestCase;
use crate::paths::matches_template;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

const PERMISSIONS_JSON: &str = include_str!("../../data/permissions.json");

/// Consent-creating endpoint; its cases never consume a bundle.
pub const ACCOUNT_ACCESS_CONSENTS: &str = "/account-access-consents";

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionEntry {
    pub path: String,
    /// Restricts the entry to one verb; `None` applies to all.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Request body must carry a detached JWS.
    #[serde(default)]
    pub signed: bool,
}

impl PermissionEntry {
    fn applies_to(&self, method: &str, path: &str) -> bool {
        self.method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method))
            && matches_template(&self.path, path)
    }
}

/// Permissions a single case needs from its bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaseRequirement {
    pub required: BTreeSet<String>,
    pub excluded: BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionTable {
    /// Scopes keyed by specification identifier prefix.
    scopes: BTreeMap<String, Vec<String>>,
    endpoints: Vec<PermissionEntry>,
}

impl PermissionTable {
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Self::from_json(PERMISSIONS_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Entry for a concrete or template path; exact template match wins.
    pub fn lookup(&self, method: &str, path: &str) -> Option<&PermissionEntry> {
        let path = path.split('?').next().unwrap_or(path);
        self.endpoints
            .iter()
            .find(|e| e.path == path && e.applies_to(method, path))
            .or_else(|| self.endpoints.iter().find(|e| e.applies_to(method, path)))
    }

    pub fn requires_signature(&self, method: &str, path: &str) -> bool {
        self.lookup(method, path).map(|e| e.signed).unwrap_or(false)
    }

    pub fn scopes_for(&self, specification: &str) -> Vec<String> {
        self.scopes
            .iter()
            .find(|(prefix, _)| specification.starts_with(prefix.as_str()))
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| vec!["openid".to_string()])
    }

    /// `None` when the case needs no consent bundle.
    pub fn requirement(&self, case: &TestCase) -> Option<CaseRequirement> {
        let path = case.path();
        if path.starts_with(ACCOUNT_ACCESS_CONSENTS) {
            return None;
        }

        let requirement = if !case.permissions.is_empty() {
            CaseRequirement {
                required: case.permissions.iter().cloned().collect(),
                excluded: case.permissions_excluded.iter().cloned().collect(),
            }
        } else {
            let entry = self.lookup(&case.input.method, path)?;
            let excluded: BTreeSet<String> = entry.excluded.iter().cloned().collect();
            let required = entry
                .required
                .iter()
                .chain(&entry.default)
                .filter(|p| !excluded.contains(*p))
                .cloned()
                .collect();
            CaseRequirement { required, excluded }
        };

        (!requirement.required.is_empty()).then_some(requirement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expect, Input};

    fn case(method: &str, endpoint: &str) -> TestCase {
        TestCase {
            id: "#t1001".into(),
            name: String::new(),
            input: Input {
                method: method.into(),
                endpoint: endpoint.into(),
                ..Default::default()
            },
            context: Default::default(),
            expect: Expect::default(),
            context_put: vec![],
            permissions: vec![],
            permissions_excluded: vec![],
        }
    }

    #[test]
    fn concrete_paths_resolve_against_templates() {
        let t = PermissionTable::builtin().unwrap();
        let req = t.requirement(&case("GET", "/accounts/100/transactions")).unwrap();
        assert!(req.required.contains("ReadTransactionsBasic"));
        assert!(req.required.contains("ReadTransactionsDetail"));
        assert!(t.requirement(&case("GET", "/accounts/100/balances")).is_some());
    }

    #[test]
    fn consent_endpoints_need_no_bundle() {
        let t = PermissionTable::builtin().unwrap();
        assert!(t.requirement(&case("POST", "/account-access-consents")).is_none());
        assert!(t
            .requirement(&case("GET", "/account-access-consents/aac-1"))
            .is_none());
    }

    #[test]
    fn explicit_permissions_override_table() {
        let t = PermissionTable::builtin().unwrap();
        let mut c = case("GET", "/accounts");
        c.permissions = vec!["ReadAccountsBasic".into()];
        c.permissions_excluded = vec!["ReadAccountsDetail".into()];
        let req = t.requirement(&c).unwrap();
        assert_eq!(req.required.len(), 1);
        assert!(req.excluded.contains("ReadAccountsDetail"));
    }

    #[test]
    fn signing_and_scopes() {
        let t = PermissionTable::builtin().unwrap();
        assert!(t.requires_signature("POST", "/domestic-payment-consents"));
        assert!(!t.requires_signature("GET", "/domestic-payment-consents/abc"));
        assert_eq!(
            t.scopes_for("payment-initiation-v3.1"),
            vec!["openid".to_string(), "payments".to_string()]
        );
    }
}
