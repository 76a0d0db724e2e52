//! Discovery validation pipeline.
//!
//! Stages run in order: structural, discovery version, token acquisition,
//! specification consistency, endpoint presence, mandatory coverage. A
//! structural failure short-circuits the semantic stages; every other stage
//! accumulates so one response carries all problems.

use super::{structural, Discovery, DiscoveryItem, SUPPORTED_VERSIONS, TOKEN_ACQUISITION_METHODS};
use crate::conditionality::ConditionalityCatalogue;
use crate::specification::SpecRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One collectible discovery problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Locator into the document, e.g. `DiscoveryModel.DiscoveryItems[0].Endpoints`.
    pub key: String,
    pub error: String,
}

impl ValidationFailure {
    pub fn new(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: error.into(),
        }
    }
}

/// Fatal validator errors; collectible problems are [`ValidationFailure`]s.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery document is not a JSON object")]
    Malformed,

    #[error("validator engine failure: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(Discovery),
    Invalid(Vec<ValidationFailure>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        match self {
            Validation::Valid(_) => &[],
            Validation::Invalid(f) => f,
        }
    }
}

pub struct DiscoveryValidator<'a> {
    catalogue: &'a dyn ConditionalityCatalogue,
    registry: &'a SpecRegistry,
}

impl<'a> DiscoveryValidator<'a> {
    pub fn new(catalogue: &'a dyn ConditionalityCatalogue, registry: &'a SpecRegistry) -> Self {
        Self {
            catalogue,
            registry,
        }
    }

    pub fn validate(&self, doc: &Value) -> Result<Validation, DiscoveryError> {
        if !doc.is_object() {
            return Err(DiscoveryError::Malformed);
        }

        let failures = structural::check(doc);
        if !failures.is_empty() {
            debug!(count = failures.len(), "discovery failed structural checks");
            return Ok(Validation::Invalid(failures));
        }

        let discovery: Discovery = match serde_json::from_value(doc.clone()) {
            Ok(d) => d,
            Err(e) => {
                return Ok(Validation::Invalid(vec![ValidationFailure::new(
                    "DiscoveryModel",
                    e.to_string(),
                )]))
            }
        };

        let failures = self.semantic(&discovery);
        if failures.is_empty() {
            Ok(Validation::Valid(discovery))
        } else {
            debug!(count = failures.len(), "discovery failed semantic checks");
            Ok(Validation::Invalid(failures))
        }
    }

    fn semantic(&self, discovery: &Discovery) -> Vec<ValidationFailure> {
        let model = &discovery.discovery_model;
        let mut failures = Vec::new();

        if !SUPPORTED_VERSIONS.contains(&model.discovery_version.as_str()) {
            failures.push(ValidationFailure::new(
                "DiscoveryModel.DiscoveryVersion",
                format!(
                    "DiscoveryVersion '{}' not in list of supported versions",
                    model.discovery_version
                ),
            ));
        }

        if !TOKEN_ACQUISITION_METHODS.contains(&model.token_acquisition.as_str()) {
            failures.push(ValidationFailure::new(
                "DiscoveryModel.TokenAcquisition",
                format!(
                    "TokenAcquisition '{}' not in list of supported methods",
                    model.token_acquisition
                ),
            ));
        }

        for (i, item) in model.discovery_items.iter().enumerate() {
            self.check_item(i, item, &mut failures);
        }
        failures
    }

    fn check_item(&self, index: usize, item: &DiscoveryItem, failures: &mut Vec<ValidationFailure>) {
        let prefix = format!("DiscoveryModel.DiscoveryItems[{index}]");
        let api = &item.api_specification;

        let spec = match self.registry.from_schema_version(&api.schema_version) {
            Ok(spec) => spec,
            Err(_) => {
                failures.push(ValidationFailure::new(
                    format!("{prefix}.APISpecification.SchemaVersion"),
                    format!(
                        "'SchemaVersion' not supported by suite '{}'",
                        api.schema_version
                    ),
                ));
                // nothing further can be checked without a specification
                return;
            }
        };

        for (field, actual, expected) in [
            ("Name", &api.name, &spec.name),
            ("Version", &api.version, &spec.version),
            ("URL", &api.url, &spec.url),
        ] {
            if actual != expected {
                failures.push(ValidationFailure::new(
                    format!("{prefix}.APISpecification.{field}"),
                    format!(
                        "'{field}' should be '{expected}' when schemaVersion is '{}'",
                        api.schema_version
                    ),
                ));
            }
        }

        for (j, endpoint) in item.endpoints.iter().enumerate() {
            if !self
                .catalogue
                .is_present(&endpoint.method, &endpoint.path, &spec.identifier)
            {
                failures.push(ValidationFailure::new(
                    format!("{prefix}.Endpoints[{j}]"),
                    format!(
                        "Invalid endpoint Method='{}', Path='{}'",
                        endpoint.method, endpoint.path
                    ),
                ));
            }
        }

        if spec.is_payment() {
            debug!(spec = %spec.identifier, "mandatory coverage not enforced for payment specification");
            return;
        }
        for missing in self.catalogue.missing_mandatory(&item.declared(), &spec.identifier) {
            failures.push(ValidationFailure::new(
                format!("{prefix}.Endpoints"),
                format!(
                    "Missing mandatory endpoint Method='{}', Path='{}'",
                    missing.method, missing.path
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditionality::StaticCatalogue;
    use serde_json::json;

    fn registry() -> SpecRegistry {
        SpecRegistry::builtin().unwrap()
    }

    fn catalogue() -> StaticCatalogue {
        StaticCatalogue::builtin().unwrap()
    }

    fn accounts_doc(endpoints: Value) -> Value {
        let reg = registry();
        let spec = reg.by_identifier("account-transaction-v3.1").unwrap();
        json!({"discoveryModel": {
            "name": "ob-v3.1-ozone",
            "description": "Accounts sandbox",
            "discoveryVersion": "v0.3.0",
            "tokenAcquisition": "psu",
            "discoveryItems": [{
                "apiSpecification": {
                    "name": spec.name, "url": spec.url, "version": spec.version,
                    "schemaVersion": spec.schema_version,
                    "manifest": "file://manifests/ob_3.1_accounts_transactions_fca.json"
                },
                "openidConfigurationUri": "https://as.example/.well-known/openid-configuration",
                "resourceBaseUri": "https://rs.example/open-banking/v3.1/aisp",
                "endpoints": endpoints
            }]
        }})
    }

    fn mandatory_endpoints() -> Value {
        json!([
            {"method": "POST", "path": "/account-access-consents"},
            {"method": "GET", "path": "/account-access-consents/{ConsentId}"},
            {"method": "DELETE", "path": "/account-access-consents/{ConsentId}"},
            {"method": "GET", "path": "/accounts"},
            {"method": "GET", "path": "/accounts/{AccountId}"}
        ])
    }

    #[test]
    fn complete_accounts_discovery_is_valid() {
        let (cat, reg) = (catalogue(), registry());
        let v = DiscoveryValidator::new(&cat, &reg)
            .validate(&accounts_doc(mandatory_endpoints()))
            .unwrap();
        assert!(v.is_valid(), "{:?}", v.failures());
    }

    #[test]
    fn unsupported_version_and_token_method() {
        let (cat, reg) = (catalogue(), registry());
        let mut doc = accounts_doc(mandatory_endpoints());
        doc["discoveryModel"]["discoveryVersion"] = json!("v9.9.9");
        doc["discoveryModel"]["tokenAcquisition"] = json!("magic");
        let v = DiscoveryValidator::new(&cat, &reg).validate(&doc).unwrap();
        assert_eq!(
            v.failures(),
            &[
                ValidationFailure::new(
                    "DiscoveryModel.DiscoveryVersion",
                    "DiscoveryVersion 'v9.9.9' not in list of supported versions"
                ),
                ValidationFailure::new(
                    "DiscoveryModel.TokenAcquisition",
                    "TokenAcquisition 'magic' not in list of supported methods"
                ),
            ]
        );
    }

    #[test]
    fn specification_fields_must_match_registry() {
        let (cat, reg) = (catalogue(), registry());
        let mut doc = accounts_doc(mandatory_endpoints());
        doc["discoveryModel"]["discoveryItems"][0]["apiSpecification"]["name"] = json!("Accounts");
        doc["discoveryModel"]["discoveryItems"][0]["apiSpecification"]["version"] = json!("v9");
        let v = DiscoveryValidator::new(&cat, &reg).validate(&doc).unwrap();
        let keys: Vec<_> = v.failures().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "DiscoveryModel.DiscoveryItems[0].APISpecification.Name",
                "DiscoveryModel.DiscoveryItems[0].APISpecification.Version",
            ]
        );
        assert!(v.failures()[0]
            .error
            .starts_with("'Name' should be 'Account and Transaction API Specification' when schemaVersion is 'https://"));
    }

    #[test]
    fn unknown_schema_version() {
        let (cat, reg) = (catalogue(), registry());
        let mut doc = accounts_doc(mandatory_endpoints());
        doc["discoveryModel"]["discoveryItems"][0]["apiSpecification"]["schemaVersion"] =
            json!("https://example.com/unknown.json");
        let v = DiscoveryValidator::new(&cat, &reg).validate(&doc).unwrap();
        assert_eq!(
            v.failures(),
            &[ValidationFailure::new(
                "DiscoveryModel.DiscoveryItems[0].APISpecification.SchemaVersion",
                "'SchemaVersion' not supported by suite 'https://example.com/unknown.json'"
            )]
        );
    }

    #[test]
    fn undeclared_endpoint_is_invalid() {
        let (cat, reg) = (catalogue(), registry());
        let mut endpoints = mandatory_endpoints();
        endpoints
            .as_array_mut()
            .unwrap()
            .push(json!({"method": "PUT", "path": "/accounts"}));
        let v = DiscoveryValidator::new(&cat, &reg)
            .validate(&accounts_doc(endpoints))
            .unwrap();
        assert_eq!(
            v.failures(),
            &[ValidationFailure::new(
                "DiscoveryModel.DiscoveryItems[0].Endpoints[5]",
                "Invalid endpoint Method='PUT', Path='/accounts'"
            )]
        );
    }

    #[test]
    fn non_object_document_is_fatal() {
        let (cat, reg) = (catalogue(), registry());
        assert!(matches!(
            DiscoveryValidator::new(&cat, &reg).validate(&json!([1, 2])),
            Err(DiscoveryError::Malformed)
        ));
    }
}
