//! Journey configuration posted by the operator.
//!
//! Only the four PEM strings are required; everything else seeds run
//! context variables when present.

use crate::context::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid certificate '{field}': {reason}")]
    InvalidCertificate { field: &'static str, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditorAccount {
    #[serde(default)]
    pub scheme_name: String,
    #[serde(default)]
    pub identification: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructedAmount {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub currency: String,
}

fn default_algorithm() -> String {
    "PS256".to_string()
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyConfig {
    pub signing_private: String,
    pub signing_public: String,
    pub transport_private: String,
    pub transport_public: String,

    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default)]
    pub authorization_endpoint: String,
    #[serde(default)]
    pub x_fapi_financial_id: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub signing_kid: String,
    #[serde(default = "default_algorithm")]
    pub signing_algorithm: String,
    #[serde(default)]
    pub non_ob_directory: bool,
    #[serde(default)]
    pub trust_anchor: String,
    #[serde(default)]
    pub transaction_from_date: String,
    #[serde(default)]
    pub transaction_to_date: String,
    #[serde(default)]
    pub creditor_account: CreditorAccount,
    #[serde(default)]
    pub instructed_amount: InstructedAmount,
    /// Merged over each discovery item's resource-ID table.
    #[serde(default)]
    pub resource_ids: BTreeMap<String, String>,
}

impl std::fmt::Debug for JourneyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyConfig")
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.token_endpoint)
            .field("x_fapi_financial_id", &self.x_fapi_financial_id)
            .field("signing_kid", &self.signing_kid)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("non_ob_directory", &self.non_ob_directory)
            .finish_non_exhaustive()
    }
}

/// Parsed certificate material.
#[derive(Clone)]
pub struct Certificates {
    pub signing_key: Arc<EncodingKey>,
    pub algorithm: Algorithm,
    /// Transport certificate followed by its private key, for mTLS.
    pub transport_pem: Vec<u8>,
}

impl std::fmt::Debug for Certificates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificates")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Certificates {
    pub fn parse(
        signing_private: &str,
        signing_public: &str,
        transport_private: &str,
        transport_public: &str,
        algorithm: Algorithm,
    ) -> Result<Self, ConfigError> {
        let signing_key = EncodingKey::from_rsa_pem(signing_private.as_bytes()).map_err(|e| {
            ConfigError::InvalidCertificate {
                field: "signing_private",
                reason: e.to_string(),
            }
        })?;
        check_public(signing_public, "signing_public")?;
        check_public(transport_public, "transport_public")?;
        if !transport_private.contains("PRIVATE KEY-----") {
            return Err(ConfigError::InvalidCertificate {
                field: "transport_private",
                reason: "not a PEM private key".to_string(),
            });
        }

        let mut transport_pem = Vec::with_capacity(transport_public.len() + transport_private.len() + 1);
        transport_pem.extend_from_slice(transport_public.trim_end().as_bytes());
        transport_pem.push(b'\n');
        transport_pem.extend_from_slice(transport_private.as_bytes());
        reqwest::Identity::from_pem(&transport_pem).map_err(|e| ConfigError::InvalidCertificate {
            field: "transport_private",
            reason: format!("transport pair rejected: {e}"),
        })?;

        Ok(Self {
            signing_key: Arc::new(signing_key),
            algorithm,
            transport_pem,
        })
    }
}

/// Accept a PEM certificate (body must be base64) or an RSA public key.
fn check_public(pem: &str, field: &'static str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCertificate { field, reason };

    if pem.contains("PUBLIC KEY-----") {
        return DecodingKey::from_rsa_pem(pem.as_bytes())
            .map(|_| ())
            .map_err(|e| invalid(e.to_string()));
    }
    if !pem.contains("-----BEGIN CERTIFICATE-----") {
        return Err(invalid("not a PEM certificate or public key".to_string()));
    }
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("-----"))
        .collect();
    match STANDARD.decode(body.as_bytes()) {
        Ok(der) if !der.is_empty() => Ok(()),
        Ok(_) => Err(invalid("empty certificate body".to_string())),
        Err(e) => Err(invalid(format!("certificate body is not base64: {e}"))),
    }
}

impl JourneyConfig {
    /// Check the whole document, returning parsed certificate material.
    pub fn validate(&self) -> Result<Certificates, ConfigError> {
        let algorithm = Algorithm::from_str(&self.signing_algorithm).map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "unsupported signing_algorithm '{}'",
                self.signing_algorithm
            ))
        })?;
        if !matches!(
            algorithm,
            Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 | Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            return Err(ConfigError::InvalidConfig(format!(
                "signing_algorithm '{}' is not an RSA algorithm",
                self.signing_algorithm
            )));
        }

        for (name, value) in [
            ("token_endpoint", &self.token_endpoint),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("redirect_url", &self.redirect_url),
        ] {
            if !value.is_empty() && url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidConfig(format!("{name} is not a URL")));
            }
        }
        for (name, value) in [
            ("transaction_from_date", &self.transaction_from_date),
            ("transaction_to_date", &self.transaction_to_date),
        ] {
            if !value.is_empty() && chrono::DateTime::parse_from_rfc3339(value).is_err() {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be an RFC 3339 timestamp"
                )));
            }
        }

        Certificates::parse(
            &self.signing_private,
            &self.signing_public,
            &self.transport_private,
            &self.transport_public,
            algorithm,
        )
    }

    /// Context variables derived from this configuration; empty values are
    /// left unset so templates referencing them fail to resolve.
    pub fn seed_context(&self, ctx: &mut Context) {
        let mut put = |key: &str, value: &str| {
            if !value.is_empty() {
                ctx.put(key, value);
            }
        };
        put("client_id", &self.client_id);
        put("client_secret", &self.client_secret);
        put("token_endpoint", &self.token_endpoint);
        put("authorization_endpoint", &self.authorization_endpoint);
        put("fapi_financial_id", &self.x_fapi_financial_id);
        put("issuer", &self.issuer);
        put("redirect_url", &self.redirect_url);
        put("signing_kid", &self.signing_kid);
        put("transaction_from_date", &self.transaction_from_date);
        put("transaction_to_date", &self.transaction_to_date);
        put("creditor_scheme_name", &self.creditor_account.scheme_name);
        put("creditor_identification", &self.creditor_account.identification);
        put("creditor_name", &self.creditor_account.name);
        put("instructed_amount_value", &self.instructed_amount.value);
        put("instructed_amount_currency", &self.instructed_amount.currency);
        if !self.client_id.is_empty() {
            let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
            put("basic_authentication", &basic);
        }
        for (k, v) in &self.resource_ids {
            put(k, v);
        }
    }
}
