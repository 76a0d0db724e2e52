//! Detached request signing (`x-jws-signature`).
//!
//! Produces a JWS with an unencoded payload (`b64=false`) and the
//! Open-Banking `iat`/`iss`/`tan` critical header claims. The payload is
//! omitted from the output: `<header>..<signature>`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use serde_json::json;
use std::sync::Arc;

pub const SIGNATURE_HEADER: &str = "x-jws-signature";

const OB_TRUST_ANCHOR: &str = "openbanking.org.uk";
const CLAIM_IAT: &str = "http://openbanking.org.uk/iat";
const CLAIM_ISS: &str = "http://openbanking.org.uk/iss";
const CLAIM_TAN: &str = "http://openbanking.org.uk/tan";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("signing failed: {0}")]
    Crypto(String),

    #[error("signing misconfigured: {0}")]
    Config(String),
}

pub trait RequestSigner: Send + Sync {
    /// Detached signature over `body`.
    fn sign(&self, body: &[u8]) -> Result<String, SigningError>;
}

pub struct DetachedJwsSigner {
    key: Arc<EncodingKey>,
    algorithm: Algorithm,
    kid: String,
    issuer: String,
    trust_anchor: String,
}

impl DetachedJwsSigner {
    /// `non_ob_directory` switches the trust anchor from the Open-Banking
    /// directory to the configured `trust_anchor`.
    pub fn new(
        key: Arc<EncodingKey>,
        algorithm: Algorithm,
        kid: &str,
        issuer: &str,
        non_ob_directory: bool,
        trust_anchor: &str,
    ) -> Result<Self, SigningError> {
        let trust_anchor = if non_ob_directory {
            if trust_anchor.is_empty() {
                return Err(SigningError::Config(
                    "trust_anchor is required outside the Open-Banking directory".to_string(),
                ));
            }
            trust_anchor.to_string()
        } else {
            OB_TRUST_ANCHOR.to_string()
        };
        Ok(Self {
            key,
            algorithm,
            kid: kid.to_string(),
            issuer: issuer.to_string(),
            trust_anchor,
        })
    }

    fn protected_header(&self, iat: i64) -> serde_json::Value {
        json!({
            "alg": format!("{:?}", self.algorithm),
            "kid": self.kid,
            "typ": "JOSE",
            "cty": "application/json",
            "b64": false,
            CLAIM_IAT: iat,
            CLAIM_ISS: self.issuer,
            CLAIM_TAN: self.trust_anchor,
            "crit": ["b64", CLAIM_IAT, CLAIM_ISS, CLAIM_TAN],
        })
    }

    pub(crate) fn sign_at(&self, body: &[u8], iat: i64) -> Result<String, SigningError> {
        let header = serde_json::to_vec(&self.protected_header(iat))
            .map_err(|e| SigningError::Crypto(e.to_string()))?;
        let encoded_header = URL_SAFE_NO_PAD.encode(header);

        let mut signing_input = Vec::with_capacity(encoded_header.len() + 1 + body.len());
        signing_input.extend_from_slice(encoded_header.as_bytes());
        signing_input.push(b'.');
        signing_input.extend_from_slice(body);

        let signature = jsonwebtoken::crypto::sign(&signing_input, &self.key, self.algorithm)
            .map_err(|e| SigningError::Crypto(e.to_string()))?;
        Ok(format!("{encoded_header}..{signature}"))
    }
}

impl RequestSigner for DetachedJwsSigner {
    fn sign(&self, body: &[u8]) -> Result<String, SigningError> {
        self.sign_at(body, chrono::Utc::now().timestamp())
    }
}
