//! Outbound HTTP for test cases.
//!
//! The runner talks to a [`Transport`]; the default one is a rustls
//! `reqwest` client presenting the transport certificate for mTLS.

use crate::config::Certificates;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CapturedResponse {
    /// Body as JSON; `None` for empty or non-JSON bodies.
    pub fn json(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("request timed out")]
    TimedOut,

    #[error("transport error: {0}")]
    Network(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<CapturedResponse, TransportError>;
}

/// Builds the run's transport once certificates are known.
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        certificates: Option<&Certificates>,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestTransportFactory;

impl TransportFactory for ReqwestTransportFactory {
    fn build(
        &self,
        certificates: Option<&Certificates>,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let identity = certificates.map(|c| c.transport_pem.as_slice());
        Ok(Arc::new(ReqwestTransport::new(timeout, identity)?))
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, identity_pem: Option<&[u8]>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(crate::USER_AGENT);
        if let Some(pem) = identity_pem {
            let identity =
                reqwest::Identity::from_pem(pem).map_err(|e| TransportError::Tls(e.to_string()))?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Tls(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::TimedOut;
    }
    let mut chain = String::new();
    let mut source = err.source();
    while let Some(s) = source {
        chain.push_str(&s.to_string().to_ascii_lowercase());
        chain.push(' ');
        source = s.source();
    }
    if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
        TransportError::Tls(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<CapturedResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("bad method '{}'", request.method)))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await.map_err(classify)?;
        debug!(status, url = %request.url, "response received");

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: String) -> PreparedRequest {
        PreparedRequest {
            method: "GET".into(),
            url,
            headers: [("x-fapi-financial-id".to_string(), "0015800001041RHAAY".to_string())].into(),
            body: None,
        }
    }

    #[tokio::test]
    async fn captures_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts"))
            .and(header("x-fapi-financial-id", "0015800001041RHAAY"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-fapi-interaction-id", "abc")
                    .set_body_json(serde_json::json!({"Data": {"Account": []}})),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5), None).unwrap();
        let response = transport
            .send(&request(format!("{}/accounts", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.headers["x-fapi-interaction-id"], "abc");
        assert!(response.json().unwrap()["Data"]["Account"].is_array());
    }

    #[tokio::test]
    async fn slow_target_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(Duration::from_millis(100), None).unwrap();
        let err = transport.send(&request(server.uri())).await.unwrap_err();
        assert_eq!(err, TransportError::TimedOut);
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2), None).unwrap();
        let err = transport
            .send(&request("http://127.0.0.1:9/".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
