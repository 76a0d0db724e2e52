use super::{SchemaError, SwaggerDoc, SwaggerSource};
use async_trait::async_trait;
use moka::sync::Cache;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Loads swagger documents from `http(s)://`, `file://` or a bare path and
/// keeps them in a bounded LRU keyed by URL.
#[derive(Clone)]
pub struct SwaggerLoader {
    client: reqwest::Client,
    cache: Cache<String, Arc<SwaggerDoc>>,
}

impl SwaggerLoader {
    pub fn new(max_entries: u64, timeout: Duration) -> Result<Self, SchemaError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SchemaError::Unavailable {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            cache: Cache::new(max_entries),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, SchemaError> {
        let unavailable = |message: String| SchemaError::Unavailable {
            url: url.to_string(),
            message,
        };

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| unavailable(format!("request failed: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(unavailable(format!("HTTP {status}")));
            }
            return response
                .text()
                .await
                .map_err(|e| unavailable(format!("failed to read body: {e}")));
        }

        let path = match url.strip_prefix("file://") {
            Some(rest) => rest,
            None => url,
        };
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| unavailable(format!("failed to read {path}: {e}")))
    }
}

/// JSON first, YAML as fallback.
fn parse_document(url: &str, text: &str) -> Result<SwaggerDoc, SchemaError> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(json_err) => serde_yaml::from_str(text).map_err(|yaml_err| SchemaError::Unavailable {
            url: url.to_string(),
            message: format!("not JSON ({json_err}) or YAML ({yaml_err})"),
        })?,
    };
    SwaggerDoc::from_value(value).map_err(|message| SchemaError::Unavailable {
        url: url.to_string(),
        message,
    })
}

#[async_trait]
impl SwaggerSource for SwaggerLoader {
    async fn load(&self, url: &str) -> Result<Arc<SwaggerDoc>, SchemaError> {
        if let Some(doc) = self.cache.get(url) {
            debug!(url, "swagger cache hit");
            return Ok(doc);
        }

        let text = self.fetch(url).await?;
        let doc = Arc::new(parse_document(url, &text)?);
        info!(url, paths = doc.paths.len(), "loaded swagger document");
        self.cache.insert(url.to_string(), doc.clone());
        Ok(doc)
    }

    fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

/// In-memory source for tests and embedded documents.
#[derive(Default)]
pub struct MemorySwaggerSource {
    docs: Mutex<HashMap<String, Arc<SwaggerDoc>>>,
}

impl MemorySwaggerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, raw: Value) -> Result<Self, SchemaError> {
        let doc = SwaggerDoc::from_value(raw).map_err(|message| SchemaError::Unavailable {
            url: url.to_string(),
            message,
        })?;
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(url.to_string(), Arc::new(doc));
        }
        Ok(self)
    }
}

#[async_trait]
impl SwaggerSource for MemorySwaggerSource {
    async fn load(&self, url: &str) -> Result<Arc<SwaggerDoc>, SchemaError> {
        self.docs
            .lock()
            .ok()
            .and_then(|docs| docs.get(url).cloned())
            .ok_or_else(|| SchemaError::Unavailable {
                url: url.to_string(),
                message: "no such document".to_string(),
            })
    }

    fn invalidate(&self) {}
}
