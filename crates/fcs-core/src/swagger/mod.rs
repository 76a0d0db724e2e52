//! Parsed OpenAPI / Swagger documents.
//!
//! Only the parts the generator and runner consume are modelled: paths,
//! per-verb operations with their summary and responses. The raw document
//! is kept so response schemas can resolve `$ref`s into `definitions` or
//! `components`.

mod loader;

pub use loader::{MemorySwaggerSource, SwaggerLoader};

use crate::paths::matches_template;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Transport or parse failure for the document at `url`.
    #[error("schema unavailable: {url}: {message}")]
    Unavailable { url: String, message: String },
}

/// HTTP verbs in their fixed alphabetic iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Delete,
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Options,
        HttpMethod::Patch,
        HttpMethod::Post,
        HttpMethod::Put,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    fn swagger_key(self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operation {
    pub summary: String,
    /// Keyed by status code string (`"200"`, `"default"`, ...).
    pub responses: BTreeMap<String, Value>,
}

impl Operation {
    /// The numerically smallest 2xx response code.
    pub fn success_status(&self) -> Option<u16> {
        self.responses
            .keys()
            .filter_map(|k| k.parse::<u16>().ok())
            .filter(|c| (200..=299).contains(c))
            .min()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathItem {
    operations: BTreeMap<HttpMethod, Operation>,
}

impl PathItem {
    pub fn get(&self, method: HttpMethod) -> Option<&Operation> {
        self.operations.get(&method)
    }

    /// Present operations, DELETE first and PUT last.
    pub fn operations(&self) -> impl Iterator<Item = (HttpMethod, &Operation)> {
        self.operations.iter().map(|(m, op)| (*m, op))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwaggerDoc {
    raw: Value,
    pub paths: BTreeMap<String, PathItem>,
}

impl SwaggerDoc {
    pub fn from_value(raw: Value) -> Result<Self, String> {
        let Some(paths_obj) = raw.get("paths").and_then(Value::as_object) else {
            return Err("document has no 'paths' object".to_string());
        };

        let mut paths = BTreeMap::new();
        for (path, item) in paths_obj {
            let mut operations = BTreeMap::new();
            for method in HttpMethod::ALL {
                let Some(op) = item.get(method.swagger_key()) else {
                    continue;
                };
                let responses = op
                    .get("responses")
                    .and_then(Value::as_object)
                    .map(|r| r.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                operations.insert(
                    method,
                    Operation {
                        summary: op
                            .get("summary")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        responses,
                    },
                );
            }
            paths.insert(path.clone(), PathItem { operations });
        }
        Ok(Self { raw, paths })
    }

    pub fn path(&self, template: &str) -> Option<&PathItem> {
        self.paths.get(template)
    }

    /// Operation whose template matches a concrete request path.
    pub fn find_operation(&self, method: HttpMethod, concrete: &str) -> Option<(&str, &Operation)> {
        if let Some((template, item)) = self.paths.get_key_value(concrete) {
            if let Some(op) = item.get(method) {
                return Some((template.as_str(), op));
            }
        }
        self.paths
            .iter()
            .filter(|(template, _)| matches_template(template, concrete))
            .find_map(|(template, item)| item.get(method).map(|op| (template.as_str(), op)))
    }

    /// Response body schema for `status`, wrapped so `#/definitions/...`
    /// and `#/components/...` references resolve against this document.
    pub fn response_schema(&self, op: &Operation, status: u16) -> Option<Value> {
        let mut response = op.responses.get(&status.to_string())?;
        if let Some(reference) = response.get("$ref").and_then(Value::as_str) {
            response = self.raw.pointer(reference.strip_prefix('#')?)?;
        }

        let schema = response.get("schema").cloned().or_else(|| {
            let content = response.get("content")?.as_object()?;
            content
                .get("application/json")
                .or_else(|| content.values().next())
                .and_then(|media| media.get("schema"))
                .cloned()
        })?;

        let mut wrapped = json!({ "allOf": [schema] });
        for key in ["definitions", "components"] {
            if let Some(v) = self.raw.get(key) {
                wrapped[key] = v.clone();
            }
        }
        Some(wrapped)
    }
}

/// Source of parsed swagger documents, keyed by schema URL.
#[async_trait]
pub trait SwaggerSource: Send + Sync {
    async fn load(&self, url: &str) -> Result<Arc<SwaggerDoc>, SchemaError>;

    /// Drop cached documents.
    fn invalidate(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> SwaggerDoc {
        SwaggerDoc::from_value(json!({
            "swagger": "2.0",
            "paths": {
                "/accounts/{AccountId}": {
                    "get": {"summary": "Get Account", "responses": {
                        "default": {}, "400": {}, "204": {}, "200": {"$ref": "#/responses/200Account"}
                    }}
                },
                "/account-access-consents": {
                    "post": {"summary": "Create", "responses": {"201": {"schema": {"type": "object"}}}},
                    "put": {"responses": {"400": {}}},
                    "delete": {"responses": {"204": {}}}
                }
            },
            "responses": {
                "200Account": {"schema": {"$ref": "#/definitions/Account"}}
            },
            "definitions": {"Account": {"type": "object", "required": ["Data"]}}
        }))
        .unwrap()
    }

    #[test]
    fn success_status_is_smallest_2xx() {
        let d = doc();
        let op = d.path("/accounts/{AccountId}").unwrap().get(HttpMethod::Get).unwrap();
        assert_eq!(op.success_status(), Some(200));
        assert_eq!(op.summary, "Get Account");

        let consents = d.path("/account-access-consents").unwrap();
        assert_eq!(consents.get(HttpMethod::Put).unwrap().success_status(), None);
    }

    #[test]
    fn operations_iterate_alphabetically() {
        let d = doc();
        let verbs: Vec<_> = d
            .path("/account-access-consents")
            .unwrap()
            .operations()
            .map(|(m, _)| m.as_str())
            .collect();
        assert_eq!(verbs, vec!["DELETE", "POST", "PUT"]);
    }

    #[test]
    fn response_schema_resolves_shared_responses() {
        let d = doc();
        let (template, op) = d.find_operation(HttpMethod::Get, "/accounts/100").unwrap();
        assert_eq!(template, "/accounts/{AccountId}");
        let schema = d.response_schema(op, 200).unwrap();
        assert_eq!(schema["allOf"][0]["$ref"], "#/definitions/Account");
        assert_eq!(schema["definitions"]["Account"]["required"][0], "Data");
        assert!(d.response_schema(op, 204).is_none());
    }

    #[test]
    fn parse_verbs() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("FETCH"), None);
        assert!(HttpMethod::Delete < HttpMethod::Put);
    }

    #[test]
    fn missing_paths_is_rejected() {
        assert!(SwaggerDoc::from_value(json!({"swagger": "2.0"})).is_err());
    }
}
