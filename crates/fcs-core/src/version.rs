//! Release check against an upstream tag feed.
//!
//! The feed is a JSON array of tags, or a paged object carrying that array
//! under `values`. Tags are strings or objects with a `name` field
//! (`v1.4.0`, `1.5.0-rc1`, ...); anything that is not a plain
//! `major.minor.patch` version is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub message: String,
    pub update: bool,
}

type Semver = (u64, u64, u64);

fn parse_semver(tag: &str) -> Option<Semver> {
    let mut parts = tag.trim().trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((major, minor, patch))
}

#[derive(Debug, Clone)]
pub struct VersionChecker {
    client: reqwest::Client,
    feed_url: String,
    current: String,
}

impl VersionChecker {
    pub fn new(current: &str, feed_url: &str, timeout: Duration) -> Result<Self, VersionError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| VersionError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            feed_url: feed_url.to_string(),
            current: current.to_string(),
        })
    }

    pub async fn check(&self) -> Result<VersionInfo, VersionError> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .map_err(|e| VersionError::UpstreamUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VersionError::UpstreamUnavailable(format!("HTTP {}", response.status())));
        }
        let feed: Value = response.json().await.map_err(|e| VersionError::UpstreamUnavailable(e.to_string()))?;
        let latest = latest_tag(&feed)
            .ok_or_else(|| VersionError::UpstreamUnavailable("feed contains no release tags".to_string()))?;
        debug!(latest = ?latest, current = %self.current, "version feed read");
        Ok(compare(&self.current, latest))
    }
}

fn latest_tag(feed: &Value) -> Option<Semver> {
    feed.as_array()
        .or_else(|| feed.get("values").and_then(Value::as_array))?
        .iter()
        .filter_map(|t| t.as_str().or_else(|| t.get("name").and_then(Value::as_str)))
        .filter_map(parse_semver)
        .max()
}

fn compare(current: &str, latest: Semver) -> VersionInfo {
    let (major, minor, patch) = latest;
    let latest_str = format!("v{major}.{minor}.{patch}");
    let update = parse_semver(current).map_or(true, |c| c < latest);
    let message = if update {
        format!("Version {latest_str} of the conformance suite is available, please update.")
    } else {
        "Conformance suite is running the latest version.".to_string()
    };
    VersionInfo {
        version: format!("v{}", current.trim_start_matches('v')),
        message,
        update,
    }
}
