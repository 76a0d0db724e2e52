//! Server settings from flags or `FCS_*` environment variables.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_VERSION_FEED: &str =
    "https://api.bitbucket.org/2.0/repositories/openbankingteam/conformance-suite/refs/tags";

#[derive(Parser, Debug, Clone)]
#[command(name = "fcs-server")]
#[command(version, about = "Functional conformance suite for Open-Banking APIs", long_about = None)]
pub struct ServerConfig {
    #[arg(long, env = "FCS_SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "FCS_SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Tracing filter directive, e.g. `info` or `fcs_core=debug`.
    /// `RUST_LOG` takes precedence when set.
    #[arg(long, env = "FCS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Add source file and line to every log record.
    #[arg(long, env = "FCS_LOG_TRACER")]
    pub log_tracer: bool,

    /// Log full request/response snapshots of test cases and API requests.
    #[arg(long, env = "FCS_LOG_HTTP_TRACE")]
    pub log_http_trace: bool,

    #[arg(long, env = "FCS_RUN_TIMEOUT_SECS", default_value_t = 300)]
    pub run_timeout_secs: u64,

    /// Per-request I/O timeout for test cases, token exchange and swagger downloads.
    #[arg(long, env = "FCS_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    #[arg(long, env = "FCS_VERSION_CHECK_URL", default_value = DEFAULT_VERSION_FEED)]
    pub version_check_url: String,

    #[arg(long, env = "FCS_SWAGGER_CACHE_SIZE", default_value_t = 16)]
    pub swagger_cache_size: u64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address '{addr}': {e}"))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
