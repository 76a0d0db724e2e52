use crate::config::ServerConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` when set and valid, else the configured level, else `info`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(config.log_tracer)
                .with_line_number(config.log_tracer),
        )
        .try_init()?;
    Ok(())
}
