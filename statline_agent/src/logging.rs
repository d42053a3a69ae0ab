//! Subscriber setup. `RUST_LOG` wins when set; otherwise the agent logs at
//! info.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVE: &str = "statline_agent=info";

/// Filter from a `RUST_LOG` value, falling back to [`DEFAULT_DIRECTIVE`]
/// when it is unset, empty or unparseable.
pub fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

pub fn init() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref()))
        .init();
}
