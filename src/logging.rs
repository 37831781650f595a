use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "snapline=info";

/// Install the global fmt subscriber, filtered by `RUST_LOG` or `snapline=info`
pub fn init() -> Result<()> {
    init_with_filter(DEFAULT_FILTER)
}

/// Like [`init`] with a different fallback filter. Fails if a global
/// subscriber is already installed.
pub fn init_with_filter(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
