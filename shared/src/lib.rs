pub mod config;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise everything logs at `info` and the
/// calling crate at `debug`.
pub fn init_tracing(crate_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{crate_name}=debug")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!(e))
}

/// Initialize tracing using the calling crate's name for the default filter.
#[macro_export]
macro_rules! init_tracing {
    () => {
        $crate::init_tracing(env!("CARGO_CRATE_NAME"))
    };
}
