//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events. Embedders that have no
//! subscriber of their own can install the default one here.

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::config::SimulatorConfig;

/// Install a fmt subscriber filtering with `filter`
///
/// `RUST_LOG` overrides `filter` when set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
///
/// ```
/// lorawan_sim::logging::init_logging("info,lorawan_sim::gateway=debug");
/// ```
pub fn init_logging(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .try_init()
        .is_ok()
}

/// Install the subscriber with the filter from `config`
pub fn init_from_config(config: &SimulatorConfig) -> bool {
    init_logging(&config.log_filter)
}
