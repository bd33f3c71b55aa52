//! Logging setup built on `tracing`.
//!
//! The filter comes from the `DANDORI_LOG` environment variable (same
//! syntax as `RUST_LOG`, e.g. `debug` or `dandori=trace`) and defaults to
//! `info`. Log lines are routed through `tracing-indicatif` so progress
//! bars and text output don't trample each other.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tracing_indicatif::IndicatifLayer;

/// Environment variable selecting the log filter.
pub const LOG_ENV: &str = "DANDORI_LOG";

/// Initializes the global subscriber. Safe to call once at startup;
/// a second call would panic, so nothing else should install one.
pub fn init() {
    let indicatif_layer = IndicatifLayer::new();

    let filter = EnvFilter::try_from_env(LOG_ENV) //
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .init();
}
