//! Process-wide `tracing` subscriber.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `log.level`. `log.format = "text"`
/// selects compact human-readable lines; anything else emits JSON.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(true)
        .with_file(config.add_source())
        .with_line_number(config.add_source());

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.format().eq_ignore_ascii_case("text") {
        registry.with(layer.compact()).try_init()
    } else {
        registry.with(layer.json().flatten_event(true)).try_init()
    };
    installed.is_ok()
}
