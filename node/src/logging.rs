//! Log output setup.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install a compact stdout subscriber. `RUST_LOG` overrides `level` when
/// set. Returns `false` if a global subscriber was already installed.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stdout = tracing_subscriber::fmt::layer().compact().with_filter(filter);
    if tracing_subscriber::registry().with(stdout).try_init().is_err() {
        return false;
    }
    info!(level, "logging started");
    true
}
