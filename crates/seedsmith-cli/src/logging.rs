//! Tracing subscriber setup

use crate::config::Verbosity;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the stderr subscriber. `RUST_LOG` overrides the filter derived
/// from `-v`/`-q`. A second call is a no-op.
pub fn init_tracing(verbosity: Verbosity, color: bool) {
    let filter = verbosity.log_filter();
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color)
                .without_time()
                .compact(),
        )
        .try_init();
}
