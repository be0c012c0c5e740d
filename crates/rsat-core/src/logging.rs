//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise `verbose` selects `debug` over `info`
//! for the harness crates. Installing twice is harmless, so test binaries
//! and the CLI can both call [`init_logging`].

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines on stderr
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Default filter directive for a verbosity level
#[must_use]
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,rsat_core=debug,rsat_fixtures=debug,rsat_scenario=debug"
    } else {
        "warn,rsat_core=info,rsat_fixtures=info,rsat_scenario=info"
    }
}

/// Install the global subscriber
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(verbose: bool, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.is_ok()
}
