//! Subscriber setup for binaries and hosts embedding the submitter.

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Installs a global subscriber logging to stderr at `level`, unless
/// `RUST_LOG` says otherwise. Fails if a subscriber is already installed.
pub fn init(level: Level) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
}
