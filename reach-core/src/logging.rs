use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::{ReachError, Result};

/// Initializes the default tracing subscriber used across the binaries.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice returns an error
/// instead of panicking.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let default_level = level.unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .try_init()
        .map_err(|err| ReachError::General(err.to_string()))?;

    Ok(())
}
