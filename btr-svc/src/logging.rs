//! Tracing subscriber setup
//!
//! The subscriber is installed before configuration is loaded, filtering at
//! RUST_LOG or `info`. Once the config is known its `logging.level` replaces
//! the filter, unless RUST_LOG was set.

use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Level used until the configured one is applied
pub const DEFAULT_LEVEL: &str = "info";

/// Handle for swapping the active filter after startup
pub struct LogFilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilterHandle {
    /// Whether RUST_LOG supplied the filter
    pub fn from_env(&self) -> bool {
        self.from_env
    }

    /// Apply the configured level; RUST_LOG keeps precedence
    ///
    /// Returns `Ok(false)` when the filter was left unchanged.
    pub fn apply_configured_level(&self, level: &str) -> btr_common::Result<bool> {
        if self.from_env {
            return Ok(false);
        }
        let filter = EnvFilter::try_new(level).map_err(|e| {
            btr_common::Error::Config(format!("Invalid logging.level '{}': {}", level, e))
        })?;
        self.handle
            .reload(filter)
            .map_err(|e| btr_common::Error::Internal(format!("Log filter reload failed: {}", e)))?;
        Ok(true)
    }
}

/// Build the fmt subscriber writing to `writer`
///
/// `rust_log` is the RUST_LOG directive, if any.
pub fn subscriber<W>(
    rust_log: Option<&str>,
    writer: W,
) -> (impl Subscriber + Send + Sync, LogFilterHandle)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = rust_log.and_then(|directives| EnvFilter::try_new(directives).ok());
    let from_env = env_filter.is_some();
    let (filter, handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL)));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer));

    (subscriber, LogFilterHandle { handle, from_env })
}

/// Install the global subscriber on stdout
pub fn init() -> anyhow::Result<LogFilterHandle> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let (subscriber, handle) = subscriber(rust_log.as_deref(), std::io::stdout);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(handle)
}
