use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

#[cfg(feature = "diagnostics")]
pub fn default_log_level() -> &'static str {
    "trace"
}

#[cfg(not(feature = "diagnostics"))]
pub fn default_log_level() -> &'static str {
    "warn"
}

/// Single initialization function for diagnostic logging.
///
/// `RUST_LOG` takes precedence over the built-in default level. Safe to call
/// more than once; only the first call installs a subscriber.
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level()));
        let installed = tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_env_filter(env_filter)
                .finish(),
        );
        match installed {
            Ok(()) => tracing::trace!("Logging initialized"),
            Err(e) => eprintln!("logging already initialized: {e}"),
        }
    });
}
