use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted for the log filter, e.g. `RELEVE_LOG=debug`.
pub const LOG_ENV_VAR: &str = "RELEVE_LOG";

/// Install the global tracing subscriber.
///
/// Filter defaults to `info` when `RELEVE_LOG` is unset. Safe to call more
/// than once; later calls are ignored so tests can share a process.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
