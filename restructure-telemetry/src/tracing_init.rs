use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;

/// Error raised when the global tracing subscriber cannot be installed.
pub type InitTracingError = SetGlobalDefaultError;

/// Default filter directive when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "info";

/// Initializes the global tracing subscriber for a restructure binary.
///
/// The filter is taken from `RUST_LOG` when set, defaulting to `info`. Output
/// goes to stderr so that any structured output on stdout stays clean.
pub fn init_tracing(service_name: &str) -> Result<(), InitTracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    tracing::info!(service = service_name, "tracing initialized");

    Ok(())
}
