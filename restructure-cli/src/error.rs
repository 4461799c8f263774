use restructure::RestructureError;
use restructure_config::LoadConfigError;
use restructure_config::shared::ValidationError;
use restructure_telemetry::InitTracingError;
use thiserror::Error;

/// Process exit code for configuration problems.
pub const EXIT_CONFIG: u8 = 1;

/// Process exit code for runtime failures.
pub const EXIT_RUNTIME: u8 = 2;

pub type CliResult<T> = Result<T, CliError>;

/// Top-level failure of the restructure binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be loaded.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] LoadConfigError),

    /// The configuration was loaded but is invalid.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] ValidationError),

    /// Tracing could not be initialized.
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] InitTracingError),

    /// The async runtime could not be built.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The pipeline failed while running.
    #[error("{0}")]
    Pipeline(#[from] RestructureError),
}

impl CliError {
    /// Maps the failure to the documented process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::ConfigLoad(_) | CliError::ConfigInvalid(_) | CliError::Tracing(_) => {
                EXIT_CONFIG
            }
            CliError::Runtime(_) => EXIT_RUNTIME,
            CliError::Pipeline(err) => match err.kind() {
                restructure::ErrorKind::InvalidConfiguration => EXIT_CONFIG,
                _ => EXIT_RUNTIME,
            },
        }
    }
}
