//! Restructure service binary.
//!
//! Loads configuration, applies command-line overrides, initializes tracing,
//! starts the async runtime and runs the pipeline. Exit codes: 0 on success,
//! 1 for configuration errors, 2 for runtime failures.

use std::process::ExitCode;

use clap::Parser;
use restructure_config::shared::RestructureConfig;
use tracing::error;

mod cli;
mod core;
mod error;

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Tracing may not be initialized yet for configuration errors.
            eprintln!("restructure: {err}");
            error!(error = %err, "exiting with failure");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let mut config: RestructureConfig = restructure_config::load_config_from(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    restructure_telemetry::init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?
        .block_on(core::run(config, &cli))
}
