use std::sync::Arc;
use std::time::Duration;

use restructure::RestructurePipeline;
use restructure::storage::Storage;
use restructure_config::shared::RestructureConfig;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::cli::Cli;
use crate::error::CliResult;

/// Builds the pipeline and runs it either once or as a service.
pub async fn run(config: RestructureConfig, cli: &Cli) -> CliResult<()> {
    let source = Storage::from_config(&config.source.storage)?;
    let target = Storage::from_config(&config.target.storage)?;

    let run_restructure = !cli.no_restructure;
    let run_cleaner = config.cleaner.enable;
    let service = config.service.enable;

    let pipeline = Arc::new(RestructurePipeline::new(config.clone(), source, target).await?);

    if service {
        run_service(pipeline.clone(), &config, run_restructure, run_cleaner).await?;
    } else {
        if run_restructure {
            pipeline.run_restructure_pass().await?;
        }
        if run_cleaner {
            pipeline.run_cleaner_pass().await?;
        }
    }

    match Arc::into_inner(pipeline) {
        Some(pipeline) => pipeline.close().await?,
        None => error!("pipeline still referenced at shutdown"),
    }

    Ok(())
}

/// Repeats restructure and cleaner passes on their intervals until ctrl-c.
async fn run_service(
    pipeline: Arc<RestructurePipeline<Storage, Storage>>,
    config: &RestructureConfig,
    run_restructure: bool,
    run_cleaner: bool,
) -> CliResult<()> {
    info!(
        interval_secs = config.service.interval_secs,
        cleaner = run_cleaner,
        "running as a service"
    );

    let mut restructure_tick =
        tokio::time::interval(Duration::from_secs(config.service.interval_secs.max(1)));
    restructure_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cleaner_tick =
        tokio::time::interval(Duration::from_secs(config.cleaner.interval_secs.max(1)));
    cleaner_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Flip the shutdown signal as soon as ctrl-c arrives, even mid-pass, so
    // workers stop between files instead of finishing the whole batch.
    let signal_pipeline = pipeline.clone();
    let mut ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_pipeline.shutdown();
        }
    });

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                break;
            }
            _ = restructure_tick.tick(), if run_restructure => {
                if let Err(err) = pipeline.run_restructure_pass().await {
                    if err.is_retryable() {
                        error!(error = %err, "restructure pass failed, retrying next interval");
                    } else {
                        return Err(err.into());
                    }
                }
            }
            _ = cleaner_tick.tick(), if run_cleaner => {
                if let Err(err) = pipeline.run_cleaner_pass().await {
                    if err.is_retryable() {
                        error!(error = %err, "cleaner pass failed, retrying next interval");
                    } else {
                        return Err(err.into());
                    }
                }
            }
        }
    }

    Ok(())
}
