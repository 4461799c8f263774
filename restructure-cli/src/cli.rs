use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use restructure_config::shared::{CompressionKind, FormatKind, RestructureConfig, StorageConfig};

/// Restructures a Kafka landing zone of Avro files into a record-partitioned
/// output tree, and cleans the landing zone of fully extracted files.
#[derive(Debug, Parser)]
#[command(name = "restructure", version)]
pub struct Cli {
    /// Input paths under the source storage root whose child directories are
    /// topics. Overrides `source.paths` from the configuration file.
    pub inputs: Vec<String>,

    /// Path to the configuration file.
    #[arg(short = 'F', long = "config", default_value = "restructure.yml")]
    pub config: PathBuf,

    /// Output directory, overriding the configured local target root.
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Keep running, repeating passes on the configured intervals.
    #[arg(long)]
    pub service: bool,

    /// Seconds between restructure passes in service mode.
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<u64>,

    /// Maximum number of open output writers per worker.
    #[arg(long)]
    pub cache_size: Option<usize>,

    /// Number of topics processed concurrently.
    #[arg(long)]
    pub num_threads: Option<usize>,

    /// Maximum number of files processed per topic per pass.
    #[arg(long)]
    pub max_files_per_topic: Option<usize>,

    /// Directory for staged output files.
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Output record format.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Output compression.
    #[arg(long, value_enum)]
    pub compression: Option<CompressionArg>,

    /// Deduplicate output files when publishing them.
    #[arg(long)]
    pub deduplicate: bool,

    /// Also run the cleaner.
    #[arg(long)]
    pub clean: bool,

    /// Skip the restructure passes, e.g. to run the cleaner alone.
    #[arg(long)]
    pub no_restructure: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompressionArg {
    None,
    Gzip,
    Zip,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut RestructureConfig) {
        if !self.inputs.is_empty() {
            config.source.paths = self.inputs.clone();
        }
        if let Some(output) = &self.output {
            config.target.storage = StorageConfig::Local {
                root: output.clone(),
            };
        }
        if self.service {
            config.service.enable = true;
        }
        if let Some(interval) = self.poll_interval {
            config.service.interval_secs = interval;
        }
        if let Some(cache_size) = self.cache_size {
            config.workers.cache_size = cache_size;
        }
        if let Some(num_threads) = self.num_threads {
            config.workers.num_workers = num_threads;
        }
        if let Some(max_files) = self.max_files_per_topic {
            config.workers.max_files_per_topic = max_files;
        }
        if let Some(tmp_dir) = &self.tmp_dir {
            config.workers.tmp_dir = tmp_dir.clone();
        }
        if let Some(format) = self.format {
            config.format.kind = match format {
                FormatArg::Csv => FormatKind::Csv,
                FormatArg::Json => FormatKind::Json,
            };
        }
        if let Some(compression) = self.compression {
            config.format.compression = match compression {
                CompressionArg::None => CompressionKind::None,
                CompressionArg::Gzip => CompressionKind::Gzip,
                CompressionArg::Zip => CompressionKind::Zip,
            };
        }
        if self.deduplicate {
            config.format.deduplicate.enable = true;
        }
        if self.clean {
            config.cleaner.enable = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use restructure_config::shared::{SourceConfig, TargetConfig};

    fn base_config() -> RestructureConfig {
        RestructureConfig {
            source: SourceConfig {
                storage: StorageConfig::Local {
                    root: "/landing".to_string(),
                },
                paths: vec![String::new()],
            },
            target: TargetConfig {
                storage: StorageConfig::Local {
                    root: "/output".to_string(),
                },
            },
            format: Default::default(),
            topics: Default::default(),
            workers: Default::default(),
            service: Default::default(),
            cleaner: Default::default(),
            coordination: None,
            path_factory: "observationKey".to_string(),
        }
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "restructure",
            "--service",
            "--poll-interval",
            "30",
            "--cache-size",
            "7",
            "--num-threads",
            "3",
            "--format",
            "json",
            "--compression",
            "zip",
            "--deduplicate",
            "--clean",
            "staging/topics",
        ]);

        let mut config = base_config();
        cli.apply_overrides(&mut config);

        assert!(config.service.enable);
        assert_eq!(config.service.interval_secs, 30);
        assert_eq!(config.workers.cache_size, 7);
        assert_eq!(config.workers.num_workers, 3);
        assert_eq!(config.format.kind, FormatKind::Json);
        assert_eq!(config.format.compression, CompressionKind::Zip);
        assert!(config.format.deduplicate.enable);
        assert!(config.cleaner.enable);
        assert_eq!(config.source.paths, vec!["staging/topics".to_string()]);
    }

    #[test]
    fn absent_flags_leave_config_untouched() {
        let cli = Cli::parse_from(["restructure"]);

        let mut config = base_config();
        cli.apply_overrides(&mut config);

        assert!(!config.service.enable);
        assert_eq!(config.format.kind, FormatKind::Csv);
        assert_eq!(config.source.paths, vec![String::new()]);
    }
}
