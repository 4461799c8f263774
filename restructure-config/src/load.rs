use std::{
    io,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "restructure.yml";

/// Environment variable for specifying an absolute path to the configuration file.
const CONFIG_FILE_ENV_VAR: &str = "RESTRUCTURE_CONFIG";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "RESTRUCTURE";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Separator for list elements in environment variables.
const LIST_SEPARATOR: &str = ",";

/// Trait implemented by configuration structures that require list parsing help.
pub trait Config {
    /// Keys whose values should be parsed as lists when loading the configuration.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory")]
    CurrentDir(#[source] io::Error),

    /// Could not locate the configuration file.
    #[error("configuration file `{0}` does not exist")]
    ConfigurationFileMissing(PathBuf),

    /// Environment variable overrides failed to merge into the configuration.
    #[error("failed to load configuration from environment variables")]
    EnvironmentVariables(#[source] config::ConfigError),

    /// The configuration file was parsed but deserialization failed.
    #[error("failed to deserialize configuration")]
    Deserialization(#[source] config::ConfigError),

    /// Failed to initialize the configuration builder.
    #[error("failed to initialize configuration builder")]
    Builder(#[source] config::ConfigError),
}

/// Loads configuration from the default file location and environment overrides.
///
/// The configuration file is determined by:
/// - First checking the `RESTRUCTURE_CONFIG` environment variable for an absolute path
/// - If not set, using `<current_dir>/restructure.yml`
///
/// Environment variables prefixed with `RESTRUCTURE_` override file values.
/// Nested keys use double underscores (`RESTRUCTURE_SERVICE__INTERVAL_SECS`),
/// and list values are comma-separated.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let configuration_file = if let Ok(config_file) = std::env::var(CONFIG_FILE_ENV_VAR) {
        PathBuf::from(config_file)
    } else {
        let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
        base_path.join(DEFAULT_CONFIG_FILE)
    };

    load_config_from(&configuration_file)
}

/// Loads configuration from an explicit file path plus environment overrides.
pub fn load_config_from<T>(path: &Path) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !path.is_file() {
        return Err(LoadConfigError::ConfigurationFileMissing(
            path.to_path_buf(),
        ));
    }

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let file_source = config::File::from(path.to_path_buf());

    let builder = config::Config::builder()
        .add_source(file_source)
        .add_source(environment_source);

    let settings = builder.build().map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}
