//! Configuration types and loading for the restructure pipeline.

mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config, load_config_from};
