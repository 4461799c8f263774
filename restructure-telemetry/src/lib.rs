//! Tracing bootstrap for restructure binaries.

mod tracing_init;

pub use tracing_init::{InitTracingError, init_tracing};
