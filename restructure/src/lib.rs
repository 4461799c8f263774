//! Restructures a Kafka landing zone of Avro container files into a
//! record-partitioned output tree, and cleans the landing zone of files whose
//! records have all been persisted.
//!
//! The crate is organized around a small number of cooperating pieces:
//!
//! - [`accounting`] tracks which source offset ranges have been persisted and
//!   keeps that state durable on the target storage.
//! - [`output`] maintains a bounded cache of open output writers, staging
//!   records locally and publishing files atomically.
//! - [`pipeline`] discovers topics, takes per-topic locks, and drives workers
//!   over batches of source files.
//! - [`cleaner`] re-reads fully accounted source files, verifies every record
//!   reached its target, and deletes the source.

pub mod accounting;
pub mod cleaner;
pub mod compression;
pub mod concurrency;
pub mod error;
pub mod format;
pub mod lock;
mod macros;
pub mod output;
pub mod paths;
pub mod pipeline;
pub mod source;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;

pub use error::{ErrorKind, RestructureError, RestructureResult};
pub use pipeline::{PassSummary, RestructurePipeline};
