//! Workers that process batches of landing-zone files.

mod restructure;

pub use restructure::{RestructureWorker, TopicSummary};
