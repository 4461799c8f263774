//! Output file writers and the bounded cache that owns them.

mod cache;
mod writer;

pub use cache::WriterCache;
pub use writer::OutputWriter;
