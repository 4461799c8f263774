//! Offset-range accounting and its durable persistence.
//!
//! The [`Accountant`] is shared by every worker. Workers stage offsets and bin
//! increments in a [`Ledger`] and hand the whole ledger over in one call when
//! an output file is published, so partially processed files never reach the
//! durable state.

mod accountant;
mod bins;
mod durable;
mod ledger;
mod offsets;
mod range_set;

pub use accountant::Accountant;
pub use bins::BinTable;
pub use ledger::{Bin, Ledger, Transaction};
pub use range_set::OffsetRangeSet;

pub(crate) use bins::{parse_bins, render_bin_rows, render_bins};
pub(crate) use offsets::{parse_offsets, render_offset_rows, render_offsets};
