use std::collections::HashMap;

use crate::accounting::OffsetRangeSet;
use crate::types::{OffsetRange, TopicPartition};

/// Hourly counter key for operational accounting.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bin {
    /// Source topic.
    pub topic: String,
    /// Device (source id) the records came from.
    pub device: String,
    /// Operation category, e.g. `written` or `deleted`.
    pub category: String,
    /// Hour bucket in `%Y%m%d_%H` form.
    pub time: String,
}

/// One successfully routed record: the offset it covers and the bin to count
/// it under.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub topic_partition: TopicPartition,
    pub offset: i64,
    pub bin: Bin,
}

/// Worker-local staging of offsets and bin increments.
///
/// A ledger only ever reaches the [`crate::accounting::Accountant`] when the
/// output file it belongs to has been published without error.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    offsets: OffsetRangeSet,
    bins: HashMap<Bin, i64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages one transaction.
    pub fn add(&mut self, transaction: Transaction) {
        self.offsets.add(&OffsetRange::new(
            transaction.topic_partition,
            transaction.offset,
            transaction.offset,
        ));
        *self.bins.entry(transaction.bin).or_insert(0) += 1;
    }

    /// Stages a bin increment without an offset, used by the cleaner.
    pub fn add_bin(&mut self, bin: Bin, count: i64) {
        *self.bins.entry(bin).or_insert(0) += count;
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty() && self.bins.is_empty()
    }

    pub fn offsets(&self) -> &OffsetRangeSet {
        &self.offsets
    }

    pub fn bins(&self) -> &HashMap<Bin, i64> {
        &self.bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(offset: i64) -> Transaction {
        Transaction {
            topic_partition: TopicPartition::new("t", 0),
            offset,
            bin: Bin {
                topic: "t".to_string(),
                device: "s1".to_string(),
                category: "written".to_string(),
                time: "20240101_00".to_string(),
            },
        }
    }

    #[test]
    fn consecutive_offsets_collapse_into_one_range() {
        let mut ledger = Ledger::new();
        ledger.add(transaction(0));
        ledger.add(transaction(1));
        ledger.add(transaction(2));

        assert_eq!(ledger.offsets().size(&TopicPartition::new("t", 0)), 1);
        assert!(
            ledger
                .offsets()
                .contains(&OffsetRange::new(TopicPartition::new("t", 0), 0, 2))
        );
    }

    #[test]
    fn bins_accumulate_counts() {
        let mut ledger = Ledger::new();
        ledger.add(transaction(0));
        ledger.add(transaction(1));

        assert_eq!(ledger.bins().values().sum::<i64>(), 2);
    }
}
