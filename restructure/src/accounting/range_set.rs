use std::collections::HashMap;

use crate::types::{OffsetRange, TopicPartition};

/// Set of processed offsets per topic partition, stored as merged intervals.
///
/// Within a partition the intervals are sorted by start offset, pairwise
/// disjoint and non-adjacent: `[0, 1]` and `[2, 3]` collapse into `[0, 3]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetRangeSet {
    ranges: HashMap<TopicPartition, Vec<(i64, i64)>>,
}

impl OffsetRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range, merging it with any overlapping or adjacent intervals.
    pub fn add(&mut self, range: &OffsetRange) {
        let intervals = self
            .ranges
            .entry(range.topic_partition().clone())
            .or_default();

        let mut from = range.from_offset();
        let mut to = range.to_offset();

        // First interval that could interact with the new range: step back one
        // when the predecessor overlaps or is adjacent.
        let mut start = intervals.partition_point(|&(x, _)| x < from);
        if start > 0 && intervals[start - 1].1 >= from.saturating_sub(1) {
            start -= 1;
        }

        let mut end = start;
        while end < intervals.len() && intervals[end].0 <= to.saturating_add(1) {
            from = from.min(intervals[end].0);
            to = to.max(intervals[end].1);
            end += 1;
        }

        intervals.splice(start..end, std::iter::once((from, to)));
    }

    /// Adds every interval of another set.
    pub fn add_all(&mut self, other: &OffsetRangeSet) {
        for range in other.iter() {
            self.add(&range);
        }
    }

    /// Whether one stored interval fully covers the given range.
    pub fn contains(&self, range: &OffsetRange) -> bool {
        self.covering_interval(
            range.topic_partition(),
            range.from_offset(),
            range.to_offset(),
        )
    }

    /// Whether a single offset is covered.
    pub fn contains_offset(&self, topic_partition: &TopicPartition, offset: i64) -> bool {
        self.covering_interval(topic_partition, offset, offset)
    }

    fn covering_interval(&self, topic_partition: &TopicPartition, from: i64, to: i64) -> bool {
        let Some(intervals) = self.ranges.get(topic_partition) else {
            return false;
        };

        let index = intervals.partition_point(|&(x, _)| x <= from);
        index > 0 && intervals[index - 1].1 >= to
    }

    /// Number of stored intervals for one partition.
    pub fn size(&self, topic_partition: &TopicPartition) -> usize {
        self.ranges
            .get(topic_partition)
            .map_or(0, |intervals| intervals.len())
    }

    /// True when no interval is stored at all.
    pub fn is_empty(&self) -> bool {
        self.ranges.values().all(|intervals| intervals.is_empty())
    }

    /// Iterates all stored intervals as owned ranges, ordered within each
    /// partition by start offset.
    pub fn iter(&self) -> impl Iterator<Item = OffsetRange> + '_ {
        let mut partitions: Vec<_> = self.ranges.iter().collect();
        partitions.sort_by(|(a, _), (b, _)| a.cmp(b));

        partitions.into_iter().flat_map(|(tp, intervals)| {
            intervals
                .iter()
                .map(move |&(from, to)| OffsetRange::new(tp.clone(), from, to))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp() -> TopicPartition {
        TopicPartition::new("test", 0)
    }

    fn range(from: i64, to: i64) -> OffsetRange {
        OffsetRange::new(tp(), from, to)
    }

    #[test]
    fn disjoint_ranges_stay_separate() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(0, 1));
        set.add(&range(5, 6));

        assert_eq!(set.size(&tp()), 2);
        assert!(set.contains(&range(0, 1)));
        assert!(set.contains(&range(5, 6)));
        assert!(!set.contains(&range(0, 6)));
        assert!(!set.contains(&range(2, 3)));
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(0, 1));
        set.add(&range(2, 3));

        assert_eq!(set.size(&tp()), 1);
        assert!(set.contains(&range(0, 3)));
    }

    #[test]
    fn overlapping_ranges_merge() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(0, 10));
        set.add(&range(5, 20));

        assert_eq!(set.size(&tp()), 1);
        assert!(set.contains(&range(0, 20)));
    }

    #[test]
    fn bridging_range_collapses_neighbours() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(0, 1));
        set.add(&range(10, 11));
        set.add(&range(2, 9));

        assert_eq!(set.size(&tp()), 1);
        assert!(set.contains(&range(0, 11)));
    }

    #[test]
    fn contains_requires_full_coverage() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(5, 10));

        assert!(set.contains(&range(5, 10)));
        assert!(set.contains(&range(6, 9)));
        assert!(!set.contains(&range(4, 10)));
        assert!(!set.contains(&range(5, 11)));
    }

    #[test]
    fn contains_offset_matches_single_points() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(5, 10));

        assert!(set.contains_offset(&tp(), 5));
        assert!(set.contains_offset(&tp(), 10));
        assert!(!set.contains_offset(&tp(), 11));
        assert!(!set.contains_offset(&TopicPartition::new("other", 0), 5));
    }

    #[test]
    fn partitions_are_independent() {
        let mut set = OffsetRangeSet::new();
        let other = TopicPartition::new("test", 1);
        set.add(&range(0, 3));
        set.add(&OffsetRange::new(other.clone(), 4, 7));

        assert_eq!(set.size(&tp()), 1);
        assert_eq!(set.size(&other), 1);
        assert!(!set.contains(&OffsetRange::new(other, 0, 3)));
    }

    #[test]
    fn add_all_unions_sets() {
        let mut left = OffsetRangeSet::new();
        left.add(&range(0, 1));
        let mut right = OffsetRangeSet::new();
        right.add(&range(2, 5));

        left.add_all(&right);
        assert_eq!(left.size(&tp()), 1);
        assert!(left.contains(&range(0, 5)));
    }

    #[test]
    fn iter_returns_sorted_intervals() {
        let mut set = OffsetRangeSet::new();
        set.add(&range(10, 11));
        set.add(&range(0, 1));

        let collected: Vec<_> = set.iter().collect();
        assert_eq!(collected, vec![range(0, 1), range(10, 11)]);
    }
}
