use std::sync::Arc;

use crate::{
    error::SchedulerResult,
    partition::PartitionSequence,
    step_table::StepTable,
};

/// Step → nesting level → term count. Holds no state of its own.
#[derive(Debug, Clone)]
pub struct NestedLevelResolver {
    table: Arc<StepTable>,
    partitions: Arc<PartitionSequence>,
}

impl NestedLevelResolver {
    /// Creates a resolver over shared configuration.
    #[must_use]
    pub const fn new(table: Arc<StepTable>, partitions: Arc<PartitionSequence>) -> Self {
        Self { table, partitions }
    }

    /// Nesting level recorded for `step`.
    pub fn level_for_step(&self, step: u32) -> SchedulerResult<u32> {
        self.table.entry(step).map(|entry| entry.nesting_level)
    }

    /// Term count at `level`.
    pub fn terms_at_level(&self, level: u32) -> SchedulerResult<u32> {
        self.partitions.terms_at(level)
    }

    /// Term count at the level of `step`.
    pub fn terms_for_step(&self, step: u32) -> SchedulerResult<u32> {
        self.terms_at_level(self.level_for_step(step)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RangeKind, SchedulerError};

    fn resolver() -> NestedLevelResolver {
        NestedLevelResolver::new(
            Arc::new(StepTable::reference()),
            Arc::new(PartitionSequence::reference()),
        )
    }

    #[test]
    fn levels_never_decrease_across_the_cycle() {
        let resolver = resolver();
        let levels: Vec<u32> = (0..12)
            .map(|step| resolver.level_for_step(step).unwrap())
            .collect();
        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(levels.first(), Some(&1));
        assert_eq!(levels.last(), Some(&4));
    }

    #[test]
    fn terms_follow_the_partition_sequence() {
        let resolver = resolver();
        for (level, expected) in [(1, 1), (2, 2), (3, 4), (4, 9)] {
            assert_eq!(resolver.terms_at_level(level).unwrap(), expected);
        }
        assert_eq!(resolver.terms_for_step(0).unwrap(), 1);
        assert_eq!(resolver.terms_for_step(4).unwrap(), 2);
        assert_eq!(resolver.terms_for_step(8).unwrap(), 4);
        assert_eq!(resolver.terms_for_step(11).unwrap(), 9);
    }

    #[test]
    fn out_of_range_inputs_are_typed_errors() {
        let resolver = resolver();
        assert!(matches!(
            resolver.level_for_step(12),
            Err(SchedulerError::OutOfRange {
                kind: RangeKind::Step,
                ..
            })
        ));
        assert!(matches!(
            resolver.terms_at_level(0),
            Err(SchedulerError::OutOfRange {
                kind: RangeKind::NestingLevel,
                ..
            })
        ));
    }
}
