use serde::Serialize;

use crate::error::{RangeKind, SchedulerError, SchedulerResult};

/// Number of nesting levels the scheduler understands.
pub const LEVEL_COUNT: u32 = 4;

/// Term counts per nesting level: the rooted-tree counts 1, 2, 4, 9.
const REFERENCE_TERMS: [u32; LEVEL_COUNT as usize] = [1, 2, 4, 9];

/// Nesting level → term count lookup, indexed from level 1.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PartitionSequence {
    terms: Vec<u32>,
}

impl PartitionSequence {
    /// The reference sequence `[1, 2, 4, 9]`.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            terms: REFERENCE_TERMS.to_vec(),
        }
    }

    /// Builds a sequence from custom term counts. Requires exactly
    /// [`LEVEL_COUNT`] positive, non-decreasing terms.
    pub fn from_terms(terms: Vec<u32>) -> SchedulerResult<Self> {
        if terms.len() != LEVEL_COUNT as usize {
            return Err(SchedulerError::Configuration(format!(
                "partition sequence has {} terms, expected {LEVEL_COUNT}",
                terms.len()
            )));
        }
        if terms.contains(&0) {
            return Err(SchedulerError::InvariantViolation(
                "partition sequence contains an empty level".into(),
            ));
        }
        if terms.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(SchedulerError::InvariantViolation(format!(
                "partition sequence {terms:?} is not non-decreasing"
            )));
        }
        Ok(Self { terms })
    }

    /// Term count at `level` (1-based).
    pub fn terms_at(&self, level: u32) -> SchedulerResult<u32> {
        level
            .checked_sub(1)
            .and_then(|idx| self.terms.get(idx as usize).copied())
            .ok_or_else(|| {
                SchedulerError::out_of_range(RangeKind::NestingLevel, level, 1, self.levels())
            })
    }

    /// Number of levels.
    #[must_use]
    pub fn levels(&self) -> u32 {
        u32::try_from(self.terms.len()).unwrap_or(u32::MAX)
    }

    /// Sum of all terms (16 for the reference sequence).
    #[must_use]
    pub fn total_terms(&self) -> u32 {
        self.terms.iter().sum()
    }

    /// Raw terms, level 1 first.
    #[must_use]
    pub fn terms(&self) -> &[u32] {
        &self.terms
    }
}

impl Default for PartitionSequence {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_terms() {
        let seq = PartitionSequence::reference();
        let terms: Vec<u32> = (1..=4).map(|level| seq.terms_at(level).unwrap()).collect();
        assert_eq!(terms, vec![1, 2, 4, 9]);
        assert_eq!(seq.total_terms(), 16);
    }

    #[test]
    fn out_of_range_levels_are_errors() {
        let seq = PartitionSequence::reference();
        for level in [0, 5, u32::MAX] {
            assert!(matches!(
                seq.terms_at(level),
                Err(SchedulerError::OutOfRange {
                    kind: RangeKind::NestingLevel,
                    ..
                })
            ));
        }
    }

    #[test]
    fn validation() {
        assert!(matches!(
            PartitionSequence::from_terms(vec![1, 2, 4]),
            Err(SchedulerError::Configuration(_))
        ));
        assert!(matches!(
            PartitionSequence::from_terms(vec![1, 4, 2, 9]),
            Err(SchedulerError::InvariantViolation(_))
        ));
        assert!(matches!(
            PartitionSequence::from_terms(vec![0, 2, 4, 9]),
            Err(SchedulerError::InvariantViolation(_))
        ));
        assert_eq!(
            PartitionSequence::from_terms(vec![1, 1, 2, 4]).unwrap().terms(),
            &[1, 1, 2, 4]
        );
    }
}
