use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RangeKind, SchedulerError, SchedulerResult};

/// Number of steps in one cycle.
pub const STEP_COUNT: u32 = 12;
/// Number of triads (groups of steps sharing `step % 4`).
pub const TRIAD_COUNT: u32 = 4;

/// Processing mode attached to a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Reactive, action-oriented processing.
    Expressive,
    /// Anticipatory, simulation-oriented processing.
    Reflective,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expressive => write!(f, "expressive"),
            Self::Reflective => write!(f, "reflective"),
        }
    }
}

/// Semantic label of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Initial perception of stimuli.
    Perceive,
    /// Orientation to context.
    Orient,
    /// Reflection on perception and orientation.
    Reflect,
    /// Integration of perceptual and reflective insight.
    Integrate,
    /// Commitment to a course of action.
    Decide,
    /// Simulation of future potential.
    Simulate,
    /// Interaction with affordances.
    Act,
    /// Observation of outcomes.
    Observe,
    /// Learning from action/outcome contingencies.
    Learn,
    /// Consolidation of learned patterns.
    Consolidate,
    /// Anticipation of future states.
    Anticipate,
    /// Stepping outside the current frame.
    Transcend,
}

impl StepKind {
    /// Every kind, in reference step order.
    pub const ALL: [Self; 12] = [
        Self::Perceive,
        Self::Orient,
        Self::Reflect,
        Self::Integrate,
        Self::Decide,
        Self::Simulate,
        Self::Act,
        Self::Observe,
        Self::Learn,
        Self::Consolidate,
        Self::Anticipate,
        Self::Transcend,
    ];

    /// Short lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Perceive => "perceive",
            Self::Orient => "orient",
            Self::Reflect => "reflect",
            Self::Integrate => "integrate",
            Self::Decide => "decide",
            Self::Simulate => "simulate",
            Self::Act => "act",
            Self::Observe => "observe",
            Self::Learn => "learn",
            Self::Consolidate => "consolidate",
            Self::Anticipate => "anticipate",
            Self::Transcend => "transcend",
        }
    }

    /// One-line description of what the step is for.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Perceive => "initial perception of environment and stimuli",
            Self::Orient => "orientation to context and salience landscape",
            Self::Reflect => "reflection on perception and orientation",
            Self::Integrate => "integration of perceptual and reflective insights",
            Self::Decide => "relevance realization: commitment in the present",
            Self::Simulate => "virtual simulation of future potential",
            Self::Act => "interaction with actual affordances",
            Self::Observe => "observation of action outcomes",
            Self::Learn => "learning from action/outcome contingencies",
            Self::Consolidate => "consolidation of learned patterns",
            Self::Anticipate => "anticipation of future states",
            Self::Transcend => "relevance realization: transcending the current frame",
        }
    }

    /// Mode this kind of work is naturally done in.
    #[must_use]
    pub const fn natural_mode(self) -> Mode {
        match self {
            Self::Reflect | Self::Simulate | Self::Learn | Self::Anticipate | Self::Transcend => {
                Mode::Reflective
            }
            _ => Mode::Expressive,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Static configuration of one step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepEntry {
    /// Step number, 0-based.
    pub step: u32,
    /// Semantic label.
    pub kind: StepKind,
    /// Default processing mode.
    pub mode: Mode,
    /// Stream foregrounded on this step.
    pub primary_stream: u32,
    /// Marks a relevance-realization peak.
    #[serde(default)]
    pub pivotal: bool,
    /// Nesting level (1-based index into the partition sequence).
    pub nesting_level: u32,
    /// Triad this step belongs to (`step % 4`).
    pub triadic_group: u32,
    /// Whether the streams synchronize when this step is entered.
    #[serde(default)]
    pub sync_point: bool,
}

// (kind, mode, primary stream, pivotal, nesting level, triadic group, sync point)
type Row = (StepKind, Mode, u32, bool, u32, u32, bool);

const REFERENCE_ROWS: [Row; 12] = [
    (StepKind::Perceive, Mode::Expressive, 0, false, 1, 0, true),
    (StepKind::Orient, Mode::Expressive, 1, false, 1, 1, false),
    (StepKind::Reflect, Mode::Reflective, 2, false, 1, 2, false),
    (StepKind::Integrate, Mode::Expressive, 0, false, 2, 3, false),
    (StepKind::Decide, Mode::Expressive, 1, true, 2, 0, true),
    (StepKind::Simulate, Mode::Reflective, 2, false, 3, 1, false),
    (StepKind::Act, Mode::Expressive, 0, false, 3, 2, false),
    (StepKind::Observe, Mode::Expressive, 1, false, 3, 3, false),
    (StepKind::Learn, Mode::Reflective, 2, false, 3, 0, true),
    (StepKind::Consolidate, Mode::Expressive, 0, false, 4, 1, false),
    (StepKind::Anticipate, Mode::Reflective, 1, false, 4, 2, false),
    (StepKind::Transcend, Mode::Reflective, 2, true, 4, 3, false),
];

/// The twelve step entries, validated for cardinality and ordering.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StepTable {
    entries: Vec<StepEntry>,
}

impl StepTable {
    /// The reference table: 7 expressive and 5 reflective steps, pivots on
    /// `Decide` (4) and `Transcend` (11), sync points on triad 0.
    #[must_use]
    pub fn reference() -> Self {
        let entries = REFERENCE_ROWS
            .iter()
            .zip(0_u32..)
            .map(
                |(&(kind, mode, primary_stream, pivotal, nesting_level, triadic_group, sync_point), step)| {
                    StepEntry {
                        step,
                        kind,
                        mode,
                        primary_stream,
                        pivotal,
                        nesting_level,
                        triadic_group,
                        sync_point,
                    }
                },
            )
            .collect();
        Self { entries }
    }

    /// Builds a table from caller-supplied entries.
    ///
    /// Wrong cardinality is a configuration error; steps out of order or a triadic
    /// group that disagrees with `step % 4` are invariant violations.
    pub fn from_entries(entries: Vec<StepEntry>) -> SchedulerResult<Self> {
        if entries.len() != STEP_COUNT as usize {
            return Err(SchedulerError::Configuration(format!(
                "step table has {} entries, expected {STEP_COUNT}",
                entries.len()
            )));
        }
        for (expected, entry) in (0_u32..).zip(&entries) {
            if entry.step != expected {
                return Err(SchedulerError::InvariantViolation(format!(
                    "step table entry {expected} carries step number {}",
                    entry.step
                )));
            }
            if entry.triadic_group != entry.step % TRIAD_COUNT {
                return Err(SchedulerError::InvariantViolation(format!(
                    "step {} assigned to triad {}, expected {}",
                    entry.step,
                    entry.triadic_group,
                    entry.step % TRIAD_COUNT
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Checks cross references against the stream count and partition depth.
    pub fn validate_against(&self, stream_count: u32, levels: u32) -> SchedulerResult<()> {
        for entry in &self.entries {
            if entry.primary_stream >= stream_count {
                return Err(SchedulerError::InvariantViolation(format!(
                    "step {} foregrounds stream {} but only {stream_count} streams exist",
                    entry.step, entry.primary_stream
                )));
            }
            if entry.nesting_level == 0 || entry.nesting_level > levels {
                return Err(SchedulerError::InvariantViolation(format!(
                    "step {} has nesting level {} outside 1..={levels}",
                    entry.step, entry.nesting_level
                )));
            }
        }
        Ok(())
    }

    /// Entry for `step`, or a range error.
    pub fn entry(&self, step: u32) -> SchedulerResult<&StepEntry> {
        self.entries
            .get(step as usize)
            .ok_or_else(|| SchedulerError::out_of_range(RangeKind::Step, step, 0, STEP_COUNT - 1))
    }

    /// Entry for `step % 12`. Construction guarantees all twelve exist.
    pub(crate) fn at(&self, step: u32) -> &StepEntry {
        &self.entries[wrap_step(step) as usize]
    }

    /// Entries in step order.
    #[must_use]
    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    /// Steps flagged as synchronization points, ascending.
    pub fn sync_points(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.sync_point)
            .map(|entry| entry.step)
    }
}

impl Default for StepTable {
    fn default() -> Self {
        Self::reference()
    }
}

pub(crate) const fn wrap_step(step: u32) -> u32 {
    step % STEP_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_table_is_well_formed() {
        let table = StepTable::reference();
        assert_eq!(table.entries().len(), 12);
        let rebuilt = StepTable::from_entries(table.entries().to_vec()).unwrap();
        assert_eq!(rebuilt, table);
        table.validate_against(3, 4).unwrap();
    }

    #[test]
    fn reference_modes_and_pivots() {
        let table = StepTable::reference();
        let reflective = table
            .entries()
            .iter()
            .filter(|e| e.mode == Mode::Reflective)
            .count();
        assert_eq!(reflective, 5);
        let pivots: Vec<u32> = table
            .entries()
            .iter()
            .filter(|e| e.pivotal)
            .map(|e| e.step)
            .collect();
        assert_eq!(pivots, vec![4, 11]);
        assert_eq!(table.sync_points().collect::<Vec<_>>(), vec![0, 4, 8]);
        for entry in table.entries() {
            assert_eq!(entry.kind.natural_mode(), entry.mode, "step {}", entry.step);
            assert_eq!(entry.kind, StepKind::ALL[entry.step as usize]);
        }
    }

    #[test]
    fn nesting_boundaries_are_table_data() {
        let table = StepTable::reference();
        let levels: Vec<u32> = table.entries().iter().map(|e| e.nesting_level).collect();
        assert_eq!(levels, vec![1, 1, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn rejects_wrong_cardinality() {
        let mut entries = StepTable::reference().entries().to_vec();
        entries.pop();
        let err = StepTable::from_entries(entries).unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
    }

    #[test]
    fn rejects_non_contiguous_steps() {
        let mut entries = StepTable::reference().entries().to_vec();
        entries.swap(2, 3);
        let err = StepTable::from_entries(entries).unwrap_err();
        assert!(matches!(err, SchedulerError::InvariantViolation(_)));
    }

    #[test]
    fn rejects_misassigned_triad() {
        let mut entries = StepTable::reference().entries().to_vec();
        entries[5].triadic_group = 0;
        let err = StepTable::from_entries(entries).unwrap_err();
        assert!(matches!(err, SchedulerError::InvariantViolation(_)));
    }

    #[test]
    fn cross_references_are_checked() {
        let mut entries = StepTable::reference().entries().to_vec();
        entries[7].primary_stream = 3;
        let table = StepTable::from_entries(entries).unwrap();
        assert!(table.validate_against(3, 4).is_err());
        assert!(StepTable::reference().validate_against(3, 3).is_err());
    }

    #[test]
    fn lookup_out_of_range() {
        let err = StepTable::reference().entry(12).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::OutOfRange {
                kind: RangeKind::Step,
                value: 12,
                min: 0,
                max: 11
            }
        );
    }
}
