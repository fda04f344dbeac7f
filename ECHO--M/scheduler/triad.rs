use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    error::{RangeKind, SchedulerError, SchedulerResult},
    events::CycleEvent,
    step_table::{StepEntry, StepTable, STEP_COUNT, TRIAD_COUNT},
    streams::StreamSet,
};

/// Largest offset variance considered, used to normalize phase alignment.
pub const MAX_OFFSET_VARIANCE: f64 = 36.0;

/// Outcome of the most recent synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriadicSyncState {
    /// Triad of the step that last synchronized.
    pub triad_index: u32,
    /// The three steps of that triad.
    pub triad_steps: Vec<u32>,
    /// Mean awareness among the involved streams.
    pub sync_quality: f64,
    /// `1 - var(offsets) / 36` over the involved streams.
    pub phase_alignment: f64,
    /// Pairwise awareness, `N x N`, with 1.0 on the diagonal.
    pub coherence_matrix: Vec<Vec<f64>>,
}

/// Steps of triad `group`: `group`, `group + 4`, `group + 8`.
pub fn triad_steps(group: u32) -> SchedulerResult<Vec<u32>> {
    if group >= TRIAD_COUNT {
        return Err(SchedulerError::out_of_range(
            RangeKind::TriadicGroup,
            group,
            0,
            TRIAD_COUNT - 1,
        ));
    }
    Ok((group..STEP_COUNT).step_by(TRIAD_COUNT as usize).collect())
}

fn len_f64(len: usize) -> f64 {
    f64::from(u32::try_from(len).unwrap_or(u32::MAX))
}

fn phase_alignment(offsets: &[u32]) -> f64 {
    if offsets.len() < 2 {
        return 1.0;
    }
    let count = len_f64(offsets.len());
    let mean = offsets.iter().map(|&o| f64::from(o)).sum::<f64>() / count;
    let variance = offsets
        .iter()
        .map(|&o| (f64::from(o) - mean).powi(2))
        .sum::<f64>()
        / count;
    (1.0 - variance / MAX_OFFSET_VARIANCE).clamp(0.0, 1.0)
}

fn sync_quality(streams: &StreamSet, involved: &[u32]) -> f64 {
    let values: Vec<f64> = involved
        .iter()
        .flat_map(|&from| {
            involved
                .iter()
                .filter(move |&&to| to != from)
                .filter_map(move |&to| streams.awareness(from, to))
        })
        .collect();
    if values.is_empty() {
        1.0
    } else {
        values.iter().sum::<f64>() / len_f64(values.len())
    }
}

fn coherence_matrix(streams: &StreamSet) -> Vec<Vec<f64>> {
    let count = streams.len();
    (0..count)
        .map(|i| {
            (0..count)
                .map(|j| {
                    if i == j {
                        1.0
                    } else {
                        streams.awareness(i, j).unwrap_or(0.0)
                    }
                })
                .collect()
        })
        .collect()
}

/// Couples the streams at every flagged sync point, then measures how well they agree.
///
/// With `coupling` set to `None` the barrier is off: sync points pass without blending,
/// measuring or emitting `TriadicSync`, and the baseline state stays in place.
#[derive(Debug, Clone)]
pub struct TriadicSynchronizer {
    table: Arc<StepTable>,
    coupling: Option<f64>,
    state: TriadicSyncState,
}

impl TriadicSynchronizer {
    /// Creates the synchronizer with a baseline measurement of triad 0.
    #[must_use]
    pub fn new(table: Arc<StepTable>, streams: &StreamSet, coupling: Option<f64>) -> Self {
        let state = Self::measure(0, streams);
        Self {
            table,
            coupling,
            state,
        }
    }

    /// Blend strength applied at sync points, if the barrier is on.
    #[must_use]
    pub const fn coupling(&self) -> Option<f64> {
        self.coupling
    }

    /// True when the table flags `step` as a sync point. Unknown steps are not.
    #[must_use]
    pub fn is_sync_point(&self, step: u32) -> bool {
        self.table.entry(step).is_ok_and(|entry| entry.sync_point)
    }

    /// Synchronizes on `entry` if it is a sync point: pulls every activation toward the
    /// mean by the coupling strength, recomputes awareness, measures the triad and pushes
    /// one `TriadicSync`. Returns whether a synchronization happened.
    pub fn evaluate(
        &mut self,
        entry: &StepEntry,
        streams: &mut StreamSet,
        events: &mut Vec<CycleEvent>,
    ) -> bool {
        let Some(strength) = self.coupling else {
            return false;
        };
        if !entry.sync_point {
            return false;
        }
        streams.force_synchronize(strength);
        self.state = Self::measure(entry.triadic_group, streams);
        events.push(CycleEvent::TriadicSync {
            triad_index: self.state.triad_index,
            quality: self.state.sync_quality,
        });
        true
    }

    /// Latest synchronization state.
    #[must_use]
    pub const fn state(&self) -> &TriadicSyncState {
        &self.state
    }

    /// Discards the last synchronization and re-measures triad 0.
    pub fn reset(&mut self, streams: &StreamSet) {
        self.state = Self::measure(0, streams);
    }

    fn measure(group: u32, streams: &StreamSet) -> TriadicSyncState {
        let involved = streams.streams_in_triad(group);
        TriadicSyncState {
            triad_index: group,
            triad_steps: triad_steps(group).unwrap_or_default(),
            sync_quality: sync_quality(streams, &involved),
            phase_alignment: phase_alignment(&streams.phase_offsets(&involved)),
            coherence_matrix: coherence_matrix(streams),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn triads_partition_the_cycle() {
        let mut seen = BTreeSet::new();
        for group in 0..TRIAD_COUNT {
            let steps = triad_steps(group).unwrap();
            assert_eq!(steps.len(), 3);
            for step in steps {
                assert_eq!(step % 4, group);
                assert!(seen.insert(step), "step {step} in two triads");
            }
        }
        assert_eq!(seen, (0..12).collect());
        assert!(matches!(
            triad_steps(4),
            Err(SchedulerError::OutOfRange {
                kind: RangeKind::TriadicGroup,
                ..
            })
        ));
    }

    #[test]
    fn sync_points_come_from_the_table() {
        let table = Arc::new(StepTable::reference());
        let streams = StreamSet::new(3).unwrap();
        let sync = TriadicSynchronizer::new(Arc::clone(&table), &streams, Some(0.3));
        for entry in table.entries() {
            assert_eq!(sync.is_sync_point(entry.step), entry.sync_point);
        }
        assert!(!sync.is_sync_point(12));
    }

    #[test]
    fn evaluates_only_on_sync_points() {
        let table = Arc::new(StepTable::reference());
        let mut streams = StreamSet::new(3).unwrap();
        let mut sync = TriadicSynchronizer::new(Arc::clone(&table), &streams, Some(0.3));
        let mut events = Vec::new();
        streams.on_step_advanced(1, 1);
        streams.update_mutual_awareness();
        let untouched = streams.clone();
        assert!(!sync.evaluate(table.entry(1).unwrap(), &mut streams, &mut events));
        assert!(events.is_empty());
        assert_eq!(streams, untouched);

        streams.on_step_advanced(4, 1);
        streams.update_mutual_awareness();
        assert!(sync.evaluate(table.entry(4).unwrap(), &mut streams, &mut events));
        assert_eq!(events.len(), 1);
        let state = sync.state();
        assert_eq!(state.triad_index, 0);
        assert_eq!(state.triad_steps, vec![0, 4, 8]);
        match events[0] {
            CycleEvent::TriadicSync {
                triad_index,
                quality,
            } => {
                assert_eq!(triad_index, 0);
                assert!(approx(quality, state.sync_quality));
            }
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn quality_and_alignment_for_three_streams() {
        let streams = StreamSet::new(3).unwrap();
        let table = Arc::new(StepTable::reference());
        let sync = TriadicSynchronizer::new(table, &streams, Some(0.3));
        let state = sync.state();
        // Offsets 0, 4, 8 have population variance 32/3.
        assert!(approx(state.phase_alignment, 1.0 - (32.0 / 3.0) / 36.0));
        assert!(approx(state.sync_quality, 0.5));
        assert_eq!(state.coherence_matrix.len(), 3);
        for (i, row) in state.coherence_matrix.iter().enumerate() {
            assert!(approx(row[i], 1.0));
        }
    }

    fn activation_spread(streams: &StreamSet) -> f64 {
        let acts: Vec<f64> = streams.records().iter().map(|r| r.activation).collect();
        acts.iter().copied().fold(f64::MIN, f64::max) - acts.iter().copied().fold(f64::MAX, f64::min)
    }

    #[test]
    fn sync_points_pull_activations_together() {
        let table = Arc::new(StepTable::reference());
        let mut coupled = StreamSet::new(3).unwrap();
        let mut sync = TriadicSynchronizer::new(Arc::clone(&table), &coupled, Some(0.3));
        let mut events = Vec::new();
        for step in [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 0] {
            let entry = table.entry(step).unwrap();
            coupled.on_step_advanced(step, entry.primary_stream);
            coupled.update_mutual_awareness();
            let uncoupled = coupled.clone();
            let synced = sync.evaluate(entry, &mut coupled, &mut events);
            assert_eq!(synced, [0, 4, 8].contains(&step));
            if synced {
                let before = activation_spread(&uncoupled);
                assert!(before > 0.0);
                assert!(approx(activation_spread(&coupled), before * 0.7));
                assert!(approx(
                    sync.state().sync_quality,
                    sync_quality(&coupled, &coupled.streams_in_triad(entry.triadic_group))
                ));
            } else {
                assert_eq!(coupled, uncoupled);
            }
        }
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn disabled_barrier_skips_sync_points() {
        let table = Arc::new(StepTable::reference());
        let mut streams = StreamSet::new(3).unwrap();
        let mut sync = TriadicSynchronizer::new(Arc::clone(&table), &streams, None);
        let baseline = sync.state().clone();
        streams.on_step_advanced(4, 1);
        streams.update_mutual_awareness();
        let before = streams.clone();
        let mut events = Vec::new();
        assert!(!sync.evaluate(table.entry(4).unwrap(), &mut streams, &mut events));
        assert!(events.is_empty());
        assert_eq!(streams, before);
        assert_eq!(sync.state(), &baseline);
        assert!(sync.is_sync_point(4));
    }

    #[test]
    fn alignment_edge_cases() {
        assert!(approx(phase_alignment(&[]), 1.0));
        assert!(approx(phase_alignment(&[4]), 1.0));
        assert!(approx(phase_alignment(&[6, 6]), 1.0));
        assert!(approx(phase_alignment(&[0, 12]), 0.0));
    }
}
