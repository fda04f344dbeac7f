use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{RangeKind, SchedulerError, SchedulerResult},
    step_table::{wrap_step, STEP_COUNT, TRIAD_COUNT},
};

/// Activation every stream starts with, and the level non-primary streams relax toward.
pub const BASELINE_ACTIVATION: f64 = 0.5;
/// Awareness every stream starts with toward each peer.
pub const INITIAL_AWARENESS: f64 = 0.5;
/// Blend factor pulling the foregrounded stream toward full activation.
pub const PRIMARY_BLEND: f64 = 0.3;
/// Blend factor pulling background streams toward the baseline.
pub const BACKGROUND_BLEND: f64 = 0.1;

/// Snapshot of one stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRecord {
    /// Stable stream id.
    pub id: u32,
    /// Fixed phase offset in steps.
    pub phase_offset: u32,
    /// `(global_step + phase_offset) % 12` at snapshot time.
    pub current_step: u32,
    /// Activation in `[0, 1]`.
    pub activation: f64,
    /// Awareness toward each peer, keyed by peer id in ascending order.
    pub awareness: IndexMap<u32, f64>,
    /// Host-assigned focus label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Stream {
    id: u32,
    phase_offset: u32,
    activation: f64,
    awareness: IndexMap<u32, f64>,
    focus: Option<String>,
}

impl Stream {
    fn new(id: u32, phase_offset: u32, count: u32) -> Self {
        let awareness = (0..count)
            .filter(|&peer| peer != id)
            .map(|peer| (peer, INITIAL_AWARENESS))
            .collect();
        Self {
            id,
            phase_offset,
            activation: BASELINE_ACTIVATION,
            awareness,
            focus: None,
        }
    }
}

fn blend(current: f64, target: f64, factor: f64) -> f64 {
    (current + (target - current) * factor).clamp(0.0, 1.0)
}

/// The phase-shifted streams driven by the global step.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSet {
    streams: Vec<Stream>,
    global_step: u32,
}

impl StreamSet {
    /// Creates `count` streams spaced `12 / count` steps apart.
    pub fn new(count: u32) -> SchedulerResult<Self> {
        if count == 0 || STEP_COUNT % count != 0 {
            return Err(SchedulerError::Configuration(format!(
                "stream count {count} does not evenly divide the {STEP_COUNT}-step cycle"
            )));
        }
        let spacing = STEP_COUNT / count;
        let streams = (0..count)
            .map(|id| Stream::new(id, id * spacing, count))
            .collect();
        Ok(Self {
            streams,
            global_step: 0,
        })
    }

    /// Restores constructed activations, awareness and step; clears focus labels.
    pub fn reset(&mut self) {
        let count = self.len();
        for stream in &mut self.streams {
            *stream = Stream::new(stream.id, stream.phase_offset, count);
        }
        self.global_step = 0;
    }

    /// Moves every stream to `new_global_step` and updates activations: the
    /// `primary_stream` blends toward 1.0, the rest toward the baseline.
    pub fn on_step_advanced(&mut self, new_global_step: u32, primary_stream: u32) {
        self.global_step = wrap_step(new_global_step);
        for stream in &mut self.streams {
            stream.activation = if stream.id == primary_stream {
                blend(stream.activation, 1.0, PRIMARY_BLEND)
            } else {
                blend(stream.activation, BASELINE_ACTIVATION, BACKGROUND_BLEND)
            };
        }
    }

    /// Recomputes `awareness[i][j] = activation[j] * (1 - |offset[i] - offset[j]| / 12)`
    /// for every ordered pair from a single snapshot of activations.
    pub fn update_mutual_awareness(&mut self) {
        let snapshot: Vec<(u32, u32, f64)> = self
            .streams
            .iter()
            .map(|s| (s.id, s.phase_offset, s.activation))
            .collect();
        for stream in &mut self.streams {
            for &(peer, peer_offset, peer_activation) in &snapshot {
                if peer == stream.id {
                    continue;
                }
                let distance = f64::from(stream.phase_offset.abs_diff(peer_offset));
                let value = peer_activation * (1.0 - distance / f64::from(STEP_COUNT));
                stream.awareness.insert(peer, value.clamp(0.0, 1.0));
            }
        }
    }

    /// Blends every activation toward the mean by `strength`, then refreshes awareness.
    pub fn force_synchronize(&mut self, strength: f64) {
        let mean = self.streams.iter().map(|s| s.activation).sum::<f64>() / self.count_f64();
        for stream in &mut self.streams {
            stream.activation = blend(stream.activation, mean, strength.clamp(0.0, 1.0));
        }
        self.update_mutual_awareness();
    }

    /// Mean of all `N * (N - 1)` awareness entries; 1.0 for a single stream.
    #[must_use]
    pub fn mean_awareness(&self) -> f64 {
        let (sum, count) = self
            .streams
            .iter()
            .flat_map(|s| s.awareness.values())
            .fold((0.0, 0_u32), |(sum, count), value| (sum + value, count + 1));
        if count == 0 {
            1.0
        } else {
            sum / f64::from(count)
        }
    }

    /// Awareness of stream `from` toward stream `to`.
    #[must_use]
    pub fn awareness(&self, from: u32, to: u32) -> Option<f64> {
        self.streams
            .get(from as usize)
            .and_then(|s| s.awareness.get(&to).copied())
    }

    /// Ids of streams whose current step falls in triad `group`.
    #[must_use]
    pub fn streams_in_triad(&self, group: u32) -> Vec<u32> {
        self.streams
            .iter()
            .filter(|s| self.current_step_of(s) % TRIAD_COUNT == group)
            .map(|s| s.id)
            .collect()
    }

    /// Phase offsets of the given streams.
    #[must_use]
    pub fn phase_offsets(&self, ids: &[u32]) -> Vec<u32> {
        ids.iter()
            .filter_map(|&id| self.streams.get(id as usize))
            .map(|s| s.phase_offset)
            .collect()
    }

    /// Sets the host focus label of a stream.
    pub fn set_focus(&mut self, id: u32, focus: impl Into<String>) -> SchedulerResult<()> {
        let max = self.max_id();
        let stream = self
            .streams
            .get_mut(id as usize)
            .ok_or_else(|| SchedulerError::out_of_range(RangeKind::Stream, id, 0, max))?;
        stream.focus = Some(focus.into());
        Ok(())
    }

    /// Snapshot of one stream.
    pub fn record(&self, id: u32) -> SchedulerResult<StreamRecord> {
        self.streams
            .get(id as usize)
            .map(|s| self.snapshot(s))
            .ok_or_else(|| SchedulerError::out_of_range(RangeKind::Stream, id, 0, self.max_id()))
    }

    /// Snapshots of every stream, by id.
    #[must_use]
    pub fn records(&self) -> Vec<StreamRecord> {
        self.streams.iter().map(|s| self.snapshot(s)).collect()
    }

    /// Number of streams.
    #[must_use]
    pub fn len(&self) -> u32 {
        u32::try_from(self.streams.len()).unwrap_or(u32::MAX)
    }

    /// Always false: construction rejects zero streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Global step the streams were last moved to.
    #[must_use]
    pub const fn global_step(&self) -> u32 {
        self.global_step
    }

    fn snapshot(&self, stream: &Stream) -> StreamRecord {
        StreamRecord {
            id: stream.id,
            phase_offset: stream.phase_offset,
            current_step: self.current_step_of(stream),
            activation: stream.activation,
            awareness: stream.awareness.clone(),
            focus: stream.focus.clone(),
        }
    }

    const fn current_step_of(&self, stream: &Stream) -> u32 {
        wrap_step(self.global_step + stream.phase_offset)
    }

    fn count_f64(&self) -> f64 {
        f64::from(self.len())
    }

    fn max_id(&self) -> u32 {
        self.len().saturating_sub(1)
    }
}
