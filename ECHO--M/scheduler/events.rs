use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step_table::Mode;

/// Notification produced by the scheduler, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleEvent {
    /// The global step moved from `old` to `new`.
    StepChanged {
        /// Step before the move.
        old: u32,
        /// Step after the move.
        new: u32,
    },
    /// The resolved mode flipped.
    ModeChanged {
        /// Mode before the flip.
        old: Mode,
        /// Mode after the flip.
        new: Mode,
    },
    /// A pivotal step was entered. Always follows any mode change for the same step.
    PivotalStepReached {
        /// The pivotal step.
        step: u32,
    },
    /// Streams synchronized on a sync point.
    TriadicSync {
        /// Triad of the landing step.
        triad_index: u32,
        /// Mean awareness among the streams in that triad.
        quality: f64,
    },
    /// The global step wrapped from 11 to 0.
    CycleCompleted {
        /// Cycle count after the wrap.
        cycle_count: u64,
    },
}

impl CycleEvent {
    /// Snake-case kind tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StepChanged { .. } => "step_changed",
            Self::ModeChanged { .. } => "mode_changed",
            Self::PivotalStepReached { .. } => "pivotal_step_reached",
            Self::TriadicSync { .. } => "triadic_sync",
            Self::CycleCompleted { .. } => "cycle_completed",
        }
    }

    /// Event type used on the bus, e.g. `cycle.step_changed`.
    #[must_use]
    pub fn event_type(&self) -> String {
        format!("cycle.{}", self.kind())
    }

    /// JSON payload, including the `kind` tag.
    #[must_use]
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
