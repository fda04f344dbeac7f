use std::sync::Arc;

use crate::{
    error::SchedulerResult,
    events::CycleEvent,
    step_table::{Mode, StepEntry, StepTable},
};

/// Mode fit of a step whose configured mode disagrees with its kind.
pub const MISMATCHED_MODE_FIT: f64 = 0.7;

/// How well a step's configured mode suits its kind: 1.0 or [`MISMATCHED_MODE_FIT`].
#[must_use]
pub fn mode_fit(entry: &StepEntry) -> f64 {
    if entry.mode == entry.kind.natural_mode() {
        1.0
    } else {
        MISMATCHED_MODE_FIT
    }
}

/// Tracks the resolved mode and raises mode and pivotal notifications.
#[derive(Debug, Clone)]
pub struct ModeResolver {
    table: Arc<StepTable>,
    initial: Mode,
    current: Mode,
}

impl ModeResolver {
    /// Starts out in step 0's mode.
    #[must_use]
    pub fn new(table: Arc<StepTable>) -> Self {
        let initial = table
            .entries()
            .first()
            .map_or(Mode::Expressive, |entry| entry.mode);
        Self {
            table,
            initial,
            current: initial,
        }
    }

    /// Configured mode of `step`.
    pub fn mode_for_step(&self, step: u32) -> SchedulerResult<Mode> {
        self.table.entry(step).map(|entry| entry.mode)
    }

    /// Resolves the landing entry: pushes `ModeChanged` when the mode differs from
    /// the last resolved one, then `PivotalStepReached` for pivotal entries.
    pub fn evaluate(&mut self, entry: &StepEntry, events: &mut Vec<CycleEvent>) {
        if entry.mode != self.current {
            events.push(CycleEvent::ModeChanged {
                old: self.current,
                new: entry.mode,
            });
            self.current = entry.mode;
        }
        if entry.pivotal {
            events.push(CycleEvent::PivotalStepReached { step: entry.step });
        }
    }

    /// Last resolved mode.
    #[must_use]
    pub const fn current(&self) -> Mode {
        self.current
    }

    /// Back to step 0's mode.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
