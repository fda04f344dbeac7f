use serde::{Deserialize, Serialize};

use crate::{
    error::{SchedulerError, SchedulerResult},
    step_table::{wrap_step, STEP_COUNT},
};

/// Most step boundaries a single advance may cross. Larger deltas are refused whole.
pub const MAX_STEPS_PER_ADVANCE: u32 = 1 << 20;

/// One step boundary crossed by the clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepTransition {
    /// Step before the boundary.
    pub old_step: u32,
    /// Step after the boundary.
    pub new_step: u32,
    /// True when the boundary closed a cycle (`new_step == 0`).
    pub wrapped: bool,
}

/// Fixed-rate logical clock over the 12-step cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleClock {
    step_duration: f64,
    accumulated: f64,
    step: u32,
    cycle_count: u64,
}

impl CycleClock {
    /// Creates a clock at step 0. `step_duration` must be finite and positive.
    pub fn new(step_duration: f64) -> SchedulerResult<Self> {
        if !step_duration.is_finite() || step_duration <= 0.0 {
            return Err(SchedulerError::Configuration(format!(
                "step duration must be a positive number of seconds, got {step_duration}"
            )));
        }
        Ok(Self {
            step_duration,
            accumulated: 0.0,
            step: 0,
            cycle_count: 0,
        })
    }

    /// True when `delta_time` can be applied: finite, non-negative, and crossing at most
    /// [`MAX_STEPS_PER_ADVANCE`] boundaries from the current partial step.
    #[must_use]
    pub fn accepts(&self, delta_time: f64) -> bool {
        delta_time.is_finite()
            && delta_time >= 0.0
            && self.boundaries_after(delta_time) <= f64::from(MAX_STEPS_PER_ADVANCE)
    }

    fn boundaries_after(&self, delta_time: f64) -> f64 {
        ((self.accumulated + delta_time) / self.step_duration).floor()
    }

    /// Accumulates `delta_time` and reports every step boundary crossed, in order.
    ///
    /// Deltas that [`accepts`](Self::accepts) refuses accrue nothing.
    pub fn advance(&mut self, delta_time: f64) -> Vec<StepTransition> {
        if !self.accepts(delta_time) {
            return Vec::new();
        }
        let boundaries = self.boundaries_after(delta_time);
        // accepts() bounds the count to u32, so the cast is exact.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = boundaries as u32;
        self.accumulated =
            (self.accumulated + delta_time - boundaries * self.step_duration).max(0.0);
        (0..count).map(|_| self.step_once()).collect()
    }

    fn step_once(&mut self) -> StepTransition {
        let old_step = self.step;
        self.step = wrap_step(self.step + 1);
        let wrapped = self.step == 0;
        if wrapped {
            self.cycle_count += 1;
        }
        StepTransition {
            old_step,
            new_step: self.step,
            wrapped,
        }
    }

    /// Moves straight to `step % 12`, discarding partial time. The cycle count is
    /// left alone.
    pub fn force_step(&mut self, step: u32) -> StepTransition {
        let old_step = self.step;
        self.step = wrap_step(step);
        self.accumulated = 0.0;
        StepTransition {
            old_step,
            new_step: self.step,
            wrapped: false,
        }
    }

    /// Back to step 0, cycle 0, no partial time.
    pub fn reset(&mut self) {
        self.accumulated = 0.0;
        self.step = 0;
        self.cycle_count = 0;
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> u32 {
        self.step
    }

    /// Completed cycles.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Time spent in the current step.
    #[must_use]
    pub const fn time_in_step(&self) -> f64 {
        self.accumulated
    }

    /// Configured step length.
    #[must_use]
    pub const fn step_duration(&self) -> f64 {
        self.step_duration
    }

    /// Position within the cycle in `[0, 1)`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        (f64::from(self.step) + self.accumulated / self.step_duration) / f64::from(STEP_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_durations() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                CycleClock::new(duration),
                Err(SchedulerError::Configuration(_))
            ));
        }
    }

    #[test]
    fn visits_every_boundary_in_order() {
        let mut clock = CycleClock::new(0.5).unwrap();
        let transitions = clock.advance(13.0);
        assert_eq!(transitions.len(), 26);
        for (i, t) in transitions.iter().enumerate() {
            let i = u32::try_from(i).unwrap();
            assert_eq!(t.old_step, i % 12);
            assert_eq!(t.new_step, (i + 1) % 12);
            assert_eq!(t.wrapped, t.new_step == 0);
        }
        assert_eq!(clock.cycle_count(), 2);
        assert_eq!(clock.step(), 2);
    }

    #[test]
    fn partial_time_carries_over() {
        let mut clock = CycleClock::new(1.0).unwrap();
        assert!(clock.advance(0.75).is_empty());
        let transitions = clock.advance(0.5);
        assert_eq!(transitions.len(), 1);
        assert!((clock.time_in_step() - 0.25).abs() < 1e-12);
        assert!((clock.progress() - 1.25 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn ignores_invalid_deltas() {
        let mut clock = CycleClock::new(1.0).unwrap();
        assert!(clock.advance(-3.0).is_empty());
        assert!(clock.advance(f64::NAN).is_empty());
        assert_eq!(clock.time_in_step(), 0.0);
    }

    #[test]
    fn refuses_deltas_beyond_the_step_bound() {
        let mut clock = CycleClock::new(1.0).unwrap();
        clock.advance(0.5);
        assert!(!clock.accepts(1.0e17));
        assert!(clock.advance(1.0e17).is_empty());
        assert!((clock.time_in_step() - 0.5).abs() < 1e-12);
        assert_eq!((clock.step(), clock.cycle_count()), (0, 0));

        let at_bound = f64::from(MAX_STEPS_PER_ADVANCE) - 0.5;
        assert!(clock.accepts(at_bound));
        assert!(!clock.accepts(at_bound + 1.0));
    }

    #[test]
    fn large_accepted_delta_counts_every_wrap() {
        let mut clock = CycleClock::new(0.25).unwrap();
        let transitions = clock.advance(3_000.0);
        assert_eq!(transitions.len(), 12_000);
        assert_eq!(clock.cycle_count(), 1_000);
        assert_eq!(clock.step(), 0);
        assert_eq!(clock.time_in_step(), 0.0);
        assert_eq!(transitions.iter().filter(|t| t.wrapped).count(), 1_000);
    }

    #[test]
    fn force_step_keeps_cycle_count() {
        let mut clock = CycleClock::new(1.0).unwrap();
        clock.advance(12.5);
        let t = clock.force_step(17);
        assert_eq!((t.old_step, t.new_step, t.wrapped), (0, 5, false));
        assert_eq!(clock.cycle_count(), 1);
        assert_eq!(clock.time_in_step(), 0.0);
        clock.reset();
        assert_eq!((clock.step(), clock.cycle_count()), (0, 0));
    }
}
