use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;

use crate::{
    clock::CycleClock,
    config::SchedulerConfig,
    error::SchedulerResult,
    events::CycleEvent,
    mode::{mode_fit, ModeResolver},
    nesting::NestedLevelResolver,
    partition::PartitionSequence,
    step_table::{Mode, StepEntry, StepTable},
    streams::{StreamRecord, StreamSet},
    telemetry::SchedulerTelemetry,
    triad::{TriadicSyncState, TriadicSynchronizer},
};

/// Weight of overall coherence in the relevance level.
pub const COHERENCE_WEIGHT: f64 = 0.4;
/// Weight of the last sync quality in the relevance level.
pub const SYNC_WEIGHT: f64 = 0.3;
/// Weight of the current step's mode fit in the relevance level.
pub const MODE_FIT_WEIGHT: f64 = 0.3;
/// Blend strength used by [`CycleScheduler::force_synchronize`].
pub const FORCE_SYNC_STRENGTH: f64 = 0.3;

/// Whether ticks advance the clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Ticks advance the cycle.
    Running,
    /// Ticks are ignored.
    Paused,
}

/// Externally observable snapshot of a scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleState {
    /// Current global step.
    pub global_step: u32,
    /// Completed cycles.
    pub cycle_count: u64,
    /// Seconds accumulated toward the next step.
    pub time_in_step: f64,
    /// Nesting level of the current step.
    pub nesting_level: u32,
    /// Term count at that level.
    pub terms_at_level: u32,
    /// Last resolved mode.
    pub mode: Mode,
    /// Mean awareness across every stream pair.
    pub coherence: f64,
    /// Outcome of the last synchronization.
    pub triadic_sync: TriadicSyncState,
    /// Derived relevance-realization level in `[0, 1]`.
    pub relevance: f64,
    /// Run state at snapshot time.
    pub run_state: RunState,
    /// Position within the cycle in `[0, 1)`.
    pub cycle_progress: f64,
    /// Every stream, by id.
    pub streams: Vec<StreamRecord>,
}

/// Drives the streams through the twelve-step cycle.
///
/// Every mutating call returns the events it produced, in order. When telemetry is
/// attached the same events are published as `cycle.<kind>` in the same order.
#[derive(Debug)]
pub struct CycleScheduler {
    config: SchedulerConfig,
    table: Arc<StepTable>,
    clock: CycleClock,
    streams: StreamSet,
    triad: TriadicSynchronizer,
    nesting: NestedLevelResolver,
    modes: ModeResolver,
    run_state: RunState,
    coherence: f64,
    relevance: f64,
    telemetry: Option<SchedulerTelemetry>,
}

impl CycleScheduler {
    /// Validates `config` and builds a running scheduler at step 0.
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        let table = Arc::new(config.step_table.clone());
        let partitions = Arc::new(config.partition_sequence.clone());
        let clock = CycleClock::new(config.step_duration)?;
        let streams = StreamSet::new(config.stream_count)?;
        let triad =
            TriadicSynchronizer::new(Arc::clone(&table), &streams, config.sync_coupling());
        let nesting = NestedLevelResolver::new(Arc::clone(&table), partitions);
        let modes = ModeResolver::new(Arc::clone(&table));
        let mut scheduler = Self {
            config,
            table,
            clock,
            streams,
            triad,
            nesting,
            modes,
            run_state: RunState::Running,
            coherence: 0.0,
            relevance: 0.0,
            telemetry: None,
        };
        scheduler.refresh_derived();
        Ok(scheduler)
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SchedulerTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self.log(
            LogLevel::Info,
            "scheduler.created",
            json!({
                "step_duration": self.config.step_duration,
                "stream_count": self.config.stream_count,
                "partition_sequence": self.config.partition_sequence.terms(),
            }),
        );
        self
    }

    /// Advances by `delta_time` seconds, visiting every step boundary crossed.
    ///
    /// Does nothing while paused. Negative or non-finite deltas are ignored, as are
    /// deltas crossing more than
    /// [`MAX_STEPS_PER_ADVANCE`](crate::clock::MAX_STEPS_PER_ADVANCE) boundaries.
    pub fn tick(&mut self, delta_time: f64) -> Vec<CycleEvent> {
        if self.run_state == RunState::Paused {
            return Vec::new();
        }
        if !self.clock.accepts(delta_time) {
            self.log(
                LogLevel::Warn,
                "scheduler.delta_ignored",
                json!({ "delta_time": delta_time.to_string() }),
            );
            return Vec::new();
        }
        let cycles_before = self.clock.cycle_count();
        let transitions = self.clock.advance(delta_time);
        let mut events = Vec::with_capacity(transitions.len() * 2);
        let mut completed = Vec::new();
        for transition in transitions {
            events.push(CycleEvent::StepChanged {
                old: transition.old_step,
                new: transition.new_step,
            });
            self.enter_step(transition.new_step, &mut events);
            if transition.wrapped {
                completed.push(CycleEvent::CycleCompleted {
                    cycle_count: cycles_before + completed.len() as u64 + 1,
                });
            }
        }
        self.refresh_derived();
        for event in &completed {
            if let CycleEvent::CycleCompleted { cycle_count } = event {
                self.log(
                    LogLevel::Info,
                    "scheduler.cycle_completed",
                    json!({ "cycle_count": cycle_count, "relevance": self.relevance }),
                );
            }
        }
        events.extend(completed);
        self.publish(&events);
        events
    }

    /// Moves straight to `step % 12` without visiting the steps in between.
    ///
    /// Emits a single `StepChanged` and evaluates the landing step the way an
    /// advance would. Partial step time is discarded and the cycle count is kept.
    /// Works while paused.
    pub fn jump_to_step(&mut self, step: u32) -> Vec<CycleEvent> {
        let transition = self.clock.force_step(step);
        let mut events = vec![CycleEvent::StepChanged {
            old: transition.old_step,
            new: transition.new_step,
        }];
        self.enter_step(transition.new_step, &mut events);
        self.refresh_derived();
        self.log(
            LogLevel::Info,
            "scheduler.jump",
            json!({ "from": transition.old_step, "to": transition.new_step }),
        );
        self.publish(&events);
        events
    }

    /// Stops ticks from advancing the cycle. Idempotent.
    pub fn pause(&mut self) {
        if self.run_state != RunState::Paused {
            self.run_state = RunState::Paused;
            self.log(LogLevel::Info, "scheduler.paused", self.position());
        }
    }

    /// Lets ticks advance the cycle again. Idempotent.
    pub fn resume(&mut self) {
        if self.run_state != RunState::Running {
            self.run_state = RunState::Running;
            self.log(LogLevel::Info, "scheduler.resumed", self.position());
        }
    }

    /// Back to the constructed state, running.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.streams.reset();
        self.triad.reset(&self.streams);
        self.modes.reset();
        self.run_state = RunState::Running;
        self.refresh_derived();
        self.log(LogLevel::Info, "scheduler.reset", json!({}));
    }

    /// Pulls every stream's activation toward the mean and refreshes coherence.
    pub fn force_synchronize(&mut self) {
        self.streams.force_synchronize(FORCE_SYNC_STRENGTH);
        self.refresh_derived();
        self.log(
            LogLevel::Info,
            "scheduler.force_synchronize",
            json!({ "coherence": self.coherence }),
        );
    }

    /// Labels what a stream is working on.
    pub fn set_stream_focus(&mut self, id: u32, focus: impl Into<String>) -> SchedulerResult<()> {
        let focus = focus.into();
        self.streams.set_focus(id, focus.clone())?;
        self.log(
            LogLevel::Debug,
            "scheduler.stream_focus",
            json!({ "stream": id, "focus": focus }),
        );
        Ok(())
    }

    /// Current global step.
    #[must_use]
    pub const fn current_step(&self) -> u32 {
        self.clock.step()
    }

    /// Last resolved mode.
    #[must_use]
    pub const fn current_mode(&self) -> Mode {
        self.modes.current()
    }

    /// Completed cycles.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.clock.cycle_count()
    }

    /// Whether the current step is pivotal.
    #[must_use]
    pub fn is_pivotal_step(&self) -> bool {
        self.current_step_config().pivotal
    }

    /// Nesting level of the current step.
    #[must_use]
    pub fn nesting_level(&self) -> u32 {
        self.current_step_config().nesting_level
    }

    /// Term count at the current nesting level.
    #[must_use]
    pub fn terms_at_current_level(&self) -> u32 {
        self.nesting
            .terms_for_step(self.current_step())
            .unwrap_or_default()
    }

    /// Nesting level of any step.
    pub fn level_for_step(&self, step: u32) -> SchedulerResult<u32> {
        self.nesting.level_for_step(step)
    }

    /// Term count at any level.
    pub fn terms_at_level(&self, level: u32) -> SchedulerResult<u32> {
        self.nesting.terms_at_level(level)
    }

    /// Configured mode of any step.
    pub fn mode_for_step(&self, step: u32) -> SchedulerResult<Mode> {
        self.modes.mode_for_step(step)
    }

    /// Whether `step` is a sync point.
    #[must_use]
    pub fn is_sync_point(&self, step: u32) -> bool {
        self.triad.is_sync_point(step)
    }

    /// Snapshot of one stream.
    pub fn stream_state(&self, id: u32) -> SchedulerResult<StreamRecord> {
        self.streams.record(id)
    }

    /// Table entry of any step.
    pub fn step_config(&self, step: u32) -> SchedulerResult<StepEntry> {
        self.table.entry(step).copied()
    }

    /// Table entry of the current step.
    #[must_use]
    pub fn current_step_config(&self) -> StepEntry {
        *self.table.at(self.current_step())
    }

    /// Triad of the current step.
    #[must_use]
    pub fn current_triadic_group(&self) -> u32 {
        self.current_step_config().triadic_group
    }

    /// Stream foregrounded on the current step.
    #[must_use]
    pub fn active_stream_id(&self) -> u32 {
        self.current_step_config().primary_stream
    }

    /// Position within the cycle in `[0, 1)`.
    #[must_use]
    pub fn cycle_progress(&self) -> f64 {
        self.clock.progress()
    }

    /// Mean awareness across every stream pair.
    #[must_use]
    pub const fn coherence(&self) -> f64 {
        self.coherence
    }

    /// Relevance-realization level.
    #[must_use]
    pub const fn relevance(&self) -> f64 {
        self.relevance
    }

    /// Outcome of the last synchronization.
    #[must_use]
    pub const fn triadic_state(&self) -> &TriadicSyncState {
        self.triad.state()
    }

    /// Run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Configuration the scheduler was built from.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Shared partition sequence.
    #[must_use]
    pub const fn partition_sequence(&self) -> &PartitionSequence {
        &self.config.partition_sequence
    }

    /// Full snapshot.
    #[must_use]
    pub fn cycle_state(&self) -> CycleState {
        CycleState {
            global_step: self.current_step(),
            cycle_count: self.cycle_count(),
            time_in_step: self.clock.time_in_step(),
            nesting_level: self.nesting_level(),
            terms_at_level: self.terms_at_current_level(),
            mode: self.current_mode(),
            coherence: self.coherence,
            triadic_sync: self.triad.state().clone(),
            relevance: self.relevance,
            run_state: self.run_state,
            cycle_progress: self.cycle_progress(),
            streams: self.streams.records(),
        }
    }

    fn enter_step(&mut self, step: u32, events: &mut Vec<CycleEvent>) {
        let entry = *self.table.at(step);
        self.streams.on_step_advanced(step, entry.primary_stream);
        self.streams.update_mutual_awareness();
        self.triad.evaluate(&entry, &mut self.streams, events);
        self.modes.evaluate(&entry, events);
        self.log(
            LogLevel::Debug,
            "scheduler.step",
            json!({
                "step": step,
                "kind": entry.kind,
                "mode": self.modes.current(),
                "primary_stream": entry.primary_stream,
            }),
        );
    }

    fn refresh_derived(&mut self) {
        let entry = self.table.at(self.clock.step());
        self.coherence = self.streams.mean_awareness();
        self.relevance = (COHERENCE_WEIGHT * self.coherence
            + SYNC_WEIGHT * self.triad.state().sync_quality
            + MODE_FIT_WEIGHT * mode_fit(entry))
        .clamp(0.0, 1.0);
    }

    fn position(&self) -> Value {
        json!({ "step": self.current_step(), "cycle_count": self.cycle_count() })
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn publish(&self, events: &[CycleEvent]) {
        if let Some(tel) = &self.telemetry {
            for event in events {
                let _ = tel.cycle_event(event);
            }
        }
    }
}
