#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Echobeats cycle scheduler: twelve-step logical clock, phase-shifted streams,
//! triadic synchronization and nested level resolution.

/// Error taxonomy.
#[path = "../error.rs"]
pub mod error;

/// Static per-step configuration.
#[path = "../step_table.rs"]
pub mod step_table;

/// Nesting level term counts.
#[path = "../partition.rs"]
pub mod partition;

/// Fixed-rate step clock.
#[path = "../clock.rs"]
pub mod clock;

/// Phase-shifted processing streams.
#[path = "../streams.rs"]
pub mod streams;

/// Sync point detection and coherence measurement.
#[path = "../triad.rs"]
pub mod triad;

/// Step to nesting level to term count.
#[path = "../nesting.rs"]
pub mod nesting;

/// Mode resolution and pivotal notifications.
#[path = "../mode.rs"]
pub mod mode;

/// Ordered scheduler notifications.
#[path = "../events.rs"]
pub mod events;

/// Scheduler configuration and TOML loading.
#[path = "../config.rs"]
pub mod config;

/// Telemetry builder/hook for the scheduler.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// The orchestrating scheduler.
#[path = "../scheduler.rs"]
pub mod scheduler;

pub use clock::{CycleClock, StepTransition, MAX_STEPS_PER_ADVANCE};
pub use config::{SchedulerConfig, DEFAULT_SYNC_COUPLING};
pub use error::{RangeKind, SchedulerError, SchedulerResult};
pub use events::CycleEvent;
pub use mode::ModeResolver;
pub use nesting::NestedLevelResolver;
pub use partition::PartitionSequence;
pub use scheduler::{CycleScheduler, CycleState, RunState};
pub use step_table::{Mode, StepEntry, StepKind, StepTable};
pub use streams::{StreamRecord, StreamSet};
pub use telemetry::{SchedulerTelemetry, SchedulerTelemetryBuilder};
pub use triad::{TriadicSyncState, TriadicSynchronizer};
