use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::{SchedulerError, SchedulerResult},
    partition::PartitionSequence,
    step_table::{StepEntry, StepTable, STEP_COUNT},
    streams::StreamSet,
};

/// The only stream count the reference nesting boundaries are defined for.
pub const SUPPORTED_STREAM_COUNT: u32 = 3;

fn default_step_duration() -> f64 {
    1.0
}

const fn default_stream_count() -> u32 {
    SUPPORTED_STREAM_COUNT
}

/// Blend strength pulling activations toward their mean at each sync point.
pub const DEFAULT_SYNC_COUPLING: f64 = 0.3;

fn default_sync_coupling() -> f64 {
    DEFAULT_SYNC_COUPLING
}

const fn default_triadic_sync() -> bool {
    true
}

/// Immutable scheduler configuration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchedulerConfig {
    /// Seconds per step.
    pub step_duration: f64,
    /// Number of streams; must be 3.
    pub stream_count: u32,
    /// Per-step configuration.
    pub step_table: StepTable,
    /// Term counts per nesting level.
    pub partition_sequence: PartitionSequence,
    /// Whether sync points couple and measure the streams.
    pub triadic_sync: bool,
    /// Blend strength in `[0, 1]` used at sync points.
    pub sync_coupling_strength: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            step_duration: default_step_duration(),
            stream_count: default_stream_count(),
            step_table: StepTable::reference(),
            partition_sequence: PartitionSequence::reference(),
            triadic_sync: default_triadic_sync(),
            sync_coupling_strength: default_sync_coupling(),
        }
    }
}

impl SchedulerConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("loading {}", path.display()))
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let document: ConfigDocument = toml::from_str(raw).context("parsing scheduler config")?;
        let step_duration = match (document.step_duration, document.cycle_duration) {
            (Some(_), Some(_)) => bail!("set either step_duration or cycle_duration, not both"),
            (Some(step), None) => step,
            (None, Some(cycle)) => cycle / f64::from(STEP_COUNT),
            (None, None) => default_step_duration(),
        };
        let step_table = if document.steps.is_empty() {
            StepTable::reference()
        } else {
            StepTable::from_entries(document.steps)?
        };
        let partition_sequence = match document.partition_sequence {
            Some(terms) => PartitionSequence::from_terms(terms)?,
            None => PartitionSequence::reference(),
        };
        let config = Self {
            step_duration,
            stream_count: document.stream_count,
            step_table,
            partition_sequence,
            triadic_sync: document.triadic_sync,
            sync_coupling_strength: document.sync_coupling_strength,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the step length so a full cycle takes `seconds`.
    #[must_use]
    pub fn with_cycle_duration(mut self, seconds: f64) -> Self {
        self.step_duration = seconds / f64::from(STEP_COUNT);
        self
    }

    /// Sets the step length directly.
    #[must_use]
    pub fn with_step_duration(mut self, seconds: f64) -> Self {
        self.step_duration = seconds;
        self
    }

    /// Coupling handed to the synchronizer; `None` when the barrier is off.
    #[must_use]
    pub fn sync_coupling(&self) -> Option<f64> {
        self.triadic_sync.then_some(self.sync_coupling_strength)
    }

    /// Seconds per full cycle.
    #[must_use]
    pub fn cycle_duration(&self) -> f64 {
        self.step_duration * f64::from(STEP_COUNT)
    }

    /// Runs every construction-time check.
    pub fn validate(&self) -> SchedulerResult<()> {
        if !self.step_duration.is_finite() || self.step_duration <= 0.0 {
            return Err(SchedulerError::Configuration(format!(
                "step duration must be a positive number of seconds, got {}",
                self.step_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.sync_coupling_strength) {
            return Err(SchedulerError::Configuration(format!(
                "sync coupling strength must lie in [0, 1], got {}",
                self.sync_coupling_strength
            )));
        }
        if self.stream_count != SUPPORTED_STREAM_COUNT {
            return Err(SchedulerError::Configuration(format!(
                "stream count {} unsupported, nesting boundaries are defined for {SUPPORTED_STREAM_COUNT}",
                self.stream_count
            )));
        }
        StreamSet::new(self.stream_count)?;
        self.step_table
            .validate_against(self.stream_count, self.partition_sequence.levels())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    #[serde(default)]
    step_duration: Option<f64>,
    #[serde(default)]
    cycle_duration: Option<f64>,
    #[serde(default = "default_stream_count")]
    stream_count: u32,
    #[serde(default)]
    steps: Vec<StepEntry>,
    #[serde(default)]
    partition_sequence: Option<Vec<u32>>,
    #[serde(default = "default_triadic_sync")]
    triadic_sync: bool,
    #[serde(default = "default_sync_coupling")]
    sync_coupling_strength: f64,
}
