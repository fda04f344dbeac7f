use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the scheduler core.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Domain an out-of-range value was checked against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// Global or stream step index.
    Step,
    /// Nesting level of the partition sequence.
    NestingLevel,
    /// Stream identifier.
    Stream,
    /// Triadic group index.
    TriadicGroup,
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::NestingLevel => write!(f, "nesting level"),
            Self::Stream => write!(f, "stream id"),
            Self::TriadicGroup => write!(f, "triadic group"),
        }
    }
}

/// Errors surfaced by the scheduler core.
///
/// `Configuration` and `InvariantViolation` only come out of construction and are
/// fatal for that configuration. `OutOfRange` is returned by queries and leaves the
/// scheduler untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// Invalid stream count, step duration, or table cardinality.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A query argument fell outside its domain.
    #[error("{kind} {value} outside {min}..={max}")]
    OutOfRange {
        /// What was being looked up.
        kind: RangeKind,
        /// Offending value.
        value: u32,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// Configuration data breaks a structural invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl SchedulerError {
    pub(crate) fn out_of_range(kind: RangeKind, value: u32, min: u32, max: u32) -> Self {
        Self::OutOfRange {
            kind,
            value,
            min,
            max,
        }
    }

    /// True for errors raised while validating configuration.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvariantViolation(_))
    }
}
