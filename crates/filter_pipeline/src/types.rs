use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use strum::{Display, IntoStaticStr};
use ts_rs::TS;

use crate::error::{PipelineError, Result};

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one filter instance for as long as it lives,
/// including while an undo command holds it outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterId(u64);

impl FilterId {
    pub(crate) fn next() -> Self {
        Self(NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Aggregate result of a preflight pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct PreflightReport {
    /// Number of enabled filters whose data check failed
    pub error_count: usize,
    pub warning_count: usize,
    /// Code of the first failing filter, in pipeline order
    pub first_error: Option<i32>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.error_count == 0
    }

    /// Single signed code in the style of a filter error code: 0 when clean
    pub fn error_code(&self) -> i32 {
        self.first_error.unwrap_or(0)
    }
}

/// How an execute pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export)]
pub enum RunOutcome {
    /// Every enabled filter ran without error
    Completed,
    /// The filter at `index` reported `code`; later filters did not run
    Failed { index: usize, code: i32 },
    /// Cancellation was observed before the filter at `index` started, or inside it
    Cancelled { index: usize },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Error code in the filter-code convention: negative on failure
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Failed { code, .. } => *code,
            _ => 0,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed { index, code } => write!(f, "failed at filter {} with code {}", index, code),
            Self::Cancelled { index } => write!(f, "cancelled at filter {}", index),
        }
    }
}

/// Lifecycle of a pipeline run as seen by a front end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Stopped,
}

/// Events that drive [`RunState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunEvent {
    Start,
    Cancel,
    Finish,
    Reset,
}

impl RunState {
    /// `Idle -> Running -> {Stopped | Cancelling -> Idle}`, with `Stopped -> Idle` on reset.
    /// A new run may start from `Idle` or `Stopped`.
    pub fn transition(self, event: RunEvent) -> Result<Self> {
        use RunEvent::*;
        use RunState::*;

        match (self, event) {
            (Idle | Stopped, Start) => Ok(Running),
            (Running, Cancel) => Ok(Cancelling),
            (Cancelling, Cancel) => Ok(Cancelling),
            (Running, Finish) => Ok(Stopped),
            (Cancelling, Finish) => Ok(Idle),
            (Stopped | Idle, Reset) => Ok(Idle),
            (from, event) => Err(PipelineError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }
}
