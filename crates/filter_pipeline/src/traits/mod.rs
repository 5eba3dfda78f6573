use filter_kit_common::PipelineMessage;
use serde::Serialize;

use crate::context::FilterContext;

/// Failure reported by a filter: a negative code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct FilterError {
    pub code: i32,
    pub message: String,
}

impl FilterError {
    /// Non-negative codes are not error codes and are mapped to -1.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: if code < 0 { code } else { -1 },
            message: message.into(),
        }
    }
}

pub type FilterResult = std::result::Result<(), FilterError>;

/// Serializes a filter's parameters for pipeline files.
///
/// Implemented for every `Serialize` type; filters get it by deriving `Serialize`.
pub trait FilterParameters {
    fn to_parameters(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T: Serialize> FilterParameters for T {
    fn to_parameters(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// A single named step of a pipeline.
///
/// The engine calls [`Filter::data_check`] alone while preflighting, and
/// `data_check` followed by [`Filter::execute`] while executing. `data_check` should
/// validate parameters against the data left by earlier filters and create the
/// structure later filters depend on, without heavy computation.
/// [`FilterContext::in_preflight`] tells the two passes apart.
pub trait Filter: FilterParameters + Send {
    /// Class name used in pipeline files and the registry
    fn name(&self) -> &'static str;

    /// Label shown to users and attached to messages
    fn human_label(&self) -> &str;

    fn group(&self) -> &'static str {
        "Core"
    }

    fn sub_group(&self) -> &'static str {
        "Misc"
    }

    /// Validate against the current data and create output structure
    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult;

    /// Perform the actual computation. Runs only after a successful `data_check`.
    fn execute(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }
}

/// Receives messages published while a pipeline preflights or executes
pub trait PipelineObserver: Send {
    fn on_message(&mut self, message: &PipelineMessage);
}
