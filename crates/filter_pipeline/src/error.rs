use thiserror::Error;

use crate::types::FilterId;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Invalid parameters for {filter}: {message}")]
    InvalidParameters { filter: String, message: String },

    #[error("No filter with id {0} in the pipeline")]
    FilterNotFound(FilterId),

    #[error("Insert position {index} is past the end of a pipeline of {len} filters")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Pipeline is checked out for a run and cannot be edited")]
    PipelineBusy,

    #[error("Invalid run state transition: {from} -> {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Nothing to {0}")]
    EmptyUndoStack(&'static str),

    #[error("Malformed pipeline file: {0}")]
    MalformedPipeline(String),

    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,

    #[error("Pipeline worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Kit(#[from] filter_kit_common::KitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML read error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
