//! # Filter Pipeline Library
//!
//! An engine for ordered pipelines of data-processing filters that share one
//! hierarchical data context.
//!
//! ## Core Features
//!
//! - **Trait-based filters**: implement [`Filter`] with a `data_check` and an `execute` step
//! - **Preflight**: validate a whole pipeline without running it, reporting every error
//! - **Fail-fast execution**: stop at the first filter that reports a negative error code
//! - **Undoable editing**: insert, remove, move and toggle filters through an undo stack
//! - **Background runs**: execute on a worker with cooperative cancellation and streamed messages
//! - **Pipeline files**: numbered-filter JSON documents, or the same document as TOML
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filter_pipeline::{DataArrayPath, DataContainerArray, FilterPipeline, NumericType, RunOutcome};
//!
//! let path = DataArrayPath::new("Image", "Cells", "Phases");
//! let mut pipeline = FilterPipeline::builder()
//!     .name("Example")
//!     .with_tracing()
//!     .create_data_container("Image")
//!     .create_attribute_matrix(path.matrix_path(), vec![10, 10])
//!     .create_data_array(path.clone(), NumericType::Int32, 0.0)
//!     .replace_value(path, 0.0, 1.0)
//!     .build();
//!
//! assert!(pipeline.preflight_pipeline().is_ok());
//!
//! let mut data = DataContainerArray::new();
//! assert_eq!(pipeline.execute(&mut data), RunOutcome::Completed);
//! ```
//!
//! ## Loading a pipeline file
//!
//! ```rust,no_run
//! use filter_pipeline::{io, FilterRegistry};
//!
//! let registry = FilterRegistry::with_core_filters();
//! let mut pipeline = io::load_pipeline("pipeline.json", &registry)?;
//! let report = pipeline.preflight_pipeline();
//! println!("{} errors, {} warnings", report.error_count, report.warning_count);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod traits;
pub mod context;
pub mod data;
pub mod pipeline;
pub mod observer;
pub mod runner;

// Filters and how they are found
pub mod filters;
pub mod registry;

// Editing, persistence and the service
pub mod editing;
pub mod io;
pub mod mcp;

#[cfg(test)]
mod test_helpers;

// Re-exports for convenience
pub use error::{PipelineError, Result};
pub use types::{FilterId, PreflightReport, RunEvent, RunOutcome, RunState};
pub use traits::*;
pub use context::{FilterContext, RunMode};
pub use data::{AttributeMatrix, DataArray, DataContainer, DataContainerArray};
pub use pipeline::{FilterNode, FilterPipeline, builder::PipelineBuilder};
pub use observer::{ChannelObserver, MessageCollector, TracingObserver};
pub use runner::{CancelToken, CompletedRun, RunCanceller, RunHandle};
pub use registry::{FilterInfo, FilterRegistry};
pub use editing::{EditCommand, PipelineEditor, UndoStack};
pub use filter_kit_common::{DataArrayPath, MessageType, NumericType, PipelineMessage};
