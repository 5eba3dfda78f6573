//! # Filter Kit Common - Shared Types and Utilities
//!
//! Shared value types used across the Filter Kit crates: addressing data inside a
//! data container array, the numeric element types a data array can hold, and the
//! message records a running pipeline publishes to its observers.
//!
//! ## Example
//!
//! ```rust
//! use filter_kit_common::{DataArrayPath, NumericType, PipelineMessage};
//!
//! let path: DataArrayPath = "ImageDataContainer/CellData/Phases".parse().unwrap();
//! assert_eq!(path.data_array, "Phases");
//!
//! assert!(NumericType::UInt8.contains(255.0));
//! assert!(!NumericType::UInt8.contains(256.0));
//!
//! let msg = PipelineMessage::error("Replace Value", 1, -5, "array missing");
//! println!("{}", msg);
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use thiserror::Error;

// Re-exports for convenience
pub use chrono::{DateTime, Utc};

/// Result type for filter kit value operations
pub type Result<T> = std::result::Result<T, KitError>;

/// Standard error type for filter kit value operations
#[derive(Error, Debug)]
pub enum KitError {
    #[error("Invalid data array path: {path}")]
    InvalidPath { path: String },

    #[error("Value {value} is out of range for {numeric_type}")]
    ValueOutOfRange { value: f64, numeric_type: NumericType },

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Address of a data array inside a data container array:
/// `DataContainer / AttributeMatrix / DataArray`.
///
/// Trailing components may be empty when the path only names a container or a matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct DataArrayPath {
    pub data_container: String,
    #[serde(default)]
    pub attribute_matrix: String,
    #[serde(default)]
    pub data_array: String,
}

impl DataArrayPath {
    pub const SEPARATOR: char = '/';

    /// Create a full path to a data array
    pub fn new(
        data_container: impl Into<String>,
        attribute_matrix: impl Into<String>,
        data_array: impl Into<String>,
    ) -> Self {
        Self {
            data_container: data_container.into(),
            attribute_matrix: attribute_matrix.into(),
            data_array: data_array.into(),
        }
    }

    /// Path naming only a data container
    pub fn container(data_container: impl Into<String>) -> Self {
        Self::new(data_container, "", "")
    }

    /// Path naming an attribute matrix
    pub fn matrix(data_container: impl Into<String>, attribute_matrix: impl Into<String>) -> Self {
        Self::new(data_container, attribute_matrix, "")
    }

    /// Same container and matrix, different array name
    pub fn with_data_array(&self, data_array: impl Into<String>) -> Self {
        Self::new(self.data_container.clone(), self.attribute_matrix.clone(), data_array)
    }

    /// Truncate this path to its attribute matrix
    pub fn matrix_path(&self) -> Self {
        Self::matrix(self.data_container.clone(), self.attribute_matrix.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.data_container.is_empty() && self.attribute_matrix.is_empty() && self.data_array.is_empty()
    }

    /// True when all three levels are named
    pub fn is_complete(&self) -> bool {
        !self.data_container.is_empty() && !self.attribute_matrix.is_empty() && !self.data_array.is_empty()
    }

    /// Check that names do not contain the separator and that no level is
    /// named without its parents.
    pub fn validate(&self) -> Result<()> {
        let levels = [&self.data_container, &self.attribute_matrix, &self.data_array];
        if levels.iter().any(|name| name.contains(Self::SEPARATOR)) {
            return Err(KitError::InvalidPath { path: self.to_string() });
        }
        let mut seen_gap = false;
        for name in levels {
            if name.is_empty() {
                seen_gap = true;
            } else if seen_gap {
                return Err(KitError::InvalidPath { path: self.to_string() });
            }
        }
        Ok(())
    }
}

impl fmt::Display for DataArrayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_container)?;
        if !self.attribute_matrix.is_empty() || !self.data_array.is_empty() {
            write!(f, "{}{}", Self::SEPARATOR, self.attribute_matrix)?;
        }
        if !self.data_array.is_empty() {
            write!(f, "{}{}", Self::SEPARATOR, self.data_array)?;
        }
        Ok(())
    }
}

impl FromStr for DataArrayPath {
    type Err = KitError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(Self::SEPARATOR).collect();
        if parts.len() > 3 || parts.iter().all(|p| p.is_empty()) {
            return Err(KitError::InvalidPath { path: s.to_string() });
        }
        let path = Self::new(
            parts[0],
            parts.get(1).copied().unwrap_or_default(),
            parts.get(2).copied().unwrap_or_default(),
        );
        path.validate()?;
        Ok(path)
    }
}

/// Element type of a data array
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    #[default]
    Double,
    Bool,
}

impl NumericType {
    /// Inclusive range of values representable by this type
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::Int8 => (i8::MIN as f64, i8::MAX as f64),
            Self::UInt8 => (0.0, u8::MAX as f64),
            Self::Int16 => (i16::MIN as f64, i16::MAX as f64),
            Self::UInt16 => (0.0, u16::MAX as f64),
            Self::Int32 => (i32::MIN as f64, i32::MAX as f64),
            Self::UInt32 => (0.0, u32::MAX as f64),
            Self::Int64 => (i64::MIN as f64, i64::MAX as f64),
            Self::UInt64 => (0.0, u64::MAX as f64),
            Self::Float => (f32::MIN as f64, f32::MAX as f64),
            Self::Double => (f64::MIN, f64::MAX),
            Self::Bool => (0.0, 1.0),
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Float | Self::Double)
    }

    /// Whether `value` can be stored in this type without leaving its range
    pub fn contains(&self, value: f64) -> bool {
        if value.is_nan() {
            return !self.is_integer();
        }
        let (min, max) = self.range();
        value >= min && value <= max
    }

    /// Convert `value` to this type's representation, rejecting out-of-range values
    pub fn coerce(&self, value: f64) -> Result<f64> {
        if !self.contains(value) {
            return Err(KitError::ValueOutOfRange { value, numeric_type: *self });
        }
        Ok(match self {
            Self::Bool => if value != 0.0 { 1.0 } else { 0.0 },
            Self::Float => value as f32 as f64,
            Self::Double => value,
            _ => value.trunc(),
        })
    }
}

/// Kind of message published while a pipeline preflights or executes
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
    PartialEq, Eq, Hash,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Error,
    Warning,
    StatusMessage,
    ProgressValue,
}

/// A message produced during preflight or execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineMessage {
    pub message_type: MessageType,
    /// Human label of the originating filter, or the pipeline name for pipeline-level messages
    pub prefix: String,
    /// Class name of the originating filter, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    /// 0-based position of the originating filter in the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_index: Option<usize>,
    /// Error or warning code; 0 for status and progress messages
    pub code: i32,
    pub text: String,
    /// Percent complete, for progress messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

impl PipelineMessage {
    fn new(message_type: MessageType, prefix: impl Into<String>, code: i32, text: impl Into<String>) -> Self {
        Self {
            message_type,
            prefix: prefix.into(),
            filter_name: None,
            pipeline_index: None,
            code,
            text: text.into(),
            progress: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(prefix: impl Into<String>, pipeline_index: usize, code: i32, text: impl Into<String>) -> Self {
        Self::new(MessageType::Error, prefix, code, text).at_index(pipeline_index)
    }

    pub fn warning(prefix: impl Into<String>, pipeline_index: usize, code: i32, text: impl Into<String>) -> Self {
        Self::new(MessageType::Warning, prefix, code, text).at_index(pipeline_index)
    }

    /// Status message not tied to a filter position
    pub fn status(prefix: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageType::StatusMessage, prefix, 0, text)
    }

    pub fn progress(prefix: impl Into<String>, progress: u8, text: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::ProgressValue, prefix, 0, text);
        msg.progress = Some(progress.min(100));
        msg
    }

    pub fn at_index(mut self, pipeline_index: usize) -> Self {
        self.pipeline_index = Some(pipeline_index);
        self
    }

    pub fn from_filter(mut self, filter_name: impl Into<String>) -> Self {
        self.filter_name = Some(filter_name.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.message_type == MessageType::Error
    }

    pub fn is_warning(&self) -> bool {
        self.message_type == MessageType::Warning
    }
}

impl fmt::Display for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pipeline_index {
            Some(index) => write!(f, "[{}] {}", index, self.prefix)?,
            None => write!(f, "{}", self.prefix)?,
        }
        match self.message_type {
            MessageType::Error | MessageType::Warning => {
                write!(f, " {} ({}): {}", self.message_type, self.code, self.text)
            }
            MessageType::ProgressValue => {
                write!(f, " {}% {}", self.progress.unwrap_or_default(), self.text)
            }
            MessageType::StatusMessage => write!(f, ": {}", self.text),
        }
    }
}

/// Utility functions
pub mod utils {
    use super::*;

    /// Format a duration in milliseconds as `H:MM:SS.mmm`
    pub fn format_elapsed(millis: u128) -> String {
        let total_seconds = millis / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, secs, millis % 1000)
    }

    /// Parse a comma separated list of dimensions such as `"10, 20, 5"`
    pub fn parse_dims(text: &str) -> Result<Vec<usize>> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .map_err(|_| KitError::Parse(format!("Invalid dimension '{}'", s)))
            })
            .collect()
    }

    /// Get file extension from filename, lowercased
    pub fn get_file_extension(filename: &str) -> Option<String> {
        std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Ensure output directory exists
    pub fn ensure_output_dir(path: &str) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display_and_parse() {
        let path = DataArrayPath::new("Small IN100", "EBSD Data", "Phases");
        assert_eq!(path.to_string(), "Small IN100/EBSD Data/Phases");

        let parsed: DataArrayPath = "Small IN100/EBSD Data/Phases".parse().unwrap();
        assert_eq!(parsed, path);

        let matrix: DataArrayPath = "Small IN100/EBSD Data".parse().unwrap();
        assert_eq!(matrix, path.matrix_path());
        assert!(!matrix.is_complete());
    }

    #[test]
    fn test_invalid_paths() {
        assert!("a/b/c/d".parse::<DataArrayPath>().is_err());
        assert!("".parse::<DataArrayPath>().is_err());
        assert!("a//c".parse::<DataArrayPath>().is_err());
        assert!(DataArrayPath::new("", "Matrix", "Array").validate().is_err());
    }

    #[test]
    fn test_numeric_ranges() {
        assert!(NumericType::Int8.contains(-128.0));
        assert!(!NumericType::Int8.contains(128.0));
        assert!(!NumericType::UInt32.contains(-1.0));
        assert!(NumericType::Double.contains(1.0e300));
        assert!(!NumericType::Int32.contains(f64::NAN));
        assert!(NumericType::Float.contains(f64::NAN));
    }

    #[test]
    fn test_numeric_coerce() {
        assert_eq!(NumericType::Int32.coerce(3.9).unwrap(), 3.0);
        assert_eq!(NumericType::Bool.coerce(1.0).unwrap(), 1.0);
        assert!(NumericType::UInt8.coerce(300.0).is_err());
    }

    #[test]
    fn test_numeric_type_names() {
        assert_eq!(NumericType::UInt16.to_string(), "uint16");
        assert_eq!("float".parse::<NumericType>().unwrap(), NumericType::Float);
    }

    #[test]
    fn test_message_display() {
        let msg = PipelineMessage::error("Replace Value", 1, -5, "array missing");
        assert_eq!(msg.to_string(), "[1] Replace Value error (-5): array missing");

        let status = PipelineMessage::status("Pipeline", "Starting");
        assert_eq!(status.to_string(), "Pipeline: Starting");
        assert!(status.pipeline_index.is_none());
    }

    #[test]
    fn test_progress_is_clamped() {
        let msg = PipelineMessage::progress("Pipeline", 150, "done");
        assert_eq!(msg.progress, Some(100));
    }

    #[test]
    fn test_utils() {
        assert_eq!(utils::format_elapsed(3_725_042), "1:02:05.042");
        assert_eq!(utils::parse_dims("10, 20,5").unwrap(), vec![10, 20, 5]);
        assert!(utils::parse_dims("10, x").is_err());
        assert_eq!(utils::get_file_extension("pipe.JSON"), Some("json".to_string()));
    }
}
