//! Built-in filters.
//!
//! Each filter is a plain struct of parameters. Deriving `Serialize`/`Deserialize`
//! makes it loadable from pipeline files and `JsonSchema` documents it in the
//! registry.

pub mod generation;
pub mod modification;
pub mod io;

pub use generation::*;
pub use modification::*;
pub use io::*;

use filter_kit_common::DataArrayPath;

use crate::traits::FilterError;

/// Reject paths whose names contain the separator or skip a level
pub(crate) fn check_path(path: &DataArrayPath, code: i32) -> Result<(), FilterError> {
    path.validate()
        .map_err(|e| FilterError::new(code, e.to_string()))
}
