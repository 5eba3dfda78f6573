//! Per-request working directories for pipelines run by the service.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use serde_json::Value;

use crate::{
    error::{PipelineError, Result},
    io::BUILDER_KEY,
};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Parameter name suffixes whose values are file paths to relocate
const INPUT_SUFFIX: &str = "InputFile";
const OUTPUT_SUFFIX: &str = "OutputFile";

/// Fresh session id: UTC timestamp plus a process-wide counter
pub fn new_session_id() -> String {
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"), n)
}

/// Session ids become directory names, so only plain names are accepted
pub fn validate_session_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id != "."
        && id != ".."
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(PipelineError::MalformedPipeline(format!("invalid session id '{}'", id)))
    }
}

/// Paths a relocated pipeline will read and write
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RelocatedFiles {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// Point every `*InputFile` / `*OutputFile` parameter of every filter at a file of
/// the same name inside `session_dir`. Directories in the original paths are dropped.
pub fn relocate_paths(document: &mut Value, session_dir: &Path) -> Result<RelocatedFiles> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| PipelineError::MalformedPipeline("top level is not an object".into()))?;

    let mut files = RelocatedFiles::default();
    for (key, entry) in root.iter_mut() {
        if key == BUILDER_KEY {
            continue;
        }
        let Some(params) = entry.as_object_mut() else {
            continue;
        };
        for (name, value) in params.iter_mut() {
            let is_input = name.ends_with(INPUT_SUFFIX);
            if !is_input && !name.ends_with(OUTPUT_SUFFIX) {
                continue;
            }
            let Some(path) = value.as_str() else {
                continue;
            };
            let file_name = Path::new(path).file_name().ok_or_else(|| {
                PipelineError::MalformedPipeline(format!("{} '{}' of filter {} does not name a file", name, path, key))
            })?;
            let relocated = session_dir.join(file_name);
            *value = Value::from(relocated.to_string_lossy().into_owned());
            if is_input {
                files.inputs.push(relocated);
            } else {
                files.outputs.push(relocated);
            }
        }
    }
    Ok(files)
}
