use std::{
    fs,
    path::{Path, PathBuf},
};

use filter_pipeline::{DataContainerArray, FilterPipeline, FilterRegistry, PipelineError, io};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Parameter name suffix of values the pipeline writes to
const OUTPUT_SUFFIX: &str = "OutputFile";

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Preflight found {0} error(s)")]
    PreflightFailed(usize),
    #[error("Pipeline {0}")]
    RunFailed(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// How `filter-cli run` behaves. Every field can be overridden from the command line.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Validate the whole pipeline before executing it
    pub preflight_first: bool,
    /// Refuse to execute when the preflight reports errors
    pub stop_on_preflight_errors: bool,
    /// Directory that relative `*OutputFile` parameters are resolved against
    pub output_dir: Option<PathBuf>,
    /// Data snapshot the run starts from instead of an empty context
    pub seed_file: Option<PathBuf>,
    /// Where to write the data context once the run completes
    pub save_data_to: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            preflight_first: true,
            stop_on_preflight_errors: true,
            output_dir: None,
            seed_file: None,
            save_data_to: None,
        }
    }
}

impl RunSettings {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load settings
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The data the run starts from: the seed snapshot, or an empty context
    pub fn load_seed(&self) -> Result<DataContainerArray, CliError> {
        match &self.seed_file {
            Some(path) => Ok(DataContainerArray::from_json_file(path)?),
            None => Ok(DataContainerArray::new()),
        }
    }

    /// Load a pipeline file, resolving relative output paths against `output_dir`
    pub fn load_pipeline<P: AsRef<Path>>(&self, path: P, registry: &FilterRegistry) -> Result<FilterPipeline, CliError> {
        let mut document = io::read_document(path)?;
        if let Some(dir) = &self.output_dir {
            resolve_output_paths(&mut document, dir);
        }
        Ok(io::from_json_value(&document, registry)?)
    }
}

/// Prefix every relative `*OutputFile` parameter in a pipeline document with `dir`.
/// Returns the rewritten paths.
pub fn resolve_output_paths(document: &mut Value, dir: &Path) -> Vec<PathBuf> {
    let mut resolved = Vec::new();
    let Some(root) = document.as_object_mut() else {
        return resolved;
    };
    for (key, entry) in root.iter_mut() {
        if key == io::BUILDER_KEY {
            continue;
        }
        let Some(params) = entry.as_object_mut() else {
            continue;
        };
        for (name, value) in params.iter_mut() {
            if !name.ends_with(OUTPUT_SUFFIX) {
                continue;
            }
            let Some(path) = value.as_str().map(Path::new) else {
                continue;
            };
            if path.as_os_str().is_empty() || path.is_absolute() {
                continue;
            }
            let joined = dir.join(path);
            *value = Value::from(joined.to_string_lossy().into_owned());
            resolved.push(joined);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings = RunSettings::from_toml("log_filter = \"debug\"\n").unwrap();
        assert_eq!(settings.log_filter, "debug");
        assert!(settings.preflight_first);
        assert!(settings.stop_on_preflight_errors);
        assert_eq!(settings.output_dir, None);
    }

    #[test]
    fn test_settings_toml_and_json_agree() {
        let settings = RunSettings {
            output_dir: Some(PathBuf::from("out")),
            preflight_first: false,
            ..Default::default()
        };
        assert_eq!(RunSettings::from_toml(&settings.to_toml().unwrap()).unwrap(), settings);
        assert_eq!(RunSettings::from_json(&settings.to_json().unwrap()).unwrap(), settings);
    }

    #[test]
    fn test_settings_rejects_unknown_extension() {
        assert!(matches!(
            RunSettings::from_file("settings.yaml"),
            Err(CliError::UnsupportedFileFormat)
        ));
    }

    #[test]
    fn test_relative_outputs_are_resolved() {
        let mut document = json!({
            "0": { "Filter_Name": "DataContainerWriter", "OutputFile": "result.json" },
            "1": { "Filter_Name": "DataContainerWriter", "OutputFile": "/abs/result.json" },
            "2": { "Filter_Name": "DataContainerReader", "InputFile": "seed.json" },
            "PipelineBuilder": { "Name": "Outputs", "Number_Filters": 3, "Version": 6 }
        });
        let resolved = resolve_output_paths(&mut document, Path::new("runs/today"));

        assert_eq!(resolved, vec![Path::new("runs/today").join("result.json")]);
        assert_eq!(document["1"]["OutputFile"], "/abs/result.json");
        assert_eq!(document["2"]["InputFile"], "seed.json");
    }

    #[test]
    fn test_load_pipeline_with_output_dir() {
        let dir = std::env::temp_dir().join(format!("filter_cli_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("pipeline.json");
        fs::write(
            &file,
            json!({
                "0": { "Filter_Name": "CreateDataContainer", "DataContainerName": "Image" },
                "1": { "Filter_Name": "DataContainerWriter", "OutputFile": "snapshot.json" },
                "PipelineBuilder": { "Name": "Write", "Number_Filters": 2, "Version": 6 }
            })
            .to_string(),
        )
        .unwrap();

        let settings = RunSettings {
            output_dir: Some(dir.clone()),
            ..Default::default()
        };
        let registry = FilterRegistry::with_core_filters();
        let mut pipeline = settings.load_pipeline(&file, &registry).unwrap();
        let mut data = settings.load_seed().unwrap();
        assert!(pipeline.execute(&mut data).is_success());
        assert!(dir.join("snapshot.json").exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
