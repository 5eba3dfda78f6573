//! Pipeline files.
//!
//! A pipeline is stored as one object with a numbered entry per filter and a
//! `PipelineBuilder` header:
//!
//! ```json
//! {
//!   "0": { "Filter_Name": "CreateDataContainer", "Filter_Human_Label": "Create Data Container",
//!          "Filter_Enabled": true, "DataContainerName": "Image" },
//!   "PipelineBuilder": { "Name": "Example", "Number_Filters": 1, "Version": 6 }
//! }
//! ```
//!
//! The filter's own parameters sit next to the `Filter_*` keys. TOML files hold
//! the same document; the format is picked from the file extension.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    error::{PipelineError, Result},
    pipeline::{FilterNode, FilterPipeline},
    registry::FilterRegistry,
    traits::FilterParameters,
};

pub const PIPELINE_VERSION: u32 = 6;
pub const BUILDER_KEY: &str = "PipelineBuilder";

const FILTER_NAME: &str = "Filter_Name";
const FILTER_HUMAN_LABEL: &str = "Filter_Human_Label";
const FILTER_ENABLED: &str = "Filter_Enabled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineHeader {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Number_Filters")]
    pub number_filters: usize,
    #[serde(rename = "Version", default)]
    pub version: u32,
}

/// File formats a pipeline can be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineFormat {
    Json,
    Toml,
}

impl PipelineFormat {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(PipelineError::UnsupportedFileFormat),
        }
    }
}

/// Build the pipeline document
pub fn to_json_value(pipeline: &FilterPipeline) -> Result<Value> {
    let mut root = Map::new();
    for (index, node) in pipeline.iter().enumerate() {
        let filter = node.filter();
        let mut entry = match filter.to_parameters()? {
            Value::Object(params) => params,
            Value::Null => Map::new(),
            other => {
                return Err(PipelineError::MalformedPipeline(format!(
                    "parameters of {} serialize to {} instead of an object",
                    filter.name(),
                    other
                )))
            }
        };
        entry.insert(FILTER_NAME.into(), Value::from(filter.name()));
        entry.insert(FILTER_HUMAN_LABEL.into(), Value::from(filter.human_label()));
        entry.insert(FILTER_ENABLED.into(), Value::from(node.is_enabled()));
        root.insert(index.to_string(), Value::Object(entry));
    }

    let header = PipelineHeader {
        name: pipeline.name().to_string(),
        number_filters: pipeline.len(),
        version: PIPELINE_VERSION,
    };
    root.insert(BUILDER_KEY.into(), serde_json::to_value(header)?);
    Ok(Value::Object(root))
}

/// Rebuild a pipeline from its document, creating each filter through `registry`.
///
/// A filter class the registry does not know fails the whole load.
pub fn from_json_value(document: &Value, registry: &FilterRegistry) -> Result<FilterPipeline> {
    let root = document
        .as_object()
        .ok_or_else(|| PipelineError::MalformedPipeline("top level is not an object".into()))?;
    let header: PipelineHeader = root
        .get(BUILDER_KEY)
        .cloned()
        .map(serde_json::from_value::<PipelineHeader>)
        .transpose()?
        .ok_or_else(|| PipelineError::MalformedPipeline(format!("missing '{}' header", BUILDER_KEY)))?;
    if header.version > PIPELINE_VERSION {
        warn!(version = header.version, supported = PIPELINE_VERSION, "Pipeline file is newer than this reader");
    }

    let mut pipeline = FilterPipeline::new(header.name);
    for index in 0..header.number_filters {
        let mut entry = match root.get(&index.to_string()) {
            Some(Value::Object(entry)) => entry.clone(),
            Some(_) => {
                return Err(PipelineError::MalformedPipeline(format!("filter {} is not an object", index)))
            }
            None => return Err(PipelineError::MalformedPipeline(format!("filter {} is missing", index))),
        };

        let name = match entry.remove(FILTER_NAME) {
            Some(Value::String(name)) => name,
            _ => {
                return Err(PipelineError::MalformedPipeline(format!(
                    "filter {} has no {}",
                    index, FILTER_NAME
                )))
            }
        };
        entry.remove(FILTER_HUMAN_LABEL);
        let enabled = entry
            .remove(FILTER_ENABLED)
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        debug!(index, filter = %name, "Loading filter");
        let mut node = FilterNode::from_boxed(registry.create(&name, Value::Object(entry))?);
        node.set_enabled(enabled);
        pipeline.push_back(node);
    }
    Ok(pipeline)
}

pub fn to_json_string(pipeline: &FilterPipeline) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json_value(pipeline)?)?)
}

pub fn from_json_str(content: &str, registry: &FilterRegistry) -> Result<FilterPipeline> {
    let document: Value = serde_json::from_str(content)?;
    from_json_value(&document, registry)
}

pub fn to_toml_string(pipeline: &FilterPipeline) -> Result<String> {
    Ok(toml::to_string_pretty(&to_json_value(pipeline)?)?)
}

pub fn from_toml_str(content: &str, registry: &FilterRegistry) -> Result<FilterPipeline> {
    let document: Value = toml::from_str(content)?;
    from_json_value(&document, registry)
}

/// Write `pipeline` as JSON or TOML depending on the extension of `path`
pub fn save_pipeline<P: AsRef<Path>>(pipeline: &FilterPipeline, path: P) -> Result<()> {
    let content = match PipelineFormat::from_path(&path)? {
        PipelineFormat::Json => to_json_string(pipeline)?,
        PipelineFormat::Toml => to_toml_string(pipeline)?,
    };
    fs::write(path, content)?;
    Ok(())
}

/// Read the raw document of a JSON or TOML pipeline file without creating filters
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Value> {
    let format = PipelineFormat::from_path(&path)?;
    let content = fs::read_to_string(path)?;
    Ok(match format {
        PipelineFormat::Json => serde_json::from_str(&content)?,
        PipelineFormat::Toml => toml::from_str(&content)?,
    })
}

/// Read a JSON or TOML pipeline file depending on the extension of `path`
pub fn load_pipeline<P: AsRef<Path>>(path: P, registry: &FilterRegistry) -> Result<FilterPipeline> {
    from_json_value(&read_document(path)?, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::DataContainerArray,
        filters::{CreateAttributeMatrix, CreateDataArray, CreateDataContainer, ReplaceValueInArray},
        types::RunOutcome,
    };
    use filter_kit_common::{DataArrayPath, NumericType};
    use serde_json::json;

    fn sample() -> FilterPipeline {
        let path = DataArrayPath::new("Image", "Cells", "Phases");
        FilterPipeline::builder()
            .name("Sample")
            .add_filter(CreateDataContainer::new("Image"))
            .add_filter(CreateAttributeMatrix::new(path.matrix_path(), vec![2, 2]))
            .add_filter(CreateDataArray::new(path.clone(), NumericType::Int16, 1, 4.0))
            .add_disabled_filter(ReplaceValueInArray::new(path, 4.0, 8.0))
            .build()
    }

    #[test]
    fn test_document_layout() {
        let document = to_json_value(&sample()).unwrap();
        assert_eq!(document["PipelineBuilder"], json!({ "Name": "Sample", "Number_Filters": 4, "Version": 6 }));
        assert_eq!(document["0"]["Filter_Name"], "CreateDataContainer");
        assert_eq!(document["0"]["Filter_Human_Label"], "Create Data Container");
        assert_eq!(document["0"]["DataContainerName"], "Image");
        assert_eq!(document["2"]["ScalarType"], "int16");
        assert_eq!(document["3"]["Filter_Enabled"], false);
    }

    #[test]
    fn test_load_preserves_order_parameters_and_flags() {
        let registry = FilterRegistry::with_core_filters();
        let text = to_json_string(&sample()).unwrap();
        let mut loaded = from_json_str(&text, &registry).unwrap();

        assert_eq!(loaded.name(), "Sample");
        assert_eq!(
            loaded.labels(),
            ["Create Data Container", "Create Attribute Matrix", "Create Data Array", "Replace Value"]
        );
        assert!(!loaded.get(3).unwrap().is_enabled());
        assert_eq!(to_json_value(&loaded).unwrap(), to_json_value(&sample()).unwrap());

        let mut data = DataContainerArray::new();
        assert_eq!(loaded.execute(&mut data), RunOutcome::Completed);
        let phases = data.data_array(&DataArrayPath::new("Image", "Cells", "Phases")).unwrap();
        assert_eq!(phases.values().unwrap(), &[4.0; 4]);
    }

    #[test]
    fn test_toml_carries_the_same_document() {
        let registry = FilterRegistry::with_core_filters();
        let text = to_toml_string(&sample()).unwrap();
        assert!(text.contains("Filter_Name = \"CreateDataContainer\""));
        let loaded = from_toml_str(&text, &registry).unwrap();
        assert_eq!(to_json_value(&loaded).unwrap(), to_json_value(&sample()).unwrap());
    }

    #[test]
    fn test_unknown_filter_fails_load() {
        let registry = FilterRegistry::with_core_filters();
        let document = json!({
            "0": { "Filter_Name": "GenerateMisorientationColors", "Filter_Enabled": true },
            "PipelineBuilder": { "Name": "Plugin", "Number_Filters": 1, "Version": 6 }
        });
        assert!(matches!(
            from_json_value(&document, &registry),
            Err(PipelineError::UnknownFilter(name)) if name == "GenerateMisorientationColors"
        ));
    }

    #[test]
    fn test_malformed_documents() {
        let registry = FilterRegistry::with_core_filters();
        let no_header = json!({ "0": { "Filter_Name": "CreateDataContainer" } });
        assert!(matches!(from_json_value(&no_header, &registry), Err(PipelineError::MalformedPipeline(_))));

        let missing_entry = json!({ "PipelineBuilder": { "Name": "Gap", "Number_Filters": 2 } });
        assert!(matches!(from_json_value(&missing_entry, &registry), Err(PipelineError::MalformedPipeline(_))));
    }

    #[test]
    fn test_missing_enabled_flag_defaults_to_enabled() {
        let registry = FilterRegistry::with_core_filters();
        let document = json!({
            "0": { "Filter_Name": "CreateDataContainer", "DataContainerName": "Image" },
            "PipelineBuilder": { "Name": "Old", "Number_Filters": 1, "Version": 1 }
        });
        let pipeline = from_json_value(&document, &registry).unwrap();
        assert!(pipeline.get(0).unwrap().is_enabled());
    }

    #[test]
    fn test_save_and_load_by_extension() {
        let registry = FilterRegistry::with_core_filters();
        let dir = std::env::temp_dir().join(format!("filter_pipeline_io_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        for file in ["pipeline.json", "pipeline.toml"] {
            let path = dir.join(file);
            save_pipeline(&sample(), &path).unwrap();
            let loaded = load_pipeline(&path, &registry).unwrap();
            assert_eq!(loaded.len(), 4);
        }
        assert!(matches!(
            save_pipeline(&sample(), dir.join("pipeline.yaml")),
            Err(PipelineError::UnsupportedFileFormat)
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
