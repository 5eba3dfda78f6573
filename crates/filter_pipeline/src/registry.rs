use std::collections::BTreeMap;

use schemars::{schema::RootSchema, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    error::{PipelineError, Result},
    filters::{
        CreateAttributeMatrix,
        CreateDataArray,
        CreateDataContainer,
        DataContainerReader,
        DataContainerWriter,
        DeleteData,
        RenameDataArray,
        ReplaceValueInArray,
    },
    traits::Filter,
};

/// Description of a registered filter class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct FilterInfo {
    /// Class name used in pipeline files
    pub name: String,
    pub human_label: String,
    pub group: String,
    pub sub_group: String,
}

type Factory = fn(serde_json::Value) -> Result<Box<dyn Filter>>;
type SchemaFn = fn() -> RootSchema;

struct Registration {
    info: FilterInfo,
    factory: Factory,
    schema: SchemaFn,
}

fn build<F>(params: serde_json::Value) -> Result<Box<dyn Filter>>
where
    F: Filter + DeserializeOwned + 'static,
{
    let params = match params {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other,
    };
    let filter: F = serde_json::from_value(params).map_err(|e| PipelineError::InvalidParameters {
        filter: std::any::type_name::<F>().rsplit("::").next().unwrap_or_default().to_string(),
        message: e.to_string(),
    })?;
    Ok(Box::new(filter))
}

fn schema<F: JsonSchema>() -> RootSchema {
    schemars::schema_for!(F)
}

/// Maps filter class names to constructors.
///
/// Pipelines loaded from files resolve their filters through a registry, so
/// callers decide which filters are available by what they register.
#[derive(Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, Registration>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in filter
    pub fn with_core_filters() -> Self {
        let mut registry = Self::new();
        registry
            .register::<CreateDataContainer>()
            .register::<CreateAttributeMatrix>()
            .register::<CreateDataArray>()
            .register::<ReplaceValueInArray>()
            .register::<RenameDataArray>()
            .register::<DeleteData>()
            .register::<DataContainerWriter>()
            .register::<DataContainerReader>();
        registry
    }

    /// Register `F` under the class name its default instance reports.
    /// Registering the same name again replaces the earlier entry.
    pub fn register<F>(&mut self) -> &mut Self
    where
        F: Filter + Default + DeserializeOwned + JsonSchema + 'static,
    {
        let prototype = F::default();
        let info = FilterInfo {
            name: prototype.name().to_string(),
            human_label: prototype.human_label().to_string(),
            group: prototype.group().to_string(),
            sub_group: prototype.sub_group().to_string(),
        };
        tracing::debug!(filter = %info.name, "Registering filter");
        self.filters.insert(
            info.name.clone(),
            Registration {
                info,
                factory: build::<F>,
                schema: schema::<F>,
            },
        );
        self
    }

    /// Build a filter from its class name and parameter object.
    /// `null` parameters give the filter's defaults.
    pub fn create(&self, name: &str, params: serde_json::Value) -> Result<Box<dyn Filter>> {
        let registration = self
            .filters
            .get(name)
            .ok_or_else(|| PipelineError::UnknownFilter(name.to_string()))?;
        (registration.factory)(params).map_err(|err| match err {
            PipelineError::InvalidParameters { message, .. } => PipelineError::InvalidParameters {
                filter: name.to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn create_default(&self, name: &str) -> Result<Box<dyn Filter>> {
        self.create(name, serde_json::Value::Null)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn info(&self, name: &str) -> Option<&FilterInfo> {
        self.filters.get(name).map(|r| &r.info)
    }

    /// All registered filters, sorted by class name
    pub fn list(&self) -> Vec<FilterInfo> {
        self.filters.values().map(|r| r.info.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }

    /// Distinct group names
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.filters.values().map(|r| r.info.group.clone()).collect();
        groups.sort();
        groups.dedup();
        groups
    }

    /// JSON schema of a filter's parameter object
    pub fn schema(&self, name: &str) -> Result<RootSchema> {
        self.filters
            .get(name)
            .map(|r| (r.schema)())
            .ok_or_else(|| PipelineError::UnknownFilter(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FilterParameters;
    use serde_json::json;

    #[test]
    fn test_core_filters_registered() {
        let registry = FilterRegistry::with_core_filters();
        assert_eq!(registry.len(), 8);
        assert!(registry.contains("ReplaceValueInArray"));
        assert!(registry.contains("RemoveArrays"));
        assert_eq!(registry.groups(), vec!["Core".to_string(), "IO".to_string()]);

        let info = registry.info("CreateDataArray").unwrap();
        assert_eq!(info.human_label, "Create Data Array");
        assert_eq!(info.sub_group, "Generation");
    }

    #[test]
    fn test_create_from_parameters() {
        let registry = FilterRegistry::with_core_filters();
        let filter = registry
            .create(
                "ReplaceValueInArray",
                json!({
                    "SelectedArray": { "DataContainer": "Image", "AttributeMatrix": "Cells", "DataArray": "Phases" },
                    "RemoveValue": 1.0,
                    "ReplaceValue": 2.0
                }),
            )
            .unwrap();
        assert_eq!(filter.name(), "ReplaceValueInArray");
        let params = filter.to_parameters().unwrap();
        assert_eq!(params["ReplaceValue"], 2.0);
        assert_eq!(params["SelectedArray"]["DataArray"], "Phases");
    }

    #[test]
    fn test_null_parameters_use_defaults() {
        let registry = FilterRegistry::with_core_filters();
        let filter = registry.create_default("CreateDataArray").unwrap();
        assert_eq!(filter.to_parameters().unwrap()["NumberOfComponents"], 1);
    }

    #[test]
    fn test_unknown_and_invalid() {
        let registry = FilterRegistry::with_core_filters();
        assert!(matches!(
            registry.create("NoSuchFilter", json!({})),
            Err(PipelineError::UnknownFilter(name)) if name == "NoSuchFilter"
        ));
        assert!(matches!(
            registry.create("CreateDataArray", json!({ "NumberOfComponents": "three" })),
            Err(PipelineError::InvalidParameters { filter, .. }) if filter == "CreateDataArray"
        ));
    }

    #[test]
    fn test_schema_lists_parameters() {
        let registry = FilterRegistry::with_core_filters();
        let schema = serde_json::to_value(registry.schema("CreateAttributeMatrix").unwrap()).unwrap();
        let properties = &schema["properties"];
        assert!(properties.get("CreatedAttributeMatrix").is_some());
        assert!(properties.get("TupleDimensions").is_some());
        assert!(registry.schema("Missing").is_err());
    }
}
