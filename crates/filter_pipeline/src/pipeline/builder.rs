use filter_kit_common::{DataArrayPath, NumericType};

use crate::{
    filters::{
        CreateAttributeMatrix,
        CreateDataArray,
        CreateDataContainer,
        DataContainerWriter,
        DeleteData,
        ReplaceValueInArray,
    },
    observer::TracingObserver,
    pipeline::{FilterNode, FilterPipeline},
    traits::{Filter, PipelineObserver},
};

/// Builder for creating pipelines with a fluent API
pub struct PipelineBuilder {
    name: String,
    filters: Vec<FilterNode>,
    observers: Vec<Box<dyn PipelineObserver>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            name: "Untitled Pipeline".to_string(),
            filters: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a filter to the pipeline
    pub fn add_filter<F>(mut self, filter: F) -> Self
    where
        F: Filter + 'static,
    {
        self.filters.push(FilterNode::new(filter));
        self
    }

    /// Append a filter that starts out disabled
    pub fn add_disabled_filter<F>(mut self, filter: F) -> Self
    where
        F: Filter + 'static,
    {
        let mut node = FilterNode::new(filter);
        node.set_enabled(false);
        self.filters.push(node);
        self
    }

    pub fn add_boxed(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(FilterNode::from_boxed(filter));
        self
    }

    pub fn add_observer<O>(mut self, observer: O) -> Self
    where
        O: PipelineObserver + 'static,
    {
        self.observers.push(Box::new(observer));
        self
    }

    /// Forward all messages to `tracing`
    pub fn with_tracing(self) -> Self {
        self.add_observer(TracingObserver)
    }

    /// Create a data container
    pub fn create_data_container(self, name: impl Into<String>) -> Self {
        self.add_filter(CreateDataContainer::new(name))
    }

    /// Create an attribute matrix with the given tuple dimensions
    pub fn create_attribute_matrix(self, path: DataArrayPath, tuple_dims: Vec<usize>) -> Self {
        self.add_filter(CreateAttributeMatrix::new(path, tuple_dims))
    }

    /// Create a single-component array filled with `init`
    pub fn create_data_array(self, path: DataArrayPath, numeric_type: NumericType, init: f64) -> Self {
        self.add_filter(CreateDataArray::new(path, numeric_type, 1, init))
    }

    pub fn replace_value(self, path: DataArrayPath, remove_value: f64, replace_value: f64) -> Self {
        self.add_filter(ReplaceValueInArray::new(path, remove_value, replace_value))
    }

    pub fn delete_data(self, paths: Vec<DataArrayPath>) -> Self {
        self.add_filter(DeleteData::new(paths))
    }

    /// Write the data container array to a JSON file at the end of the run
    pub fn write_output(self, output_file: impl Into<std::path::PathBuf>) -> Self {
        self.add_filter(DataContainerWriter::new(output_file))
    }

    /// Build the pipeline
    pub fn build(self) -> FilterPipeline {
        let mut pipeline = FilterPipeline::new(self.name);
        for node in self.filters {
            pipeline.push_back(node);
        }
        for observer in self.observers {
            pipeline.push_boxed_observer(observer);
        }
        pipeline
    }

    /// Build a pipeline that creates one container, one matrix and one array
    pub fn build_scaffold(container: &str, matrix: &str, tuple_dims: Vec<usize>, array: &str, numeric_type: NumericType) -> FilterPipeline {
        let path = DataArrayPath::new(container, matrix, array);
        Self::new()
            .name(format!("Create {}", path))
            .create_data_container(container)
            .create_attribute_matrix(path.matrix_path(), tuple_dims)
            .create_data_array(path, numeric_type, 0.0)
            .build()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
