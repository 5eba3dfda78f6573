use filter_kit_common::DataArrayPath;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    context::FilterContext,
    filters::check_path,
    traits::{Filter, FilterError, FilterResult},
};

fn missing_array(code: i32, path: &DataArrayPath) -> FilterError {
    FilterError::new(code, format!("Data Array '{}' does not exist", path))
}

/// Replaces every occurrence of one value in a single-component array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct ReplaceValueInArray {
    pub selected_array: DataArrayPath,
    pub remove_value: f64,
    pub replace_value: f64,
}

impl ReplaceValueInArray {
    pub fn new(path: DataArrayPath, remove_value: f64, replace_value: f64) -> Self {
        Self {
            selected_array: path,
            remove_value,
            replace_value,
        }
    }
}

impl Filter for ReplaceValueInArray {
    fn name(&self) -> &'static str {
        "ReplaceValueInArray"
    }

    fn human_label(&self) -> &str {
        "Replace Value"
    }

    fn sub_group(&self) -> &'static str {
        "Memory/Management"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let path = &self.selected_array;
        let array = ctx.data().data_array(path).ok_or_else(|| missing_array(-11001, path))?;
        if array.components != 1 {
            return Err(FilterError::new(
                -11002,
                format!("'{}' has {} components; a scalar array is required", path, array.components),
            ));
        }
        let numeric_type = array.numeric_type;
        if !numeric_type.contains(self.remove_value) {
            return Err(FilterError::new(
                -100,
                format!("Value to remove {} is out of range for {}", self.remove_value, numeric_type),
            ));
        }
        if !numeric_type.contains(self.replace_value) {
            return Err(FilterError::new(
                -101,
                format!("Replacement value {} is out of range for {}", self.replace_value, numeric_type),
            ));
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let path = &self.selected_array;
        let array = ctx
            .data_mut()
            .data_array_mut(path)
            .ok_or_else(|| missing_array(-11001, path))?;
        let replaced = array
            .replace_all(self.remove_value, self.replace_value)
            .map_err(|e| FilterError::new(-101, e.to_string()))?;
        ctx.status(format!("Replaced {} values", replaced));
        Ok(())
    }
}

/// Gives an array a new name within its attribute matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct RenameDataArray {
    pub selected_array: DataArrayPath,
    pub new_array_name: String,
}

impl RenameDataArray {
    pub fn new(path: DataArrayPath, new_name: impl Into<String>) -> Self {
        Self {
            selected_array: path,
            new_array_name: new_name.into(),
        }
    }
}

impl Filter for RenameDataArray {
    fn name(&self) -> &'static str {
        "RenameDataArray"
    }

    fn human_label(&self) -> &str {
        "Rename Attribute Array"
    }

    fn sub_group(&self) -> &'static str {
        "Memory/Management"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let path = &self.selected_array;
        if self.new_array_name.is_empty() {
            return Err(FilterError::new(-11009, "The new Data Array name must not be empty"));
        }
        let target = path.with_data_array(self.new_array_name.clone());
        check_path(&target, -11009)?;

        let matrix = ctx
            .data_mut()
            .attribute_matrix_mut(path)
            .ok_or_else(|| missing_array(-11008, path))?;
        if self.new_array_name == path.data_array {
            return match matrix.array(&path.data_array) {
                Some(_) => Ok(()),
                None => Err(missing_array(-11008, path)),
            };
        }
        if matrix.array(&self.new_array_name).is_some() {
            return Err(FilterError::new(-11010, format!("Data Array '{}' already exists", target)));
        }

        let mut renamed = matrix
            .remove_array(&path.data_array)
            .ok_or_else(|| missing_array(-11008, path))?;
        renamed.name = self.new_array_name.clone();
        matrix
            .insert_array(renamed)
            .map_err(|e| FilterError::new(-11011, e.to_string()))?;
        Ok(())
    }
}

/// Removes data containers, attribute matrices or arrays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct DeleteData {
    pub data_array_paths: Vec<DataArrayPath>,
}

impl DeleteData {
    pub fn new(paths: Vec<DataArrayPath>) -> Self {
        Self { data_array_paths: paths }
    }
}

impl Filter for DeleteData {
    fn name(&self) -> &'static str {
        "RemoveArrays"
    }

    fn human_label(&self) -> &str {
        "Delete Data"
    }

    fn sub_group(&self) -> &'static str {
        "Memory/Management"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        if self.data_array_paths.is_empty() {
            ctx.set_warning(-11050, "No data selected for deletion");
            return Ok(());
        }
        if let Some(missing) = self.data_array_paths.iter().find(|p| !ctx.data().exists(p)) {
            return Err(FilterError::new(-11051, format!("'{}' does not exist", missing)));
        }
        for path in &self.data_array_paths {
            ctx.data_mut().remove(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::DataContainerArray,
        filters::{CreateAttributeMatrix, CreateDataArray, CreateDataContainer},
        observer::MessageCollector,
        pipeline::FilterPipeline,
        types::RunOutcome,
    };
    use filter_kit_common::{MessageType, NumericType};

    fn phases() -> DataArrayPath {
        DataArrayPath::new("Image", "Cells", "Phases")
    }

    fn scaffold(init: f64) -> FilterPipeline {
        let mut pipeline = FilterPipeline::new("Modify");
        pipeline.push_filter(CreateDataContainer::new("Image"));
        pipeline.push_filter(CreateAttributeMatrix::new(phases().matrix_path(), vec![4]));
        pipeline.push_filter(CreateDataArray::new(phases(), NumericType::Int32, 1, init));
        pipeline
    }

    #[test]
    fn test_replace_value_rewrites_matches() {
        let mut pipeline = scaffold(3.0);
        pipeline.push_filter(ReplaceValueInArray::new(phases(), 3.0, -1.0));
        let collector = MessageCollector::new();
        pipeline.add_observer(collector.clone());

        let mut data = DataContainerArray::new();
        assert_eq!(pipeline.execute(&mut data), RunOutcome::Completed);
        assert_eq!(data.data_array(&phases()).unwrap().values().unwrap(), &[-1.0; 4]);
        assert!(collector
            .of_type(MessageType::StatusMessage)
            .iter()
            .any(|m| m.text == "Replaced 4 values"));
    }

    #[test]
    fn test_replace_value_checks_range_and_components() {
        let mut pipeline = scaffold(0.0);
        pipeline.push_filter(ReplaceValueInArray::new(phases(), 1e12, 0.0));
        assert_eq!(pipeline.preflight_pipeline().first_error, Some(-100));

        let mut pipeline = FilterPipeline::new("Vector");
        pipeline.push_filter(CreateDataContainer::new("Image"));
        pipeline.push_filter(CreateAttributeMatrix::new(phases().matrix_path(), vec![4]));
        pipeline.push_filter(CreateDataArray::new(phases(), NumericType::Float, 3, 0.0));
        pipeline.push_filter(ReplaceValueInArray::new(phases(), 0.0, 1.0));
        assert_eq!(pipeline.preflight_pipeline().first_error, Some(-11002));
    }

    #[test]
    fn test_replace_value_missing_array() {
        let mut pipeline = FilterPipeline::new("Missing");
        pipeline.push_filter(ReplaceValueInArray::new(phases(), 0.0, 1.0));
        assert_eq!(pipeline.preflight_pipeline().first_error, Some(-11001));
    }

    #[test]
    fn test_rename_moves_array() {
        let mut pipeline = scaffold(2.0);
        pipeline.push_filter(RenameDataArray::new(phases(), "Grains"));
        pipeline.push_filter(ReplaceValueInArray::new(phases().with_data_array("Grains"), 2.0, 5.0));

        assert!(pipeline.preflight_pipeline().is_ok());
        let mut data = DataContainerArray::new();
        assert_eq!(pipeline.execute(&mut data), RunOutcome::Completed);
        assert!(data.data_array(&phases()).is_none());
        let grains = data.data_array(&phases().with_data_array("Grains")).unwrap();
        assert_eq!(grains.values().unwrap(), &[5.0; 4]);
    }

    #[test]
    fn test_rename_onto_existing_array_fails() {
        let mut pipeline = scaffold(0.0);
        pipeline.push_filter(CreateDataArray::new(phases().with_data_array("Other"), NumericType::Int32, 1, 0.0));
        pipeline.push_filter(RenameDataArray::new(phases(), "Other"));
        assert_eq!(pipeline.preflight_pipeline().first_error, Some(-11010));
    }

    #[test]
    fn test_delete_data_removes_and_later_filters_see_it() {
        let mut pipeline = scaffold(0.0);
        pipeline.push_filter(DeleteData::new(vec![phases().matrix_path()]));
        pipeline.push_filter(ReplaceValueInArray::new(phases(), 0.0, 1.0));

        let report = pipeline.preflight_pipeline();
        assert_eq!(report.error_count, 1);
        assert_eq!(pipeline.get(4).unwrap().error_code(), -11001);
    }

    #[test]
    fn test_delete_nothing_warns() {
        let mut pipeline = FilterPipeline::new("Nothing");
        pipeline.push_filter(DeleteData::default());
        let report = pipeline.preflight_pipeline();
        assert!(report.is_ok());
        assert_eq!(report.warning_count, 1);
        assert_eq!(pipeline.get(0).unwrap().warning_code(), -11050);
    }

    #[test]
    fn test_delete_missing_path_fails() {
        let mut pipeline = FilterPipeline::new("Missing");
        pipeline.push_filter(DeleteData::new(vec![DataArrayPath::container("Nope")]));
        assert_eq!(pipeline.preflight_pipeline().first_error, Some(-11051));
    }
}
