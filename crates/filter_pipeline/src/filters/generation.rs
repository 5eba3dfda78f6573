use filter_kit_common::{DataArrayPath, NumericType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    context::FilterContext,
    data::{AttributeMatrix, DataArray, DataContainer, MAX_ELEMENTS, element_count},
    filters::check_path,
    traits::{Filter, FilterError, FilterResult},
};

/// Adds an empty data container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct CreateDataContainer {
    pub data_container_name: String,
}

impl CreateDataContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { data_container_name: name.into() }
    }
}

impl Filter for CreateDataContainer {
    fn name(&self) -> &'static str {
        "CreateDataContainer"
    }

    fn human_label(&self) -> &str {
        "Create Data Container"
    }

    fn sub_group(&self) -> &'static str {
        "Generation"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let path = DataArrayPath::container(self.data_container_name.clone());
        if self.data_container_name.is_empty() {
            return Err(FilterError::new(-887, "The Data Container name must not be empty"));
        }
        check_path(&path, -888)?;
        if ctx.data().contains_data_container(&self.data_container_name) {
            return Err(FilterError::new(
                -889,
                format!("A Data Container named '{}' already exists", self.data_container_name),
            ));
        }
        ctx.data_mut()
            .insert_data_container(DataContainer::new(self.data_container_name.clone()));
        Ok(())
    }
}

/// Adds an attribute matrix with fixed tuple dimensions to an existing container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct CreateAttributeMatrix {
    pub created_attribute_matrix: DataArrayPath,
    pub tuple_dimensions: Vec<usize>,
}

impl CreateAttributeMatrix {
    pub fn new(path: DataArrayPath, tuple_dimensions: Vec<usize>) -> Self {
        Self {
            created_attribute_matrix: path,
            tuple_dimensions,
        }
    }
}

impl Filter for CreateAttributeMatrix {
    fn name(&self) -> &'static str {
        "CreateAttributeMatrix"
    }

    fn human_label(&self) -> &str {
        "Create Attribute Matrix"
    }

    fn sub_group(&self) -> &'static str {
        "Generation"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let path = &self.created_attribute_matrix;
        check_path(path, -11000)?;
        if path.attribute_matrix.is_empty() {
            return Err(FilterError::new(-11002, "The Attribute Matrix name must not be empty"));
        }
        if self.tuple_dimensions.is_empty() || self.tuple_dimensions.contains(&0) {
            return Err(FilterError::new(
                -11003,
                format!("Tuple dimensions {:?} must be non-empty and non-zero", self.tuple_dimensions),
            ));
        }
        if element_count(&self.tuple_dimensions).is_none_or(|n| n > MAX_ELEMENTS) {
            return Err(FilterError::new(
                -11005,
                format!(
                    "Tuple dimensions {:?} exceed {} tuples",
                    self.tuple_dimensions, MAX_ELEMENTS
                ),
            ));
        }

        let container = ctx
            .data_mut()
            .data_container_mut(&path.data_container)
            .ok_or_else(|| {
                FilterError::new(-11001, format!("Data Container '{}' does not exist", path.data_container))
            })?;
        if container.attribute_matrix(&path.attribute_matrix).is_some() {
            return Err(FilterError::new(
                -11004,
                format!("Attribute Matrix '{}' already exists", path.matrix_path()),
            ));
        }
        container.insert_attribute_matrix(AttributeMatrix::new(
            path.attribute_matrix.clone(),
            self.tuple_dimensions.clone(),
        ));
        Ok(())
    }
}

/// Adds an array to an existing attribute matrix, filled with one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct CreateDataArray {
    pub new_array: DataArrayPath,
    pub scalar_type: NumericType,
    pub number_of_components: usize,
    pub initialization_value: f64,
}

impl Default for CreateDataArray {
    fn default() -> Self {
        Self {
            new_array: DataArrayPath::default(),
            scalar_type: NumericType::default(),
            number_of_components: 1,
            initialization_value: 0.0,
        }
    }
}

impl CreateDataArray {
    pub fn new(path: DataArrayPath, scalar_type: NumericType, components: usize, init: f64) -> Self {
        Self {
            new_array: path,
            scalar_type,
            number_of_components: components,
            initialization_value: init,
        }
    }
}

impl Filter for CreateDataArray {
    fn name(&self) -> &'static str {
        "CreateDataArray"
    }

    fn human_label(&self) -> &str {
        "Create Data Array"
    }

    fn sub_group(&self) -> &'static str {
        "Generation"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        let path = &self.new_array;
        check_path(path, -8000)?;
        if !path.is_complete() {
            return Err(FilterError::new(-8000, format!("'{}' does not name a data array", path)));
        }
        if self.number_of_components == 0 {
            return Err(FilterError::new(-8150, "The number of components must be at least 1"));
        }
        if !self.scalar_type.contains(self.initialization_value) {
            return Err(FilterError::new(
                -4000,
                format!(
                    "Initialization value {} is out of range for {}",
                    self.initialization_value, self.scalar_type
                ),
            ));
        }

        let in_preflight = ctx.in_preflight();
        let matrix = ctx.data_mut().attribute_matrix_mut(path).ok_or_else(|| {
            FilterError::new(-8001, format!("Attribute Matrix '{}' does not exist", path.matrix_path()))
        })?;
        if matrix.array(&path.data_array).is_some() {
            return Err(FilterError::new(-8010, format!("Data Array '{}' already exists", path)));
        }

        let tuples = matrix.num_tuples();
        if tuples
            .checked_mul(self.number_of_components)
            .is_none_or(|n| n > MAX_ELEMENTS)
        {
            return Err(FilterError::new(
                -8151,
                format!(
                    "{} tuples of {} components exceed {} elements",
                    tuples, self.number_of_components, MAX_ELEMENTS
                ),
            ));
        }
        let array = if in_preflight {
            DataArray::unallocated(path.data_array.clone(), self.scalar_type, tuples, self.number_of_components)
        } else {
            DataArray::filled(
                path.data_array.clone(),
                self.scalar_type,
                tuples,
                self.number_of_components,
                self.initialization_value,
            )
            .map_err(|e| FilterError::new(-4000, e.to_string()))?
        };
        matrix
            .insert_array(array)
            .map_err(|e| FilterError::new(-8011, e.to_string()))?;
        Ok(())
    }
}
