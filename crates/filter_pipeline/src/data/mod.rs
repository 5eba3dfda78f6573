//! The shared context threaded through a pipeline.
//!
//! A [`DataContainerArray`] holds named data containers, each holding attribute
//! matrices, each holding data arrays whose tuple count matches the matrix. Filters
//! read what earlier filters left here and add or modify entries for later ones.

use std::{collections::BTreeMap, fs, path::Path};

use filter_kit_common::{DataArrayPath, KitError, NumericType};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Largest number of elements one array may hold
pub const MAX_ELEMENTS: usize = 1 << 28;

/// Product of `dims`, or `None` when it overflows
pub fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn invalid(message: String) -> KitError {
    KitError::InvalidValue { message }
}

/// A typed array of `num_tuples * components` values.
///
/// Storage is absent while a pipeline preflights: arrays then carry only their shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArray {
    pub name: String,
    pub numeric_type: NumericType,
    pub num_tuples: usize,
    pub components: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<f64>>,
}

impl DataArray {
    /// Array with a shape but no storage
    pub fn unallocated(name: impl Into<String>, numeric_type: NumericType, num_tuples: usize, components: usize) -> Self {
        Self {
            name: name.into(),
            numeric_type,
            num_tuples,
            components: components.max(1),
            values: None,
        }
    }

    /// Array filled with `init`, which must fit `numeric_type`
    pub fn filled(
        name: impl Into<String>,
        numeric_type: NumericType,
        num_tuples: usize,
        components: usize,
        init: f64,
    ) -> filter_kit_common::Result<Self> {
        let mut array = Self::unallocated(name, numeric_type, num_tuples, components);
        array.allocate(init)?;
        Ok(array)
    }

    pub fn from_values(name: impl Into<String>, numeric_type: NumericType, components: usize, values: Vec<f64>) -> filter_kit_common::Result<Self> {
        let components = components.max(1);
        if values.len() % components != 0 {
            return Err(KitError::InvalidValue {
                message: format!("{} values do not divide into {} components", values.len(), components),
            });
        }
        let values = values
            .into_iter()
            .map(|v| numeric_type.coerce(v))
            .collect::<filter_kit_common::Result<Vec<_>>>()?;
        Ok(Self {
            name: name.into(),
            numeric_type,
            num_tuples: values.len() / components,
            components,
            values: Some(values),
        })
    }

    /// Allocate storage and fill it with `init`
    pub fn allocate(&mut self, init: f64) -> filter_kit_common::Result<()> {
        let init = self.numeric_type.coerce(init)?;
        let len = self.checked_len().ok_or_else(|| {
            invalid(format!(
                "array '{}' of {} tuples x {} components exceeds {} elements",
                self.name, self.num_tuples, self.components, MAX_ELEMENTS
            ))
        })?;
        self.values = Some(vec![init; len]);
        Ok(())
    }

    /// Drop the values and keep the shape
    pub fn release_storage(&mut self) {
        self.values = None;
    }

    pub fn is_allocated(&self) -> bool {
        self.values.is_some()
    }

    /// Number of elements the array holds once allocated. Saturates on overflow.
    pub fn len(&self) -> usize {
        self.num_tuples.saturating_mul(self.components)
    }

    /// Element count, or `None` when it overflows or exceeds [`MAX_ELEMENTS`]
    pub fn checked_len(&self) -> Option<usize> {
        self.num_tuples
            .checked_mul(self.components)
            .filter(|&len| len <= MAX_ELEMENTS)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.as_ref().and_then(|v| v.get(index).copied())
    }

    /// Store `value` at `index`, converting to the array's type
    pub fn set(&mut self, index: usize, value: f64) -> filter_kit_common::Result<()> {
        let value = self.numeric_type.coerce(value)?;
        let len = self.len();
        let slot = self
            .values
            .as_mut()
            .and_then(|v| v.get_mut(index))
            .ok_or_else(|| KitError::InvalidValue {
                message: format!("index {} outside array of {} elements", index, len),
            })?;
        *slot = value;
        Ok(())
    }

    /// Replace every element equal to `from` with `to`, returning how many changed
    pub fn replace_all(&mut self, from: f64, to: f64) -> filter_kit_common::Result<usize> {
        let to = self.numeric_type.coerce(to)?;
        let mut replaced = 0;
        if let Some(values) = self.values.as_mut() {
            for v in values.iter_mut().filter(|v| **v == from) {
                *v = to;
                replaced += 1;
            }
        }
        Ok(replaced)
    }
}

/// Arrays sharing a tuple shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMatrix {
    pub name: String,
    pub tuple_dims: Vec<usize>,
    #[serde(default)]
    arrays: BTreeMap<String, DataArray>,
}

impl AttributeMatrix {
    pub fn new(name: impl Into<String>, tuple_dims: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            tuple_dims,
            arrays: BTreeMap::new(),
        }
    }

    /// Tuple count. Saturates when the dimensions overflow.
    pub fn num_tuples(&self) -> usize {
        if self.tuple_dims.is_empty() {
            return 0;
        }
        element_count(&self.tuple_dims).unwrap_or(usize::MAX)
    }

    /// Tuple count, or `None` when the dimensions overflow or exceed [`MAX_ELEMENTS`]
    pub fn checked_num_tuples(&self) -> Option<usize> {
        if self.tuple_dims.is_empty() {
            return Some(0);
        }
        element_count(&self.tuple_dims).filter(|&n| n <= MAX_ELEMENTS)
    }

    /// Add an array, replacing any array of the same name.
    /// The array's tuple count must match the matrix.
    pub fn insert_array(&mut self, array: DataArray) -> filter_kit_common::Result<Option<DataArray>> {
        if array.num_tuples != self.num_tuples() {
            return Err(KitError::InvalidValue {
                message: format!(
                    "array '{}' has {} tuples but attribute matrix '{}' has {}",
                    array.name,
                    array.num_tuples,
                    self.name,
                    self.num_tuples()
                ),
            });
        }
        Ok(self.arrays.insert(array.name.clone(), array))
    }

    pub fn array(&self, name: &str) -> Option<&DataArray> {
        self.arrays.get(name)
    }

    pub fn array_mut(&mut self, name: &str) -> Option<&mut DataArray> {
        self.arrays.get_mut(name)
    }

    pub fn remove_array(&mut self, name: &str) -> Option<DataArray> {
        self.arrays.remove(name)
    }

    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    pub fn arrays(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.values()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataContainer {
    pub name: String,
    #[serde(default)]
    attribute_matrices: BTreeMap<String, AttributeMatrix>,
}

impl DataContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_matrices: BTreeMap::new(),
        }
    }

    pub fn insert_attribute_matrix(&mut self, matrix: AttributeMatrix) -> Option<AttributeMatrix> {
        self.attribute_matrices.insert(matrix.name.clone(), matrix)
    }

    pub fn attribute_matrix(&self, name: &str) -> Option<&AttributeMatrix> {
        self.attribute_matrices.get(name)
    }

    pub fn attribute_matrix_mut(&mut self, name: &str) -> Option<&mut AttributeMatrix> {
        self.attribute_matrices.get_mut(name)
    }

    pub fn remove_attribute_matrix(&mut self, name: &str) -> Option<AttributeMatrix> {
        self.attribute_matrices.remove(name)
    }

    pub fn attribute_matrices(&self) -> impl Iterator<Item = &AttributeMatrix> {
        self.attribute_matrices.values()
    }
}

/// Root of the data a pipeline reads and writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataContainerArray {
    #[serde(default)]
    data_containers: BTreeMap<String, DataContainer>,
}

impl DataContainerArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_data_container(&mut self, container: DataContainer) -> Option<DataContainer> {
        self.data_containers.insert(container.name.clone(), container)
    }

    pub fn contains_data_container(&self, name: &str) -> bool {
        self.data_containers.contains_key(name)
    }

    pub fn data_container(&self, name: &str) -> Option<&DataContainer> {
        self.data_containers.get(name)
    }

    pub fn data_container_mut(&mut self, name: &str) -> Option<&mut DataContainer> {
        self.data_containers.get_mut(name)
    }

    pub fn data_container_names(&self) -> impl Iterator<Item = &str> {
        self.data_containers.keys().map(String::as_str)
    }

    pub fn attribute_matrix(&self, path: &DataArrayPath) -> Option<&AttributeMatrix> {
        self.data_container(&path.data_container)?
            .attribute_matrix(&path.attribute_matrix)
    }

    pub fn attribute_matrix_mut(&mut self, path: &DataArrayPath) -> Option<&mut AttributeMatrix> {
        self.data_container_mut(&path.data_container)?
            .attribute_matrix_mut(&path.attribute_matrix)
    }

    pub fn data_array(&self, path: &DataArrayPath) -> Option<&DataArray> {
        self.attribute_matrix(path)?.array(&path.data_array)
    }

    pub fn data_array_mut(&mut self, path: &DataArrayPath) -> Option<&mut DataArray> {
        self.attribute_matrix_mut(path)?.array_mut(&path.data_array)
    }

    /// Whether the deepest level named by `path` exists
    pub fn exists(&self, path: &DataArrayPath) -> bool {
        if !path.data_array.is_empty() {
            self.data_array(path).is_some()
        } else if !path.attribute_matrix.is_empty() {
            self.attribute_matrix(path).is_some()
        } else {
            self.contains_data_container(&path.data_container)
        }
    }

    /// Remove the deepest level named by `path`. Returns false when it did not exist.
    pub fn remove(&mut self, path: &DataArrayPath) -> bool {
        if !path.data_array.is_empty() {
            self.attribute_matrix_mut(path)
                .and_then(|am| am.remove_array(&path.data_array))
                .is_some()
        } else if !path.attribute_matrix.is_empty() {
            self.data_container_mut(&path.data_container)
                .and_then(|dc| dc.remove_attribute_matrix(&path.attribute_matrix))
                .is_some()
        } else {
            self.data_containers.remove(&path.data_container).is_some()
        }
    }

    /// Paths of every data array, in container/matrix/array name order
    pub fn array_paths(&self) -> Vec<DataArrayPath> {
        self.data_containers
            .values()
            .flat_map(|dc| {
                dc.attribute_matrices().flat_map(move |am| {
                    am.array_names()
                        .map(move |name| DataArrayPath::new(dc.name.clone(), am.name.clone(), name))
                })
            })
            .collect()
    }

    /// Drop the values of every array, keeping the structure
    pub fn release_storage(&mut self) {
        for dc in self.data_containers.values_mut() {
            for am in dc.attribute_matrices.values_mut() {
                for array in am.arrays.values_mut() {
                    array.release_storage();
                }
            }
        }
    }

    /// Check the structure of data that did not come from the filters, e.g. a snapshot:
    /// map keys match names, shapes stay within [`MAX_ELEMENTS`], arrays match their
    /// matrix, and stored values match the shape and numeric type.
    pub fn validate(&self) -> filter_kit_common::Result<()> {
        for (dc_key, dc) in &self.data_containers {
            if dc_key != &dc.name {
                return Err(invalid(format!("data container '{}' is stored as '{}'", dc.name, dc_key)));
            }
            for (am_key, am) in &dc.attribute_matrices {
                if am_key != &am.name {
                    return Err(invalid(format!("attribute matrix '{}' is stored as '{}'", am.name, am_key)));
                }
                let tuples = am.checked_num_tuples().ok_or_else(|| {
                    invalid(format!("attribute matrix '{}' has oversized dimensions {:?}", am.name, am.tuple_dims))
                })?;
                for (array_key, array) in &am.arrays {
                    if array_key != &array.name {
                        return Err(invalid(format!("data array '{}' is stored as '{}'", array.name, array_key)));
                    }
                    if array.num_tuples != tuples {
                        return Err(invalid(format!(
                            "array '{}' has {} tuples but attribute matrix '{}' has {}",
                            array.name, array.num_tuples, am.name, tuples
                        )));
                    }
                    if array.components == 0 {
                        return Err(invalid(format!("array '{}' has no components", array.name)));
                    }
                    let len = array
                        .checked_len()
                        .ok_or_else(|| invalid(format!("array '{}' exceeds {} elements", array.name, MAX_ELEMENTS)))?;
                    if let Some(values) = &array.values {
                        if values.len() != len {
                            return Err(invalid(format!(
                                "array '{}' stores {} values but its shape needs {}",
                                array.name,
                                values.len(),
                                len
                            )));
                        }
                        if let Some(v) = values.iter().find(|v| !array.numeric_type.contains(**v)) {
                            return Err(KitError::ValueOutOfRange {
                                value: *v,
                                numeric_type: array.numeric_type,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn into_data_containers(self) -> impl Iterator<Item = DataContainer> {
        self.data_containers.into_values()
    }

    /// Load a snapshot previously written with [`Self::to_json_file`]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the whole context as pretty JSON
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
