use std::{fs, path::PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    context::FilterContext,
    data::DataContainerArray,
    traits::{Filter, FilterError, FilterResult},
};

/// Writes the whole data container array to a JSON snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct DataContainerWriter {
    pub output_file: PathBuf,
}

impl DataContainerWriter {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        Self { output_file: output_file.into() }
    }
}

impl Filter for DataContainerWriter {
    fn name(&self) -> &'static str {
        "DataContainerWriter"
    }

    fn human_label(&self) -> &str {
        "Write DREAM3D Data File"
    }

    fn group(&self) -> &'static str {
        "IO"
    }

    fn sub_group(&self) -> &'static str {
        "Output"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        if self.output_file.as_os_str().is_empty() {
            return Err(FilterError::new(-12001, "The output file must be set"));
        }
        let is_json = self
            .output_file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            ctx.set_warning(
                -12003,
                format!("'{}' will be written as JSON", self.output_file.display()),
            );
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        if let Some(parent) = self.output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                FilterError::new(-12002, format!("Could not create '{}': {}", parent.display(), e))
            })?;
        }
        ctx.status(format!("Writing {}", self.output_file.display()));
        ctx.data().to_json_file(&self.output_file).map_err(|e| {
            FilterError::new(-12002, format!("Could not write '{}': {}", self.output_file.display(), e))
        })
    }
}

/// Merges the containers of a JSON snapshot into the current data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "PascalCase")]
pub struct DataContainerReader {
    pub input_file: PathBuf,
    /// Replace containers that already exist instead of failing
    pub overwrite_existing_data_containers: bool,
}

impl DataContainerReader {
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            overwrite_existing_data_containers: false,
        }
    }

    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing_data_containers = overwrite;
        self
    }
}

impl Filter for DataContainerReader {
    fn name(&self) -> &'static str {
        "DataContainerReader"
    }

    fn human_label(&self) -> &str {
        "Read DREAM3D Data File"
    }

    fn group(&self) -> &'static str {
        "IO"
    }

    fn sub_group(&self) -> &'static str {
        "Input"
    }

    fn data_check(&mut self, ctx: &mut FilterContext<'_>) -> FilterResult {
        if self.input_file.as_os_str().is_empty() {
            return Err(FilterError::new(-12010, "The input file must be set"));
        }
        if !self.input_file.is_file() {
            return Err(FilterError::new(
                -12011,
                format!("'{}' does not exist", self.input_file.display()),
            ));
        }

        let mut loaded = DataContainerArray::from_json_file(&self.input_file).map_err(|e| {
            FilterError::new(-12012, format!("Could not read '{}': {}", self.input_file.display(), e))
        })?;
        loaded.validate().map_err(|e| {
            FilterError::new(-12012, format!("Invalid data in '{}': {}", self.input_file.display(), e))
        })?;
        if ctx.in_preflight() {
            loaded.release_storage();
        }

        if !self.overwrite_existing_data_containers {
            if let Some(name) = loaded
                .data_container_names()
                .find(|name| ctx.data().contains_data_container(name))
            {
                return Err(FilterError::new(
                    -12013,
                    format!("Data Container '{}' already exists", name),
                ));
            }
        }

        for container in loaded.into_data_containers() {
            ctx.data_mut().insert_data_container(container);
        }
        Ok(())
    }
}
