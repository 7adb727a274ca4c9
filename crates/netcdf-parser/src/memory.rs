//! In-memory dataset, used for fixtures and for data assembled by hand.

use std::collections::HashMap;

use crate::error::NetCdfResult;
use crate::source::{VariableData, VariableSource};

/// A dataset held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    variables: HashMap<String, VariableData>,
    attributes: HashMap<(String, String), String>,
    dimensions: HashMap<String, usize>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: &str, shape: Vec<usize>, values: Vec<f64>) -> Self {
        self.insert_variable(name, VariableData::new(shape, values));
        self
    }

    pub fn with_attribute(mut self, variable: &str, name: &str, value: &str) -> Self {
        self.attributes
            .insert((variable.to_string(), name.to_string()), value.to_string());
        self
    }

    pub fn with_dimension(mut self, name: &str, len: usize) -> Self {
        self.dimensions.insert(name.to_string(), len);
        self
    }

    pub fn insert_variable(&mut self, name: &str, data: VariableData) {
        self.variables.insert(name.to_string(), data);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<VariableData> {
        self.variables.remove(name)
    }
}

impl VariableSource for MemoryDataset {
    fn read_variable(&self, name: &str) -> NetCdfResult<Option<VariableData>> {
        Ok(self.variables.get(name).cloned())
    }

    fn text_attribute(&self, variable: &str, name: &str) -> NetCdfResult<Option<String>> {
        Ok(self
            .attributes
            .get(&(variable.to_string(), name.to_string()))
            .cloned())
    }

    fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }
}
