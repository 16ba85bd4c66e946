use super::{GridSource, SourceError};
use crate::masked::MaskedGrid3;
use ndarray::Array1;
use std::collections::HashMap;

/// In-memory grid source for tests and synthesized data.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    coordinates: HashMap<String, Array1<f64>>,
    grids: HashMap<String, MaskedGrid3>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a coordinate axis under a name (`lon`, `lat`, `time`)
    pub fn insert_coordinate(&mut self, name: impl Into<String>, values: Array1<f64>) {
        self.coordinates.insert(name.into(), values);
    }

    /// Register a masked grid under a variable name
    pub fn insert_grid(&mut self, name: impl Into<String>, grid: MaskedGrid3) {
        self.grids.insert(name.into(), grid);
    }

    /// Builder-style variant of [`MemorySource::insert_coordinate`]
    pub fn with_coordinate(mut self, name: impl Into<String>, values: Array1<f64>) -> Self {
        self.insert_coordinate(name, values);
        self
    }

    /// Builder-style variant of [`MemorySource::insert_grid`]
    pub fn with_grid(mut self, name: impl Into<String>, grid: MaskedGrid3) -> Self {
        self.insert_grid(name, grid);
        self
    }
}

impl GridSource for MemorySource {
    fn coordinate(&self, name: &str) -> Result<Array1<f64>, SourceError> {
        self.coordinates
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::MissingCoordinate(name.to_string()))
    }

    fn grid(&self, name: &str) -> Result<MaskedGrid3, SourceError> {
        self.grids
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::MissingVariable(name.to_string()))
    }
}
