use super::{GridSource, SourceError};
use crate::masked::MaskedGrid3;
use log::debug;
use ndarray::{Array1, Array3};
use std::path::Path;

/// NetCDF-backed grid source.
///
/// Missing elements are detected from the variable's `_FillValue` (or
/// `missing_value`) attribute; NaN elements are always treated as missing.
pub struct NetcdfSource {
    file: netcdf::File,
    path: String,
}

impl NetcdfSource {
    /// Open a NetCDF file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let file = netcdf::open(path.as_ref())?;
        debug!("opened NetCDF source {}", path_str);
        Ok(Self {
            file,
            path: path_str,
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names of all variables in the file
    pub fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name()).collect()
    }

    fn fill_attribute(var: &netcdf::Variable) -> Option<f64> {
        for attr_name in ["_FillValue", "missing_value"] {
            if let Some(attr) = var.attribute(attr_name) {
                match attr.value() {
                    Ok(netcdf::AttributeValue::Double(v)) => return Some(v),
                    Ok(netcdf::AttributeValue::Float(v)) => return Some(f64::from(v)),
                    Ok(netcdf::AttributeValue::Int(v)) => return Some(f64::from(v)),
                    Ok(netcdf::AttributeValue::Doubles(v)) if v.len() == 1 => return Some(v[0]),
                    Ok(netcdf::AttributeValue::Floats(v)) if v.len() == 1 => {
                        return Some(f64::from(v[0]))
                    }
                    _ => {}
                }
            }
        }
        None
    }
}

impl GridSource for NetcdfSource {
    fn coordinate(&self, name: &str) -> Result<Array1<f64>, SourceError> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| SourceError::MissingCoordinate(name.to_string()))?;
        let values: Vec<f64> = var.get_values(..)?;
        Ok(Array1::from(values))
    }

    fn grid(&self, name: &str) -> Result<MaskedGrid3, SourceError> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| SourceError::MissingVariable(name.to_string()))?;

        let raw: Vec<f64> = var.get_values(..)?;
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let values: Array3<f64> = match shape.len() {
            3 => Array3::from_shape_vec((shape[0], shape[1], shape[2]), raw)
                .map_err(|_| SourceError::ShapeConversion(name.to_string()))?,
            // 2D static layers get a singleton time axis
            2 => Array3::from_shape_vec((1, shape[0], shape[1]), raw)
                .map_err(|_| SourceError::ShapeConversion(name.to_string()))?,
            rank => {
                return Err(SourceError::UnsupportedRank {
                    name: name.to_string(),
                    rank,
                })
            }
        };

        let grid = match Self::fill_attribute(&var) {
            Some(fill) => MaskedGrid3::from_fill_value(values, fill),
            None => {
                let mask = values.map(|v| v.is_nan());
                MaskedGrid3 { values, mask }
            }
        };

        debug!(
            "read variable {} from {}: shape {:?}, {:.1}% missing",
            name,
            self.path,
            grid.dim(),
            grid.missing_fraction() * 100.0
        );
        Ok(grid)
    }
}
