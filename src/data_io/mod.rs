pub mod memory;
pub mod netcdf_source;

pub use memory::MemorySource;
pub use netcdf_source::NetcdfSource;

use crate::masked::MaskedGrid3;
use ndarray::Array1;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Coordinate not found: {0}")]
    MissingCoordinate(String),

    #[error("Variable {name} has rank {rank}, expected 2 or 3")]
    UnsupportedRank { name: String, rank: usize },

    #[error("Shape conversion failed for variable {0}")]
    ShapeConversion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Collaborator contract for gridded data sources.
///
/// A source exposes named numeric arrays laid out [time, lat, lon] (2D arrays
/// are promoted with a singleton time axis) together with a per-element
/// missing mask, plus the `lon`, `lat` and `time` coordinate axes.
pub trait GridSource {
    /// Read a 1D coordinate axis (`lon`, `lat` or `time`)
    fn coordinate(&self, name: &str) -> Result<Array1<f64>, SourceError>;

    /// Read a named variable as a masked [time, lat, lon] grid
    fn grid(&self, name: &str) -> Result<MaskedGrid3, SourceError>;
}
