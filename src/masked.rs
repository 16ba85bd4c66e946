use ndarray::{Array3, ArrayView3, Zip};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("mask shape {mask:?} does not match value shape {values:?}")]
pub struct MaskShapeError {
    pub values: Vec<usize>,
    pub mask: Vec<usize>,
}

/// A 3D grid [time, lat, lon] with an explicit per-element missing mask.
///
/// `true` in the mask marks a missing element. The value stored underneath a
/// masked element is unspecified and must not be read directly.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedGrid3 {
    pub values: Array3<f64>,
    pub mask: Array3<bool>,
}

impl MaskedGrid3 {
    /// Pair a value array with its missing mask
    pub fn new(values: Array3<f64>, mask: Array3<bool>) -> Result<Self, MaskShapeError> {
        if values.shape() != mask.shape() {
            return Err(MaskShapeError {
                values: values.shape().to_vec(),
                mask: mask.shape().to_vec(),
            });
        }
        Ok(Self { values, mask })
    }

    /// Wrap a fully-present array (empty mask)
    pub fn all_present(values: Array3<f64>) -> Self {
        let mask = Array3::from_elem(values.raw_dim(), false);
        Self { values, mask }
    }

    /// Derive the mask by comparing against a sentinel value; NaN is always
    /// treated as missing
    pub fn from_fill_value(values: Array3<f64>, fill: f64) -> Self {
        let mask = values.map(|&v| v.is_nan() || v == fill);
        Self { values, mask }
    }

    /// Grid dimensions as (time, lat, lon)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    /// Length of the time axis
    pub fn len_time(&self) -> usize {
        self.values.dim().0
    }

    /// Fraction of elements flagged missing over the whole grid
    pub fn missing_fraction(&self) -> f64 {
        missing_fraction(&self.mask.view())
    }

    /// True if any element is flagged missing
    pub fn any_missing(&self) -> bool {
        self.mask.iter().any(|&m| m)
    }

    /// Value at an index triple, `None` when the element is masked
    pub fn value_at(&self, t: usize, lat_idx: usize, lon_idx: usize) -> Option<f64> {
        if self.mask[[t, lat_idx, lon_idx]] {
            None
        } else {
            Some(self.values[[t, lat_idx, lon_idx]])
        }
    }

    /// Copy of the grid restricted to a time range
    pub fn slice_time(&self, range: Range<usize>) -> Self {
        Self {
            values: self
                .values
                .slice(ndarray::s![range.clone(), .., ..])
                .to_owned(),
            mask: self.mask.slice(ndarray::s![range, .., ..]).to_owned(),
        }
    }

    /// Copy of the grid with masked elements replaced by `fill`
    pub fn filled(&self, fill: f64) -> Array3<f64> {
        fill_missing(&self.values.view(), &self.mask.view(), fill)
    }
}

/// Fraction of `true` elements in a mask view
pub fn missing_fraction(mask: &ArrayView3<bool>) -> f64 {
    let total = mask.len();
    if total == 0 {
        return 0.0;
    }
    let missing = mask.iter().filter(|&&m| m).count();
    missing as f64 / total as f64
}

/// Copy of a value view with masked elements replaced by `fill`
pub fn fill_missing(values: &ArrayView3<f64>, mask: &ArrayView3<bool>, fill: f64) -> Array3<f64> {
    let mut out = values.to_owned();
    Zip::from(&mut out).and(mask).for_each(|v, &m| {
        if m {
            *v = fill;
        }
    });
    out
}
