use super::{AlignmentPolicy, PatchSampler, SamplerError};
use crate::masked::fill_missing;
use ndarray::{concatenate, s, stack, Array3, Array4, Axis};

/// Shape convention for the assembled sample array, counted including the
/// leading sample axis: rank 4 concatenates feature windows along a single
/// channel axis, rank 5 keeps one axis per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRank {
    Rank4,
    Rank5,
}

/// A fixed-shape multi-channel spatial window extracted around one
/// (time, lat, lon) point.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Rank-4 convention: (total_channels, side, side)
    Channels(Array3<f64>),
    /// Rank-5 convention: (num_features, window_len, side, side)
    Layered(Array4<f64>),
}

impl Patch {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Channels(a) => a.shape(),
            Self::Layered(a) => a.shape(),
        }
    }

    pub fn as_channels(&self) -> Option<&Array3<f64>> {
        match self {
            Self::Channels(a) => Some(a),
            Self::Layered(_) => None,
        }
    }

    pub fn as_layered(&self) -> Option<&Array4<f64>> {
        match self {
            Self::Layered(a) => Some(a),
            Self::Channels(_) => None,
        }
    }
}

impl PatchSampler {
    /// Extract the multi-channel patch centered at (t, lat_idx, lon_idx).
    ///
    /// Returns `Ok(None)` when the sample must be rejected: a window would run
    /// out of the grid bounds, or more than half of any feature's window is
    /// missing. Remaining missing cells are replaced by the configured fill
    /// value. `Err` is reserved for structural misuse such as mismatched
    /// rank-5 window lengths.
    pub fn extract_patch(
        &self,
        t: usize,
        lat_idx: usize,
        lon_idx: usize,
        output_rank: OutputRank,
    ) -> Result<Option<Patch>, SamplerError> {
        let b = self.config().box_radius;
        if lat_idx < b || lon_idx < b {
            return Ok(None);
        }

        let mut windows: Vec<Array3<f64>> = Vec::with_capacity(self.feature_names().len());

        for name in self.feature_names() {
            let feature = self.feature(name);
            let span = match self.window_len(feature.policy) {
                Some(span) => span,
                // Static layers contribute no channels
                None => continue,
            };

            let (nt, nj, nk) = feature.grid.dim();
            if t + span > nt || lat_idx + b + 1 > nj || lon_idx + b + 1 > nk {
                return Ok(None);
            }

            let region = s![
                t..t + span,
                lat_idx - b..lat_idx + b + 1,
                lon_idx - b..lon_idx + b + 1
            ];
            let values = feature.grid.values.slice(region);
            let mask = feature.grid.mask.slice(region);

            let missing = mask.iter().filter(|&&m| m).count();
            // Majority-missing window rejects the whole sample
            if missing * 2 > mask.len() {
                return Ok(None);
            }

            let window = if missing > 0 {
                fill_missing(&values, &mask, self.config().fill_value)
            } else {
                values.to_owned()
            };
            windows.push(window);
        }

        if windows.is_empty() {
            return Ok(None);
        }

        let patch = match output_rank {
            OutputRank::Rank4 => {
                let views: Vec<_> = windows.iter().map(|w| w.view()).collect();
                let stacked = concatenate(Axis(0), &views)
                    .map_err(|e| SamplerError::Stacking(e.to_string()))?;
                Patch::Channels(stacked)
            }
            OutputRank::Rank5 => {
                let expected = windows[0].shape()[0];
                if let Some(other) = windows.iter().find(|w| w.shape()[0] != expected) {
                    return Err(SamplerError::WindowLengthMismatch {
                        expected,
                        found: other.shape()[0],
                    });
                }
                let views: Vec<_> = windows.iter().map(|w| w.view()).collect();
                let stacked =
                    stack(Axis(0), &views).map_err(|e| SamplerError::Stacking(e.to_string()))?;
                Patch::Layered(stacked)
            }
        };

        Ok(Some(patch))
    }
}
