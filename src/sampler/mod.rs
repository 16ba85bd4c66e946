mod extract;
mod select;

pub use extract::{OutputRank, Patch};
pub use select::{SelectMode, Selection};

use crate::config::SamplerConfig;
use crate::data_io::{GridSource, SourceError};
use crate::masked::MaskedGrid3;
use log::info;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Labels must be loaded before {0}")]
    LabelsNotLoaded(&'static str),

    #[error("Time series for '{name}' too short: {len} steps, need more than {required}")]
    TimeSeriesTooShort {
        name: String,
        len: usize,
        required: usize,
    },

    #[error("Unrecognized alignment policy: {0}")]
    UnknownPolicy(String),

    #[error("Rank-5 stacking requires uniform window lengths: found {found} after {expected}")]
    WindowLengthMismatch { expected: usize, found: usize },

    #[error("Subset is required for {0} selection")]
    SubsetRequired(&'static str),

    #[error("Window stacking failed: {0}")]
    Stacking(String),
}

/// Rule for trimming a feature's time axis so it lines up with the label's
/// effective time index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentPolicy {
    /// Time series used as historical context; the last `predict` steps are
    /// dropped on load
    HistoryTimeSeries,
    /// Time series aligned with the forecast horizon; the first `history`
    /// steps are dropped on load
    ForecastTimeSeries,
    /// Static multi-layer field, stored unmodified
    MultiLayers,
    /// Static single-layer field, stored unmodified
    SingleLayer,
}

impl AlignmentPolicy {
    /// True for the two time-varying policies that contribute patch channels
    pub fn is_time_series(self) -> bool {
        matches!(self, Self::HistoryTimeSeries | Self::ForecastTimeSeries)
    }
}

impl FromStr for AlignmentPolicy {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "history_time_series" => Ok(Self::HistoryTimeSeries),
            "forecast_time_series" => Ok(Self::ForecastTimeSeries),
            "multi_layers" => Ok(Self::MultiLayers),
            "single_layer" => Ok(Self::SingleLayer),
            other => Err(SamplerError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for AlignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HistoryTimeSeries => "history_time_series",
            Self::ForecastTimeSeries => "forecast_time_series",
            Self::MultiLayers => "multi_layers",
            Self::SingleLayer => "single_layer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct Feature {
    grid: MaskedGrid3,
    policy: AlignmentPolicy,
}

/// Store for label and feature grids plus the patch extraction and sample
/// selection operations.
///
/// Built once per instance: one [`PatchSampler::load_labels`] call followed by
/// zero or more [`PatchSampler::load_feature`] calls, read-only thereafter.
/// Feature registration order determines channel stacking order in extracted
/// patches.
pub struct PatchSampler {
    config: SamplerConfig,
    rng: StdRng,
    lons: Array1<f64>,
    lats: Array1<f64>,
    times: Array1<f64>,
    labels: Option<MaskedGrid3>,
    feature_order: Vec<String>,
    features: HashMap<String, Feature>,
}

impl PatchSampler {
    /// Create a sampler with the given configuration
    pub fn new(config: SamplerConfig) -> Result<Self, SamplerError> {
        config.validate().map_err(SamplerError::InvalidConfig)?;
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            rng,
            lons: Array1::zeros(0),
            lats: Array1::zeros(0),
            times: Array1::zeros(0),
            labels: None,
            feature_order: Vec::new(),
            features: HashMap::new(),
        })
    }

    /// Load the label grid and coordinate axes.
    ///
    /// Label time indices are trimmed to `[history + predict, end)` so that
    /// label index 0 aligns with original time index `history + predict`; the
    /// retained time coordinates cover `[history, end - predict)`.
    pub fn load_labels(
        &mut self,
        source: &dyn GridSource,
        variable: &str,
    ) -> Result<(), SamplerError> {
        let lons = source.coordinate("lon")?;
        let lats = source.coordinate("lat")?;
        let time = source.coordinate("time")?;
        let grid = source.grid(variable)?;

        let n = self.config.history + self.config.predict;
        let nt = grid.len_time();
        if nt <= n || time.len() <= n {
            return Err(SamplerError::TimeSeriesTooShort {
                name: variable.to_string(),
                len: nt.min(time.len()),
                required: n,
            });
        }

        self.labels = Some(grid.slice_time(n..nt));
        self.times = time
            .slice(ndarray::s![self.config.history..time.len() - self.config.predict])
            .to_owned();
        self.lons = lons;
        self.lats = lats;

        info!(
            "loaded labels '{}': {} usable time steps on a {}x{} grid",
            variable,
            self.times.len(),
            self.lats.len(),
            self.lons.len()
        );
        Ok(())
    }

    /// Load a feature grid under `name`, trimmed per its alignment policy.
    ///
    /// Names are registered append-only; re-registering an existing name
    /// replaces its data and policy but keeps its channel position.
    pub fn load_feature(
        &mut self,
        source: &dyn GridSource,
        variable: &str,
        name: &str,
        policy: AlignmentPolicy,
    ) -> Result<(), SamplerError> {
        if self.labels.is_none() {
            return Err(SamplerError::LabelsNotLoaded("load_feature"));
        }

        let grid = source.grid(variable)?;
        let nt = grid.len_time();

        let trimmed = match policy {
            AlignmentPolicy::HistoryTimeSeries => {
                if nt <= self.config.predict {
                    return Err(SamplerError::TimeSeriesTooShort {
                        name: name.to_string(),
                        len: nt,
                        required: self.config.predict,
                    });
                }
                grid.slice_time(0..nt - self.config.predict)
            }
            AlignmentPolicy::ForecastTimeSeries => {
                if nt <= self.config.history {
                    return Err(SamplerError::TimeSeriesTooShort {
                        name: name.to_string(),
                        len: nt,
                        required: self.config.history,
                    });
                }
                grid.slice_time(self.config.history..nt)
            }
            AlignmentPolicy::MultiLayers | AlignmentPolicy::SingleLayer => grid,
        };

        if !self.features.contains_key(name) {
            self.feature_order.push(name.to_string());
        }
        info!(
            "registered feature '{}' ({}) from variable '{}': {} time steps retained",
            name,
            policy,
            variable,
            trimmed.len_time()
        );
        self.features.insert(name.to_string(), Feature { grid: trimmed, policy });
        Ok(())
    }

    /// Sampler configuration
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Longitude coordinate axis from the label source
    pub fn lons(&self) -> &Array1<f64> {
        &self.lons
    }

    /// Latitude coordinate axis from the label source
    pub fn lats(&self) -> &Array1<f64> {
        &self.lats
    }

    /// Retained time coordinates, aligned with the trimmed label series
    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    /// The trimmed label grid, if loaded
    pub fn labels(&self) -> Option<&MaskedGrid3> {
        self.labels.as_ref()
    }

    /// Registered feature names in channel-stacking order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_order
    }

    /// Alignment policy of a registered feature
    pub fn feature_policy(&self, name: &str) -> Option<AlignmentPolicy> {
        self.features.get(name).map(|f| f.policy)
    }

    /// Static (non-time-varying) layer by name; `None` for time-series features
    pub fn static_layer(&self, name: &str) -> Option<&MaskedGrid3> {
        self.features
            .get(name)
            .filter(|f| !f.policy.is_time_series())
            .map(|f| &f.grid)
    }

    fn feature(&self, name: &str) -> &Feature {
        &self.features[name]
    }

    /// Temporal window length a feature contributes, `None` for static layers
    fn window_len(&self, policy: AlignmentPolicy) -> Option<usize> {
        match policy {
            AlignmentPolicy::HistoryTimeSeries => Some(self.config.history + 1),
            AlignmentPolicy::ForecastTimeSeries => Some(self.config.predict + 1),
            AlignmentPolicy::MultiLayers | AlignmentPolicy::SingleLayer => None,
        }
    }

    /// Total channel count of a rank-4 patch: the sum of temporal window
    /// lengths over time-series features in registry order
    pub fn total_channels(&self) -> usize {
        self.feature_order
            .iter()
            .filter_map(|name| self.window_len(self.feature(name).policy))
            .sum()
    }

    /// Number of registered time-series features (rank-5 leading axis)
    pub fn time_series_feature_count(&self) -> usize {
        self.feature_order
            .iter()
            .filter(|name| self.feature(name).policy.is_time_series())
            .count()
    }

    /// Expected per-sample patch shape for an output rank
    pub fn expected_patch_shape(&self, output_rank: OutputRank) -> Vec<usize> {
        let side = self.config.window_side();
        match output_rank {
            OutputRank::Rank4 => vec![self.total_channels(), side, side],
            OutputRank::Rank5 => vec![
                self.time_series_feature_count(),
                self.config.history + 1,
                side,
                side,
            ],
        }
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
