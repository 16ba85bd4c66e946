/// Configuration for patch extraction and sample selection.
///
/// `predict` and `history` are counted in time steps of the input series;
/// `box_radius` is the spatial half-width of the extraction window, giving a
/// window side length of `2 * box_radius + 1` grid cells.
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Number of time steps ahead of the sample time that the label is drawn from
    pub predict: usize,
    /// Number of past time steps included as context per sample
    pub history: usize,
    /// Spatial half-width of the square extraction window
    pub box_radius: usize,
    /// Sentinel substituted for in-window missing values that survive the
    /// majority-missing check
    pub fill_value: f64,
    /// Seed for the random generator used by random-mode selection
    pub random_seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            predict: 2,
            history: 2,
            box_radius: 5,
            fill_value: -999.0,
            random_seed: None,
        }
    }
}

impl SamplerConfig {
    /// Window side length in grid cells
    pub fn window_side(&self) -> usize {
        2 * self.box_radius + 1
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !self.fill_value.is_finite() {
            return Err("Fill value must be finite".to_string());
        }
        Ok(())
    }
}
