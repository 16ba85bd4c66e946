use super::{OutputRank, Patch, PatchSampler, SamplerError};
use log::info;
use ndarray::{stack, Array1, Array2, Array4, Array5, Axis};
use rand::Rng;
use rayon::prelude::*;

/// Sample selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Deterministic sweep over every time index below the cutoff, in time
    /// order then subset order
    Exhaustive,
    /// Deterministic sweep over the subset at one fixed time index
    AtTime(usize),
    /// Draw candidates with replacement until exactly `n` are accepted
    Random { n: usize },
}

/// Aligned output of a selection run: accepted index triples
/// (time, lat_idx, lon_idx), scalar labels and patches, in matching order.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    pub indices: Vec<(usize, usize, usize)>,
    pub labels: Vec<f64>,
    pub patches: Vec<Patch>,
}

impl Selection {
    fn push(&mut self, index: (usize, usize, usize), label: f64, patch: Patch) {
        self.indices.push(index);
        self.labels.push(label);
        self.patches.push(patch);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Accepted labels as a 1D array
    pub fn labels_array(&self) -> Array1<f64> {
        Array1::from(self.labels.clone())
    }

    /// Accepted index triples as an (n, 3) array
    pub fn indices_array(&self) -> Array2<usize> {
        Array2::from_shape_fn((self.indices.len(), 3), |(row, col)| {
            let (t, j, k) = self.indices[row];
            [t, j, k][col]
        })
    }

    /// Rank-4 patches stacked along a new sample axis; `None` when the
    /// selection is empty or holds rank-5 patches
    pub fn patches_rank4(&self) -> Option<Array4<f64>> {
        let views: Vec<_> = self
            .patches
            .iter()
            .map(|p| p.as_channels().map(|a| a.view()))
            .collect::<Option<_>>()?;
        stack(Axis(0), &views).ok()
    }

    /// Rank-5 patches stacked along a new sample axis; `None` when the
    /// selection is empty or holds rank-4 patches
    pub fn patches_rank5(&self) -> Option<Array5<f64>> {
        let views: Vec<_> = self
            .patches
            .iter()
            .map(|p| p.as_layered().map(|a| a.view()))
            .collect::<Option<_>>()?;
        stack(Axis(0), &views).ok()
    }
}

impl PatchSampler {
    /// Run one selection pass against the loaded grids.
    ///
    /// `cutoff` bounds the eligible time indices; it defaults to half the
    /// trimmed time series (integer division). A negative cutoff is only
    /// meaningful in random mode, where it draws trailing time indices
    /// `[len + cutoff, len)`. `subset` is an ordered list of
    /// `(lon_idx, lat_idx)` candidate pairs; it is required for the two
    /// deterministic modes, and random mode without it draws uniformly from
    /// the in-bounds spatial range `[box, dim - box)` on each axis.
    ///
    /// Random mode keeps drawing until the quota is met: with a degenerate
    /// subset or cutoff it will not terminate, which is the caller's
    /// responsibility to avoid.
    pub fn select(
        &mut self,
        mode: SelectMode,
        cutoff: Option<i64>,
        subset: Option<&[(usize, usize)]>,
        output_rank: OutputRank,
    ) -> Result<Selection, SamplerError> {
        if self.labels().is_none() {
            return Err(SamplerError::LabelsNotLoaded("select"));
        }
        let cutoff = cutoff.unwrap_or_else(|| (self.times().len() / 2) as i64);
        let expected = self.expected_patch_shape(output_rank);

        let selection = match mode {
            SelectMode::Exhaustive => {
                let subset = subset.ok_or(SamplerError::SubsetRequired("exhaustive"))?;
                self.select_exhaustive(cutoff, subset, output_rank, &expected)?
            }
            SelectMode::AtTime(t) => {
                let subset = subset.ok_or(SamplerError::SubsetRequired("single-time"))?;
                self.select_at_time(t, subset, output_rank, &expected)?
            }
            SelectMode::Random { n } => {
                self.select_random(n, cutoff, subset, output_rank, &expected)?
            }
        };

        info!(
            "selection ({mode:?}) accepted {} samples with patch shape {expected:?}",
            selection.len()
        );
        Ok(selection)
    }

    /// Acceptance test shared by all modes: label present, patch extracted,
    /// patch shape equal to the expected shape for the output rank.
    fn evaluate(
        &self,
        t: usize,
        lat_idx: usize,
        lon_idx: usize,
        output_rank: OutputRank,
        expected: &[usize],
    ) -> Result<Option<(f64, Patch)>, SamplerError> {
        let labels = self
            .labels()
            .ok_or(SamplerError::LabelsNotLoaded("evaluate"))?;
        let (nt, nj, nk) = labels.dim();
        if t >= nt || lat_idx >= nj || lon_idx >= nk {
            return Ok(None);
        }
        let label = match labels.value_at(t, lat_idx, lon_idx) {
            Some(label) => label,
            None => return Ok(None),
        };
        let patch = match self.extract_patch(t, lat_idx, lon_idx, output_rank)? {
            Some(patch) => patch,
            None => return Ok(None),
        };
        if patch.shape() != expected {
            return Ok(None);
        }
        Ok(Some((label, patch)))
    }

    fn select_exhaustive(
        &self,
        cutoff: i64,
        subset: &[(usize, usize)],
        output_rank: OutputRank,
        expected: &[usize],
    ) -> Result<Selection, SamplerError> {
        let stop = cutoff.max(0) as usize;
        let candidates: Vec<(usize, usize, usize)> = (0..stop)
            .flat_map(|t| subset.iter().map(move |&(k, j)| (t, j, k)))
            .collect();

        // Candidate evaluation is read-only; the indexed collect keeps the
        // time-then-subset output order
        let evaluated: Vec<Option<(f64, Patch)>> = candidates
            .par_iter()
            .map(|&(t, j, k)| self.evaluate(t, j, k, output_rank, expected))
            .collect::<Result<_, _>>()?;

        let mut selection = Selection::default();
        for (index, hit) in candidates.into_iter().zip(evaluated) {
            if let Some((label, patch)) = hit {
                selection.push(index, label, patch);
            }
        }
        Ok(selection)
    }

    fn select_at_time(
        &self,
        t: usize,
        subset: &[(usize, usize)],
        output_rank: OutputRank,
        expected: &[usize],
    ) -> Result<Selection, SamplerError> {
        let mut selection = Selection::default();
        for &(k, j) in subset {
            if let Some((label, patch)) = self.evaluate(t, j, k, output_rank, expected)? {
                selection.push((t, j, k), label, patch);
            }
        }
        Ok(selection)
    }

    fn select_random(
        &mut self,
        n: usize,
        cutoff: i64,
        subset: Option<&[(usize, usize)]>,
        output_rank: OutputRank,
        expected: &[usize],
    ) -> Result<Selection, SamplerError> {
        let nt = self
            .labels()
            .ok_or(SamplerError::LabelsNotLoaded("select"))?
            .len_time() as i64;
        let b = self.config().box_radius;

        if cutoff == 0 {
            return Err(SamplerError::InvalidConfig(
                "random selection needs a non-zero cutoff".to_string(),
            ));
        }
        if cutoff < 0 && -cutoff > nt {
            return Err(SamplerError::InvalidConfig(format!(
                "negative cutoff {cutoff} exceeds the {nt}-step time series"
            )));
        }
        if matches!(subset, Some(pairs) if pairs.is_empty()) {
            return Err(SamplerError::InvalidConfig(
                "random selection needs a non-empty subset".to_string(),
            ));
        }
        if subset.is_none() && (self.lats().len() < 2 * b + 1 || self.lons().len() < 2 * b + 1) {
            return Err(SamplerError::InvalidConfig(format!(
                "grid too small for box radius {b}: no in-bounds window centers"
            )));
        }

        let mut selection = Selection::default();
        while selection.len() < n {
            let (k, j) = match subset {
                Some(pairs) => pairs[self.rng_mut().gen_range(0..pairs.len())],
                None => {
                    let n_lats = self.lats().len();
                    let n_lons = self.lons().len();
                    let j = self.rng_mut().gen_range(b..n_lats - b);
                    let k = self.rng_mut().gen_range(b..n_lons - b);
                    (k, j)
                }
            };
            let t = if cutoff < 0 {
                // Trailing-time indexing: draw from [len + cutoff, len)
                (nt + self.rng_mut().gen_range(cutoff..0)) as usize
            } else {
                self.rng_mut().gen_range(0..cutoff) as usize
            };

            if let Some((label, patch)) = self.evaluate(t, j, k, output_rank, expected)? {
                selection.push((t, j, k), label, patch);
            }
        }
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplerConfig;
    use crate::data_io::MemorySource;
    use crate::masked::MaskedGrid3;
    use crate::sampler::AlignmentPolicy;
    use ndarray::{Array1, Array3};

    fn coords(n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| i as f64)
    }

    fn sequential(nt: usize, nj: usize, nk: usize) -> Array3<f64> {
        Array3::from_shape_fn((nt, nj, nk), |(t, j, k)| (t * nj * nk + j * nk + k) as f64)
    }

    fn source(nt: usize, nj: usize, nk: usize) -> MemorySource {
        MemorySource::new()
            .with_coordinate("lon", coords(nk))
            .with_coordinate("lat", coords(nj))
            .with_coordinate("time", coords(nt))
            .with_grid("tmax", MaskedGrid3::all_present(sequential(nt, nj, nk)))
            .with_grid("temp", MaskedGrid3::all_present(sequential(nt, nj, nk)))
    }

    fn loaded_sampler(seed: Option<u64>) -> PatchSampler {
        let source = source(14, 12, 12);
        let mut sampler = PatchSampler::new(SamplerConfig {
            history: 2,
            predict: 2,
            box_radius: 1,
            random_seed: seed,
            ..SamplerConfig::default()
        })
        .unwrap();
        sampler.load_labels(&source, "tmax").unwrap();
        sampler
            .load_feature(&source, "temp", "temp", AlignmentPolicy::HistoryTimeSeries)
            .unwrap();
        sampler
    }

    #[test]
    fn test_select_requires_labels() {
        let mut sampler = PatchSampler::new(SamplerConfig::default()).unwrap();
        let result = sampler.select(SelectMode::AtTime(0), None, Some(&[(5, 5)]), OutputRank::Rank4);
        assert!(matches!(result, Err(SamplerError::LabelsNotLoaded(_))));
    }

    #[test]
    fn test_deterministic_modes_require_subset() {
        let mut sampler = loaded_sampler(None);
        assert!(matches!(
            sampler.select(SelectMode::Exhaustive, None, None, OutputRank::Rank4),
            Err(SamplerError::SubsetRequired("exhaustive"))
        ));
        assert!(matches!(
            sampler.select(SelectMode::AtTime(0), None, None, OutputRank::Rank4),
            Err(SamplerError::SubsetRequired("single-time"))
        ));
    }

    #[test]
    fn test_exhaustive_ordering_time_then_subset() {
        let mut sampler = loaded_sampler(None);
        let subset = [(5, 5), (6, 7), (4, 4)];
        let selection = sampler
            .select(SelectMode::Exhaustive, Some(2), Some(&subset), OutputRank::Rank4)
            .unwrap();

        let expected: Vec<(usize, usize, usize)> = vec![
            (0, 5, 5),
            (0, 7, 6),
            (0, 4, 4),
            (1, 5, 5),
            (1, 7, 6),
            (1, 4, 4),
        ];
        assert_eq!(selection.indices, expected);
    }

    #[test]
    fn test_default_cutoff_is_half_the_series() {
        // 14 raw steps -> 10 trimmed, default cutoff 5
        let mut sampler = loaded_sampler(None);
        let selection = sampler
            .select(SelectMode::Exhaustive, None, Some(&[(5, 5)]), OutputRank::Rank4)
            .unwrap();
        assert_eq!(selection.len(), 5);
        assert_eq!(selection.indices.last(), Some(&(4, 5, 5)));
    }

    #[test]
    fn test_at_time_idempotence() {
        let mut sampler = loaded_sampler(None);
        let subset = [(5, 5), (6, 6)];
        let first = sampler
            .select(SelectMode::AtTime(1), None, Some(&subset), OutputRank::Rank4)
            .unwrap();
        let second = sampler
            .select(SelectMode::AtTime(1), None, Some(&subset), OutputRank::Rank4)
            .unwrap();

        assert_eq!(first.indices, second.indices);
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.patches, second.patches);
    }

    #[test]
    fn test_sample_consistency() {
        let mut sampler = loaded_sampler(None);
        let subset = [(5, 5), (6, 7)];
        let selection = sampler
            .select(SelectMode::Exhaustive, Some(3), Some(&subset), OutputRank::Rank4)
            .unwrap();

        let labels = sampler.labels().unwrap();
        for (i, &(t, j, k)) in selection.indices.iter().enumerate() {
            assert_eq!(selection.labels[i], labels.values[[t, j, k]]);
            let patch = sampler
                .extract_patch(t, j, k, OutputRank::Rank4)
                .unwrap()
                .unwrap();
            assert_eq!(selection.patches[i], patch);
            assert_eq!(selection.patches[i].shape(), &[3, 3, 3]);
        }
    }

    #[test]
    fn test_random_mode_returns_exact_quota() {
        let mut sampler = loaded_sampler(Some(7));
        let selection = sampler
            .select(SelectMode::Random { n: 12 }, Some(4), None, OutputRank::Rank4)
            .unwrap();

        assert_eq!(selection.len(), 12);
        for &(t, j, k) in &selection.indices {
            assert!(t < 4);
            assert!((1..11).contains(&j));
            assert!((1..11).contains(&k));
        }
    }

    #[test]
    fn test_random_mode_is_seed_reproducible() {
        let mut a = loaded_sampler(Some(42));
        let mut b = loaded_sampler(Some(42));

        let sel_a = a
            .select(SelectMode::Random { n: 6 }, Some(4), None, OutputRank::Rank4)
            .unwrap();
        let sel_b = b
            .select(SelectMode::Random { n: 6 }, Some(4), None, OutputRank::Rank4)
            .unwrap();

        assert_eq!(sel_a.indices, sel_b.indices);
        assert_eq!(sel_a.labels, sel_b.labels);
    }

    #[test]
    fn test_random_mode_with_negative_cutoff_draws_trailing_times() {
        let mut sampler = loaded_sampler(Some(3));
        let selection = sampler
            .select(SelectMode::Random { n: 8 }, Some(-3), None, OutputRank::Rank4)
            .unwrap();

        // Trimmed label series has 10 steps, so draws come from [7, 10)
        assert_eq!(selection.len(), 8);
        for &(t, _, _) in &selection.indices {
            assert!((7..10).contains(&t));
        }
    }

    #[test]
    fn test_random_mode_rejects_empty_subset() {
        let mut sampler = loaded_sampler(Some(1));
        let subset: [(usize, usize); 0] = [];
        let result = sampler.select(
            SelectMode::Random { n: 1 },
            Some(4),
            Some(&subset),
            OutputRank::Rank4,
        );
        assert!(matches!(result, Err(SamplerError::InvalidConfig(_))));
    }

    #[test]
    fn test_random_mode_rejects_zero_cutoff() {
        let mut sampler = loaded_sampler(Some(1));
        let result = sampler.select(SelectMode::Random { n: 1 }, Some(0), None, OutputRank::Rank4);
        assert!(matches!(result, Err(SamplerError::InvalidConfig(_))));
    }

    #[test]
    fn test_random_mode_draws_from_subset() {
        let mut sampler = loaded_sampler(Some(11));
        let subset = [(5, 5)];
        let selection = sampler
            .select(SelectMode::Random { n: 4 }, Some(4), Some(&subset), OutputRank::Rank4)
            .unwrap();

        assert_eq!(selection.len(), 4);
        for &(_, j, k) in &selection.indices {
            assert_eq!((k, j), (5, 5));
        }
    }

    #[test]
    fn test_masked_labels_are_excluded() {
        let nt = 14;
        let (nj, nk) = (12, 12);
        let mut values = sequential(nt, nj, nk);
        // Mask the label cell that t=1 maps to (original time index 5)
        values[[5, 5, 5]] = -999.0;
        let source = source(nt, nj, nk)
            .with_grid("tmax", MaskedGrid3::from_fill_value(values, -999.0));

        let mut sampler = PatchSampler::new(SamplerConfig {
            history: 2,
            predict: 2,
            box_radius: 1,
            ..SamplerConfig::default()
        })
        .unwrap();
        sampler.load_labels(&source, "tmax").unwrap();
        sampler
            .load_feature(&source, "temp", "temp", AlignmentPolicy::HistoryTimeSeries)
            .unwrap();

        let selection = sampler
            .select(SelectMode::Exhaustive, Some(3), Some(&[(5, 5)]), OutputRank::Rank4)
            .unwrap();
        let times: Vec<usize> = selection.indices.iter().map(|&(t, _, _)| t).collect();
        assert_eq!(times, vec![0, 2]);
    }

    #[test]
    fn test_selection_array_assembly() {
        let mut sampler = loaded_sampler(None);
        let selection = sampler
            .select(SelectMode::Exhaustive, Some(2), Some(&[(5, 5), (6, 6)]), OutputRank::Rank4)
            .unwrap();

        assert_eq!(selection.labels_array().len(), 4);
        assert_eq!(selection.indices_array().dim(), (4, 3));
        let stacked = selection.patches_rank4().unwrap();
        assert_eq!(stacked.dim(), (4, 3, 3, 3));
        assert!(selection.patches_rank5().is_none());
    }
}
