//! Co-elution grouping of extracted ion chromatograms
//!
//! Every XIC is resampled onto one shared retention time grid, pairwise
//! similarities are computed on that grid, and XICs joined by a similarity
//! at or above the threshold end up in the same group (connected components
//! of the similarity graph).
//!
//! With `align_rt` the similarity of a pair is measured after shifting one
//! trace by the lag that maximizes their cross-correlation, so isotopologues
//! or charge states eluting slightly apart can still be grouped.
//!
//! Each group also carries the extrema its members share once projected
//! onto the reference's time axis, and the peak regions those extrema bound.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::{XicError, XicResult};
use crate::extrema::{
    DEFAULT_EXTREMUM_INTENSITY_CUTOFF, DEFAULT_EXTREMUM_RT_TOLERANCE, DEFAULT_MIN_PEAK_WIDTH,
    DEFAULT_SHARED_EXTREMUM_FRACTION, DEFAULT_SMOOTHING_POINTS, DEFAULT_TRIMMING_WINDOW, Extremum, ExtremumKind,
    PeakRegion, build_shared_peaks, cluster_extrema, find_extrema, smoothed_curve, trim_shared_extrema,
};
use crate::spline::{Interpolator, LinearInterpolator, merge_equal_knots};
use crate::xic::ExtractedIonChromatogram;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

const GRID_EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display)]
pub enum SimilarityMetric {
    #[default]
    #[strum(serialize = "cosine")]
    Cosine,
    #[strum(serialize = "pearson")]
    Pearson,
}

impl SimilarityMetric {
    pub fn compute(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            SimilarityMetric::Cosine => cosine(a, b),
            SimilarityMetric::Pearson => pearson(a, b),
        }
    }
}

/// Cosine similarity, 0 when either vector is all zeros
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na.sqrt() * nb.sqrt()) }
}

/// Pearson correlation, 0 when either vector is constant
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XicGroupingParams {
    pub similarity_threshold: f64,
    pub metric: SimilarityMetric,
    pub align_rt: bool,
    /// Largest RT shift tried when aligning, unbounded when absent
    pub max_rt_shift: Option<f64>,
    /// Grid spacing, the smallest median RT spacing of the XICs when absent
    pub grid_step: Option<f64>,
    /// Window of both smoothing passes before extremum detection
    pub smoothing_points: usize,
    /// Share of a group's XICs that must show an extremum for it to be shared
    pub shared_extremum_fraction: f64,
    /// Extrema of different XICs this close in projected RT coincide
    pub extremum_rt_tolerance: f64,
    /// Extrema below this raw intensity are ignored
    pub extremum_intensity_cutoff: f64,
    pub trimming_window: f64,
    /// Shared peak regions narrower than this are dropped
    pub min_peak_width: f64,
}

impl Default for XicGroupingParams {
    fn default() -> Self {
        XicGroupingParams {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            metric: SimilarityMetric::Cosine,
            align_rt: false,
            max_rt_shift: None,
            grid_step: None,
            smoothing_points: DEFAULT_SMOOTHING_POINTS,
            shared_extremum_fraction: DEFAULT_SHARED_EXTREMUM_FRACTION,
            extremum_rt_tolerance: DEFAULT_EXTREMUM_RT_TOLERANCE,
            extremum_intensity_cutoff: DEFAULT_EXTREMUM_INTENSITY_CUTOFF,
            trimming_window: DEFAULT_TRIMMING_WINDOW,
            min_peak_width: DEFAULT_MIN_PEAK_WIDTH,
        }
    }
}

impl XicGroupingParams {
    pub fn validate(&self) -> XicResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(XicError::invalid(format!(
                "similarity threshold must lie in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if let Some(shift) = self.max_rt_shift {
            if !shift.is_finite() || shift < 0.0 {
                return Err(XicError::invalid(format!("invalid max RT shift: {}", shift)));
            }
        }
        if let Some(step) = self.grid_step {
            if !step.is_finite() || step <= 0.0 {
                return Err(XicError::invalid(format!("invalid grid step: {}", step)));
            }
        }
        if self.smoothing_points == 0 {
            return Err(XicError::invalid("smoothing points must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.shared_extremum_fraction) {
            return Err(XicError::invalid(format!(
                "shared extremum fraction must lie in [0, 1], got {}",
                self.shared_extremum_fraction
            )));
        }
        for (name, value) in [
            ("extremum RT tolerance", self.extremum_rt_tolerance),
            ("extremum intensity cutoff", self.extremum_intensity_cutoff),
            ("trimming window", self.trimming_window),
            ("min peak width", self.min_peak_width),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(XicError::invalid(format!("invalid {}: {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Union-find with path halving and union by size
#[derive(Clone, Debug)]
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] { (ra, rb) } else { (rb, ra) };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct XicGroup {
    /// Member with the highest apex intensity
    pub reference: usize,
    /// Indices into the grouped slice, ascending
    pub members: Vec<usize>,
    /// Extrema found in enough members, on the reference time axis
    pub shared_extrema: Vec<Extremum>,
    /// `(rt, intensity)` of each shared extremum on the reference's smoothed curve
    pub extrema_in_reference: Vec<(f64, f64)>,
    pub shared_peaks: Vec<PeakRegion>,
}

impl XicGroup {
    fn new(first_member: usize) -> Self {
        XicGroup {
            reference: first_member,
            members: Vec::new(),
            shared_extrema: Vec::new(),
            extrema_in_reference: Vec::new(),
            shared_peaks: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct XicGroups<'a> {
    xics: &'a [ExtractedIonChromatogram],
    params: XicGroupingParams,
    grid: Vec<f64>,
    similarities: Vec<f64>,
    groups: Vec<XicGroup>,
    group_of: Vec<usize>,
    rt_shifts: Vec<f64>,
    extrema: Vec<Vec<Extremum>>,
}

impl<'a> XicGroups<'a> {
    pub fn new(xics: &'a [ExtractedIonChromatogram], params: XicGroupingParams) -> XicResult<Self> {
        params.validate()?;
        if xics.is_empty() {
            return Err(XicError::EmptyInput);
        }

        let n = xics.len();
        let step = params.grid_step.unwrap_or_else(|| smallest_median_spacing(xics));
        let start = xics.iter().map(|x| x.start_rt()).fold(f64::INFINITY, f64::min);
        let end = xics.iter().map(|x| x.end_rt()).fold(f64::NEG_INFINITY, f64::max);
        let point_count = ((end - start) / step + GRID_EPSILON).floor() as usize + 1;
        let grid: Vec<f64> = (0..point_count).map(|i| start + i as f64 * step).collect();

        let curves = xics
            .iter()
            .map(|xic| resample_on_grid(xic, &grid, step))
            .collect::<XicResult<Vec<_>>>()?;

        let max_lag = if params.align_rt {
            params
                .max_rt_shift
                .map(|shift| ((shift / step + GRID_EPSILON).floor() as usize).min(point_count - 1))
                .unwrap_or(point_count - 1)
        } else {
            0
        };

        let mut similarities = vec![0.0; n * n];
        let mut components = DisjointSet::new(n);
        for i in 0..n {
            similarities[i * n + i] = 1.0;
            for j in (i + 1)..n {
                let lag = best_lag(&curves[i], &curves[j], max_lag);
                let similarity = params.metric.compute(&curves[i], &shifted(&curves[j], lag));
                similarities[i * n + j] = similarity;
                similarities[j * n + i] = similarity;

                trace!("XIC {} vs {}: {} {:.4} at lag {}", i, j, params.metric, similarity, lag);
                if similarity >= params.similarity_threshold {
                    components.union(i, j);
                }
            }
        }

        // groups ordered by their lowest member
        let mut groups: Vec<XicGroup> = Vec::new();
        let mut group_of = vec![0; n];
        let mut root_to_group: Vec<Option<usize>> = vec![None; n];
        for i in 0..n {
            let root = components.find(i);
            let g = match root_to_group[root] {
                Some(g) => g,
                None => {
                    groups.push(XicGroup::new(i));
                    root_to_group[root] = Some(groups.len() - 1);
                    groups.len() - 1
                }
            };
            groups[g].members.push(i);
            group_of[i] = g;
        }

        let shift_lag = if max_lag == 0 { point_count - 1 } else { max_lag };
        let mut rt_shifts = vec![0.0; n];
        for group in &mut groups {
            group.reference = group
                .members
                .iter()
                .copied()
                .fold(group.members[0], |best, m| {
                    if xics[m].apex_intensity() > xics[best].apex_intensity() { m } else { best }
                });
            for &m in &group.members {
                if m != group.reference {
                    rt_shifts[m] = best_lag(&curves[group.reference], &curves[m], shift_lag) as f64 * step;
                }
            }
        }

        let extrema = xics
            .iter()
            .zip(&rt_shifts)
            .map(|(xic, &shift)| find_extrema(xic, params.smoothing_points, shift))
            .collect::<XicResult<Vec<_>>>()?;
        for group in &mut groups {
            set_shared_features(group, xics, &extrema, &params)?;
        }

        debug!(
            "grouped {} XICs into {} groups ({} >= {}, align_rt={})",
            n,
            groups.len(),
            params.metric,
            params.similarity_threshold,
            params.align_rt
        );

        Ok(XicGroups {
            xics,
            params,
            grid,
            similarities,
            groups,
            group_of,
            rt_shifts,
            extrema,
        })
    }

    pub fn params(&self) -> &XicGroupingParams {
        &self.params
    }

    /// Shared retention time grid the XICs were compared on
    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    pub fn groups(&self) -> &[XicGroup] {
        &self.groups
    }

    pub fn group_of(&self, xic_index: usize) -> Option<usize> {
        self.group_of.get(xic_index).copied()
    }

    pub fn similarity(&self, i: usize, j: usize) -> Option<f64> {
        let n = self.xics.len();
        if i < n && j < n { Some(self.similarities[i * n + j]) } else { None }
    }

    /// RT shift that overlays XIC `xic_index` on its group reference:
    /// `xic(t - shift)` matches `reference(t)`
    pub fn rt_shift(&self, xic_index: usize) -> Option<f64> {
        self.rt_shifts.get(xic_index).copied()
    }

    /// Extrema of XIC `xic_index`, moved onto its group reference's time axis
    pub fn extrema(&self, xic_index: usize) -> Option<&[Extremum]> {
        self.extrema.get(xic_index).map(Vec::as_slice)
    }

    pub fn members(&self, group_index: usize) -> impl Iterator<Item = &'a ExtractedIonChromatogram> + '_ {
        let xics = self.xics;
        self.groups
            .get(group_index)
            .into_iter()
            .flat_map(|g| g.members.iter())
            .map(move |&m| &xics[m])
    }

    pub fn reference(&self, group_index: usize) -> Option<&'a ExtractedIonChromatogram> {
        let xics = self.xics;
        self.groups.get(group_index).map(|g| &xics[g.reference])
    }
}

/// Shared extrema of `group`, their projection on the reference's smoothed
/// curve and the peak regions they bound. Left empty when the reference is
/// too short to smooth.
fn set_shared_features(
    group: &mut XicGroup,
    xics: &[ExtractedIonChromatogram],
    extrema: &[Vec<Extremum>],
    params: &XicGroupingParams,
) -> XicResult<()> {
    let Some(reference) = smoothed_curve(&xics[group.reference], params.smoothing_points)? else {
        return Ok(());
    };

    let min_count = params.shared_extremum_fraction * group.members.len() as f64;
    let of_kind = |kind: ExtremumKind| {
        let mut found: Vec<Extremum> = group
            .members
            .iter()
            .flat_map(|&m| extrema[m].iter().copied())
            .filter(|e| e.kind == kind && e.intensity >= params.extremum_intensity_cutoff)
            .collect();
        found.sort_by(|a, b| a.retention_time.total_cmp(&b.retention_time));
        cluster_extrema(&found, params.extremum_rt_tolerance, min_count)
    };

    let mut shared = of_kind(ExtremumKind::Minimum);
    shared.extend(of_kind(ExtremumKind::Maximum));
    shared.sort_by(|a, b| a.retention_time.total_cmp(&b.retention_time));
    trim_shared_extrema(&mut shared, &reference, params.trimming_window);

    group.extrema_in_reference = shared
        .iter()
        .map(|e| (e.retention_time, reference.evaluate(e.retention_time)))
        .collect();
    group.shared_peaks = build_shared_peaks(&shared, params.min_peak_width);
    group.shared_extrema = shared;

    trace!(
        "group of XIC {}: {} shared extrema, {} shared peaks",
        group.reference,
        group.shared_extrema.len(),
        group.shared_peaks.len()
    );
    Ok(())
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

/// Smallest median RT spacing over the XICs, 1.0 when no XIC has two peaks
fn smallest_median_spacing(xics: &[ExtractedIonChromatogram]) -> f64 {
    xics.iter()
        .filter_map(|xic| {
            let mut spacings: Vec<f64> = xic
                .peaks()
                .windows(2)
                .map(|w| w[1].retention_time - w[0].retention_time)
                .filter(|d| *d > 0.0)
                .collect();
            median(&mut spacings)
        })
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(1.0)
}

/// Linear resampling onto `grid`, zero outside the XIC's own RT range.
/// Peaks sharing a retention time count once, with the highest intensity.
fn resample_on_grid(xic: &ExtractedIonChromatogram, grid: &[f64], step: f64) -> XicResult<Vec<f64>> {
    let (x, y) = merge_equal_knots(&xic.retention_times(), &xic.intensities());
    if x.len() == 1 {
        let mut curve = vec![0.0; grid.len()];
        let slot = ((x[0] - grid[0]) / step).round() as usize;
        if let Some(v) = curve.get_mut(slot) {
            *v = y[0];
        }
        return Ok(curve);
    }

    let curve = LinearInterpolator::new(&x, &y)?;
    let (lo, hi) = curve.domain();
    Ok(grid
        .iter()
        .map(|&t| {
            if t < lo - GRID_EPSILON || t > hi + GRID_EPSILON { 0.0 } else { curve.evaluate(t) }
        })
        .collect())
}

/// `curve[k - lag]`, zero where the index falls outside the curve
fn shifted(curve: &[f64], lag: isize) -> Vec<f64> {
    (0..curve.len() as isize)
        .map(|k| {
            let src = k - lag;
            if src >= 0 && (src as usize) < curve.len() { curve[src as usize] } else { 0.0 }
        })
        .collect()
}

/// Lag `L` in `[-max_lag, max_lag]` maximizing `sum_k reference[k] * other[k - L]`.
/// Lags are tried from 0 outward so the smallest shift wins ties.
fn best_lag(reference: &[f64], other: &[f64], max_lag: usize) -> isize {
    let n = reference.len().min(other.len()) as isize;
    let correlation = |lag: isize| -> f64 {
        let lo = lag.max(0);
        let hi = (n + lag).min(n);
        (lo..hi).map(|k| reference[k as usize] * other[(k - lag) as usize]).sum()
    };

    let mut best = (0_isize, correlation(0));
    for step in 1..=max_lag as isize {
        for lag in [-step, step] {
            let c = correlation(lag);
            if c > best.1 {
                best = (lag, c);
            }
        }
    }
    best.0
}
