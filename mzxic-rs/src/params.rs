//! Extraction settings
//!
//! [`ExtractionParams`] gathers every knob of the extraction pipeline in one
//! immutable value. It is built once, either with [`ExtractionParamsBuilder`]
//! or from JSON, and handed to [`XicExtractor::new`](crate::XicExtractor::new).
//!
//! # Example
//!
//! ```
//! use mzxic::params::ExtractionParams;
//! use mzxic::tolerance::Tolerance;
//!
//! let params = ExtractionParams::from_json_str(r#"{ "tolerance": "10 ppm", "missed_scans_allowed": 2 }"#).unwrap();
//! assert_eq!(params.tolerance, Tolerance::Ppm(10.0));
//! assert_eq!(params.bins_per_dalton, 100);
//! ```

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::error::{XicError, XicResult};
use crate::extrema::{
    DEFAULT_EXTREMUM_INTENSITY_CUTOFF, DEFAULT_EXTREMUM_RT_TOLERANCE, DEFAULT_MIN_PEAK_WIDTH,
    DEFAULT_SHARED_EXTREMUM_FRACTION, DEFAULT_SMOOTHING_POINTS, DEFAULT_TRIMMING_WINDOW,
};
use crate::peak_index::{DEFAULT_BINS_PER_DALTON, IndexingParams};
use crate::spline::SplineKind;
use crate::tolerance::Tolerance;
use crate::xic::DEFAULT_DISCRIMINATION_FACTOR;
use crate::xic_group::{DEFAULT_SIMILARITY_THRESHOLD, SimilarityMetric, XicGroupingParams};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    #[serde_as(as = "DisplayFromStr")]
    pub tolerance: Tolerance,
    pub bins_per_dalton: u32,
    pub min_ms_level: u8,
    pub missed_scans_allowed: usize,
    /// Largest RT distance from the seed peak while tracing, unbounded when absent
    pub max_peak_half_width: Option<f64>,
    pub min_peaks_per_xic: usize,
    pub spline_kind: SplineKind,
    pub spline_step: f64,
    pub padding_points: usize,
    /// Spacing of the padding points, `spline_step` when absent
    pub padding_step: Option<f64>,
    pub discrimination_factor: f64,
    pub similarity_threshold: f64,
    pub similarity_metric: SimilarityMetric,
    pub align_rt: bool,
    pub max_rt_shift: Option<f64>,
    pub smoothing_points: usize,
    /// Share of a group's XICs that must show an extremum for it to be shared
    pub shared_extremum_fraction: f64,
    pub extremum_rt_tolerance: f64,
    pub extremum_intensity_cutoff: f64,
    pub trimming_window: f64,
    pub min_peak_width: f64,
    /// Worker threads for batch queries, 0 lets rayon decide
    pub num_threads: usize,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        ExtractionParams {
            tolerance: Tolerance::Ppm(20.0),
            bins_per_dalton: DEFAULT_BINS_PER_DALTON,
            min_ms_level: 1,
            missed_scans_allowed: 1,
            max_peak_half_width: None,
            min_peaks_per_xic: 3,
            spline_kind: SplineKind::Linear,
            spline_step: 0.05,
            padding_points: 0,
            padding_step: None,
            discrimination_factor: DEFAULT_DISCRIMINATION_FACTOR,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            similarity_metric: SimilarityMetric::Cosine,
            align_rt: false,
            max_rt_shift: None,
            smoothing_points: DEFAULT_SMOOTHING_POINTS,
            shared_extremum_fraction: DEFAULT_SHARED_EXTREMUM_FRACTION,
            extremum_rt_tolerance: DEFAULT_EXTREMUM_RT_TOLERANCE,
            extremum_intensity_cutoff: DEFAULT_EXTREMUM_INTENSITY_CUTOFF,
            trimming_window: DEFAULT_TRIMMING_WINDOW,
            min_peak_width: DEFAULT_MIN_PEAK_WIDTH,
            num_threads: 0,
        }
    }
}

fn check_positive(name: &str, value: f64) -> XicResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(XicError::invalid(format!(
            "{} must be a positive finite value, got {}",
            name, value
        )));
    }
    Ok(())
}

impl ExtractionParams {
    pub fn builder() -> ExtractionParamsBuilder {
        ExtractionParamsBuilder::default()
    }

    /// Parse and validate params from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> XicResult<Self> {
        let params: ExtractionParams = serde_json::from_str(json)
            .map_err(|e| XicError::invalid(format!("invalid extraction params: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json_string(&self) -> XicResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| XicError::invalid(e.to_string()))
    }

    pub fn validate(&self) -> XicResult<()> {
        self.tolerance.validate()?;
        self.indexing_params().validate()?;
        check_positive("spline step", self.spline_step)?;
        if let Some(step) = self.padding_step {
            check_positive("padding step", step)?;
        }
        if let Some(width) = self.max_peak_half_width {
            check_positive("max peak half width", width)?;
        }
        if !(0.0..=1.0).contains(&self.discrimination_factor) {
            return Err(XicError::invalid(format!(
                "discrimination factor must lie in [0, 1], got {}",
                self.discrimination_factor
            )));
        }
        self.grouping_params().validate()
    }

    pub fn indexing_params(&self) -> IndexingParams {
        IndexingParams {
            bins_per_dalton: self.bins_per_dalton,
        }
    }

    pub fn grouping_params(&self) -> XicGroupingParams {
        XicGroupingParams {
            similarity_threshold: self.similarity_threshold,
            metric: self.similarity_metric,
            align_rt: self.align_rt,
            max_rt_shift: self.max_rt_shift,
            grid_step: None,
            smoothing_points: self.smoothing_points,
            shared_extremum_fraction: self.shared_extremum_fraction,
            extremum_rt_tolerance: self.extremum_rt_tolerance,
            extremum_intensity_cutoff: self.extremum_intensity_cutoff,
            trimming_window: self.trimming_window,
            min_peak_width: self.min_peak_width,
        }
    }

    pub fn peak_half_width(&self) -> f64 {
        self.max_peak_half_width.unwrap_or(f64::MAX)
    }

    pub fn padding_step_or_default(&self) -> f64 {
        self.padding_step.unwrap_or(self.spline_step)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExtractionParamsBuilder {
    params: ExtractionParams,
}

impl ExtractionParamsBuilder {
    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.params.tolerance = tolerance;
        self
    }

    pub fn bins_per_dalton(mut self, bins_per_dalton: u32) -> Self {
        self.params.bins_per_dalton = bins_per_dalton;
        self
    }

    pub fn min_ms_level(mut self, min_ms_level: u8) -> Self {
        self.params.min_ms_level = min_ms_level;
        self
    }

    pub fn missed_scans_allowed(mut self, missed_scans_allowed: usize) -> Self {
        self.params.missed_scans_allowed = missed_scans_allowed;
        self
    }

    pub fn max_peak_half_width(mut self, max_peak_half_width: f64) -> Self {
        self.params.max_peak_half_width = Some(max_peak_half_width);
        self
    }

    pub fn min_peaks_per_xic(mut self, min_peaks_per_xic: usize) -> Self {
        self.params.min_peaks_per_xic = min_peaks_per_xic;
        self
    }

    pub fn spline(mut self, kind: SplineKind, step: f64) -> Self {
        self.params.spline_kind = kind;
        self.params.spline_step = step;
        self
    }

    pub fn padding(mut self, points: usize, step: f64) -> Self {
        self.params.padding_points = points;
        self.params.padding_step = Some(step);
        self
    }

    pub fn discrimination_factor(mut self, factor: f64) -> Self {
        self.params.discrimination_factor = factor;
        self
    }

    pub fn similarity(mut self, metric: SimilarityMetric, threshold: f64) -> Self {
        self.params.similarity_metric = metric;
        self.params.similarity_threshold = threshold;
        self
    }

    pub fn align_rt(mut self, max_rt_shift: Option<f64>) -> Self {
        self.params.align_rt = true;
        self.params.max_rt_shift = max_rt_shift;
        self
    }

    pub fn smoothing_points(mut self, smoothing_points: usize) -> Self {
        self.params.smoothing_points = smoothing_points;
        self
    }

    /// Extrema above `intensity_cutoff` found within `rt_tolerance` in at
    /// least `fraction` of a group's XICs are shared
    pub fn shared_extrema(mut self, fraction: f64, rt_tolerance: f64, intensity_cutoff: f64) -> Self {
        self.params.shared_extremum_fraction = fraction;
        self.params.extremum_rt_tolerance = rt_tolerance;
        self.params.extremum_intensity_cutoff = intensity_cutoff;
        self
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.params.num_threads = num_threads;
        self
    }

    pub fn build(self) -> XicResult<ExtractionParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ExtractionParams::default();
        assert_eq!(params.tolerance, Tolerance::Ppm(20.0));
        assert_eq!(params.bins_per_dalton, 100);
        assert_eq!(params.missed_scans_allowed, 1);
        assert_eq!(params.peak_half_width(), f64::MAX);
        assert_eq!(params.padding_step_or_default(), 0.05);
        assert_eq!(params.discrimination_factor, 0.6);
        assert_eq!(params.similarity_threshold, 0.7);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let params = ExtractionParams::builder()
            .tolerance(Tolerance::Absolute(0.01))
            .missed_scans_allowed(3)
            .spline(SplineKind::Cubic, 0.1)
            .padding(2, 0.2)
            .align_rt(Some(5.0))
            .build()
            .unwrap();

        assert_eq!(params.tolerance, Tolerance::Absolute(0.01));
        assert_eq!(params.spline_kind, SplineKind::Cubic);
        assert_eq!(params.padding_step_or_default(), 0.2);
        assert!(params.grouping_params().align_rt);
        assert_eq!(params.grouping_params().max_rt_shift, Some(5.0));
    }

    #[test]
    fn test_shared_extrema_settings_reach_grouping() {
        let params = ExtractionParams::builder()
            .smoothing_points(7)
            .shared_extrema(0.8, 0.05, 1.0e4)
            .build()
            .unwrap();

        let grouping = params.grouping_params();
        assert_eq!(grouping.smoothing_points, 7);
        assert_eq!(grouping.shared_extremum_fraction, 0.8);
        assert_eq!(grouping.extremum_rt_tolerance, 0.05);
        assert_eq!(grouping.extremum_intensity_cutoff, 1.0e4);
        assert_eq!(grouping.trimming_window, 0.3);

        assert!(ExtractionParams::builder().smoothing_points(0).build().is_err());
        assert!(ExtractionParams::builder().shared_extrema(1.2, 0.1, 0.0).build().is_err());
        assert!(ExtractionParams::builder().shared_extrema(0.5, -0.1, 0.0).build().is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(ExtractionParams::builder().spline(SplineKind::Linear, 0.0).build().is_err());
        assert!(ExtractionParams::builder().tolerance(Tolerance::Ppm(-5.0)).build().is_err());
        assert!(ExtractionParams::builder().bins_per_dalton(0).build().is_err());
        assert!(ExtractionParams::builder().discrimination_factor(1.5).build().is_err());
        assert!(
            ExtractionParams::builder()
                .similarity(SimilarityMetric::Pearson, -0.1)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_json_round_trip() {
        let params = ExtractionParams::builder()
            .tolerance(Tolerance::Ppm(7.5))
            .similarity(SimilarityMetric::Pearson, 0.8)
            .build()
            .unwrap();

        let json = params.to_json_string().unwrap();
        assert!(json.contains("\"tolerance\": \"7.5 ppm\""));
        assert!(json.contains("\"similarity_metric\": \"Pearson\""));
        assert_eq!(ExtractionParams::from_json_str(&json).unwrap(), params);
    }

    #[test]
    fn test_from_json_errors() {
        assert!(ExtractionParams::from_json_str(r#"{ "tolerance": "7 furlongs" }"#).is_err());
        assert!(ExtractionParams::from_json_str(r#"{ "spline_step": -1.0 }"#).is_err());
        assert!(ExtractionParams::from_json_str("not json").is_err());
    }
}
