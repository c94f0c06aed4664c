//! mzxic-rs: peak indexing and extracted ion chromatograms for mass spectrometry data
//!
//! This library indexes the peaks of a set of centroided scans for fast
//! tolerance lookups, assembles extracted ion chromatograms (XICs) from the
//! index, resamples them onto uniform grids and groups co-eluting traces.
//!
//! # Features
//!
//! - **Peak Index**: Mass-binned index over every peak of every scan
//! - **XIC Extraction**: Forward extraction, bidirectional tracing and whole-run XIC discovery
//! - **XIC Statistics**: Apex, RT bounds, averaged mass, normalization and valley cutting
//! - **Resampling**: Linear and natural cubic splines on RT or scan-cycle grids
//! - **Grouping**: Co-elution grouping with optional RT alignment
//! - **Shared Peaks**: Smoothed extrema shared across a group and the peak regions they bound
//! - **Peak Merging**: K-way merge of sorted peak arrays with near-duplicate collapse
//!
//! # Quick Start
//!
//! ```
//! use mzxic::{ExtractionParams, Scan, XicExtractor};
//!
//! let scans: Vec<Scan> = (0..10)
//!     .map(|i| {
//!         let intensity = 1000.0 * (1.0 + (5 - (i as i32 - 5).abs()) as f64);
//!         Scan::new(i + 1, 1, 10.0 + i as f64 * 0.1, vec![445.12, 520.3], vec![intensity, 50.0]).unwrap()
//!     })
//!     .collect();
//!
//! let extractor = XicExtractor::new(&scans, ExtractionParams::default()).unwrap();
//! let mut xic = extractor.build_xic(445.12, 5).unwrap().unwrap();
//! println!("apex at {:.2} min, averaged mass {:.4}", xic.apex_rt(), xic.averaged_mass());
//!
//! extractor.resample(&mut xic, false).unwrap();
//! assert!(xic.xy_data().is_some());
//! ```
//!
//! # Module Organization
//!
//! - [`model`]: Scans, scan metadata and indexed peaks
//! - [`tolerance`]: Ppm and absolute mass windows
//! - [`peak_index`]: The peak indexing engine
//! - [`xic`]: Extracted ion chromatograms
//! - [`spline`]: Uniform-grid resampling
//! - [`xic_group`]: Co-elution grouping
//! - [`extrema`]: Smoothing, extremum detection and shared peak regions
//! - [`merge`]: Peak array merging
//! - [`params`]: Extraction settings
//! - [`error`]: Error types

pub mod error;
pub mod extrema;
pub mod merge;
pub mod model;
pub mod params;
pub mod peak_index;
pub mod spline;
pub mod tolerance;
pub mod xic;
pub mod xic_group;


// Re-export main types for convenience
pub use error::{XicError, XicResult};
pub use extrema::{Extremum, ExtremumKind, PeakRegion};
pub use model::{IndexedPeak, Scan, ScanInfo};
pub use params::{ExtractionParams, ExtractionParamsBuilder};
pub use peak_index::{IndexingParams, PeakIndexingEngine};
pub use spline::{SplineKind, XicCubicSpline, XicLinearSpline, XicSpline};
pub use tolerance::Tolerance;
pub use xic::ExtractedIonChromatogram;
pub use xic_group::{SimilarityMetric, XicGroup, XicGroupingParams, XicGroups};

use anyhow::ensure;
use anyhow_ext::{Context, Result};
use log::info;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

/// A mass to trace and the retention time to start tracing from
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XicTarget {
    pub mass: f64,
    pub retention_time: f64,
}

/// Main entry point for chromatogram extraction
///
/// The `XicExtractor` owns the peak index built from a scan set, the
/// extraction settings and the worker pool used for batch queries.
///
/// # Example
///
/// ```no_run
/// use mzxic::{ExtractionParams, Scan, XicExtractor, XicTarget};
///
/// # let scans: Vec<Scan> = Vec::new();
/// let extractor = XicExtractor::new(&scans, ExtractionParams::default()).unwrap();
///
/// let targets = [XicTarget { mass: 800.3672, retention_time: 21.4 }];
/// for xic in extractor.extract_xics(&targets).unwrap().into_iter().flatten() {
///     println!("{:.4} apex at {:.2}", xic.averaged_mass(), xic.apex_rt());
/// }
/// ```
pub struct XicExtractor {
    engine: PeakIndexingEngine,
    params: ExtractionParams,
    pool: ThreadPool,
}

impl XicExtractor {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Validate the params, index the scans and start the worker pool
    pub fn new(scans: &[Scan], params: ExtractionParams) -> Result<Self> {
        params.validate().dot()?;
        let engine = PeakIndexingEngine::initialize_with_params(scans, params.indexing_params()).dot()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(params.num_threads)
            .build()
            .dot()?;

        info!(
            "indexed {} scans ({} peaks) with {} worker threads, tolerance {}",
            engine.scan_count(),
            engine.peak_count(),
            pool.current_num_threads(),
            params.tolerance
        );

        Ok(Self { engine, params, pool })
    }

    pub fn engine(&self) -> &PeakIndexingEngine {
        &self.engine
    }

    pub fn params(&self) -> &ExtractionParams {
        &self.params
    }

    // ========================================================================
    // Peak queries
    // ========================================================================

    /// Forward extraction of `target_mass` from a start scan
    pub fn get_xic(&self, target_mass: f64, zero_based_start_scan_index: usize) -> Result<Vec<IndexedPeak>> {
        let peaks = self
            .engine
            .get_xic(
                target_mass,
                zero_based_start_scan_index,
                &self.params.tolerance,
                self.params.min_ms_level,
            )
            .dot()?;
        Ok(peaks)
    }

    /// Forward extraction of several masses on the worker pool
    pub fn get_xics(&self, target_masses: &[f64], zero_based_start_scan_index: usize) -> Result<Vec<Vec<IndexedPeak>>> {
        let peaks = self
            .pool
            .install(|| {
                self.engine.get_xics(
                    target_masses,
                    zero_based_start_scan_index,
                    &self.params.tolerance,
                    self.params.min_ms_level,
                )
            })
            .dot()?;
        Ok(peaks)
    }

    /// Bidirectional tracing of `target_mass` around a start scan
    pub fn trace_xic(&self, target_mass: f64, zero_based_start_scan_index: usize) -> Result<Vec<IndexedPeak>> {
        let peaks = self
            .engine
            .trace_xic(
                target_mass,
                zero_based_start_scan_index,
                &self.params.tolerance,
                self.params.missed_scans_allowed,
                self.params.peak_half_width(),
            )
            .dot()?;
        Ok(peaks)
    }

    // ========================================================================
    // Chromatograms
    // ========================================================================

    /// Trace `target_mass`, build the XIC and cut it at deep valleys.
    ///
    /// Returns `None` when fewer than `min_peaks_per_xic` peaks are found.
    pub fn build_xic(
        &self,
        target_mass: f64,
        zero_based_start_scan_index: usize,
    ) -> Result<Option<ExtractedIonChromatogram>> {
        let peaks = self.trace_xic(target_mass, zero_based_start_scan_index)?;
        if peaks.is_empty() || peaks.len() < self.params.min_peaks_per_xic {
            return Ok(None);
        }

        let mut xic = ExtractedIonChromatogram::new(peaks).dot()?;
        xic.cut_peak(self.params.discrimination_factor);
        Ok(Some(xic))
    }

    /// [`build_xic`](Self::build_xic) for every target, on the worker pool
    pub fn extract_xics(&self, targets: &[XicTarget]) -> Result<Vec<Option<ExtractedIonChromatogram>>> {
        let xics = self.pool.install(|| {
            targets
                .par_iter()
                .map(|target| {
                    let start = self.engine.scan_index_at_retention_time(target.retention_time);
                    self.build_xic(target.mass, start)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        info!(
            "extracted {} XICs for {} targets",
            xics.iter().filter(|x| x.is_some()).count(),
            targets.len()
        );
        Ok(xics)
    }

    /// Trace every XIC present in the indexed scans
    pub fn get_all_xics(&self) -> Result<Vec<ExtractedIonChromatogram>> {
        let xics = self
            .engine
            .get_all_xics(
                &self.params.tolerance,
                self.params.missed_scans_allowed,
                self.params.peak_half_width(),
                self.params.min_peaks_per_xic,
            )
            .dot()?;

        info!("found {} XICs in {} scans", xics.len(), self.engine.scan_count());
        Ok(xics)
    }

    /// Resample `xic` with the configured spline
    pub fn resample(&self, xic: &mut ExtractedIonChromatogram, cycle: bool) -> Result<()> {
        let p = &self.params;
        match p.spline_kind {
            SplineKind::Linear => {
                XicLinearSpline::with_padding(p.spline_step, p.padding_points, p.padding_step_or_default())
                    .and_then(|spline| spline.set_xic_spline_xy_data(xic, cycle))
                    .dot()?;
            }
            SplineKind::Cubic => {
                XicCubicSpline::with_padding(p.spline_step, p.padding_points, p.padding_step_or_default())
                    .and_then(|spline| spline.set_xic_spline_xy_data(xic, cycle))
                    .dot()?;
            }
        }
        Ok(())
    }

    /// Group co-eluting XICs with the configured similarity settings
    pub fn group<'a>(&self, xics: &'a [ExtractedIonChromatogram]) -> Result<XicGroups<'a>> {
        ensure!(!xics.is_empty(), "no XICs to group");
        let groups = XicGroups::new(xics, self.params.grouping_params()).dot()?;
        Ok(groups)
    }
}
