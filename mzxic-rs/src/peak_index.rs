//! Mass-binned peak index over a set of scans
//!
//! Every peak of every scan is stored in a fixed-width bin keyed by
//! `round(mz * bins_per_dalton)`. Only occupied bins are stored, so memory
//! follows the peak count rather than the m/z range. Inside a bin peaks are
//! kept in scan order, so the peaks of one scan are found with a binary
//! search on the scan index.
//! A tolerance query visits every bin between `floor(min * bins_per_dalton)`
//! and `ceil(max * bins_per_dalton)`.
//!
//! # Example
//!
//! ```
//! use mzxic::model::Scan;
//! use mzxic::peak_index::PeakIndexingEngine;
//! use mzxic::tolerance::Tolerance;
//!
//! let scans: Vec<Scan> = (0..5)
//!     .map(|i| Scan::new(i + 1, 1, i as f64, vec![500.0, 600.0], vec![10.0, 20.0]).unwrap())
//!     .collect();
//!
//! let engine = PeakIndexingEngine::initialize(&scans).unwrap();
//! let xic = engine.get_xic(500.001, 0, &Tolerance::Ppm(10.0), 1).unwrap();
//! assert_eq!(xic.len(), 5);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;

use log::{debug, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{XicError, XicResult};
use crate::model::{IndexedPeak, Scan, ScanInfo};
use crate::tolerance::Tolerance;
use crate::xic::ExtractedIonChromatogram;

pub const DEFAULT_BINS_PER_DALTON: u32 = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingParams {
    pub bins_per_dalton: u32,
}

impl Default for IndexingParams {
    fn default() -> Self {
        IndexingParams {
            bins_per_dalton: DEFAULT_BINS_PER_DALTON,
        }
    }
}

impl IndexingParams {
    pub fn validate(&self) -> XicResult<()> {
        if self.bins_per_dalton == 0 {
            return Err(XicError::invalid("bins_per_dalton must be greater than zero"));
        }
        Ok(())
    }
}

/// Identity of an indexed peak: scan index plus the exact bits of its m/z
type PeakKey = (usize, u64);

/// Bin holding `mz`; the float to int cast saturates, so huge masses share the last bin
fn bin_key(mz: f64, bins_per_dalton: f64) -> u64 {
    (mz * bins_per_dalton).round() as u64
}

fn peak_key(peak: &IndexedPeak) -> PeakKey {
    (peak.zero_based_scan_index, peak.mz.to_bits())
}

#[derive(Clone, Debug)]
pub struct PeakIndexingEngine {
    bins: BTreeMap<u64, Vec<IndexedPeak>>,
    scan_infos: Vec<ScanInfo>,
    params: IndexingParams,
    peak_count: usize,
}

impl PeakIndexingEngine {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Index all peaks of `scans` with the default bin width (0.01 Da)
    pub fn initialize(scans: &[Scan]) -> XicResult<Self> {
        Self::initialize_with_params(scans, IndexingParams::default())
    }

    pub fn initialize_with_params(scans: &[Scan], params: IndexingParams) -> XicResult<Self> {
        params.validate()?;

        if scans.is_empty() {
            return Err(XicError::invalid("cannot index an empty scan set"));
        }

        for scan in scans {
            if scan.mz_array.len() != scan.intensity_array.len() {
                return Err(XicError::invalid(format!(
                    "scan {} has {} m/z values but {} intensities",
                    scan.one_based_scan_number,
                    scan.mz_array.len(),
                    scan.intensity_array.len()
                )));
            }
            if let Some(bad) = scan.mz_array.iter().find(|mz| !mz.is_finite() || **mz < 0.0) {
                return Err(XicError::invalid(format!(
                    "scan {} contains an invalid m/z value: {}",
                    scan.one_based_scan_number, bad
                )));
            }
        }

        let bins_per_dalton = params.bins_per_dalton as f64;
        let mut bins: BTreeMap<u64, Vec<IndexedPeak>> = BTreeMap::new();
        let mut scan_infos = Vec::with_capacity(scans.len());
        let mut peak_count = 0;

        for (scan_index, scan) in scans.iter().enumerate() {
            scan_infos.push(ScanInfo::from_scan(scan, scan_index));

            for (&mz, &intensity) in scan.mz_array.iter().zip(&scan.intensity_array) {
                bins.entry(bin_key(mz, bins_per_dalton))
                    .or_default()
                    .push(IndexedPeak::new(mz, intensity, scan_index, scan.retention_time));
                peak_count += 1;
            }
        }

        if peak_count == 0 {
            warn!("indexed {} scans without a single peak", scans.len());
        }

        debug!(
            "indexed {} peaks from {} scans into {} bins ({} per Da)",
            peak_count,
            scans.len(),
            bins.len(),
            params.bins_per_dalton
        );

        Ok(PeakIndexingEngine {
            bins,
            scan_infos,
            params,
            peak_count,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn scan_count(&self) -> usize {
        self.scan_infos.len()
    }

    pub fn peak_count(&self) -> usize {
        self.peak_count
    }

    pub fn params(&self) -> &IndexingParams {
        &self.params
    }

    pub fn scan_infos(&self) -> &[ScanInfo] {
        &self.scan_infos
    }

    pub fn scan_info(&self, zero_based_scan_index: usize) -> Option<&ScanInfo> {
        self.scan_infos.get(zero_based_scan_index)
    }

    /// Index of the last scan acquired at or before `retention_time`, or 0
    pub fn scan_index_at_retention_time(&self, retention_time: f64) -> usize {
        self.scan_infos
            .partition_point(|s| s.retention_time <= retention_time)
            .saturating_sub(1)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Closest in-tolerance peak to `mass` in a single scan
    pub fn get_indexed_peak(
        &self,
        mass: f64,
        zero_based_scan_index: usize,
        tolerance: &Tolerance,
    ) -> Option<IndexedPeak> {
        let bins = self.bins_in_range(mass, tolerance);
        best_peak_in_scan(&bins, mass, zero_based_scan_index, tolerance)
    }

    /// Forward-only extraction of the peaks matching `target_mass`.
    ///
    /// Scans `start..scan_count` are visited in order; scans with an MS level
    /// below `min_ms_level` are skipped. Each visited scan contributes at most
    /// its closest in-tolerance peak, and scans without a match contribute
    /// nothing.
    pub fn get_xic(
        &self,
        target_mass: f64,
        zero_based_start_scan_index: usize,
        tolerance: &Tolerance,
        min_ms_level: u8,
    ) -> XicResult<Vec<IndexedPeak>> {
        self.check_query(target_mass, tolerance)?;
        self.check_scan_index(zero_based_start_scan_index)?;

        let mut best_per_scan: BTreeMap<usize, IndexedPeak> = BTreeMap::new();

        // bins are visited by increasing m/z, so a strict comparison keeps the
        // lower m/z peak on ties
        for bin in self.bins_in_range(target_mass, tolerance) {
            let first = bin.partition_point(|p| p.zero_based_scan_index < zero_based_start_scan_index);
            for peak in &bin[first..] {
                if self.scan_infos[peak.zero_based_scan_index].ms_level < min_ms_level
                    || !tolerance.within(peak.mz, target_mass)
                {
                    continue;
                }
                best_per_scan
                    .entry(peak.zero_based_scan_index)
                    .and_modify(|best| {
                        if (peak.mz - target_mass).abs() < (best.mz - target_mass).abs() {
                            *best = *peak;
                        }
                    })
                    .or_insert(*peak);
            }
        }

        trace!(
            "get_xic {:.4} from scan {} ({}): {} peaks",
            target_mass,
            zero_based_start_scan_index,
            tolerance,
            best_per_scan.len()
        );

        Ok(best_per_scan.into_values().collect())
    }

    /// Run [`get_xic`](Self::get_xic) for every target on the current rayon pool
    pub fn get_xics(
        &self,
        target_masses: &[f64],
        zero_based_start_scan_index: usize,
        tolerance: &Tolerance,
        min_ms_level: u8,
    ) -> XicResult<Vec<Vec<IndexedPeak>>> {
        target_masses
            .par_iter()
            .map(|&mass| self.get_xic(mass, zero_based_start_scan_index, tolerance, min_ms_level))
            .collect()
    }

    /// Bidirectional peak tracing around a start scan.
    ///
    /// Walks backward then forward from `zero_based_start_scan_index`. A
    /// direction ends after more than `missed_scans_allowed` consecutive scans
    /// without a match, or at the first scan further than
    /// `max_peak_half_width` from the first peak found.
    pub fn trace_xic(
        &self,
        mass: f64,
        zero_based_start_scan_index: usize,
        tolerance: &Tolerance,
        missed_scans_allowed: usize,
        max_peak_half_width: f64,
    ) -> XicResult<Vec<IndexedPeak>> {
        self.check_query(mass, tolerance)?;
        self.check_scan_index(zero_based_start_scan_index)?;

        Ok(self.trace_peaks(
            mass,
            zero_based_start_scan_index,
            tolerance,
            missed_scans_allowed,
            max_peak_half_width,
            None,
        ))
    }

    /// [`trace_xic`](Self::trace_xic) starting from the scan at `retention_time`
    pub fn trace_xic_at_retention_time(
        &self,
        mass: f64,
        retention_time: f64,
        tolerance: &Tolerance,
        missed_scans_allowed: usize,
        max_peak_half_width: f64,
    ) -> XicResult<Vec<IndexedPeak>> {
        let start = self.scan_index_at_retention_time(retention_time);
        self.trace_xic(mass, start, tolerance, missed_scans_allowed, max_peak_half_width)
    }

    /// Trace an XIC from every indexed peak, most intense first.
    ///
    /// A peak that already belongs to an XIC counts as a miss for later
    /// traces. Traces shorter than `min_peak_count` are dropped and only their
    /// seed peak is claimed.
    pub fn get_all_xics(
        &self,
        tolerance: &Tolerance,
        max_missed_scans: usize,
        max_rt_half_width: f64,
        min_peak_count: usize,
    ) -> XicResult<Vec<ExtractedIonChromatogram>> {
        tolerance.validate()?;

        let mut seeds: Vec<&IndexedPeak> = self.bins.values().flatten().collect();
        seeds.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));

        let mut claimed: HashSet<PeakKey> = HashSet::with_capacity(self.peak_count);
        let mut xics = Vec::new();

        for seed in seeds {
            if claimed.contains(&peak_key(seed)) {
                continue;
            }

            let peaks = self.trace_peaks(
                seed.mz,
                seed.zero_based_scan_index,
                tolerance,
                max_missed_scans,
                max_rt_half_width,
                Some(&claimed),
            );

            if !peaks.is_empty() && peaks.len() >= min_peak_count {
                claimed.extend(peaks.iter().map(peak_key));
                xics.push(ExtractedIonChromatogram::new(peaks)?);
            } else {
                claimed.insert(peak_key(seed));
            }
        }

        debug!(
            "traced {} XICs from {} peaks ({}, {} missed scans allowed)",
            xics.len(),
            self.peak_count,
            tolerance,
            max_missed_scans
        );

        Ok(xics)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_query(&self, mass: f64, tolerance: &Tolerance) -> XicResult<()> {
        if !mass.is_finite() {
            return Err(XicError::invalid(format!("target mass must be finite, got {}", mass)));
        }
        tolerance.validate()
    }

    fn check_scan_index(&self, zero_based_scan_index: usize) -> XicResult<()> {
        if zero_based_scan_index >= self.scan_count() {
            return Err(XicError::IndexOutOfRange {
                index: zero_based_scan_index,
                scan_count: self.scan_count(),
            });
        }
        Ok(())
    }

    /// Keys of the bins that may hold a peak within `tolerance` of `mass`
    fn bin_range(&self, mass: f64, tolerance: &Tolerance) -> Option<RangeInclusive<u64>> {
        let (min, max) = tolerance.get_range(mass);
        let bins_per_dalton = self.params.bins_per_dalton as f64;

        let ceiling = (max * bins_per_dalton).ceil();
        if ceiling.is_nan() || ceiling < 0.0 {
            return None;
        }
        let floor = (min * bins_per_dalton).floor().max(0.0) as u64;
        let ceiling = ceiling as u64;

        (floor <= ceiling).then_some(floor..=ceiling)
    }

    fn bins_in_range(&self, mass: f64, tolerance: &Tolerance) -> Vec<&[IndexedPeak]> {
        match self.bin_range(mass, tolerance) {
            Some(keys) => self.bins.range(keys).map(|(_, bin)| bin.as_slice()).collect(),
            None => Vec::new(),
        }
    }

    fn trace_peaks(
        &self,
        mass: f64,
        start: usize,
        tolerance: &Tolerance,
        missed_scans_allowed: usize,
        max_peak_half_width: f64,
        claimed: Option<&HashSet<PeakKey>>,
    ) -> Vec<IndexedPeak> {
        let bins = self.bins_in_range(mass, tolerance);
        let unclaimed =
            |peak: &IndexedPeak| claimed.is_none_or(|c| !c.contains(&peak_key(peak)));
        let find = |scan_index: usize| {
            best_peak_in_scan(&bins, mass, scan_index, tolerance).filter(|p| unclaimed(p))
        };

        let mut peaks = Vec::new();
        let mut anchor_rt = None;

        if let Some(seed) = find(start) {
            anchor_rt = Some(seed.retention_time);
            peaks.push(seed);
        }

        for direction in [-1_isize, 1] {
            let mut missed = 0;
            let mut current = start as isize;

            while missed <= missed_scans_allowed {
                current += direction;
                if current < 0 || current as usize >= self.scan_count() {
                    break;
                }
                let scan_index = current as usize;

                if let Some(rt) = anchor_rt {
                    if (self.scan_infos[scan_index].retention_time - rt).abs() > max_peak_half_width {
                        break;
                    }
                }

                match find(scan_index) {
                    Some(peak) => {
                        anchor_rt.get_or_insert(peak.retention_time);
                        peaks.push(peak);
                        missed = 0;
                    }
                    None => missed += 1,
                }
            }
        }

        peaks.sort_by_key(|p| p.zero_based_scan_index);
        trace!("traced {:.4} from scan {}: {} peaks", mass, start, peaks.len());
        peaks
    }
}

/// Closest in-tolerance peak of one scan across the given bins (first on ties)
fn best_peak_in_scan(
    bins: &[&[IndexedPeak]],
    mass: f64,
    zero_based_scan_index: usize,
    tolerance: &Tolerance,
) -> Option<IndexedPeak> {
    let mut best: Option<IndexedPeak> = None;

    for bin in bins {
        let first = bin.partition_point(|p| p.zero_based_scan_index < zero_based_scan_index);
        for peak in bin[first..]
            .iter()
            .take_while(|p| p.zero_based_scan_index == zero_based_scan_index)
        {
            if !tolerance.within(peak.mz, mass) {
                continue;
            }
            if best.is_none_or(|b| (peak.mz - mass).abs() < (b.mz - mass).abs()) {
                best = Some(*peak);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::*;

    fn engine() -> PeakIndexingEngine {
        PeakIndexingEngine::initialize(&peptide_scans()).unwrap()
    }

    #[test]
    fn test_initialize_records_scans_and_peaks() {
        let engine = engine();
        assert_eq!(engine.scan_count(), 10);
        assert_eq!(engine.peak_count(), 80);
        assert_eq!(engine.params().bins_per_dalton, 100);

        let info = engine.scan_info(3).unwrap();
        assert_eq!(info.one_based_scan_number, 4);
        assert_eq!(info.zero_based_scan_index, 3);
        assert!((info.retention_time - 1.3).abs() < 1e-12);
        assert!(engine.scan_info(10).is_none());
    }

    #[test]
    fn test_initialize_rejects_bad_input() {
        assert!(matches!(PeakIndexingEngine::initialize(&[]), Err(XicError::InvalidInput(_))));

        let mismatched = Scan {
            one_based_scan_number: 1,
            ms_level: 1,
            retention_time: 0.0,
            mz_array: vec![100.0, 200.0],
            intensity_array: vec![1.0],
        };
        assert!(matches!(
            PeakIndexingEngine::initialize(&[mismatched]),
            Err(XicError::InvalidInput(_))
        ));

        let negative = Scan::new(1, 1, 0.0, vec![-1.0, 200.0], vec![1.0, 1.0]).unwrap();
        assert!(PeakIndexingEngine::initialize(&[negative]).is_err());

        let nan = Scan::new(1, 1, 0.0, vec![f64::NAN], vec![1.0]).unwrap();
        assert!(PeakIndexingEngine::initialize(&[nan]).is_err());

        let scans = peptide_scans();
        let result = PeakIndexingEngine::initialize_with_params(&scans, IndexingParams { bins_per_dalton: 0 });
        assert!(result.is_err());
    }

    #[test]
    fn test_get_xic_returns_one_peak_per_scan() {
        let engine = engine();
        let xic = engine.get_xic(PEPTIDE_MZ, 0, &Tolerance::Ppm(20.0), 1).unwrap();

        assert_eq!(xic.len(), 10);
        for (i, peak) in xic.iter().enumerate() {
            assert_eq!(peak.zero_based_scan_index, i);
            // the main peak is closer than the shoulder
            assert_eq!(peak.mz, PEPTIDE_MZ);
        }
        assert_eq!(xic[6].intensity, 1.0e7);
    }

    #[test]
    fn test_get_xic_is_forward_only() {
        let engine = engine();
        let xic = engine.get_xic(PEPTIDE_MZ, 4, &Tolerance::Ppm(20.0), 1).unwrap();
        assert_eq!(xic.len(), 6);
        assert_eq!(xic[0].zero_based_scan_index, 4);
    }

    #[test]
    fn test_get_xic_picks_closest_peak() {
        let engine = engine();
        let target = PEPTIDE_MZ + SHOULDER_OFFSET;
        let xic = engine.get_xic(target, 0, &Tolerance::Ppm(20.0), 1).unwrap();
        assert_eq!(xic.len(), 10);
        assert!(xic.iter().all(|p| p.mz == target));
    }

    #[test]
    fn test_get_xic_no_match_is_empty() {
        let engine = engine();
        let xic = engine.get_xic(PEPTIDE_MZ + 0.5, 0, &Tolerance::Ppm(20.0), 1).unwrap();
        assert!(xic.is_empty());

        let xic = engine.get_xic(5000.0, 0, &Tolerance::Ppm(20.0), 1).unwrap();
        assert!(xic.is_empty());

        let xic = engine.get_xic(0.001, 0, &Tolerance::Absolute(0.01), 1).unwrap();
        assert!(xic.is_empty());
    }

    #[test]
    fn test_get_xic_errors() {
        let engine = engine();
        assert_eq!(
            engine.get_xic(PEPTIDE_MZ, 10, &Tolerance::Ppm(20.0), 1),
            Err(XicError::IndexOutOfRange { index: 10, scan_count: 10 })
        );
        assert!(matches!(
            engine.get_xic(PEPTIDE_MZ, 0, &Tolerance::Ppm(0.0), 1),
            Err(XicError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.get_xic(f64::NAN, 0, &Tolerance::Ppm(20.0), 1),
            Err(XicError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_get_xic_skips_low_ms_levels() {
        let mut scans = peptide_scans();
        for scan in scans.iter_mut().skip(1).step_by(2) {
            scan.ms_level = 2;
        }
        let engine = PeakIndexingEngine::initialize(&scans).unwrap();

        let ms1 = engine.get_xic(PEPTIDE_MZ, 0, &Tolerance::Ppm(20.0), 1).unwrap();
        assert_eq!(ms1.len(), 10);

        let ms2 = engine.get_xic(PEPTIDE_MZ, 0, &Tolerance::Ppm(20.0), 2).unwrap();
        assert_eq!(ms2.len(), 5);
        assert!(ms2.iter().all(|p| p.zero_based_scan_index % 2 == 1));
    }

    #[test]
    fn test_peaks_on_bin_boundaries_are_found() {
        // peak in bin 10001, target in bin 10000
        let scans = vec![Scan::new(1, 1, 0.0, vec![100.006], vec![1.0]).unwrap()];
        let engine = PeakIndexingEngine::initialize(&scans).unwrap();
        let peak = engine.get_indexed_peak(100.0049, 0, &Tolerance::Absolute(0.002));
        assert_eq!(peak.map(|p| p.mz), Some(100.006));
    }

    #[test]
    fn test_huge_masses_are_indexed_sparsely() {
        let scans = vec![
            Scan::new(1, 1, 0.0, vec![500.0, 1.0e6, 1.0e20], vec![1.0, 2.0, 3.0]).unwrap(),
            Scan::new(2, 1, 0.1, vec![500.0, 1.0e20], vec![4.0, 5.0]).unwrap(),
        ];
        let engine = PeakIndexingEngine::initialize(&scans).unwrap();
        assert_eq!(engine.peak_count(), 5);
        assert_eq!(engine.bins.len(), 3);

        let tol = Tolerance::Ppm(10.0);
        let far = engine.get_xic(1.0e20, 0, &tol, 1).unwrap();
        assert_eq!(far.iter().map(|p| p.intensity).collect::<Vec<_>>(), vec![3.0, 5.0]);
        assert_eq!(engine.get_indexed_peak(1.0e6, 0, &tol).map(|p| p.intensity), Some(2.0));
        assert_eq!(engine.get_xic(500.0, 0, &tol, 1).unwrap().len(), 2);
        assert_eq!(engine.get_all_xics(&tol, 1, f64::MAX, 1).unwrap().len(), 3);
    }

    #[test]
    fn test_get_indexed_peak() {
        let engine = engine();
        let tol = Tolerance::Ppm(20.0);

        let peak = engine.get_indexed_peak(isotope_mz(1), 6, &tol).unwrap();
        assert_eq!(peak.zero_based_scan_index, 6);
        assert_eq!(peak.mz, isotope_mz(1));
        assert!((peak.retention_time - 1.6).abs() < 1e-12);

        assert!(engine.get_indexed_peak(isotope_mz(1), 42, &tol).is_none());
        assert!(engine.get_indexed_peak(isotope_mz(1) + 0.3, 6, &tol).is_none());
    }

    #[test]
    fn test_get_xics_matches_sequential_queries() {
        let engine = engine();
        let tol = Tolerance::Ppm(20.0);
        let targets: Vec<f64> = (0..4).map(isotope_mz).collect();

        let batch = engine.get_xics(&targets, 0, &tol, 1).unwrap();
        assert_eq!(batch.len(), 4);
        for (target, xic) in targets.iter().zip(&batch) {
            assert_eq!(xic, &engine.get_xic(*target, 0, &tol, 1).unwrap());
        }
    }

    #[test]
    fn test_trace_xic_goes_both_ways() {
        let engine = engine();
        let xic = engine
            .trace_xic(PEPTIDE_MZ, 4, &Tolerance::Ppm(20.0), 1, f64::MAX)
            .unwrap();
        assert_eq!(xic.len(), 10);
        assert!(xic.windows(2).all(|w| w[0].zero_based_scan_index < w[1].zero_based_scan_index));
    }

    #[test]
    fn test_trace_xic_stops_after_missed_scans() {
        let engine = PeakIndexingEngine::initialize(&peptide_scans_without(&[2, 3])).unwrap();
        let tol = Tolerance::Ppm(20.0);

        let xic = engine.trace_xic(PEPTIDE_MZ, 6, &tol, 1, f64::MAX).unwrap();
        assert_eq!(xic.len(), 6);
        assert_eq!(xic[0].zero_based_scan_index, 4);

        let xic = engine.trace_xic(PEPTIDE_MZ, 6, &tol, 2, f64::MAX).unwrap();
        assert_eq!(xic.len(), 8);
    }

    #[test]
    fn test_trace_xic_respects_half_width() {
        let engine = engine();
        let xic = engine.trace_xic(PEPTIDE_MZ, 5, &Tolerance::Ppm(20.0), 1, 0.25).unwrap();
        let scans: Vec<usize> = xic.iter().map(|p| p.zero_based_scan_index).collect();
        assert_eq!(scans, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_trace_xic_at_retention_time() {
        let engine = engine();
        assert_eq!(engine.scan_index_at_retention_time(1.45), 4);
        assert_eq!(engine.scan_index_at_retention_time(0.2), 0);
        assert_eq!(engine.scan_index_at_retention_time(7.0), 9);

        let xic = engine
            .trace_xic_at_retention_time(PEPTIDE_MZ, 1.45, &Tolerance::Ppm(20.0), 1, f64::MAX)
            .unwrap();
        assert_eq!(xic.len(), 10);
    }

    #[test]
    fn test_get_all_xics() {
        let engine = engine();
        let xics = engine.get_all_xics(&Tolerance::Ppm(20.0), 1, f64::MAX, 3).unwrap();

        assert_eq!(xics.len(), 8);
        assert!(xics.iter().all(|x| x.peaks().len() == 10));

        // every peak ends up in exactly one XIC
        let mut keys: Vec<PeakKey> = xics.iter().flat_map(|x| x.peaks().iter().map(peak_key)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 80);
    }

    #[test]
    fn test_get_all_xics_splits_on_gaps() {
        let engine = PeakIndexingEngine::initialize(&peptide_scans_without(&[3, 4, 5])).unwrap();
        let xics = engine.get_all_xics(&Tolerance::Ppm(20.0), 2, f64::MAX, 3).unwrap();

        assert_eq!(xics.len(), 16);
        let mut sizes: Vec<usize> = xics.iter().map(|x| x.peaks().len()).collect();
        sizes.sort();
        assert_eq!(sizes, [vec![3; 8], vec![4; 8]].concat());
    }

    #[test]
    fn test_get_all_xics_drops_short_traces() {
        let engine = PeakIndexingEngine::initialize(&peptide_scans_without(&[3, 4, 5])).unwrap();
        let xics = engine.get_all_xics(&Tolerance::Ppm(20.0), 2, f64::MAX, 4).unwrap();
        assert_eq!(xics.len(), 8);
        assert!(xics.iter().all(|x| x.peaks().len() == 4));
    }
}
