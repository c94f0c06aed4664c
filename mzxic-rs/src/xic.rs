//! Extracted ion chromatograms
//!
//! An [`ExtractedIonChromatogram`] owns a trace of indexed peaks ordered by
//! scan index, one peak per scan, and the statistics derived from it.

use log::{debug, trace};
use serde::Serialize;

use crate::error::{XicError, XicResult};
use crate::model::IndexedPeak;

pub const DEFAULT_DISCRIMINATION_FACTOR: f64 = 0.6;

/// Traces shorter than this are never split
pub const MIN_PEAKS_TO_CUT: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtractedIonChromatogram {
    peaks: Vec<IndexedPeak>,
    apex_index: usize,
    averaged_mass: f64,
    normalized_intensities: Option<Vec<f64>>,
    xy_data: Option<Vec<(f64, f64)>>,
}

impl ExtractedIonChromatogram {
    /// Build an XIC from a peak list.
    ///
    /// Peaks are sorted by scan index. When several peaks share a scan, the
    /// most intense one is kept (the first one on ties).
    pub fn new(peaks: Vec<IndexedPeak>) -> XicResult<Self> {
        if peaks.is_empty() {
            return Err(XicError::EmptyInput);
        }

        let mut peaks = peaks;
        peaks.sort_by_key(|p| p.zero_based_scan_index);

        let input_count = peaks.len();
        let mut unique: Vec<IndexedPeak> = Vec::with_capacity(input_count);
        for peak in peaks {
            match unique.last_mut() {
                Some(last) if last.zero_based_scan_index == peak.zero_based_scan_index => {
                    if peak.intensity > last.intensity {
                        *last = peak;
                    }
                }
                _ => unique.push(peak),
            }
        }

        if unique.len() < input_count {
            debug!(
                "dropped {} peaks sharing a scan index with a more intense peak",
                input_count - unique.len()
            );
        }

        let mut xic = ExtractedIonChromatogram {
            peaks: unique,
            apex_index: 0,
            averaged_mass: 0.0,
            normalized_intensities: None,
            xy_data: None,
        };
        xic.update_statistics();
        Ok(xic)
    }

    fn update_statistics(&mut self) {
        self.apex_index = self
            .peaks
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if p.intensity > self.peaks[best].intensity { i } else { best });

        let total_intensity: f64 = self.peaks.iter().map(|p| p.intensity).sum();
        self.averaged_mass = if total_intensity > 0.0 {
            self.peaks.iter().map(|p| p.mz * p.intensity).sum::<f64>() / total_intensity
        } else {
            self.peaks.iter().map(|p| p.mz).sum::<f64>() / self.peaks.len() as f64
        };
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn peaks(&self) -> &[IndexedPeak] {
        &self.peaks
    }

    pub fn apex_index(&self) -> usize {
        self.apex_index
    }

    pub fn apex_peak(&self) -> &IndexedPeak {
        &self.peaks[self.apex_index]
    }

    pub fn apex_rt(&self) -> f64 {
        self.apex_peak().retention_time
    }

    pub fn apex_intensity(&self) -> f64 {
        self.apex_peak().intensity
    }

    pub fn start_rt(&self) -> f64 {
        self.peaks[0].retention_time
    }

    pub fn end_rt(&self) -> f64 {
        self.peaks[self.peaks.len() - 1].retention_time
    }

    /// Intensity-weighted mean m/z (plain mean when every intensity is zero)
    pub fn averaged_mass(&self) -> f64 {
        self.averaged_mass
    }

    pub fn normalized_peak_intensities(&self) -> Option<&[f64]> {
        self.normalized_intensities.as_deref()
    }

    /// Resampled curve written by a spline, if any
    pub fn xy_data(&self) -> Option<&[(f64, f64)]> {
        self.xy_data.as_deref()
    }

    pub fn set_xy_data(&mut self, xy_data: Vec<(f64, f64)>) {
        self.xy_data = Some(xy_data);
    }

    pub fn retention_times(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.retention_time).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.intensity).collect()
    }

    pub fn scan_indices(&self) -> Vec<usize> {
        self.peaks.iter().map(|p| p.zero_based_scan_index).collect()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Scale peak intensities so that they sum to 100
    pub fn set_normalized_peak_intensities(&mut self) -> XicResult<()> {
        let total: f64 = self.peaks.iter().map(|p| p.intensity).sum();
        if total == 0.0 || !total.is_finite() {
            return Err(XicError::invalid(format!(
                "cannot normalize an XIC with total intensity {}",
                total
            )));
        }

        self.normalized_intensities = Some(
            self.peaks
                .iter()
                .map(|p| p.intensity / total * 100.0)
                .collect(),
        );
        Ok(())
    }

    /// Split the trace at the valley between two apexes, keeping the side
    /// that holds the apex. Repeats until no valley qualifies.
    ///
    /// Returns whether any peak was removed. Normalized intensities and
    /// resampled data are dropped when the trace changes.
    pub fn cut_peak(&mut self, discrimination_factor: f64) -> bool {
        let mut cut_any = false;

        while let Some(valley) = self.find_valley(discrimination_factor) {
            let apex_scan = self.apex_peak().zero_based_scan_index;
            let valley_scan = self.peaks[valley].zero_based_scan_index;

            if apex_scan > valley_scan {
                self.peaks.retain(|p| p.zero_based_scan_index > valley_scan);
            } else {
                self.peaks.retain(|p| p.zero_based_scan_index < valley_scan);
            }

            trace!(
                "cut XIC at scan {} (apex at scan {}), {} peaks left",
                valley_scan,
                apex_scan,
                self.peaks.len()
            );

            self.update_statistics();
            self.normalized_intensities = None;
            self.xy_data = None;
            cut_any = true;
        }

        cut_any
    }

    /// Position of the first qualifying valley, searching right then left of the apex
    fn find_valley(&self, discrimination_factor: f64) -> Option<usize> {
        if self.peaks.len() < MIN_PEAKS_TO_CUT {
            return None;
        }

        let len = self.peaks.len() as isize;
        let contains_scan = |scan: isize| {
            scan >= 0
                && self
                    .peaks
                    .binary_search_by_key(&(scan as usize), |p| p.zero_based_scan_index)
                    .is_ok()
        };

        for direction in [1_isize, -1] {
            let mut valley: Option<usize> = None;
            let mut i = self.apex_index as isize + direction;

            while i >= 0 && i < len {
                let current = &self.peaks[i as usize];
                if valley.is_none_or(|v| current.intensity < self.peaks[v].intensity) {
                    valley = Some(i as usize);
                }
                let Some(v) = valley else { break };
                let valley_peak = &self.peaks[v];

                let depth = (current.intensity - valley_peak.intensity) / current.intensity;
                let after = v as isize + direction;

                if depth > discrimination_factor && after >= 0 && after < len {
                    let after_peak = &self.peaks[after as usize];
                    let second_depth = (current.intensity - after_peak.intensity) / current.intensity;
                    if second_depth > discrimination_factor {
                        return Some(v);
                    }

                    let next_scan = valley_peak.zero_based_scan_index as isize + direction;
                    if !contains_scan(next_scan) {
                        return Some(v);
                    }
                }

                i += direction;
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(scan: usize, intensity: f64) -> IndexedPeak {
        IndexedPeak::new(500.0 + scan as f64 * 1e-5, intensity, scan, 1.0 + scan as f64 / 10.0)
    }

    fn xic_from(intensities: &[f64]) -> ExtractedIonChromatogram {
        let peaks = intensities.iter().enumerate().map(|(s, &i)| peak(s, i)).collect();
        ExtractedIonChromatogram::new(peaks).unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(ExtractedIonChromatogram::new(vec![]), Err(XicError::EmptyInput));
    }

    #[test]
    fn test_statistics() {
        let xic = xic_from(&[1.0, 3.0, 1.0, 1.0, 3.0, 5.0, 10.0, 5.0, 3.0, 1.0]);

        assert_eq!(xic.apex_index(), 6);
        assert_eq!(xic.apex_peak().zero_based_scan_index, 6);
        assert!((xic.apex_rt() - 1.6).abs() < 1e-12);
        assert!((xic.start_rt() - 1.0).abs() < 1e-12);
        assert!((xic.end_rt() - 1.9).abs() < 1e-12);
        assert!(xic.normalized_peak_intensities().is_none());
        assert!(xic.xy_data().is_none());
    }

    #[test]
    fn test_apex_ties_go_to_first_peak() {
        let xic = xic_from(&[1.0, 7.0, 2.0, 7.0]);
        assert_eq!(xic.apex_index(), 1);
    }

    #[test]
    fn test_averaged_mass_is_intensity_weighted() {
        let peaks = vec![
            IndexedPeak::new(100.0, 1.0, 0, 0.0),
            IndexedPeak::new(101.0, 3.0, 1, 0.1),
        ];
        let xic = ExtractedIonChromatogram::new(peaks).unwrap();
        assert!((xic.averaged_mass() - 100.75).abs() < 1e-12);

        let zero = vec![
            IndexedPeak::new(100.0, 0.0, 0, 0.0),
            IndexedPeak::new(101.0, 0.0, 1, 0.1),
        ];
        let xic = ExtractedIonChromatogram::new(zero).unwrap();
        assert!((xic.averaged_mass() - 100.5).abs() < 1e-12);
    }

    #[test]
    fn test_peaks_are_sorted_and_deduplicated() {
        let peaks = vec![peak(3, 1.0), peak(1, 2.0), peak(3, 4.0), peak(2, 1.0), peak(1, 2.0)];
        let xic = ExtractedIonChromatogram::new(peaks).unwrap();

        assert_eq!(xic.scan_indices(), vec![1, 2, 3]);
        assert_eq!(xic.intensities(), vec![2.0, 1.0, 4.0]);
        assert_eq!(xic.retention_times().len(), 3);
    }

    #[test]
    fn test_normalization() {
        let mut xic = xic_from(&[1.0, 3.0, 1.0, 1.0, 3.0, 5.0, 10.0, 5.0, 3.0, 1.0]);
        xic.set_normalized_peak_intensities().unwrap();
        let first: Vec<f64> = xic.normalized_peak_intensities().unwrap().to_vec();
        assert!((first.iter().sum::<f64>() - 100.0).abs() < 1e-4);
        assert!((first[6] - 30.3030303).abs() < 1e-6);

        xic.set_normalized_peak_intensities().unwrap();
        assert_eq!(xic.normalized_peak_intensities().unwrap(), first.as_slice());
    }

    #[test]
    fn test_normalization_of_zero_trace_fails() {
        let mut xic = xic_from(&[0.0, 0.0, 0.0]);
        assert!(matches!(
            xic.set_normalized_peak_intensities(),
            Err(XicError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cut_peak_at_deep_valley() {
        let mut xic = xic_from(&[2.0, 6.0, 10.0, 6.0, 2.0, 3.0, 7.0, 8.0, 4.0, 1.0]);
        xic.set_normalized_peak_intensities().unwrap();

        assert!(xic.cut_peak(DEFAULT_DISCRIMINATION_FACTOR));
        assert_eq!(xic.scan_indices(), vec![0, 1, 2, 3]);
        assert_eq!(xic.apex_index(), 2);
        assert!(xic.normalized_peak_intensities().is_none());
    }

    #[test]
    fn test_cut_peak_keeps_apex_side() {
        let mut xic = xic_from(&[2.0, 8.0, 9.0, 3.0, 1.0, 5.0, 10.0, 6.0, 2.0]);
        assert!(xic.cut_peak(DEFAULT_DISCRIMINATION_FACTOR));
        assert_eq!(xic.scan_indices(), vec![5, 6, 7, 8]);
        assert!((xic.start_rt() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_cut_peak_at_missing_scan() {
        let intensities = [2.0, 6.0, 10.0, 6.0, 2.0, 8.0, 9.0, 4.0];
        let scans = [0, 1, 2, 3, 4, 6, 7, 8];
        let peaks = scans.iter().zip(intensities).map(|(&s, i)| peak(s, i)).collect();
        let mut xic = ExtractedIonChromatogram::new(peaks).unwrap();

        assert!(xic.cut_peak(DEFAULT_DISCRIMINATION_FACTOR));
        assert_eq!(xic.scan_indices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cut_peak_repeats_until_stable() {
        let mut xic = xic_from(&[8.0, 3.0, 1.0, 3.0, 8.0, 10.0, 9.0, 3.0, 1.0, 2.0, 7.0]);
        assert!(xic.cut_peak(DEFAULT_DISCRIMINATION_FACTOR));
        assert_eq!(xic.scan_indices(), vec![3, 4, 5, 6, 7]);
        assert_eq!(xic.apex_peak().zero_based_scan_index, 5);
    }

    #[test]
    fn test_cut_peak_leaves_single_apex_alone() {
        let mut xic = xic_from(&[1.0, 3.0, 6.0, 10.0, 6.0, 3.0, 1.0]);
        assert!(!xic.cut_peak(DEFAULT_DISCRIMINATION_FACTOR));
        assert_eq!(xic.peaks().len(), 7);
    }

    #[test]
    fn test_cut_peak_ignores_short_traces() {
        let mut xic = xic_from(&[10.0, 1.0, 10.0, 1.0]);
        assert!(!xic.cut_peak(DEFAULT_DISCRIMINATION_FACTOR));
        assert_eq!(xic.peaks().len(), 4);
    }
}
