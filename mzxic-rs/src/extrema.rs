//! Extremum detection on smoothed chromatograms
//!
//! An XIC is smoothed twice (an intensity-weighted window average followed
//! by a plain moving average) and fitted with a natural cubic spline. The
//! stationary points of that spline are its local maxima and minima.
//!
//! Across a group of co-eluting XICs, extrema that line up on the reference
//! time axis become shared extrema. Each shared maximum then spans a shared
//! peak region bounded by its neighbouring extrema.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{MIN_SPLINE_POINTS, XicError, XicResult};
use crate::spline::{Interpolator, LinearInterpolator, NaturalCubicSpline, merge_equal_knots};
use crate::xic::ExtractedIonChromatogram;

pub const DEFAULT_SMOOTHING_POINTS: usize = 5;
pub const DEFAULT_SHARED_EXTREMUM_FRACTION: f64 = 0.55;
pub const DEFAULT_EXTREMUM_RT_TOLERANCE: f64 = 0.1;
pub const DEFAULT_EXTREMUM_INTENSITY_CUTOFF: f64 = 30_000.0;
pub const DEFAULT_TRIMMING_WINDOW: f64 = 0.3;
pub const DEFAULT_MIN_PEAK_WIDTH: f64 = 0.3;

/// Distance kept on each side of the outermost shared extrema when a peak
/// region has no neighbour
const OPEN_REGION_MARGIN: f64 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum ExtremumKind {
    #[strum(serialize = "minimum")]
    Minimum,
    #[strum(serialize = "maximum")]
    Maximum,
}

/// A local extremum of a smoothed XIC
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    /// Position on the reference time axis: own RT plus the XIC's RT shift
    pub retention_time: f64,
    /// Raw intensity at the extremum, linearly interpolated between peaks
    pub intensity: f64,
    pub kind: ExtremumKind,
}

/// Elution window around a shared maximum
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakRegion {
    pub apex_rt: f64,
    pub start_rt: f64,
    pub end_rt: f64,
}

impl PeakRegion {
    pub fn width(&self) -> f64 {
        self.end_rt - self.start_rt
    }
}

fn check_window(points_to_average: usize) -> XicResult<()> {
    if points_to_average == 0 {
        return Err(XicError::invalid("points to average must be greater than zero"));
    }
    Ok(())
}

/// Replace every point whose full window fits inside the slice; the first
/// and last `points / 2` values are kept as they are
fn smooth_with(intensities: &[f64], points: usize, window_value: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let half = points / 2;
    (0..intensities.len())
        .map(|i| {
            if i < half || i + half >= intensities.len() {
                intensities[i]
            } else {
                window_value(&intensities[i - half..i - half + points])
            }
        })
        .collect()
}

/// Intensity-weighted window average, `sum(w^2) / sum(w)` over each window.
/// An all-zero window stays zero.
pub fn weighted_smoothing(intensities: &[f64], points_to_average: usize) -> XicResult<Vec<f64>> {
    check_window(points_to_average)?;
    Ok(smooth_with(intensities, points_to_average, |window| {
        let sum: f64 = window.iter().sum();
        if sum == 0.0 { 0.0 } else { window.iter().map(|w| w * w).sum::<f64>() / sum }
    }))
}

pub fn moving_average(intensities: &[f64], points_to_average: usize) -> XicResult<Vec<f64>> {
    check_window(points_to_average)?;
    Ok(smooth_with(intensities, points_to_average, |window| {
        window.iter().sum::<f64>() / window.len() as f64
    }))
}

fn fit_smoothed(x: &[f64], y: &[f64], points_to_average: usize) -> XicResult<Option<NaturalCubicSpline>> {
    check_window(points_to_average)?;
    if x.len() < MIN_SPLINE_POINTS {
        return Ok(None);
    }
    let smoothed = moving_average(&weighted_smoothing(y, points_to_average)?, points_to_average)?;
    NaturalCubicSpline::new(x, &smoothed).map(Some)
}

/// Natural cubic spline through the doubly smoothed intensities of `xic`
/// over its retention times. `None` below five distinct retention times.
pub fn smoothed_curve(
    xic: &ExtractedIonChromatogram,
    points_to_average: usize,
) -> XicResult<Option<NaturalCubicSpline>> {
    let (x, y) = merge_equal_knots(&xic.retention_times(), &xic.intensities());
    fit_smoothed(&x, &y, points_to_average)
}

/// Local extrema of the smoothed curve of `xic`, ascending in time and
/// moved by `rt_shift` onto the reference time axis.
///
/// Stationary points without curvature (plateaus, inflections) are not
/// extrema and are skipped.
pub fn find_extrema(
    xic: &ExtractedIonChromatogram,
    points_to_average: usize,
    rt_shift: f64,
) -> XicResult<Vec<Extremum>> {
    let (x, y) = merge_equal_knots(&xic.retention_times(), &xic.intensities());
    let Some(curve) = fit_smoothed(&x, &y, points_to_average)? else {
        return Ok(Vec::new());
    };
    let raw = LinearInterpolator::new(&x, &y)?;

    let extrema: Vec<Extremum> = curve
        .stationary_points()
        .into_iter()
        .filter_map(|t| {
            let curvature = curve.second_derivative(t);
            let kind = if curvature < 0.0 {
                ExtremumKind::Maximum
            } else if curvature > 0.0 {
                ExtremumKind::Minimum
            } else {
                return None;
            };
            Some(Extremum {
                retention_time: t + rt_shift,
                intensity: raw.evaluate(t),
                kind,
            })
        })
        .collect();

    trace!("XIC at {:.4}: {} extrema", xic.averaged_mass(), extrema.len());
    Ok(extrema)
}

/// Chain time-sorted extrema into clusters. A cluster takes every extremum
/// within `rt_tolerance` of its first member. The first member of each
/// cluster holding at least `min_count` extrema is returned.
pub fn cluster_extrema(sorted: &[Extremum], rt_tolerance: f64, min_count: f64) -> Vec<Extremum> {
    let mut shared = Vec::new();
    let mut start = 0;
    while start < sorted.len() {
        let first = sorted[start];
        let end = start
            + sorted[start..].partition_point(|e| e.retention_time - first.retention_time <= rt_tolerance);
        if (end - start) as f64 >= min_count {
            shared.push(first);
        }
        start = end;
    }
    shared
}

/// Drop redundant neighbours from time-sorted shared extrema: of two minima
/// closer than `window`, the first goes when `reference` keeps rising to the
/// second; of two maxima, the first goes when it keeps falling.
pub fn trim_shared_extrema(extrema: &mut Vec<Extremum>, reference: &impl Interpolator, window: f64) {
    let mut i = 0;
    while i + 1 < extrema.len() {
        let (current, next) = (extrema[i], extrema[i + 1]);
        let delta = reference.evaluate(next.retention_time) - reference.evaluate(current.retention_time);

        let redundant = current.kind == next.kind
            && next.retention_time - current.retention_time < window
            && match current.kind {
                ExtremumKind::Minimum => delta > 0.0,
                ExtremumKind::Maximum => delta < 0.0,
            };

        if redundant {
            extrema.remove(i);
        } else {
            i += 1;
        }
    }
}

/// One region per shared maximum of the time-sorted `shared` extrema.
///
/// Each side ends at the neighbouring minimum, halfway to a neighbouring
/// maximum, or one time unit past the outermost shared extremum. Regions
/// narrower than `min_width` are dropped.
pub fn build_shared_peaks(shared: &[Extremum], min_width: f64) -> Vec<PeakRegion> {
    let (Some(first), Some(last)) = (shared.first(), shared.last()) else {
        return Vec::new();
    };

    let boundary = |apex: &Extremum, neighbour: Option<&Extremum>, open: f64| match neighbour {
        Some(n) if n.kind == ExtremumKind::Minimum => n.retention_time,
        Some(n) => (apex.retention_time + n.retention_time) / 2.0,
        None => open,
    };

    shared
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == ExtremumKind::Maximum)
        .map(|(i, apex)| {
            let previous = i.checked_sub(1).map(|j| &shared[j]);
            PeakRegion {
                apex_rt: apex.retention_time,
                start_rt: boundary(apex, previous, first.retention_time - OPEN_REGION_MARGIN),
                end_rt: boundary(apex, shared.get(i + 1), last.retention_time + OPEN_REGION_MARGIN),
            }
        })
        .filter(|region| region.width() >= min_width)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndexedPeak;
    use statrs::distribution::{Continuous, Normal};

    fn extremum(retention_time: f64, kind: ExtremumKind) -> Extremum {
        Extremum { retention_time, intensity: 1.0e5, kind }
    }

    fn maximum(rt: f64) -> Extremum {
        extremum(rt, ExtremumKind::Maximum)
    }

    fn minimum(rt: f64) -> Extremum {
        extremum(rt, ExtremumKind::Minimum)
    }

    /// Sum of normal densities sampled at t = 10 + k/10 for k in 0..200
    fn trace(means: &[f64], sd: f64, scale: f64) -> ExtractedIonChromatogram {
        let normals: Vec<Normal> = means.iter().map(|&m| Normal::new(m, sd).unwrap()).collect();
        let peaks = (0..200)
            .map(|k| {
                let t = 10.0 + k as f64 / 10.0;
                let intensity = normals.iter().map(|n| scale * n.pdf(t)).sum();
                IndexedPeak::new(700.0, intensity, k, t)
            })
            .collect();
        ExtractedIonChromatogram::new(peaks).unwrap()
    }

    #[test]
    fn test_weighted_smoothing() {
        let smoothed = weighted_smoothing(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 5.0], 3).unwrap();
        assert_eq!(smoothed[0], 1.0);
        assert!((smoothed[1] - 14.0 / 6.0).abs() < 1e-12);
        assert!((smoothed[2] - 13.0 / 5.0).abs() < 1e-12);
        assert_eq!(smoothed[4], 0.0);
        assert_eq!(smoothed[5], 5.0);
        assert_eq!(smoothed[6], 5.0);
    }

    #[test]
    fn test_moving_average_keeps_edges() {
        let values = [4.0, 8.0, 0.0, 4.0, 8.0, 6.0];
        let smoothed = moving_average(&values, 5).unwrap();
        assert_eq!(smoothed, vec![4.0, 8.0, 4.8, 5.2, 8.0, 6.0]);

        assert_eq!(moving_average(&[1.0, 2.0], 5).unwrap(), vec![1.0, 2.0]);
        assert!(matches!(moving_average(&values, 0), Err(XicError::InvalidInput(_))));
        assert!(weighted_smoothing(&values, 0).is_err());
    }

    #[test]
    fn test_single_peak_has_one_maximum_at_its_apex() {
        let xic = trace(&[20.0], 0.6, 1.0e6);
        let apex = xic.apex_intensity();

        let extrema: Vec<Extremum> = find_extrema(&xic, DEFAULT_SMOOTHING_POINTS, 0.0)
            .unwrap()
            .into_iter()
            .filter(|e| e.intensity > 0.01 * apex)
            .collect();
        assert_eq!(extrema.len(), 1, "{:?}", extrema);
        assert_eq!(extrema[0].kind, ExtremumKind::Maximum);
        assert!((extrema[0].retention_time - 20.0).abs() < 1e-6);
        assert!((extrema[0].intensity - apex).abs() < 1e-6 * apex);

        let moved = find_extrema(&xic, DEFAULT_SMOOTHING_POINTS, -2.5).unwrap();
        assert!(moved.iter().any(|e| (e.retention_time - 17.5).abs() < 1e-6));
    }

    #[test]
    fn test_double_peak_has_a_valley() {
        let xic = trace(&[18.5, 21.5], 0.6, 1.0e6);
        let apex = xic.apex_intensity();

        let extrema: Vec<Extremum> = find_extrema(&xic, DEFAULT_SMOOTHING_POINTS, 0.0)
            .unwrap()
            .into_iter()
            .filter(|e| e.intensity > 0.01 * apex)
            .collect();
        let kinds: Vec<ExtremumKind> = extrema.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ExtremumKind::Maximum, ExtremumKind::Minimum, ExtremumKind::Maximum]);
        assert!((extrema[0].retention_time - 18.5).abs() < 0.1);
        assert!((extrema[1].retention_time - 20.0).abs() < 1e-6);
        assert!((extrema[2].retention_time - 21.5).abs() < 0.1);
    }

    #[test]
    fn test_short_xic_has_no_extrema() {
        let peaks = (0..4).map(|s| IndexedPeak::new(700.0, 1.0 + s as f64, s, s as f64)).collect();
        let xic = ExtractedIonChromatogram::new(peaks).unwrap();
        assert!(find_extrema(&xic, 5, 0.0).unwrap().is_empty());
        assert!(smoothed_curve(&xic, 5).unwrap().is_none());
        assert!(find_extrema(&xic, 0, 0.0).is_err());
    }

    #[test]
    fn test_cluster_extrema() {
        let sorted = [maximum(10.0), maximum(10.05), maximum(10.1), maximum(10.15), maximum(12.0)];

        let shared = cluster_extrema(&sorted, 0.1, 2.0);
        assert_eq!(shared, vec![maximum(10.0)]);

        // 10.15 starts its own cluster, the trailing singleton counts too
        let shared = cluster_extrema(&sorted, 0.1, 1.0);
        assert_eq!(shared, vec![maximum(10.0), maximum(10.15), maximum(12.0)]);

        assert!(cluster_extrema(&[], 0.1, 1.0).is_empty());
    }

    #[test]
    fn test_trimming_on_a_rising_reference() {
        let reference = LinearInterpolator::new(&[0.0, 10.0], &[0.0, 10.0]).unwrap();

        let mut extrema = vec![minimum(1.0), minimum(1.2), maximum(3.0), maximum(3.1), minimum(5.0), minimum(6.0)];
        trim_shared_extrema(&mut extrema, &reference, DEFAULT_TRIMMING_WINDOW);

        // minima close together on a rising curve collapse onto the later one,
        // maxima on a rising curve are both kept
        assert_eq!(extrema, vec![minimum(1.2), maximum(3.0), maximum(3.1), minimum(5.0), minimum(6.0)]);

        let falling = LinearInterpolator::new(&[0.0, 10.0], &[10.0, 0.0]).unwrap();
        let mut extrema = vec![maximum(3.0), maximum(3.1), maximum(3.2)];
        trim_shared_extrema(&mut extrema, &falling, DEFAULT_TRIMMING_WINDOW);
        assert_eq!(extrema, vec![maximum(3.2)]);
    }

    #[test]
    fn test_shared_peak_boundaries() {
        let shared = [minimum(4.0), maximum(5.0), maximum(7.0), minimum(8.0), maximum(9.0)];
        let peaks = build_shared_peaks(&shared, DEFAULT_MIN_PEAK_WIDTH);

        assert_eq!(
            peaks,
            vec![
                PeakRegion { apex_rt: 5.0, start_rt: 4.0, end_rt: 6.0 },
                PeakRegion { apex_rt: 7.0, start_rt: 6.0, end_rt: 8.0 },
                PeakRegion { apex_rt: 9.0, start_rt: 8.0, end_rt: 10.0 },
            ]
        );
        assert_eq!(peaks[0].width(), 2.0);

        let lone = build_shared_peaks(&[maximum(20.0)], DEFAULT_MIN_PEAK_WIDTH);
        assert_eq!(lone, vec![PeakRegion { apex_rt: 20.0, start_rt: 19.0, end_rt: 21.0 }]);

        // a maximum pinched between two close minima is too narrow
        let narrow = build_shared_peaks(&[minimum(5.0), maximum(5.1), minimum(5.2)], DEFAULT_MIN_PEAK_WIDTH);
        assert!(narrow.is_empty());
        assert!(build_shared_peaks(&[], DEFAULT_MIN_PEAK_WIDTH).is_empty());
    }

    #[test]
    fn test_extremum_kind_display() {
        assert_eq!(ExtremumKind::Maximum.to_string(), "maximum");
        assert_eq!(ExtremumKind::Minimum.to_string(), "minimum");
    }
}
