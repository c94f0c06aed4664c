//! Merging of m/z-sorted peak arrays
//!
//! Sorted arrays are merged into one sorted array, then neighbouring peaks
//! closer than the tolerance are collapsed into a single centroid.

use itertools::Itertools;
use log::trace;

use crate::error::{XicError, XicResult};
use crate::tolerance::Tolerance;

pub const DEFAULT_MERGE_TOLERANCE: Tolerance = Tolerance::Ppm(10.0);

fn check_pair(mz: &[f64], intensity: &[f64]) -> XicResult<()> {
    if mz.len() != intensity.len() {
        return Err(XicError::invalid(format!(
            "peak arrays differ in length: {} m/z values, {} intensities",
            mz.len(),
            intensity.len()
        )));
    }
    Ok(())
}

/// Merge two m/z-sorted peak arrays into one sorted array.
/// On equal m/z the peak of the first array comes first.
pub fn two_pointer_merge(
    mz1: &[f64],
    intensity1: &[f64],
    mz2: &[f64],
    intensity2: &[f64],
) -> XicResult<(Vec<f64>, Vec<f64>)> {
    check_pair(mz1, intensity1)?;
    check_pair(mz2, intensity2)?;

    let total = mz1.len() + mz2.len();
    let mut merged_mz = Vec::with_capacity(total);
    let mut merged_intensity = Vec::with_capacity(total);

    let (mut p1, mut p2) = (0, 0);
    while p1 < mz1.len() && p2 < mz2.len() {
        if mz1[p1] <= mz2[p2] {
            merged_mz.push(mz1[p1]);
            merged_intensity.push(intensity1[p1]);
            p1 += 1;
        } else {
            merged_mz.push(mz2[p2]);
            merged_intensity.push(intensity2[p2]);
            p2 += 1;
        }
    }
    merged_mz.extend_from_slice(&mz1[p1..]);
    merged_intensity.extend_from_slice(&intensity1[p1..]);
    merged_mz.extend_from_slice(&mz2[p2..]);
    merged_intensity.extend_from_slice(&intensity2[p2..]);

    Ok((merged_mz, merged_intensity))
}

/// Collapse chains of peaks where each m/z lies within `tolerance` of the
/// previous one. A cluster keeps the summed intensity and the
/// intensity-weighted mean m/z.
pub fn collapse_peaks(
    mz: &[f64],
    intensity: &[f64],
    tolerance: &Tolerance,
) -> XicResult<(Vec<f64>, Vec<f64>)> {
    check_pair(mz, intensity)?;
    tolerance.validate()?;

    let mut collapsed_mz = Vec::with_capacity(mz.len());
    let mut collapsed_intensity = Vec::with_capacity(mz.len());

    let mut p1 = 0;
    while p1 < mz.len() {
        let mut p2 = p1;
        while p2 + 1 < mz.len() && mz[p2 + 1] <= tolerance.get_maximum_value(mz[p2]) {
            p2 += 1;
        }

        let cluster = p1..=p2;
        let summed: f64 = intensity[cluster.clone()].iter().sum();
        let centroid = if summed > 0.0 {
            cluster.clone().map(|i| mz[i] * intensity[i]).sum::<f64>() / summed
        } else {
            mz[cluster.clone()].iter().sum::<f64>() / (p2 - p1 + 1) as f64
        };

        collapsed_mz.push(centroid);
        collapsed_intensity.push(summed);
        p1 = p2 + 1;
    }

    trace!("collapsed {} peaks into {}", mz.len(), collapsed_mz.len());
    Ok((collapsed_mz, collapsed_intensity))
}

/// Merge any number of m/z-sorted peak arrays and collapse near-duplicates
pub fn merge_spectra<M, I>(
    mz_arrays: &[M],
    intensity_arrays: &[I],
    tolerance: &Tolerance,
) -> XicResult<(Vec<f64>, Vec<f64>)>
where
    M: AsRef<[f64]>,
    I: AsRef<[f64]>,
{
    if mz_arrays.len() != intensity_arrays.len() {
        return Err(XicError::invalid(format!(
            "got {} m/z arrays but {} intensity arrays",
            mz_arrays.len(),
            intensity_arrays.len()
        )));
    }
    for (mz, intensity) in mz_arrays.iter().zip(intensity_arrays) {
        check_pair(mz.as_ref(), intensity.as_ref())?;
    }

    let (mz, intensity): (Vec<f64>, Vec<f64>) = mz_arrays
        .iter()
        .zip(intensity_arrays)
        .map(|(mz, intensity)| {
            mz.as_ref()
                .iter()
                .copied()
                .zip(intensity.as_ref().iter().copied())
        })
        .kmerge_by(|a, b| a.0 < b.0)
        .unzip();

    collapse_peaks(&mz, &intensity, tolerance)
}
