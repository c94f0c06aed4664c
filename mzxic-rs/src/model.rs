use serde::{Deserialize, Serialize};

use crate::error::{XicError, XicResult};

/// One centroided mass spectrum, peaks sorted by increasing m/z
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub one_based_scan_number: i32,
    pub ms_level: u8,
    pub retention_time: f64,
    pub mz_array: Vec<f64>,
    pub intensity_array: Vec<f64>,
}

impl Scan {
    /// Build a scan, sorting the peak arrays by m/z.
    ///
    /// Fails with [`XicError::InvalidInput`] when the arrays differ in length.
    pub fn new(
        one_based_scan_number: i32,
        ms_level: u8,
        retention_time: f64,
        mz_array: Vec<f64>,
        intensity_array: Vec<f64>,
    ) -> XicResult<Self> {
        if mz_array.len() != intensity_array.len() {
            return Err(XicError::invalid(format!(
                "scan {} has {} m/z values but {} intensities",
                one_based_scan_number,
                mz_array.len(),
                intensity_array.len()
            )));
        }

        let is_sorted = mz_array.windows(2).all(|w| w[0] <= w[1]);
        let (mz_array, intensity_array) = if is_sorted {
            (mz_array, intensity_array)
        } else {
            let mut pairs: Vec<(f64, f64)> = mz_array.into_iter().zip(intensity_array).collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            pairs.into_iter().unzip()
        };

        Ok(Scan {
            one_based_scan_number,
            ms_level,
            retention_time,
            mz_array,
            intensity_array,
        })
    }
}

/// Per-scan metadata recorded when a scan set is indexed
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    pub one_based_scan_number: i32,
    pub zero_based_scan_index: usize,
    pub retention_time: f64,
    pub ms_level: u8,
}

impl ScanInfo {
    pub fn from_scan(scan: &Scan, zero_based_scan_index: usize) -> Self {
        ScanInfo {
            one_based_scan_number: scan.one_based_scan_number,
            zero_based_scan_index,
            retention_time: scan.retention_time,
            ms_level: scan.ms_level,
        }
    }
}

/// A single peak as stored in the peak index
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedPeak {
    pub mz: f64,
    pub intensity: f64,
    pub zero_based_scan_index: usize,
    pub retention_time: f64,
}

impl IndexedPeak {
    pub fn new(mz: f64, intensity: f64, zero_based_scan_index: usize, retention_time: f64) -> Self {
        IndexedPeak {
            mz,
            intensity,
            zero_based_scan_index,
            retention_time,
        }
    }
}
