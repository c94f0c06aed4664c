use anyhow::{anyhow, ensure};
use anyhow_ext::{Context, Result};
use log::info;

use mzxic::{ExtractionParams, Scan, SimilarityMetric, SplineKind, Tolerance, XicExtractor, XicTarget};

const SCAN_COUNT: usize = 60;
const CYCLE_TIME: f64 = 0.05;

/// (monoisotopic m/z, charge, apex RT, peak width, apex intensity)
const ANALYTES: [(f64, u8, f64, f64, f64); 3] = [
    (800.3672, 1, 1.20, 0.12, 2.0e7),
    (523.7745, 2, 1.65, 0.10, 8.0e6),
    (644.8123, 2, 1.70, 0.15, 5.0e6),
];

const ISOTOPE_ABUNDANCES: [f64; 3] = [1.0, 0.45, 0.12];

/// Centroided MS1 scans with a few co-eluting isotope envelopes on a flat background
fn synthetic_scans() -> Result<Vec<Scan>> {
    (0..SCAN_COUNT)
        .map(|s| {
            let rt = 0.5 + s as f64 * CYCLE_TIME;
            let mut mz_array = Vec::new();
            let mut intensity_array = Vec::new();

            for &(mono, charge, apex_rt, width, height) in &ANALYTES {
                let profile = (-0.5 * ((rt - apex_rt) / width).powi(2)).exp();
                if profile < 1e-3 {
                    continue;
                }
                for (k, abundance) in ISOTOPE_ABUNDANCES.iter().enumerate() {
                    mz_array.push(mono + k as f64 * 1.003_355 / charge as f64);
                    intensity_array.push(height * abundance * profile);
                }
            }

            // deterministic chemical background every 25 Th
            for b in 0..40 {
                mz_array.push(400.0 + b as f64 * 25.0 + (s % 7) as f64 * 1e-4);
                intensity_array.push(1.0e4 * (1.0 + (b % 3) as f64));
            }

            Scan::new(s as i32 + 1, 1, rt, mz_array, intensity_array).dot()
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();

    let scans = synthetic_scans()?;
    let params = ExtractionParams::builder()
        .tolerance(Tolerance::Ppm(10.0))
        .missed_scans_allowed(2)
        .min_peaks_per_xic(5)
        .spline(SplineKind::Cubic, 0.01)
        .padding(2, CYCLE_TIME)
        .similarity(SimilarityMetric::Cosine, 0.8)
        .build()
        .dot()?;

    println!("=== Params ===");
    println!("{}", params.to_json_string().dot()?);

    let extractor = XicExtractor::new(&scans, params).dot()?;

    println!("\n=== Targeted extraction ===");
    let targets: Vec<XicTarget> = ANALYTES
        .iter()
        .map(|&(mass, _, retention_time, _, _)| XicTarget { mass, retention_time })
        .collect();

    for (target, xic) in targets.iter().zip(extractor.extract_xics(&targets)?) {
        match xic {
            Some(mut xic) => {
                extractor.resample(&mut xic, false)?;
                println!(
                    "{:.4}: {} peaks, apex {:.3} min ({:.3}-{:.3}), averaged mass {:.5}, {} resampled points",
                    target.mass,
                    xic.peaks().len(),
                    xic.apex_rt(),
                    xic.start_rt(),
                    xic.end_rt(),
                    xic.averaged_mass(),
                    xic.xy_data().map_or(0, |xy| xy.len())
                );
            }
            None => println!("{:.4}: not found", target.mass),
        }
    }

    println!("\n=== Untargeted extraction ===");
    let all_xics = extractor.get_all_xics()?;
    info!("traced {} XICs", all_xics.len());
    ensure!(!all_xics.is_empty(), "no XIC traced in {} scans", scans.len());

    let groups = extractor.group(&all_xics)?;
    for (g, group) in groups.groups().iter().enumerate() {
        if group.members.len() < 2 {
            continue;
        }
        let masses: Vec<String> = groups
            .members(g)
            .map(|xic| format!("{:.4}", xic.averaged_mass()))
            .collect();
        let reference = all_xics
            .get(group.reference)
            .ok_or_else(|| anyhow!("reference XIC {} not found", group.reference))?;
        println!(
            "group {}: apex {:.3} min, reference {:.4}, members [{}]",
            g,
            reference.apex_rt(),
            reference.averaged_mass(),
            masses.join(", ")
        );
        for peak in &group.shared_peaks {
            println!(
                "  shared peak at {:.3} min ({:.3}-{:.3})",
                peak.apex_rt, peak.start_rt, peak.end_rt
            );
        }
    }

    println!(
        "{} XICs in {} groups ({} singletons)",
        all_xics.len(),
        groups.groups().len(),
        groups.groups().iter().filter(|g| g.members.len() == 1).count()
    );

    Ok(())
}
