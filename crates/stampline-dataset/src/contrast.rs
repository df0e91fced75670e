//! Contrast pre-processing: grayscale, stretch around the mean, threshold.
//!
//! Produces black-and-white "document look" variants that OCR backends read
//! more reliably than the raw photos. Images are processed on the rayon
//! pool; the ledger is only touched afterwards, from the calling thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, GrayImage, ImageFormat};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stampline_core::{Ledger, LedgerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastConfig {
    /// 1.0 keeps the original contrast
    pub factor: f32,
    /// Luma below this becomes black, the rest white
    pub threshold: u8,
    /// Path segment replaced in the identity
    pub input_segment: String,
    pub output_segment: String,
    /// Column that records the processed path
    pub column: String,
}

impl Default for ContrastConfig {
    fn default() -> Self {
        Self {
            factor: 2.5,
            threshold: 150,
            input_segment: "stamps".to_string(),
            output_segment: "bw-stamps".to_string(),
            column: "processed".to_string(),
        }
    }
}

/// `data/stamps/a.jpg` → `data/bw-stamps/a.jpg`; None when no segment matches.
pub fn output_identity(identity: &str, input_segment: &str, output_segment: &str) -> Option<String> {
    let mut segments: Vec<&str> = identity.split('/').collect();
    let last = segments.len().checked_sub(1)?;
    let pos = segments[..last].iter().position(|s| *s == input_segment)?;
    segments[pos] = output_segment;
    Some(segments.join("/"))
}

/// Grayscale, contrast around the mean luma, then binarize.
pub fn document_look(img: &DynamicImage, factor: f32, threshold: u8) -> GrayImage {
    let mut gray = img.to_luma8();
    let pixels = gray.as_raw();
    let mean = if pixels.is_empty() {
        0.0
    } else {
        let sum: u64 = pixels.iter().map(|&p| u64::from(p)).sum();
        (sum as f64 / pixels.len() as f64 + 0.5).floor() as f32
    };
    for p in gray.pixels_mut() {
        let v = (mean + factor * (f32::from(p.0[0]) - mean)).clamp(0.0, 255.0);
        p.0[0] = if v < f32::from(threshold) { 0 } else { 255 };
    }
    gray
}

/// Process one file. The output format follows the output extension.
pub fn process_file(src: &Path, dst: &Path, factor: f32, threshold: u8) -> anyhow::Result<()> {
    use anyhow::Context;

    let img = image::open(src).with_context(|| format!("cannot open {}", src.display()))?;
    let bw = document_look(&img, factor, threshold);
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let format = ImageFormat::from_path(dst)
        .with_context(|| format!("unknown output format: {}", dst.display()))?;
    let out = match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Tiff => DynamicImage::ImageLuma8(bw),
        _ => DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(bw).to_rgb8()),
    };
    out.save_with_format(dst, format)
        .with_context(|| format!("cannot write {}", dst.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContrastReport {
    pub processed: usize,
    /// Output already present (no `force`)
    pub existing: usize,
    pub failed: usize,
    /// Identity has no input segment to replace
    pub unmapped: usize,
}

/// What became of one job on the pool
#[derive(Debug, PartialEq, Eq)]
enum JobOutcome {
    Done(String),
    Failed,
    /// Not started: the stop flag was already raised
    Skipped,
}

/// Fold job outcomes into the report; returns the rows to record.
fn tally(results: Vec<(usize, JobOutcome)>, report: &mut ContrastReport) -> Vec<(usize, String)> {
    let mut done = Vec::new();
    for (row, outcome) in results {
        match outcome {
            JobOutcome::Done(out_identity) => {
                report.processed += 1;
                done.push((row, out_identity));
            }
            JobOutcome::Failed => report.failed += 1,
            JobOutcome::Skipped => {}
        }
    }
    done
}

struct Job {
    row: usize,
    src: PathBuf,
    dst: PathBuf,
    out_identity: String,
}

/// Process every ledger row and record output paths in `config.column`.
///
/// Per-image failures are logged and counted. The stop flag is honored
/// between images; rows already finished are still recorded.
pub fn run_contrast(
    ledger: &mut Ledger,
    root: &Path,
    config: &ContrastConfig,
    force: bool,
    stop: &AtomicBool,
    pb: &ProgressBar,
) -> Result<ContrastReport, LedgerError> {
    ledger.ensure_column(&config.column)?;
    let mut report = ContrastReport::default();
    let mut jobs = Vec::new();
    let mut done = Vec::new();

    for row in 0..ledger.len() {
        let identity = ledger.identity(row).unwrap_or_default();
        let Some(out_identity) =
            output_identity(identity, &config.input_segment, &config.output_segment)
        else {
            log::warn!(
                "{identity}: no {:?} segment, not processed",
                config.input_segment
            );
            report.unmapped += 1;
            continue;
        };
        let dst = root.join(&out_identity);
        if !force && dst.is_file() {
            report.existing += 1;
            done.push((row, out_identity));
            continue;
        }
        jobs.push(Job {
            row,
            src: root.join(identity),
            dst,
            out_identity,
        });
    }

    pb.set_length(jobs.len() as u64);
    let results: Vec<(usize, JobOutcome)> = jobs
        .into_par_iter()
        .map(|job| {
            if stop.load(Ordering::Relaxed) {
                return (job.row, JobOutcome::Skipped);
            }
            let result = process_file(&job.src, &job.dst, config.factor, config.threshold);
            pb.inc(1);
            match result {
                Ok(()) => {
                    log::debug!("{} -> {}", job.src.display(), job.dst.display());
                    (job.row, JobOutcome::Done(job.out_identity))
                }
                Err(e) => {
                    log::error!("{e:#}");
                    (job.row, JobOutcome::Failed)
                }
            }
        })
        .collect();

    done.extend(tally(results, &mut report));
    for (row, out_identity) in done {
        ledger.set(row, &config.column, out_identity)?;
    }
    Ok(report)
}
