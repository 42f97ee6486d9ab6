use crate::filter::{FilterType, TemporalFilter};
use crate::frame::{frame_pairs, list_frames, load_image};
use crate::model::FlowEstimator;
use crate::padder::{InputPadder, PadMode};
use crate::viz::{compose, flow_to_image, write_frame};
use anyhow::{bail, Result};
use candle_core::Device;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct Settings {
    pub frames_dir: PathBuf,
    pub output_dir: PathBuf,
    pub frame_len: usize,
    pub filter_type: FilterType,
    pub filter_size: usize,
    pub pad_mode: PadMode,
    pub device: Device,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Fails when pairs were attempted and none produced an image.
    pub fn ensure_any_written(self) -> Result<Self> {
        if self.written == 0 && self.failed > 0 {
            bail!("all {} frame pairs failed", self.failed);
        }
        Ok(self)
    }
}

pub fn run<E: FlowEstimator>(settings: &Settings, estimator: &mut E) -> Result<RunSummary> {
    let frames = list_frames(&settings.frames_dir)?;
    let pairs = frame_pairs(&frames, settings.frame_len);
    if pairs.is_empty() {
        warn!(
            frames = frames.len(),
            frame_len = settings.frame_len,
            "not enough frames to form a pair"
        );
        return Ok(RunSummary::default());
    }
    info!(
        pairs = pairs.len(),
        filter = ?settings.filter_type,
        output = %settings.output_dir.display(),
        "estimating flow"
    );

    let progress = ProgressBar::new(pairs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
        )?
        .progress_chars("#>-"),
    );

    let mut filter = TemporalFilter::new(settings.filter_type, settings.filter_size);
    let mut summary = RunSummary::default();
    for (index, (first, second)) in pairs.iter().enumerate() {
        match process_pair(settings, estimator, &mut filter, index, first, second) {
            Ok(path) => {
                debug!(path = %path.display(), "wrote visualization");
                summary.written += 1;
            }
            Err(e) => {
                progress.suspend(|| error!("skipping {}: {e:#}", first.display()));
                summary.failed += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish();

    info!(written = summary.written, failed = summary.failed, "done");
    Ok(summary)
}

fn process_pair<E: FlowEstimator>(
    settings: &Settings,
    estimator: &mut E,
    filter: &mut TemporalFilter,
    index: usize,
    first: &Path,
    second: &Path,
) -> Result<PathBuf> {
    let (frame, image1) = load_image(first, &settings.device)?;
    let (_, image2) = load_image(second, &settings.device)?;
    if image1.dims() != image2.dims() {
        bail!(
            "frame sizes differ: {:?} vs {:?} ({})",
            image1.dims(),
            image2.dims(),
            second.display()
        );
    }

    let padder = InputPadder::for_tensor(&image1, settings.pad_mode)?;
    let flow = estimator.estimate(&padder.pad(&image1)?, &padder.pad(&image2)?)?;
    let flow = padder.unpad(&flow)?;
    let flow = filter.push(&flow)?;

    let field = flow.squeeze(0)?.to_vec3::<f32>()?;
    let rendered = compose(&frame, &flow_to_image(&field, None))?;
    write_frame(&settings.output_dir, index, &rendered)
}
