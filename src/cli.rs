use crate::config::{load_config, Config};
use crate::filter::FilterType;
use crate::model::{resolve_checkpoint, select_device, ModelOptions, OnnxRaft};
use crate::padder::PadMode;
use crate::pipeline::{self, Settings};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PadArg {
    #[default]
    Sintel,
    Kitti,
}

impl From<PadArg> for PadMode {
    fn from(arg: PadArg) -> Self {
        match arg {
            PadArg::Sintel => PadMode::Sintel,
            PadArg::Kitti => PadMode::Kitti,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "raft-flow-demo",
    version,
    about = "Render RAFT optical flow for a directory of frames"
)]
pub struct Cli {
    /// ONNX checkpoint to restore
    #[arg(long)]
    pub model: Option<String>,
    /// Directory of input frames
    #[arg(long)]
    pub path: PathBuf,
    /// Use the small model checkpoint
    #[arg(long)]
    pub small: bool,
    /// Run the network with f16 inputs
    #[arg(long)]
    pub mixed_precision: bool,
    /// Distance between the two frames of a pair
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub frame_len: u32,
    /// Temporal filter applied to consecutive flows
    #[arg(long, value_enum, default_value_t = FilterType::None)]
    pub filter_type: FilterType,
    /// Filter window size
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub filter_size: Option<u32>,
    /// Refinement iterations, for graphs that expose them
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub iters: Option<u32>,
    /// Where visualizations are written
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Padding layout used to align frames to the network stride
    #[arg(long, value_enum, default_value_t = PadArg::Sintel)]
    pub pad: PadArg,
    /// Never use CUDA
    #[arg(long)]
    pub cpu: bool,
}

impl Cli {
    /// Checkpoint name: `--model`, else the configured (small) model.
    pub fn checkpoint(&self, cfg: &Config) -> String {
        match &self.model {
            Some(m) => m.clone(),
            None if self.small => cfg.small_model.clone(),
            None => cfg.model.clone(),
        }
    }

    pub fn settings(&self, cfg: &Config) -> Result<Settings> {
        Ok(Settings {
            frames_dir: self.path.clone(),
            output_dir: self.output.clone().unwrap_or_else(|| cfg.output_dir.clone()),
            frame_len: self.frame_len as usize,
            filter_type: self.filter_type,
            filter_size: self
                .filter_size
                .map(|s| s as usize)
                .unwrap_or(cfg.filter_size)
                .max(1),
            pad_mode: self.pad.into(),
            device: select_device(self.cpu)?,
        })
    }

    pub fn model_options(&self, cfg: &Config) -> ModelOptions {
        ModelOptions {
            iters: self.iters.unwrap_or(cfg.iters),
            mixed_precision: self.mixed_precision,
        }
    }
}

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn run_cli() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = execute(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    let cfg = load_config();
    let settings = cli.settings(&cfg)?;
    let checkpoint = resolve_checkpoint(&cli.checkpoint(&cfg), cfg.model_repo.as_deref())?;
    info!(model = %checkpoint.display(), "loading model");
    let mut model = OnnxRaft::load(&checkpoint, cli.model_options(&cfg))?;
    pipeline::run(&settings, &mut model)?.ensure_any_written()?;
    Ok(())
}
