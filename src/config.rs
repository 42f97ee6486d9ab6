use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use tracing::{debug, error};

pub const DEFAULT_MODEL: &str = "raft-things.onnx";
pub const DEFAULT_SMALL_MODEL: &str = "raft-small.onnx";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Checkpoint used when `--model` is not given.
    pub model: String,
    /// Checkpoint used with `--small` when `--model` is not given.
    pub small_model: String,
    /// Hugging Face repo to fetch checkpoints from when they are not on disk.
    pub model_repo: Option<String>,
    pub output_dir: PathBuf,
    pub iters: u32,
    pub filter_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            small_model: DEFAULT_SMALL_MODEL.to_string(),
            model_repo: None,
            output_dir: PathBuf::from("images"),
            iters: 20,
            filter_size: 9,
        }
    }
}

pub fn config_path() -> PathBuf {
    env::var_os("RAFT_DEMO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("raft-demo.json"))
}

pub fn load_config() -> Config {
    let path = config_path();
    let Ok(data) = fs::read(&path) else {
        debug!(path = %path.display(), "no config file, using defaults");
        return Config::default();
    };
    match serde_json::from_slice(&data) {
        Ok(cfg) => {
            debug!(path = %path.display(), "loaded configuration");
            cfg
        }
        Err(e) => {
            error!("failed to parse {}: {e}", path.display());
            Config::default()
        }
    }
}
