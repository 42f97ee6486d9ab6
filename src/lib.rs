pub mod cli;
pub mod config;
pub mod filter;
pub mod frame;
pub mod model;
pub mod padder;
pub mod pipeline;
pub mod viz;

pub use cli::{execute, run_cli, Cli};
pub use config::Config;
pub use filter::FilterType;
