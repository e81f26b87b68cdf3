use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "lv2show", about = "List LV2 plugins or inspect one by URI")]
pub struct Cli {
    /// Plugin URI to load. Without one, supported plugin URIs are listed.
    pub uri: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Sample rate in Hz (default: from host config)
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Block size in frames (default: from host config)
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Silent blocks to run after loading
    #[arg(long, default_value = "4")]
    pub blocks: usize,

    /// Extra LV2 bundle directory (repeatable)
    #[arg(long = "lv2-path")]
    pub lv2_paths: Vec<PathBuf>,

    /// Restore plugin state from this file before running
    #[arg(long)]
    pub load_state: Option<PathBuf>,

    /// Write plugin state to this file after running
    #[arg(long)]
    pub save_state: Option<PathBuf>,
}
