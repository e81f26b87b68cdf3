//! jlv2 - LV2 plugin hosting core
//!
//! Load LV2 plugins through lilv and run them from a real-time audio
//! callback. See [`lv2::World`] for discovery and [`lv2::PluginInstance`]
//! for the processing bridge.

pub mod config;
pub mod error;
pub mod lv2;

pub use config::HostConfig;
pub use error::{Error, Result};
