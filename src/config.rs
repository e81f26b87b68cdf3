//! Host configuration persisted as JSON in the user's config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    /// Capacity (in events) of each port event ring, both directions.
    pub port_event_queue_size: usize,
    /// Bytes allocated per atom/event port buffer.
    pub atom_buffer_size: usize,
    /// Events a [`crate::lv2::MidiBuffer`] created by the host can hold.
    pub midi_buffer_capacity: usize,
    pub worker_threads: usize,
    /// Capacity (in messages) of each worker request/response ring.
    pub worker_queue_size: usize,
    /// Extra LV2 bundle directories, prepended to `LV2_PATH`.
    pub search_paths: Vec<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 1024,
            port_event_queue_size: 128,
            atom_buffer_size: 8192,
            midi_buffer_capacity: 512,
            worker_threads: 1,
            worker_queue_size: 32,
            search_paths: Vec::new(),
        }
    }
}

impl HostConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("jlv2").join("host.json"))
    }

    /// Load the user's config, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => {
                log::info!("Loaded host config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring host config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: HostConfig = serde_json::from_str(&text)?;
        Ok(config.sanitized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Clamp sizes that would make buffers unusable.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.sample_rate > 0.0) {
            self.sample_rate = defaults.sample_rate;
        }
        self.block_size = self.block_size.max(1);
        self.port_event_queue_size = self.port_event_queue_size.max(1);
        // room for the sequence header plus one small event
        self.atom_buffer_size = self.atom_buffer_size.max(64);
        self.worker_threads = self.worker_threads.max(1);
        self.worker_queue_size = self.worker_queue_size.max(1);
        self
    }

    /// The value `LV2_PATH` should take so the configured directories are
    /// searched before the system locations.
    pub fn lv2_path(&self) -> Option<String> {
        if self.search_paths.is_empty() {
            return None;
        }
        let mut dirs: Vec<PathBuf> = self.search_paths.clone();
        dirs.extend(crate::lv2::default_search_paths());
        std::env::join_paths(dirs)
            .ok()
            .and_then(|p| p.into_string().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.block_size, 1024);
        assert!(config.lv2_path().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.json");

        let config = HostConfig {
            sample_rate: 44100.0,
            block_size: 256,
            search_paths: vec![PathBuf::from("/opt/lv2")],
            ..HostConfig::default()
        };
        config.save_to(&path).unwrap();

        let loaded = HostConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(&path, r#"{ "block_size": 64 }"#).unwrap();

        let loaded = HostConfig::load_from(&path).unwrap();
        assert_eq!(loaded.block_size, 64);
        assert_eq!(loaded.sample_rate, 48000.0);
        assert_eq!(loaded.worker_queue_size, 32);
    }

    #[test]
    fn test_sanitized_clamps_zero_sizes() {
        let config = HostConfig {
            sample_rate: 0.0,
            block_size: 0,
            atom_buffer_size: 0,
            worker_threads: 0,
            ..HostConfig::default()
        }
        .sanitized();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.block_size, 1);
        assert_eq!(config.atom_buffer_size, 64);
        assert_eq!(config.worker_threads, 1);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(HostConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_lv2_path_prepends_search_paths() {
        let config = HostConfig {
            search_paths: vec![PathBuf::from("/opt/lv2")],
            ..HostConfig::default()
        };
        let path = config.lv2_path().unwrap();
        assert!(path.starts_with("/opt/lv2"));
    }
}
