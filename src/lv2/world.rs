//! The process-wide LV2 context: lilv's world, the shared symbol map and
//! the worker threads every instance draws from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::instance::PluginInstance;
use super::module::LilvModule;
use super::scanner;
use super::urid::SymbolMap;
use super::worker::WorkerPool;
use super::PluginInfo;
use crate::config::HostConfig;
use crate::error::{Error, Result};

pub struct World {
    lilv: Arc<lilv::World>,
    symbols: Arc<SymbolMap>,
    workers: WorkerPool,
    config: HostConfig,
}

impl World {
    /// Load every bundle on the LV2 search path and start the worker pool.
    pub fn new(config: HostConfig) -> Result<Self> {
        let config = config.sanitized();
        let lilv = Arc::new(lilv::World::with_load_all());
        let workers = WorkerPool::new(config.worker_threads)?;
        log::info!(
            "LV2 world ready ({} worker thread{})",
            workers.len(),
            if workers.len() == 1 { "" } else { "s" }
        );
        Ok(Self {
            lilv,
            symbols: Arc::new(SymbolMap::new()),
            workers,
            config,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn symbols(&self) -> &Arc<SymbolMap> {
        &self.symbols
    }

    pub fn map(&self, uri: &str) -> u32 {
        self.symbols.map(uri)
    }

    pub fn unmap(&self, urid: u32) -> Option<String> {
        self.symbols.unmap(urid)
    }

    pub fn is_feature_supported(&self, uri: &str) -> bool {
        scanner::is_feature_supported(uri)
    }

    /// Descriptions of every valid plugin, sorted by name.
    pub fn scan(&self) -> Vec<PluginInfo> {
        scanner::scan_plugins_with_world(&self.lilv)
    }

    /// URIs of the plugins this host can run.
    pub fn plugin_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .lilv
            .plugins()
            .iter()
            .filter(|p| p.verify() && self.supports(p))
            .filter_map(|p| p.uri().as_uri().map(String::from))
            .collect();
        uris.sort();
        uris
    }

    pub fn plugin_name(&self, uri: &str) -> Option<String> {
        self.find_plugin(uri)
            .and_then(|p| p.name().as_str().map(String::from))
    }

    pub fn is_plugin_available(&self, uri: &str) -> bool {
        self.find_plugin(uri).is_some()
    }

    pub fn is_plugin_supported(&self, uri: &str) -> bool {
        self.find_plugin(uri).is_some_and(|p| self.supports(&p))
    }

    fn supports(&self, plugin: &lilv::plugin::Plugin) -> bool {
        plugin
            .required_features()
            .iter()
            .filter_map(|n| n.as_uri().map(String::from))
            .all(|req| scanner::is_feature_supported(&req))
    }

    fn find_plugin(&self, uri: &str) -> Option<lilv::plugin::Plugin> {
        self.lilv
            .plugins()
            .iter()
            .find(|p| p.uri().as_uri() == Some(uri))
    }

    pub fn create_module(&self, uri: &str) -> Result<LilvModule> {
        if !is_plugin_identifier(uri) {
            return Err(Error::NotLv2(uri.to_string()));
        }
        let plugin = self
            .find_plugin(uri)
            .ok_or_else(|| Error::PluginNotFound(uri.to_string()))?;
        LilvModule::new(self.lilv.clone(), plugin)
    }

    /// Create and instantiate `uri`. The instance still needs `prepare`.
    pub fn create_instance(&self, uri: &str, sample_rate: f64) -> Result<PluginInstance> {
        let module = self.create_module(uri)?;
        let mut instance = PluginInstance::new(
            Box::new(module),
            self.symbols.clone(),
            Some(self.workers.next_thread()),
            &self.config,
        );
        instance.instantiate(sample_rate)?;
        Ok(instance)
    }
}

/// True for strings that look like an LV2 plugin URI, or an absolute
/// bundle directory holding a `manifest.ttl`.
pub fn is_plugin_identifier(identifier: &str) -> bool {
    if ["http:", "https:", "urn:"]
        .iter()
        .any(|scheme| identifier.contains(scheme))
    {
        return true;
    }
    let path = Path::new(identifier);
    path.is_absolute() && path.join("manifest.ttl").is_file()
}

/// Where LV2 bundles are installed on this platform.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/Library/Audio/Plug-Ins/LV2"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("Library/Audio/Plug-Ins/LV2"));
        }
    } else if cfg!(target_os = "windows") {
        if let Some(data) = dirs::data_dir() {
            paths.push(data.join("LV2"));
        }
    } else {
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".lv2"));
        }
        paths.push(PathBuf::from("/usr/lib/lv2"));
        paths.push(PathBuf::from("/usr/local/lib/lv2"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_identifiers() {
        assert!(is_plugin_identifier("http://lv2plug.in/plugins/eg-amp"));
        assert!(is_plugin_identifier("https://example.org/plugin"));
        assert!(is_plugin_identifier("urn:jlv2:test"));
        assert!(!is_plugin_identifier("eg-amp"));
        assert!(!is_plugin_identifier(""));
    }

    #[test]
    fn test_bundle_directory_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().to_str().unwrap().to_string();
        assert!(!is_plugin_identifier(&bundle));

        std::fs::write(dir.path().join("manifest.ttl"), "").unwrap();
        assert!(is_plugin_identifier(&bundle));
        // relative paths never count
        assert!(!is_plugin_identifier("manifest.ttl"));
    }

    #[test]
    fn test_default_search_paths() {
        let paths = default_search_paths();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.is_absolute()));
        #[cfg(target_os = "linux")]
        assert!(paths.contains(&PathBuf::from("/usr/lib/lv2")));
    }
}
