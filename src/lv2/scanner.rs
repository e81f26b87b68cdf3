use super::module::{has_native_ui, scan_ports};
use super::types::PluginInfo;

/// Features every instance receives from the host.
pub const PROVIDED_FEATURES: &[&str] = &[
    "http://lv2plug.in/ns/ext/urid#map",
    "http://lv2plug.in/ns/ext/urid#unmap",
    "http://lv2plug.in/ns/ext/worker#schedule",
];

pub fn is_feature_supported(uri: &str) -> bool {
    PROVIDED_FEATURES.contains(&uri)
}

pub fn scan_plugins_with_world(world: &lilv::World) -> Vec<PluginInfo> {
    let mut plugins = Vec::new();

    for plugin in world.plugins().iter() {
        if !plugin.verify() {
            continue;
        }
        if let Some(info) = describe(world, &plugin) {
            plugins.push(info);
        }
    }

    plugins.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    log::info!("LV2: found {} plugins", plugins.len());
    plugins
}

/// Everything the host can learn about a plugin without instantiating it.
pub fn describe(world: &lilv::World, plugin: &lilv::plugin::Plugin) -> Option<PluginInfo> {
    let uri = plugin.uri().as_uri()?.to_string();
    let name = plugin.name().as_str()?.to_string();
    let class_label = plugin.class().label().as_str().unwrap_or("Plugin").to_string();

    let mut info = PluginInfo::new(&uri, &name, &class_label, scan_ports(world, plugin));
    info.author = plugin
        .author_name()
        .and_then(|n| n.as_str().map(String::from));
    info.required_features = plugin
        .required_features()
        .iter()
        .filter_map(|n| n.as_uri().map(String::from))
        .collect();
    info.compatible = info
        .required_features
        .iter()
        .all(|req| is_feature_supported(req));
    info.has_ui = has_native_ui(world, plugin);
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provided_features() {
        assert!(is_feature_supported("http://lv2plug.in/ns/ext/urid#map"));
        assert!(is_feature_supported("http://lv2plug.in/ns/ext/worker#schedule"));
        assert!(!is_feature_supported("http://lv2plug.in/ns/ext/buf-size#boundedBlockLength"));
    }
}
