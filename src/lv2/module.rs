//! Plugin loading: the [`Module`] seam and its lilv implementation.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use lv2_raw::core::LV2Feature;

use super::worker::{LV2_WORKER_INTERFACE_URI, LV2_Worker_Interface};
use super::{PluginInfo, PortDeclaration, PortType};
use crate::error::{Error, Result};

/// One loadable plugin and, once instantiated, its instance.
///
/// The instance bridge drives everything through this trait, so it never
/// touches lilv directly.
pub trait Module: Send {
    fn uri(&self) -> &str;
    fn name(&self) -> &str;
    fn class_label(&self) -> &str;
    fn ports(&self) -> &[PortDeclaration];

    fn author_name(&self) -> Option<&str> {
        None
    }

    fn required_features(&self) -> &[String] {
        &[]
    }

    /// The plugin ships a native editor.
    fn has_editor(&self) -> bool {
        false
    }

    /// The plugin declares the worker interface as extension data.
    fn wants_worker(&self) -> bool {
        false
    }

    /// Create the plugin instance. Calling it again replaces the previous
    /// instance.
    ///
    /// # Safety
    /// Every feature (and whatever its data points at) must outlive the
    /// instance.
    unsafe fn instantiate(&mut self, sample_rate: f64, features: &[&LV2Feature]) -> Result<()>;

    fn is_instantiated(&self) -> bool;

    fn activate(&mut self);
    fn deactivate(&mut self);
    fn is_active(&self) -> bool;

    /// # Safety
    /// `data` must point at a buffer of the port's type that stays valid
    /// until reconnected or the instance is freed.
    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void);

    /// # Safety
    /// Every port must be connected to a buffer of at least `frames`
    /// samples (or the port type's fixed size).
    unsafe fn run(&mut self, frames: u32);

    /// Destroy the instance. The module can be instantiated again.
    fn free(&mut self);

    fn handle(&self) -> *mut c_void {
        std::ptr::null_mut()
    }

    fn worker_interface(&self) -> Option<NonNull<LV2_Worker_Interface>> {
        None
    }

    fn port_by_symbol(&self, symbol: &str) -> Option<&PortDeclaration> {
        self.ports().iter().find(|p| p.symbol == symbol)
    }

    fn info(&self) -> PluginInfo {
        let mut info = PluginInfo::new(
            self.uri(),
            self.name(),
            self.class_label(),
            self.ports().to_vec(),
        );
        info.author = self.author_name().map(String::from);
        info.required_features = self.required_features().to_vec();
        info.has_ui = self.has_editor();
        info
    }
}

// ---------------------------------------------------------------------------
// lilv
// ---------------------------------------------------------------------------

const LV2_CORE_INPUT_PORT: &str = "http://lv2plug.in/ns/lv2core#InputPort";
const LV2_CORE_OUTPUT_PORT: &str = "http://lv2plug.in/ns/lv2core#OutputPort";

const UI_CLASSES: &[&str] = &[
    "http://lv2plug.in/ns/extensions/ui#Gtk3UI",
    "http://lv2plug.in/ns/extensions/ui#X11UI",
    "http://lv2plug.in/ns/extensions/ui#Qt5UI",
    "http://lv2plug.in/ns/extensions/ui#GtkUI",
    "http://lv2plug.in/ns/extensions/ui#Gtk4UI",
];

enum ModuleInstance {
    None,
    Inactive(lilv::instance::Instance),
    Active(lilv::instance::ActiveInstance),
}

pub struct LilvModule {
    plugin: lilv::plugin::Plugin,
    uri: String,
    name: String,
    class_label: String,
    author: Option<String>,
    ports: Vec<PortDeclaration>,
    required_features: Vec<String>,
    has_editor: bool,
    wants_worker: bool,
    instance: ModuleInstance,
    _world: Arc<lilv::World>,
}

// SAFETY: lilv objects are only used from one thread at a time; the bridge
// owns the module exclusively and hands it to the audio thread by move.
unsafe impl Send for LilvModule {}

impl LilvModule {
    pub fn new(world: Arc<lilv::World>, plugin: lilv::plugin::Plugin) -> Result<Self> {
        let uri = plugin
            .uri()
            .as_uri()
            .map(String::from)
            .ok_or_else(|| Error::NotLv2("plugin has no URI".to_string()))?;
        let name = plugin
            .name()
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| uri.clone());
        let class_label = plugin
            .class()
            .label()
            .as_str()
            .unwrap_or("Plugin")
            .to_string();
        let author = plugin
            .author_name()
            .and_then(|n| n.as_str().map(String::from));

        let ports = scan_ports(&world, &plugin);

        let required_features: Vec<String> = plugin
            .required_features()
            .iter()
            .filter_map(|n| n.as_uri().map(String::from))
            .collect();

        let has_editor = has_native_ui(&world, &plugin);

        let wants_worker = plugin.has_extension_data(&world.new_uri(LV2_WORKER_INTERFACE_URI));

        Ok(Self {
            plugin,
            uri,
            name,
            class_label,
            author,
            ports,
            required_features,
            has_editor,
            wants_worker,
            instance: ModuleInstance::None,
            _world: world,
        })
    }

    fn instance(&self) -> Option<&lilv::instance::Instance> {
        match &self.instance {
            ModuleInstance::None => None,
            ModuleInstance::Inactive(i) => Some(i),
            ModuleInstance::Active(a) => Some(a.instance()),
        }
    }
}

/// The plugin ships a UI of a toolkit a host can embed.
pub(crate) fn has_native_ui(world: &lilv::World, plugin: &lilv::plugin::Plugin) -> bool {
    let ui_classes: Vec<lilv::node::Node> =
        UI_CLASSES.iter().map(|uri| world.new_uri(uri)).collect();
    plugin
        .uis()
        .map(|uis| {
            uis.iter()
                .any(|ui| ui_classes.iter().any(|cls| ui.is_a(cls)))
        })
        .unwrap_or(false)
}

/// Read every port's type, direction, names and range, in index order.
pub(crate) fn scan_ports(world: &lilv::World, plugin: &lilv::plugin::Plugin) -> Vec<PortDeclaration> {
    let input_class = world.new_uri(LV2_CORE_INPUT_PORT);
    let classes: Vec<(PortType, lilv::node::Node)> = [
        PortType::Audio,
        PortType::Atom,
        PortType::Control,
        PortType::Cv,
        PortType::Event,
        PortType::Midi,
    ]
    .into_iter()
    .map(|t| (t, world.new_uri(t.uri())))
    .collect();
    let midi_event = world.new_uri(super::urid::LV2_MIDI_EVENT);
    let output_class = world.new_uri(LV2_CORE_OUTPUT_PORT);

    let port_ranges = plugin.port_ranges_float();
    let mut ports = Vec::with_capacity(port_ranges.len());

    for (i, range) in port_ranges.iter().enumerate() {
        let Some(port) = plugin.port_by_index(i) else {
            continue;
        };

        let symbol = match port.symbol() {
            Some(s) => s.as_str().unwrap_or("").to_string(),
            None => format!("port_{}", i),
        };
        let name = match port.name() {
            Some(n) => n.as_str().unwrap_or("").to_string(),
            None => symbol.clone(),
        };

        let port_type = classes
            .iter()
            .find(|(_, class)| port.is_a(class))
            .map_or(PortType::Unknown, |(t, _)| *t);
        let is_input = port.is_a(&input_class) || !port.is_a(&output_class);
        let supports_midi = matches!(port_type, PortType::Atom | PortType::Event)
            && port.supports_event(&midi_event);

        let mut decl = PortDeclaration::new(i as u32, port_type, is_input, &symbol)
            .with_name(&name)
            .with_range(range.min, range.max, range.default);
        decl.supports_midi = supports_midi;
        ports.push(decl);
    }
    ports
}

impl Module for LilvModule {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn class_label(&self) -> &str {
        &self.class_label
    }

    fn ports(&self) -> &[PortDeclaration] {
        &self.ports
    }

    fn author_name(&self) -> Option<&str> {
        self.author.as_deref()
    }

    fn required_features(&self) -> &[String] {
        &self.required_features
    }

    fn has_editor(&self) -> bool {
        self.has_editor
    }

    fn wants_worker(&self) -> bool {
        self.wants_worker
    }

    unsafe fn instantiate(&mut self, sample_rate: f64, features: &[&LV2Feature]) -> Result<()> {
        self.free();
        let instance = unsafe { self.plugin.instantiate(sample_rate, features.to_vec()) }
            .ok_or_else(|| Error::Instantiation {
                uri: self.uri.clone(),
                reason: "Could not instantiate plugin.".to_string(),
            })?;
        self.instance = ModuleInstance::Inactive(instance);
        Ok(())
    }

    fn is_instantiated(&self) -> bool {
        !matches!(self.instance, ModuleInstance::None)
    }

    fn activate(&mut self) {
        self.instance = match std::mem::replace(&mut self.instance, ModuleInstance::None) {
            ModuleInstance::Inactive(instance) => {
                ModuleInstance::Active(unsafe { instance.activate() })
            }
            other => other,
        };
    }

    fn deactivate(&mut self) {
        self.instance = match std::mem::replace(&mut self.instance, ModuleInstance::None) {
            ModuleInstance::Active(active) => match unsafe { active.deactivate() } {
                Some(instance) => ModuleInstance::Inactive(instance),
                None => ModuleInstance::None,
            },
            other => other,
        };
    }

    fn is_active(&self) -> bool {
        matches!(self.instance, ModuleInstance::Active(_))
    }

    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void) {
        match &mut self.instance {
            ModuleInstance::None => {}
            ModuleInstance::Inactive(instance) => unsafe {
                instance.connect_port_mut(port as usize, data);
            },
            ModuleInstance::Active(active) => unsafe {
                active.instance_mut().connect_port_mut(port as usize, data);
            },
        }
    }

    unsafe fn run(&mut self, frames: u32) {
        if let ModuleInstance::Active(active) = &mut self.instance {
            unsafe {
                active.run(frames as usize);
            }
        }
    }

    fn free(&mut self) {
        self.deactivate();
        self.instance = ModuleInstance::None;
    }

    fn handle(&self) -> *mut c_void {
        self.instance()
            .map_or(std::ptr::null_mut(), |i| i.handle() as *mut c_void)
    }

    fn worker_interface(&self) -> Option<NonNull<LV2_Worker_Interface>> {
        let instance = self.instance()?;
        unsafe { instance.extension_data::<LV2_Worker_Interface>(LV2_WORKER_INTERFACE_URI) }
    }
}

impl Drop for LilvModule {
    fn drop(&mut self) {
        self.free();
    }
}
