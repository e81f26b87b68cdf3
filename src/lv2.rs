//! LV2 Plugin Hosting
//!
//! Everything between a host's audio callback and an LV2 plugin binary.
//!
//! ## Architecture
//!
//! - `urid` - Shared URI <-> integer symbol map and its LV2 features
//! - `port_type`, `channels`, `ports` - Port classification and the
//!   per-type channel tables built from a plugin's port list
//! - `module` - Plugin loading behind the [`Module`] trait (lilv-backed)
//! - `instance` - The real-time instance bridge and its host-side handle
//! - `parameter`, `port_event` - Control values and the rings carrying
//!   them between threads
//! - `worker` - LV2 Worker extension on a pooled background thread
//! - `world`, `scanner` - Plugin discovery and creation

pub mod atom;
pub mod buffers;
pub mod channels;
pub mod instance;
pub mod midi;
pub mod module;
pub mod parameter;
pub mod port_event;
pub mod port_type;
pub mod ports;
pub mod scanner;
pub mod state;
pub mod stats;
pub mod types;
pub mod urid;
pub mod worker;
pub mod world;

#[cfg(test)]
mod testing;

pub use channels::{ChannelConfig, ChannelMapping};
pub use instance::{InstanceHandle, InstanceState, PluginInstance};
pub use midi::{MidiBuffer, MidiEvent};
pub use module::{LilvModule, Module};
pub use parameter::{Parameter, ParameterListener, ParameterRange, Parameters};
pub use port_event::{PROTOCOL_FLOAT, PortObserver};
pub use port_type::PortType;
pub use ports::{PortDescription, PortList};
pub use state::PluginState;
pub use stats::StatsSnapshot;
pub use types::*;
pub use urid::SymbolMap;
pub use world::{World, default_search_paths, is_plugin_identifier};
