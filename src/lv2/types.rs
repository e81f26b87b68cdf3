//! Plain data shared by the scanner, the module layer and the instance
//! bridge.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use super::PortType;

// ---------------------------------------------------------------------------
// Port declarations
// ---------------------------------------------------------------------------

/// A port as declared by the plugin's RDF data, before any channel has been
/// assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDeclaration {
    pub index: u32,
    pub port_type: PortType,
    pub is_input: bool,
    pub symbol: String,
    pub name: String,
    #[serde(with = "unset_float", default = "unset")]
    pub min: f32,
    #[serde(with = "unset_float", default = "unset")]
    pub max: f32,
    #[serde(with = "unset_float", default = "unset")]
    pub default: f32,
    /// Atom or event port that accepts `midi:MidiEvent`.
    pub supports_midi: bool,
}

impl PortDeclaration {
    pub fn new(index: u32, port_type: PortType, is_input: bool, symbol: &str) -> Self {
        Self {
            index,
            port_type,
            is_input,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            min: f32::NAN,
            max: f32::NAN,
            default: f32::NAN,
            supports_midi: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_range(mut self, min: f32, max: f32, default: f32) -> Self {
        self.min = min;
        self.max = max;
        self.default = default;
        self
    }

    pub fn with_midi(mut self) -> Self {
        self.supports_midi = true;
        self
    }

    /// The value a control port starts with. Unset defaults fall back to
    /// the minimum, then zero.
    pub fn initial_value(&self) -> f32 {
        if !self.default.is_nan() {
            self.default
        } else if !self.min.is_nan() {
            self.min
        } else {
            0.0
        }
    }

    /// Sequence port that carries MIDI into or out of the plugin.
    pub fn is_midi(&self) -> bool {
        self.port_type == PortType::Midi || (self.port_type == PortType::Atom && self.supports_midi)
    }
}

// ---------------------------------------------------------------------------
// Plugin description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub uri: String,
    pub name: String,
    pub class_label: String,
    pub author: Option<String>,
    pub ports: Vec<PortDeclaration>,
    pub audio_inputs: usize,
    pub audio_outputs: usize,
    pub control_inputs: usize,
    pub control_outputs: usize,
    pub midi_input: bool,
    pub midi_output: bool,
    pub required_features: Vec<String>,
    pub compatible: bool,
    pub has_ui: bool,
}

impl PluginInfo {
    pub fn new(uri: &str, name: &str, class_label: &str, ports: Vec<PortDeclaration>) -> Self {
        let count = |t: PortType, input: bool| {
            ports
                .iter()
                .filter(|p| p.port_type == t && p.is_input == input)
                .count()
        };
        Self {
            uri: uri.to_string(),
            name: name.to_string(),
            class_label: class_label.to_string(),
            author: None,
            audio_inputs: count(PortType::Audio, true),
            audio_outputs: count(PortType::Audio, false),
            control_inputs: count(PortType::Control, true),
            control_outputs: count(PortType::Control, false),
            midi_input: ports.iter().any(|p| p.is_input && p.is_midi()),
            midi_output: ports.iter().any(|p| !p.is_input && p.is_midi()),
            ports,
            required_features: Vec::new(),
            compatible: true,
            has_ui: false,
        }
    }

    /// A plugin with a MIDI input is treated as an instrument.
    pub fn is_instrument(&self) -> bool {
        self.midi_input
    }

    pub fn is_effect(&self) -> bool {
        self.audio_inputs > 0 && self.audio_outputs > 0 && !self.midi_input
    }
}

// ---------------------------------------------------------------------------
// Parameter values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterValue {
    pub port_index: u32,
    pub symbol: String,
    pub name: String,
    /// Plain (denormalized) value.
    pub value: f32,
    #[serde(with = "unset_float", default = "unset")]
    pub min: f32,
    #[serde(with = "unset_float", default = "unset")]
    pub max: f32,
    #[serde(with = "unset_float", default = "unset")]
    pub default: f32,
}

fn unset() -> f32 {
    f32::NAN
}

/// NaN marks a range bound the plugin left unset; it is written as `null`.
mod unset_float {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f32, s: S) -> Result<S::Ok, S::Error> {
        if v.is_nan() {
            s.serialize_none()
        } else {
            s.serialize_some(v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(d)?.unwrap_or(f32::NAN))
    }
}

// ---------------------------------------------------------------------------
// Lock-free float
// ---------------------------------------------------------------------------

pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(val: f32) -> Self {
        Self(AtomicU32::new(val.to_bits()))
    }
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
    pub fn store(&self, val: f32) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value_fallbacks() {
        let p = PortDeclaration::new(0, PortType::Control, true, "gain");
        assert_eq!(p.initial_value(), 0.0);
        let p = p.with_range(-6.0, 6.0, f32::NAN);
        assert_eq!(p.initial_value(), -6.0);
        let p = p.with_range(-6.0, 6.0, 1.5);
        assert_eq!(p.initial_value(), 1.5);
    }

    #[test]
    fn test_plugin_info_counts() {
        let info = PluginInfo::new(
            "urn:test:synth",
            "Synth",
            "Instrument",
            vec![
                PortDeclaration::new(0, PortType::Atom, true, "events").with_midi(),
                PortDeclaration::new(1, PortType::Audio, false, "out_l"),
                PortDeclaration::new(2, PortType::Audio, false, "out_r"),
                PortDeclaration::new(3, PortType::Control, true, "volume"),
            ],
        );
        assert_eq!(info.audio_inputs, 0);
        assert_eq!(info.audio_outputs, 2);
        assert_eq!(info.control_inputs, 1);
        assert!(info.midi_input);
        assert!(!info.midi_output);
        assert!(info.is_instrument());
        assert!(!info.is_effect());
    }

    #[test]
    fn test_atomic_f32() {
        let v = AtomicF32::new(0.25);
        assert_eq!(v.load(), 0.25);
        v.store(-1.5);
        assert_eq!(v.load(), -1.5);
    }

    #[test]
    fn test_unset_range_survives_json() {
        let audio = PortDeclaration::new(0, PortType::Audio, false, "out");
        let json = serde_json::to_string(&audio).unwrap();
        assert!(json.contains("\"min\":null"));

        let back: PortDeclaration = serde_json::from_str(&json).unwrap();
        assert!(back.min.is_nan() && back.max.is_nan() && back.default.is_nan());
        assert_eq!((back.index, back.symbol.as_str()), (0, "out"));

        let gain =
            PortDeclaration::new(3, PortType::Control, true, "gain").with_range(0.0, 2.0, 1.0);
        let json = serde_json::to_string(&gain).unwrap();
        let back: PortDeclaration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gain);
    }
}
