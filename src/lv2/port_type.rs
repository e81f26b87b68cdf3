use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of data an LV2 port carries.
///
/// The discriminants are stable and used as table indices by
/// [`super::ChannelMapping`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum PortType {
    Control = 0,
    Audio = 1,
    #[serde(rename = "CV")]
    Cv = 2,
    Atom = 3,
    Event = 4,
    Midi = 5,
    #[default]
    Unknown = 6,
}

impl PortType {
    /// Number of variants, `Unknown` included.
    pub const COUNT: usize = 7;

    /// Every type a real port can have, in discriminant order.
    pub const VALID: [PortType; 6] = [
        PortType::Control,
        PortType::Audio,
        PortType::Cv,
        PortType::Atom,
        PortType::Event,
        PortType::Midi,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn uri(self) -> &'static str {
        match self {
            PortType::Control => "http://lv2plug.in/ns/lv2core#ControlPort",
            PortType::Audio => "http://lv2plug.in/ns/lv2core#AudioPort",
            PortType::Cv => "http://lv2plug.in/ns/lv2core#CVPort",
            PortType::Atom => "http://lv2plug.in/ns/ext/atom#AtomPort",
            PortType::Event => "http://lv2plug.in/ns/ext/event#EventPort",
            PortType::Midi => "http://lvtoolkit.org/ns/lvtk#MidiPort",
            PortType::Unknown => "http://lvtoolkit.org/ns/lvtk#null",
        }
    }

    /// Display name, e.g. "Audio" or "MIDI".
    pub fn name(self) -> &'static str {
        match self {
            PortType::Control => "Control",
            PortType::Audio => "Audio",
            PortType::Cv => "CV",
            PortType::Atom => "Atom",
            PortType::Event => "Event",
            PortType::Midi => "MIDI",
            PortType::Unknown => "Unknown",
        }
    }

    /// Lower case identifier, e.g. "audio" or "midi".
    pub fn slug(self) -> &'static str {
        match self {
            PortType::Control => "control",
            PortType::Audio => "audio",
            PortType::Cv => "cv",
            PortType::Atom => "atom",
            PortType::Event => "event",
            PortType::Midi => "midi",
            PortType::Unknown => "unknown",
        }
    }

    /// Resolve a slug, URI or display name. Matching is case sensitive and
    /// anything unrecognised becomes `Unknown`.
    pub fn from_identifier(identifier: &str) -> PortType {
        Self::VALID
            .into_iter()
            .find(|t| identifier == t.slug() || identifier == t.uri() || identifier == t.name())
            .unwrap_or(PortType::Unknown)
    }

    /// Whether a port of type `source` may feed a port of type `dest`.
    pub fn can_connect(source: PortType, dest: PortType) -> bool {
        use PortType::*;
        if source == Unknown || dest == Unknown {
            return false;
        }
        if source == dest {
            return true;
        }
        matches!((source, dest), (Audio, Cv) | (Control, Cv))
    }

    /// Directional check from this port's point of view. When `is_output`
    /// is false this port is the destination.
    pub fn connects_to(self, other: PortType, is_output: bool) -> bool {
        if is_output {
            Self::can_connect(self, other)
        } else {
            Self::can_connect(other, self)
        }
    }

    pub fn is_valid(self) -> bool {
        self != PortType::Unknown
    }

    pub fn is_audio(self) -> bool {
        self == PortType::Audio
    }

    pub fn is_control(self) -> bool {
        self == PortType::Control
    }

    /// Ports whose buffer is an atom sequence.
    pub fn is_sequence(self) -> bool {
        matches!(self, PortType::Atom | PortType::Midi)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for PortType {
    fn from(identifier: &str) -> Self {
        PortType::from_identifier(identifier)
    }
}
