//! Channel to port index tables.
//!
//! A channel is the position of a port among the ports sharing its type and
//! direction, counted in ascending port index order. `ChannelMapping` holds
//! one such table per [`PortType`]; `ChannelConfig` pairs an input and an
//! output mapping.

use super::PortType;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMapping {
    ports: [Vec<u32>; PortType::COUNT],
}

impl ChannelMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from a per-port type list, where the port index is
    /// the position in `types`.
    pub fn from_types(types: &[PortType]) -> Self {
        let mut mapping = Self::new();
        for (index, t) in types.iter().enumerate() {
            mapping.add_port(*t, index as u32);
        }
        mapping
    }

    /// Append `index` as the next channel of `port_type`.
    ///
    /// Ports must be added in ascending index order within a type.
    pub fn add_port(&mut self, port_type: PortType, index: u32) {
        let table = &mut self.ports[port_type.index()];
        debug_assert!(
            table.last().is_none_or(|last| *last < index),
            "ports must be added in ascending index order"
        );
        table.push(index);
    }

    /// Absolute port index for `channel`, or `None` when out of range.
    pub fn port(&self, port_type: PortType, channel: u32) -> Option<u32> {
        self.ports[port_type.index()].get(channel as usize).copied()
    }

    pub fn contains_channel(&self, port_type: PortType, channel: u32) -> bool {
        port_type.is_valid() && (channel as usize) < self.ports[port_type.index()].len()
    }

    pub fn num_channels(&self, port_type: PortType) -> u32 {
        self.ports[port_type.index()].len() as u32
    }

    pub fn ports(&self, port_type: PortType) -> &[u32] {
        &self.ports[port_type.index()]
    }

    pub fn clear(&mut self) {
        for table in &mut self.ports {
            table.clear();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    inputs: ChannelMapping,
    outputs: ChannelMapping,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port(&mut self, port_type: PortType, index: u32, is_input: bool) {
        if is_input {
            self.add_input(port_type, index);
        } else {
            self.add_output(port_type, index);
        }
    }

    pub fn add_input(&mut self, port_type: PortType, index: u32) {
        self.inputs.add_port(port_type, index);
    }

    pub fn add_output(&mut self, port_type: PortType, index: u32) {
        self.outputs.add_port(port_type, index);
    }

    pub fn inputs(&self) -> &ChannelMapping {
        &self.inputs
    }

    pub fn outputs(&self) -> &ChannelMapping {
        &self.outputs
    }

    pub fn port(&self, port_type: PortType, channel: u32, is_input: bool) -> Option<u32> {
        if is_input {
            self.input_port(port_type, channel)
        } else {
            self.output_port(port_type, channel)
        }
    }

    pub fn input_port(&self, port_type: PortType, channel: u32) -> Option<u32> {
        self.inputs.port(port_type, channel)
    }

    pub fn output_port(&self, port_type: PortType, channel: u32) -> Option<u32> {
        self.outputs.port(port_type, channel)
    }

    pub fn audio_port(&self, channel: u32, is_input: bool) -> Option<u32> {
        self.port(PortType::Audio, channel, is_input)
    }

    pub fn atom_port(&self, channel: u32, is_input: bool) -> Option<u32> {
        self.port(PortType::Atom, channel, is_input)
    }

    pub fn control_port(&self, channel: u32, is_input: bool) -> Option<u32> {
        self.port(PortType::Control, channel, is_input)
    }

    pub fn cv_port(&self, channel: u32, is_input: bool) -> Option<u32> {
        self.port(PortType::Cv, channel, is_input)
    }

    pub fn num_channels(&self, port_type: PortType, is_input: bool) -> u32 {
        if is_input {
            self.inputs.num_channels(port_type)
        } else {
            self.outputs.num_channels(port_type)
        }
    }

    pub fn num_audio_inputs(&self) -> u32 {
        self.inputs.num_channels(PortType::Audio)
    }

    pub fn num_audio_outputs(&self) -> u32 {
        self.outputs.num_channels(PortType::Audio)
    }

    pub fn num_atom_inputs(&self) -> u32 {
        self.inputs.num_channels(PortType::Atom)
    }

    pub fn num_atom_outputs(&self) -> u32 {
        self.outputs.num_channels(PortType::Atom)
    }

    pub fn num_control_inputs(&self) -> u32 {
        self.inputs.num_channels(PortType::Control)
    }

    pub fn num_control_outputs(&self) -> u32 {
        self.outputs.num_channels(PortType::Control)
    }

    pub fn num_cv_inputs(&self) -> u32 {
        self.inputs.num_channels(PortType::Cv)
    }

    pub fn num_cv_outputs(&self) -> u32 {
        self.outputs.num_channels(PortType::Cv)
    }

    pub fn num_event_inputs(&self) -> u32 {
        self.inputs.num_channels(PortType::Event)
    }

    pub fn num_event_outputs(&self) -> u32 {
        self.outputs.num_channels(PortType::Event)
    }

    pub fn num_midi_inputs(&self) -> u32 {
        self.inputs.num_channels(PortType::Midi)
    }

    pub fn num_midi_outputs(&self) -> u32 {
        self.outputs.num_channels(PortType::Midi)
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_from_types() {
        let mapping = ChannelMapping::from_types(&[
            PortType::Audio,
            PortType::Control,
            PortType::Audio,
            PortType::Atom,
        ]);
        assert_eq!(mapping.num_channels(PortType::Audio), 2);
        assert_eq!(mapping.port(PortType::Audio, 0), Some(0));
        assert_eq!(mapping.port(PortType::Audio, 1), Some(2));
        assert_eq!(mapping.port(PortType::Control, 0), Some(1));
        assert_eq!(mapping.port(PortType::Audio, 2), None);
        assert_eq!(mapping.ports(PortType::Atom), &[3]);
    }

    #[test]
    fn test_unknown_never_contains_channels() {
        let mut mapping = ChannelMapping::new();
        mapping.add_port(PortType::Unknown, 0);
        assert_eq!(mapping.num_channels(PortType::Unknown), 1);
        assert!(!mapping.contains_channel(PortType::Unknown, 0));
    }

    #[test]
    fn test_config_lookup_by_direction() {
        let mut config = ChannelConfig::new();
        config.add_input(PortType::Audio, 0);
        config.add_input(PortType::Audio, 1);
        config.add_output(PortType::Audio, 2);
        config.add_input(PortType::Control, 3);

        assert_eq!(config.audio_port(0, true), Some(0));
        assert_eq!(config.audio_port(1, true), Some(1));
        assert_eq!(config.audio_port(0, false), Some(2));
        assert_eq!(config.audio_port(1, false), None);
        assert_eq!(config.control_port(0, true), Some(3));
        assert_eq!(config.num_audio_inputs(), 2);
        assert_eq!(config.num_audio_outputs(), 1);
        assert_eq!(config.num_control_inputs(), 1);
        assert_eq!(config.num_control_outputs(), 0);
    }

    #[test]
    fn test_typed_accessors_use_their_own_type() {
        let mut config = ChannelConfig::new();
        config.add_input(PortType::Audio, 0);
        config.add_input(PortType::Atom, 1);
        config.add_input(PortType::Control, 2);
        config.add_input(PortType::Cv, 3);

        assert_eq!(config.audio_port(0, true), Some(0));
        assert_eq!(config.atom_port(0, true), Some(1));
        assert_eq!(config.control_port(0, true), Some(2));
        assert_eq!(config.cv_port(0, true), Some(3));
        assert_eq!(config.num_atom_inputs(), 1);
        assert_eq!(config.num_cv_inputs(), 1);
    }

    #[test]
    fn test_clear() {
        let mut config = ChannelConfig::new();
        config.add_port(PortType::Audio, 0, true);
        config.add_port(PortType::Audio, 1, false);
        config.clear();
        assert_eq!(config.num_audio_inputs(), 0);
        assert_eq!(config.num_audio_outputs(), 0);
    }
}
