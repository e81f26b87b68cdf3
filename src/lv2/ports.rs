//! Per-port metadata registry.

use serde::{Deserialize, Serialize};

use super::{ChannelConfig, PortDeclaration, PortType};
use crate::error::{Error, Result};

/// A port with its assigned channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescription {
    pub index: u32,
    pub channel: u32,
    #[serde(rename = "type", with = "type_slug")]
    pub port_type: PortType,
    #[serde(rename = "input")]
    pub is_input: bool,
    pub name: String,
    pub symbol: String,
}

impl PortDescription {
    pub fn new(
        index: u32,
        channel: u32,
        port_type: PortType,
        is_input: bool,
        symbol: &str,
        name: &str,
    ) -> Self {
        Self {
            index,
            channel,
            port_type,
            is_input,
            name: name.to_string(),
            symbol: symbol.to_string(),
        }
    }

    fn direction(&self) -> &'static str {
        if self.is_input { "input" } else { "output" }
    }
}

mod type_slug {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::lv2::PortType;

    pub fn serialize<S: Serializer>(t: &PortType, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(t.slug())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PortType, D::Error> {
        let slug = String::deserialize(d)?;
        Ok(PortType::from_identifier(&slug))
    }
}

/// Ports kept sorted by absolute index.
///
/// Indices are unique, and so is each (type, direction, channel) triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    ports: Vec<PortDescription>,
}

impl PortList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign channels to `declarations` in index order and collect them.
    pub fn from_declarations(declarations: &[PortDeclaration]) -> Result<Self> {
        let mut sorted: Vec<&PortDeclaration> = declarations.iter().collect();
        sorted.sort_by_key(|d| d.index);

        let mut list = Self::new();
        for decl in sorted {
            let channel = list.count(decl.port_type, decl.is_input);
            list.add(PortDescription::new(
                decl.index,
                channel,
                decl.port_type,
                decl.is_input,
                &decl.symbol,
                &decl.name,
            ))?;
        }
        Ok(list)
    }

    /// Insert a port. The list is left untouched when the index or the
    /// (type, direction, channel) slot is already taken.
    pub fn add(&mut self, port: PortDescription) -> Result<()> {
        let pos = match self.ports.binary_search_by_key(&port.index, |p| p.index) {
            Ok(_) => return Err(Error::DuplicatePortIndex { index: port.index }),
            Err(pos) => pos,
        };
        if self
            .port_for_channel(port.port_type, port.channel, port.is_input)
            .is_some()
        {
            return Err(Error::DuplicateChannel {
                index: port.index,
                port_type: port.port_type,
                direction: port.direction(),
                channel: port.channel,
            });
        }
        self.ports.insert(pos, port);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Number of ports with the given type and direction.
    pub fn count(&self, port_type: PortType, is_input: bool) -> u32 {
        self.ports
            .iter()
            .filter(|p| p.port_type == port_type && p.is_input == is_input)
            .count() as u32
    }

    pub fn get(&self, index: u32) -> Option<&PortDescription> {
        self.ports
            .binary_search_by_key(&index, |p| p.index)
            .ok()
            .map(|pos| &self.ports[pos])
    }

    pub fn channel_for_port(&self, index: u32) -> Option<u32> {
        self.get(index).map(|p| p.channel)
    }

    pub fn port_for_channel(&self, port_type: PortType, channel: u32, is_input: bool) -> Option<u32> {
        self.ports
            .iter()
            .find(|p| p.port_type == port_type && p.channel == channel && p.is_input == is_input)
            .map(|p| p.index)
    }

    pub fn port_type(&self, index: u32) -> PortType {
        self.get(index).map_or(PortType::Unknown, |p| p.port_type)
    }

    pub fn is_input(&self, index: u32, default: bool) -> bool {
        self.get(index).map_or(default, |p| p.is_input)
    }

    pub fn is_output(&self, index: u32, default: bool) -> bool {
        self.get(index).map_or(default, |p| !p.is_input)
    }

    pub fn find_by_symbol(&self, symbol: &str) -> Option<&PortDescription> {
        self.ports.iter().find(|p| p.symbol == symbol)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PortDescription> {
        self.ports.iter()
    }

    /// Highest index plus one, i.e. the length of a table indexed by port.
    pub fn index_span(&self) -> usize {
        self.ports.last().map_or(0, |p| p.index as usize + 1)
    }

    /// Channel tables for the current ports.
    pub fn channel_config(&self) -> ChannelConfig {
        let mut config = ChannelConfig::new();
        for p in &self.ports {
            config.add_port(p.port_type, p.index, p.is_input);
        }
        config
    }

    pub fn clear(&mut self) {
        self.ports.clear();
    }
}

impl<'a> IntoIterator for &'a PortList {
    type Item = &'a PortDescription;
    type IntoIter = std::slice::Iter<'a, PortDescription>;

    fn into_iter(self) -> Self::IntoIter {
        self.ports.iter()
    }
}
