//! Plugin state as a JSON string: the plugin URI plus the plain value of
//! every input control port.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedParameter {
    pub port_index: u32,
    pub symbol: String,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginState {
    pub uri: String,
    #[serde(default)]
    pub values: Vec<SavedParameter>,
}

impl PluginState {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            values: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::State(e.to_string()))
    }

    pub fn value_for(&self, symbol: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|v| v.symbol == symbol)
            .map(|v| v.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_are_plain_json() {
        let mut state = PluginState::new("urn:test");
        state.values.push(SavedParameter {
            port_index: 3,
            symbol: "gain".to_string(),
            value: 0.5,
        });
        let bytes = state.to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with('{'));
        assert!(text.contains("\"gain\""));
        assert_eq!(PluginState::from_bytes(&bytes).unwrap(), state);
        assert_eq!(state.value_for("gain"), Some(0.5));
        assert_eq!(state.value_for("nope"), None);
    }

    #[test]
    fn test_missing_values_default_to_empty() {
        let state = PluginState::from_bytes(br#"{"uri":"urn:x"}"#).unwrap();
        assert!(state.values.is_empty());
    }

    #[test]
    fn test_garbage_is_state_error() {
        let err = PluginState::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }
}
