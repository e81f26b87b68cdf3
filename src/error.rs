//! Error types for plugin hosting

use thiserror::Error;

use crate::lv2::PortType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not an LV2 plugin: {0}")]
    NotLv2(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Could not instantiate plugin {uri}\n  Reason: {reason}")]
    Instantiation { uri: String, reason: String },

    #[error("Duplicate port index {index}")]
    DuplicatePortIndex { index: u32 },

    #[error("Duplicate {port_type} {direction} channel {channel} (port {index})")]
    DuplicateChannel {
        index: u32,
        port_type: PortType,
        direction: &'static str,
        channel: u32,
    },

    #[error("Plugin instance has not been instantiated")]
    NotInstantiated,

    #[error("Operation not allowed while {0}")]
    InvalidState(&'static str),

    #[error("Failed to restore plugin state: {0}")]
    State(String),

    #[error("Port event queue is full")]
    QueueFull,

    #[error("Port event of {size} bytes exceeds the {max} byte limit")]
    EventTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors raised when a port layout breaks the
    /// unique-index / unique-channel rules.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Error::DuplicatePortIndex { .. } | Error::DuplicateChannel { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
