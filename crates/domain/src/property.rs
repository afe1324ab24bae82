//! Opaque key/value properties handed to plugins and the gateway.

use serde::{Deserialize, Serialize};

/// A single plugin property.
///
/// The value is kept as raw JSON; the orchestrator never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginProperty {
    pub key: String,
    pub value: serde_json::Value,
}

impl PluginProperty {
    /// Creates a new property.
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Finds the first property with the given key.
    pub fn find<'a>(properties: &'a [PluginProperty], key: &str) -> Option<&'a PluginProperty> {
        properties.iter().find(|p| p.key == key)
    }
}
