//! Named control plugin registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::chain::ControlChain;
use crate::error::{ControlError, Result};
use crate::plugin::ControlPlugin;

/// Registry of control plugins addressable by name.
///
/// Registration replaces any plugin already registered under the same name.
/// Readers never observe a partially registered plugin.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn ControlPlugin>>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` under `name`, returning the plugin it replaced.
    pub async fn register(
        &self,
        name: impl Into<String>,
        plugin: Arc<dyn ControlPlugin>,
    ) -> Option<Arc<dyn ControlPlugin>> {
        let name = name.into();
        tracing::info!(plugin = %name, "control plugin registered");
        self.plugins.write().await.insert(name, plugin)
    }

    /// Removes the plugin registered under `name`.
    pub async fn deregister(&self, name: &str) -> bool {
        let removed = self.plugins.write().await.remove(name).is_some();
        if removed {
            tracing::info!(plugin = %name, "control plugin deregistered");
        }
        removed
    }

    /// Looks up a single plugin.
    pub async fn lookup(&self, name: &str) -> Result<Arc<dyn ControlPlugin>> {
        self.plugins
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ControlError::PluginNotFound(name.to_string()))
    }

    /// Resolves an ordered list of names into a chain.
    ///
    /// All names are resolved under one read guard, so the chain reflects a
    /// single registry snapshot.
    pub async fn resolve(&self, names: &[String]) -> Result<ControlChain> {
        let plugins = self.plugins.read().await;
        let mut chain = ControlChain::default();
        for name in names {
            let plugin = plugins
                .get(name)
                .cloned()
                .ok_or_else(|| ControlError::PluginNotFound(name.clone()))?;
            chain.push(name.clone(), plugin);
        }
        Ok(chain)
    }

    /// Returns the registered names in sorted order.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }
}
