//! Plugin Loader
//!
//! Loaders turn a plugin id into a [`PluginConfig`]. The host treats their
//! output as untrusted and validates it before registration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use plugdock_core::PluginConfig;
use tracing::{debug, warn};

/// File name looked up inside each plugin directory.
pub const CONFIG_FILE_NAME: &str = "plugin.json";

#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// `Ok(None)` when the loader knows nothing about `plugin_id`.
    async fn load_plugin_by_id(&self, plugin_id: &str) -> Result<Option<PluginConfig>>;

    /// Every configuration the loader can produce. Individual failures are
    /// skipped rather than failing the batch.
    async fn load_all_plugins(&self) -> Result<Vec<PluginConfig>>;
}

/// Serves configurations held in memory. Used for built-in plugins and tests.
#[derive(Default, Clone)]
pub struct StaticLoader {
    configs: HashMap<String, PluginConfig>,
}

impl StaticLoader {
    pub fn new(configs: impl IntoIterator<Item = PluginConfig>) -> Self {
        Self {
            configs: configs.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

#[async_trait]
impl PluginLoader for StaticLoader {
    async fn load_plugin_by_id(&self, plugin_id: &str) -> Result<Option<PluginConfig>> {
        Ok(self.configs.get(plugin_id).cloned())
    }

    async fn load_all_plugins(&self) -> Result<Vec<PluginConfig>> {
        let mut all: Vec<_> = self.configs.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// Reads `<plugins_dir>/<id>/plugin.json`.
pub struct DirectoryLoader {
    plugins_dir: PathBuf,
}

impl DirectoryLoader {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    async fn read_config(path: &Path) -> Result<PluginConfig> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read plugin config at {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("parse plugin config at {:?}", path))
    }
}

#[async_trait]
impl PluginLoader for DirectoryLoader {
    async fn load_plugin_by_id(&self, plugin_id: &str) -> Result<Option<PluginConfig>> {
        if plugin_id.contains(['/', '\\']) || plugin_id == ".." || plugin_id == "." {
            return Ok(None);
        }
        let path = self.plugins_dir.join(plugin_id).join(CONFIG_FILE_NAME);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(plugin = %plugin_id, path = ?path, "No plugin config found");
            return Ok(None);
        }
        Self::read_config(&path).await.map(Some)
    }

    async fn load_all_plugins(&self) -> Result<Vec<PluginConfig>> {
        if !tokio::fs::try_exists(&self.plugins_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut configs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.plugins_dir)
            .await
            .context("read plugins dir")?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let config_path = path.join(CONFIG_FILE_NAME);
            if !config_path.exists() {
                continue;
            }
            match Self::read_config(&config_path).await {
                Ok(config) => configs.push(config),
                Err(e) => warn!(path = ?config_path, error = %e, "Skipping unreadable plugin config"),
            }
        }
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(configs)
    }
}
