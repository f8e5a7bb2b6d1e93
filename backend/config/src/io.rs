//! Config file read/write.

use crate::schema::HostConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the plugdock config directory.
/// Priority: `PLUGDOCK_CONFIG_DIR` env > `~/.plugdock/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PLUGDOCK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".plugdock");
    }
    PathBuf::from(".plugdock")
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<HostConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(HostConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: HostConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write config to disk atomically (write to temp file, rename).
pub async fn write_config(config: &HostConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp config: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to rename temp config to: {}", path.display()))?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TimeoutsConfig;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.yaml")).await.unwrap();
        assert!(cfg.timeouts.is_none());
        assert!(cfg.plugins_dir.is_none());
    }

    #[tokio::test]
    async fn write_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        let cfg = HostConfig {
            timeouts: Some(TimeoutsConfig {
                terminate_ms: Some(1500),
                ..Default::default()
            }),
            ..Default::default()
        };
        write_config(&cfg, &path).await.unwrap();
        let loaded = load_config(&path).await.unwrap();
        assert_eq!(loaded.timeouts().terminate_ms, Some(1500));
    }

    #[tokio::test]
    async fn parses_camel_case_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(
            &path,
            "pluginsDir: /opt/plugins\ntimeouts:\n  surfaceLoadMs: 500\nlogging:\n  level: debug\n",
        )
        .await
        .unwrap();
        let cfg = load_config(&path).await.unwrap();
        assert_eq!(cfg.plugins_dir.unwrap(), PathBuf::from("/opt/plugins"));
        assert_eq!(cfg.timeouts.unwrap().surface_load_ms, Some(500));
    }
}
