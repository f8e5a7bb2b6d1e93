//! `validate`, `list` and `inspect` over a plugins directory.

use std::path::Path;

use anyhow::{bail, Context, Result};
use plugdock_core::{PluginConfig, ViewType};
use plugdock_plugins::manifest;
use plugdock_plugins::{DirectoryLoader, PluginLoader};
use tracing::info;

use crate::terminal_output::{note_error, note_success, note_warn, render_table};

/// Outcome of checking one plugin directory.
struct Checked {
    dir_name: String,
    result: Result<PluginConfig>,
}

async fn check_all(dir: &Path) -> Result<Vec<Checked>> {
    if !dir.is_dir() {
        bail!("plugins directory {} does not exist", dir.display());
    }
    let loader = DirectoryLoader::new(dir);

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("read {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut checked = Vec::with_capacity(names.len());
    for name in names {
        let result = match loader.load_plugin_by_id(&name).await {
            Ok(Some(config)) if config.id != name => Err(anyhow::anyhow!(
                "directory name does not match id '{}'",
                config.id
            )),
            Ok(Some(config)) => manifest::validate(&config)
                .map(|_| config)
                .map_err(anyhow::Error::from),
            Ok(None) => Err(anyhow::anyhow!("missing {}", plugdock_plugins::loader::CONFIG_FILE_NAME)),
            Err(e) => Err(e),
        };
        checked.push(Checked {
            dir_name: name,
            result,
        });
    }
    Ok(checked)
}

pub async fn validate(dir: &Path) -> Result<()> {
    let checked = check_all(dir).await?;
    if checked.is_empty() {
        note_warn(&format!("no plugins found in {}", dir.display()));
        return Ok(());
    }

    let mut failures = 0;
    for plugin in &checked {
        match &plugin.result {
            Ok(config) => note_success(&format!("{} v{}", config.id, config.version)),
            Err(e) => {
                failures += 1;
                note_error(&format!("{}: {e:#}", plugin.dir_name));
            }
        }
    }
    info!(total = checked.len(), failures, "Validated plugins directory");
    if failures > 0 {
        bail!("{failures} of {} plugin(s) failed validation", checked.len());
    }
    Ok(())
}

fn features(config: &PluginConfig) -> String {
    let mut features = Vec::new();
    if config.background_entry().is_some() {
        features.push("background");
    }
    for view_type in ViewType::ALL {
        if config.view_entry(view_type).is_some() {
            features.push(view_type.as_str());
        }
    }
    if features.is_empty() {
        "-".to_string()
    } else {
        features.join(",")
    }
}

fn capabilities(config: &PluginConfig) -> String {
    let allowed = config.capabilities.allowed();
    if allowed.is_empty() {
        return "-".to_string();
    }
    allowed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub async fn list(dir: &Path, json: bool) -> Result<()> {
    let configs: Vec<PluginConfig> = check_all(dir)
        .await?
        .into_iter()
        .filter_map(|c| c.result.ok())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&configs)?);
        return Ok(());
    }
    if configs.is_empty() {
        note_warn(&format!("no valid plugins in {}", dir.display()));
        return Ok(());
    }
    let rows: Vec<Vec<String>> = configs
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.name.clone(),
                c.version.clone(),
                features(c),
                capabilities(c),
            ]
        })
        .collect();
    print!(
        "{}",
        render_table(&["ID", "NAME", "VERSION", "FEATURES", "CAPABILITIES"], &rows)
    );
    Ok(())
}

pub async fn inspect(dir: &Path, id: &str) -> Result<()> {
    let loader = DirectoryLoader::new(dir);
    let Some(config) = loader.load_plugin_by_id(id).await? else {
        bail!("plugin '{id}' not found in {}", dir.display());
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    match manifest::validate(&config) {
        Ok(()) => note_success(&format!("requests: {}", capabilities(&config))),
        Err(e) => note_error(&e.to_string()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) {
        let plugin_dir = dir.join(name);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("plugin.json"), body).unwrap();
    }

    #[tokio::test]
    async fn reports_each_plugin() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "clock",
            r#"{"id":"clock","name":"Clock","version":"0.1.0",
                "background":{"entry":"bg.js"},"summary":{"entry":"summary.html"},
                "capabilities":{"storage":{"read":true,"write":true},"dom":true}}"#,
        );
        write(dir.path(), "mismatch", r#"{"id":"other","name":"X","version":"1.0.0"}"#);
        write(dir.path(), "noversion", r#"{"id":"noversion","name":"X","version":""}"#);
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let checked = check_all(dir.path()).await.unwrap();
        let ok: Vec<_> = checked
            .iter()
            .filter(|c| c.result.is_ok())
            .map(|c| c.dir_name.as_str())
            .collect();
        assert_eq!(ok, vec!["clock"]);
        assert_eq!(checked.len(), 4);

        let clock = checked[0].result.as_ref().unwrap();
        assert_eq!(features(clock), "background,summary");
        assert_eq!(capabilities(clock), "storage:read,storage:write,dom");

        assert!(validate(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        assert!(check_all(Path::new("/nonexistent/plugdock")).await.is_err());
    }
}
