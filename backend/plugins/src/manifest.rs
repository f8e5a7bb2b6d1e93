//! Plugin configuration validation.
//!
//! Loader output is untrusted: it is re-validated here before the registry
//! ever sees it.

use plugdock_core::{EntryDescriptor, HostError, HostResult, PluginConfig};

const MAX_ID_LEN: usize = 128;

/// Validate a plugin configuration for required fields.
pub fn validate(config: &PluginConfig) -> HostResult<()> {
    let id = config.id.as_str();
    if id.trim().is_empty() {
        return Err(HostError::load("<unknown>", "configuration missing 'id'"));
    }
    if id.len() > MAX_ID_LEN
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(HostError::load(
            &config.id,
            "'id' may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    if config.name.trim().is_empty() {
        return Err(HostError::load(id, "configuration missing 'name'"));
    }
    if config.version.trim().is_empty() {
        return Err(HostError::load(id, "configuration missing 'version'"));
    }

    let features = [
        ("background", &config.background),
        ("summary", &config.summary),
        ("expand", &config.expand),
    ];
    for (feature, descriptor) in features {
        check_entry(id, feature, descriptor.as_ref())?;
    }
    Ok(())
}

/// A declared, enabled feature must name its entry point.
fn check_entry(id: &str, feature: &str, descriptor: Option<&EntryDescriptor>) -> HostResult<()> {
    match descriptor {
        Some(d) if d.enabled && d.entry.trim().is_empty() => Err(HostError::load(
            id,
            format!("'{feature}' is declared without an entry point"),
        )),
        _ => Ok(()),
    }
}
