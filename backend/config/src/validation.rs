//! Config validation: collects every problem in one pass.

use crate::schema::HostConfig;
use thiserror::Error;

/// A config validation problem with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &HostConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_timeouts(config, &mut report);
    validate_logging(config, &mut report);
    validate_plugins_dir(config, &mut report);
    report
}

fn validate_timeouts(config: &HostConfig, report: &mut ValidationReport) {
    let Some(timeouts) = &config.timeouts else { return };
    let entries = [
        ("timeouts.initializeMs", timeouts.initialize_ms),
        ("timeouts.terminateMs", timeouts.terminate_ms),
        ("timeouts.surfaceLoadMs", timeouts.surface_load_ms),
        ("timeouts.rpcCallMs", timeouts.rpc_call_ms),
    ];
    for (path, value) in entries {
        if value == Some(0) {
            report.error(path, "Timeout must be greater than zero");
        }
    }
    if let (Some(terminate), Some(rpc)) = (timeouts.terminate_ms, timeouts.rpc_call_ms) {
        if terminate > rpc {
            report.warn(
                "timeouts.terminateMs",
                "Terminate bound exceeds the general RPC call bound",
            );
        }
    }
}

fn validate_logging(config: &HostConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        // EnvFilter directives such as "plugdock=debug" are passed through.
        if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            report.error("logging.level", format!("Unknown log level '{level}'"));
        }
    }
}

fn validate_plugins_dir(config: &HostConfig, report: &mut ValidationReport) {
    match &config.plugins_dir {
        None => report.warn("pluginsDir", "No plugins directory configured"),
        Some(dir) if dir.as_os_str().is_empty() => {
            report.error("pluginsDir", "Plugins directory cannot be empty")
        }
        Some(_) => {}
    }
}
