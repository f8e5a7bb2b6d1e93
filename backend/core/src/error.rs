use thiserror::Error;

use crate::capability::Capability;

/// Top-level error type for the plugin host.
///
/// Every variant concerns a single plugin; none of them is fatal to the host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to load plugin '{plugin_id}': {reason}")]
    Load { plugin_id: String, reason: String },

    #[error("plugin '{plugin_id}' lacks the {capability} capability ({operation})")]
    PermissionDenied {
        plugin_id: String,
        capability: Capability,
        operation: String,
    },

    #[error("execution failed for plugin '{plugin_id}': {reason}")]
    Execution { plugin_id: String, reason: String },

    #[error("plugin '{plugin_id}' context does not implement: {}", missing.join(", "))]
    ContractViolation {
        plugin_id: String,
        missing: Vec<String>,
    },

    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),

    #[error("plugin '{0}' has not been approved")]
    NotApproved(String),

    #[error("plugin '{0}' is already approved")]
    AlreadyApproved(String),

    #[error("plugin '{plugin_id}' still has {contexts} active execution context(s)")]
    ExecutionActive { plugin_id: String, contexts: usize },

    #[error("tab '{tab_id}' is not owned by plugin '{plugin_id}'")]
    TabNotOwned { plugin_id: String, tab_id: String },

    #[error("message delivery failed: {0}")]
    Delivery(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("value cannot cross the sandbox boundary: {0}")]
    Boundary(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HostError {
    pub fn load(plugin_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            plugin_id: plugin_id.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(plugin_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            plugin_id: plugin_id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::TabNotOwned { .. })
    }
}

pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = HostError::PermissionDenied {
            plugin_id: "p1".into(),
            capability: Capability::STORAGE_WRITE,
            operation: "storage.set".into(),
        };
        assert_eq!(
            err.to_string(),
            "plugin 'p1' lacks the storage:write capability (storage.set)"
        );
        assert!(err.is_permission_denied());

        let err = HostError::ContractViolation {
            plugin_id: "p1".into(),
            missing: vec!["terminate".into(), "getStatus".into()],
        };
        assert!(err.to_string().ends_with("terminate, getStatus"));
    }
}
