//! Structured logging for the plugin host.
//!
//! Handles subscriber setup, log redaction, and the per-plugin audit trail.

pub mod audit;
pub mod logger;
pub mod redact;

pub use audit::{AuditLogEntry, AuditLogger};
pub use logger::{init_logger, LoggerGuard};
pub use redact::redact_sensitive_data;
