use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Daemon '{0}' already exists")]
    DuplicateDaemon(String),

    #[error("Invalid daemon name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Command validation failed: {detail}")]
    ValidationFailure { detail: String },

    #[error("Registration of '{name}' was not authorized (re-run with administrator privileges): {detail}")]
    AuthorizationFailure { name: String, detail: String },

    #[error("Security alert: '{name}' at {} has been modified since registration", path.display())]
    IntegrityFailure { name: String, path: PathBuf },

    #[error("Daemon '{0}' does not exist")]
    NotFound(String),

    #[error("{tool} failed: {detail}")]
    ExternalToolFailure { tool: String, detail: String },

    #[error("Cancelled")]
    UserCancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DaemonError {
    pub fn tool(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    /// Tampering is reported more loudly than any other failure.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::IntegrityFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
