//! Error types for atlantis-drift
//!
//! All modules use `DriftResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for atlantis-drift operations
pub type DriftResult<T> = Result<T, DriftError>;

/// Classification of a remote planning failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The same request may succeed on a later run
    Temporary,
    /// Retrying is futile without a code or config change
    Permanent,
    /// The remote does not know the requested resource
    NotFound,
}

/// All errors that can occur in atlantis-drift
#[derive(Error, Debug)]
pub enum DriftError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    ConfigMissing(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to parse repo config {path}: {reason}")]
    RepoConfig { path: PathBuf, reason: String },

    // Remote planning errors
    #[error("Atlantis plan request failed: {message}")]
    Plan { kind: ErrorKind, message: String },

    #[error("Atlantis rejected the token: {0}")]
    Unauthorized(String),

    // Collaborator errors
    #[error("Cache unavailable: {0}")]
    Cache(String),

    #[error("Notification via {sink} failed: {reason}")]
    Notification { sink: &'static str, reason: String },

    #[error("Failed to check out {repo}: {reason}")]
    Checkout { repo: String, reason: String },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stdout: {stdout}, stderr: {stderr}")]
    CommandExecution {
        command: String,
        stdout: String,
        stderr: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Run control
    #[error("Operation cancelled")]
    Cancelled,

    /// Adds the failing phase to an inner error
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<DriftError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DriftError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a remote planning error of the given kind
    pub fn plan(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Plan {
            kind,
            message: message.into(),
        }
    }

    /// Create a cache error
    pub fn cache(reason: impl Into<String>) -> Self {
        Self::Cache(reason.into())
    }

    /// Create a notification error for a sink
    pub fn notify(sink: &'static str, reason: impl Into<String>) -> Self {
        Self::Notification {
            sink,
            reason: reason.into(),
        }
    }

    /// Wrap this error with the phase that produced it
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through added context
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Plan { kind, .. } => *kind,
            Self::Context { source, .. } => source.kind(),
            _ => ErrorKind::Permanent,
        }
    }

    /// Check if the failed operation should be deferred to the next run
    pub fn is_temporary(&self) -> bool {
        self.kind() == ErrorKind::Temporary
    }

    /// Check if the error stems from cancellation of the run
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Context { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized(_) => Some("Check ATLANTIS_TOKEN matches the server's API secret"),
            Self::ConfigMissing(_) => Some("Set the value via flag, environment or --config file"),
            Self::CommandFailed { command, .. } if command.starts_with("terraform") => {
                Some("Install terraform and make sure it is on PATH")
            }
            Self::Checkout { .. } => Some("Set GITHUB_TOKEN or run: gh auth login"),
            Self::Context { source, .. } => source.hint(),
            _ => None,
        }
    }
}
