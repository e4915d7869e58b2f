//! Error types for the MAAS machine state engine
//!
//! Provides structured error types for the gateway, the lifecycle reconciler,
//! the storage/network reconfigurators and the lookup operations.

use crate::domain::status::MachineStatus;
use crate::domain::spec::TargetState;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    #[error("Unable to connect to MAAS at {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("MAAS HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MAAS rejected {operation} with HTTP {status}: {body}")]
    Remote {
        operation: String,
        status: u16,
        body: String,
    },

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    #[error("No {kind} matching {name} in MAAS or API key not authorised")]
    NotFound { kind: String, name: String },

    // =========================================================================
    // State Transition Errors
    // =========================================================================
    #[error("machine is in {status} state, set force: true to {} the machine", target.verb())]
    PreconditionFailed {
        status: MachineStatus,
        target: TargetState,
    },

    #[error("machine is in {status} state - cannot be {}; force cannot help", target.participle())]
    InvalidStateTransition {
        status: MachineStatus,
        target: TargetState,
    },

    #[error("{operation} did not settle within {timeout:?} (last observed state: {last_status})")]
    TimeoutExceeded {
        operation: String,
        timeout: Duration,
        last_status: MachineStatus,
    },

    // =========================================================================
    // Reconfiguration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Deploy failed - check the machine config, e.g. storage is mounted correctly: {0}")]
    Deployment(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-facing classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    NotFound,
    PreconditionFailed,
    InvalidStateTransition,
    Configuration,
    Deployment,
    TimeoutExceeded,
    Validation,
    Remote,
    Internal,
}

impl ErrorKind {
    /// Process exit code reported by the CLI for this kind
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::Validation => 2,
            ErrorKind::Connection => 3,
            ErrorKind::NotFound => 4,
            ErrorKind::PreconditionFailed => 5,
            ErrorKind::InvalidStateTransition => 6,
            ErrorKind::Configuration => 7,
            ErrorKind::Deployment => 8,
            ErrorKind::TimeoutExceeded => 9,
            ErrorKind::Remote => 10,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Deployment => "deployment_error",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Remote => "remote_error",
            ErrorKind::Internal => "internal_error",
        };
        write!(f, "{}", name)
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } | Error::Http(_) => ErrorKind::Connection,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Error::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Error::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Deployment(_) => ErrorKind::Deployment,
            Error::Validation(_) | Error::YamlParse(_) => ErrorKind::Validation,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::Internal(_) | Error::JsonParse(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is transient
    ///
    /// Nothing retries these automatically; the flag only tells a caller that
    /// re-running the reconciliation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::TimeoutExceeded
        )
    }

    /// Shorthand for a missing remote object
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
