//! # Error Types
//!
//! Error types for the bootstrap pipelines using `thiserror`.

use std::fmt;
use std::path::PathBuf;

/// Custom result type for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Main error type for the bootstrap pipelines
#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    /// Configuration errors. `missing` lists every absent required key.
    #[error("Configuration error: {message}")]
    Config { message: String, missing: Vec<String> },

    /// Validation errors on configuration values
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Network transport errors (connection refused, TLS, timeouts)
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Token exchange and other authentication failures
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// A "list existing resources" call returned a non-success status
    #[error("Failed to retrieve {resource}. Status code: {status}")]
    Listing { resource: String, status: u16 },

    /// A create/assign call failed
    #[error("Failed to create {kind} '{name}': {reason}")]
    Creation { kind: String, name: String, reason: String },

    /// Secrets store lifecycle faults (sealed, uninitialized, missing keys)
    #[error("Seal state error: {message}")]
    SealState { message: String },

    /// Database errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Vault admin API errors
    #[error("Vault error: {message}")]
    Vault { message: String },

    /// Failure writing the root credential bundle
    #[error("Failed to persist credentials to {}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Error taxonomy used when reporting a fault to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    TransportOrAuth,
    Listing,
    Creation,
    StateMachine,
    Configuration,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::TransportOrAuth => write!(f, "transport_or_auth"),
            ErrorCategory::Listing => write!(f, "listing"),
            ErrorCategory::Creation => write!(f, "creation"),
            ErrorCategory::StateMachine => write!(f, "state_machine"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

impl BootstrapError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), missing: Vec::new() }
    }

    /// Create a configuration error listing all missing keys at once
    pub fn missing_config(missing: Vec<String>) -> Self {
        Self::Config {
            message: format!("missing required configuration: {}", missing.join(", ")),
            missing,
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Create a listing error
    pub fn listing<S: Into<String>>(resource: S, status: u16) -> Self {
        Self::Listing { resource: resource.into(), status }
    }

    /// Create a creation error
    pub fn creation<K: Into<String>, N: Into<String>, R: Into<String>>(
        kind: K,
        name: N,
        reason: R,
    ) -> Self {
        Self::Creation { kind: kind.into(), name: name.into(), reason: reason.into() }
    }

    /// Create a seal state error
    pub fn seal_state<S: Into<String>>(message: S) -> Self {
        Self::SealState { message: message.into() }
    }

    /// Create a Vault admin API error
    pub fn vault<S: Into<String>>(message: S) -> Self {
        Self::Vault { message: message.into() }
    }

    /// Create a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Map this error onto the fault taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            BootstrapError::Transport { .. } | BootstrapError::Auth { .. } => {
                ErrorCategory::TransportOrAuth
            }
            BootstrapError::Listing { .. } => ErrorCategory::Listing,
            BootstrapError::Creation { .. }
            | BootstrapError::Database { .. }
            | BootstrapError::Vault { .. } => ErrorCategory::Creation,
            BootstrapError::SealState { .. } | BootstrapError::Persistence { .. } => {
                ErrorCategory::StateMachine
            }
            BootstrapError::Config { .. } | BootstrapError::Validation { .. } => {
                ErrorCategory::Configuration
            }
            BootstrapError::Serialization { .. } | BootstrapError::Internal { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether this fault must abort the pipeline it occurred in.
    ///
    /// Faults in the creation category (including database and Vault admin
    /// errors) are reported per resource; callers that treat them as fatal
    /// (the database pipeline) convert them explicitly.
    pub fn is_fatal(&self) -> bool {
        self.category() != ErrorCategory::Creation
    }

    /// Names of the missing configuration keys, if this is a configuration error
    pub fn missing_keys(&self) -> &[String] {
        match self {
            BootstrapError::Config { missing, .. } => missing,
            _ => &[],
        }
    }
}

impl From<sqlx::Error> for BootstrapError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<reqwest::Error> for BootstrapError {
    fn from(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            "connection failed".to_string()
        } else if error.is_decode() {
            "failed to decode response body".to_string()
        } else {
            "request failed".to_string()
        };
        Self::Transport { message, source: Some(Box::new(error)) }
    }
}

impl From<vaultrs::error::ClientError> for BootstrapError {
    fn from(error: vaultrs::error::ClientError) -> Self {
        Self::vault(error.to_string())
    }
}

impl From<validator::ValidationErrors> for BootstrapError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");
        let message = if message.is_empty() { errors.to_string() } else { message };

        Self::validation(format!("Validation failed: {}", message))
    }
}
