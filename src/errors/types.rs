//! # Error Types
//!
//! Error taxonomy for the certificate authority core using `thiserror`.

/// Custom result type for keymint operations
pub type Result<T> = std::result::Result<T, KeymintError>;

/// Message shown to end users for every authentication or authorization failure.
///
/// Invalid credentials and a failed membership check must look identical from
/// the outside.
pub const GENERIC_AUTH_FAILURE: &str = "authentication failed";

/// Main error type for keymint
#[derive(thiserror::Error, Debug)]
pub enum KeymintError {
    /// Bad construction input (DSN, provider options, config files)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backend I/O failure, retryable by the caller
    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Lookup miss
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// OAuth code exchange failed (invalid, expired or reused code, network failure)
    #[error("Token exchange failed: {message}")]
    Exchange {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Token structurally valid but the authorization check failed
    #[error("Authorization denied: {message}")]
    AuthorizationDenied { message: String },

    /// Structurally invalid input (malformed record, impossible key)
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Wire certificate could not be decoded
    #[error("Certificate parse error: {message}")]
    CertificateParse {
        message: String,
        #[source]
        source: Option<ssh_key::Error>,
    },

    /// Identity service transport failure
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Caller-imposed deadline elapsed
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KeymintError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a storage error wrapping a backend error
    pub fn storage<S, E>(source: E, context: S) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage { context: context.into(), source: Box::new(source) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create an exchange error
    pub fn exchange<S: Into<String>>(message: S) -> Self {
        Self::Exchange { message: message.into(), source: None }
    }

    /// Create an exchange error with source
    pub fn exchange_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Exchange { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create an authorization denied error
    pub fn denied<S: Into<String>>(message: S) -> Self {
        Self::AuthorizationDenied { message: message.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a certificate parse error
    pub fn certificate<S: Into<String>>(message: S, source: ssh_key::Error) -> Self {
        Self::CertificateParse { message: message.into(), source: Some(source) }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S, source: reqwest::Error) -> Self {
        Self::Transport { message: message.into(), source: Some(source) }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeymintError::Storage { .. }
                | KeymintError::Transport { .. }
                | KeymintError::Io { .. }
                | KeymintError::Timeout { .. }
        )
    }

    /// Whether this error is a lookup miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeymintError::NotFound { .. })
    }

    /// Message that is safe to show to the end user.
    pub fn public_message(&self) -> String {
        match self {
            KeymintError::Exchange { .. } | KeymintError::AuthorizationDenied { .. } => {
                GENERIC_AUTH_FAILURE.to_string()
            }
            KeymintError::NotFound { .. } => "not found".to_string(),
            KeymintError::Validation { message, .. } => message.clone(),
            _ => "internal error".to_string(),
        }
    }
}

impl From<sqlx::Error> for KeymintError {
    fn from(error: sqlx::Error) -> Self {
        Self::storage(error, "Database operation failed")
    }
}

impl From<mongodb::error::Error> for KeymintError {
    fn from(error: mongodb::error::Error) -> Self {
        Self::storage(error, "Document store operation failed")
    }
}

impl From<std::io::Error> for KeymintError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for KeymintError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for KeymintError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", error)
    }
}

impl From<validator::ValidationErrors> for KeymintError {
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

        Self::validation(format!("Validation failed: {}", message))
    }
}
