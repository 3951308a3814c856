//! Error types for the reconcile crate

use thiserror::Error;

/// Errors that can occur while reconciling a resource
#[derive(Error, Debug)]
pub enum Error {
    /// A list entry lacks a field declared as part of its identity
    #[error("malformed entry in '{field}': missing identity field '{key}'")]
    MalformedEntry { field: String, key: String },

    /// Two entries of the same list resolve to the same identity
    #[error("duplicate entry in '{field}' for key ({key})")]
    DuplicateKey { field: String, key: String },

    /// A resource-specific pre-flight check rejected the desired config
    #[error("invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    /// The transport could not apply a request
    #[error("transport error{}: {message}", code_suffix(.code))]
    Transport { message: String, code: Option<u16> },

    /// A tree does not have the shape the engine requires
    #[error("invalid tree at '{path}': {message}")]
    InvalidTree { path: String, message: String },

    /// No schema is registered under this name
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Not one of merged, replaced, overridden or deleted
    #[error("invalid state '{0}' (expected merged, replaced, overridden or deleted)")]
    InvalidState(String),
}

fn code_suffix(code: &Option<u16>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl Error {
    /// Build a validation error for a field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a transport error with an optional status code
    pub fn transport(message: impl Into<String>, code: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            code,
        }
    }

    /// Build an invalid-tree error
    pub fn invalid_tree(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTree {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Error code reported by the transport, if any
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Transport { code, .. } => *code,
            _ => None,
        }
    }
}

/// Result type for reconcile operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_code() {
        let err = Error::transport("device rejected payload", Some(400));
        assert_eq!(
            err.to_string(),
            "transport error (400): device rejected payload"
        );
        assert_eq!(err.code(), Some(400));

        let err = Error::transport("connection refused", None);
        assert_eq!(err.to_string(), "transport error: connection refused");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_validation_names_field() {
        let err = Error::validation("mtu", "must be between 1312 and 9216, got 20");
        assert!(err.to_string().contains("'mtu'"));
        assert_eq!(err.code(), None);
    }
}
