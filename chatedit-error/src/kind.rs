//! Error kinds for chatedit operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to handle a failure: terminal
/// model errors stop an edit cycle, evaluation errors are demoted to feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// A bounded collection (message text, attachments, exemplars) overflowed
    LimitExceeded,

    // =========================================================================
    // Namespace / binding errors
    // =========================================================================
    /// A name, attribute, index or key could not be found
    LookupFailed,

    /// A binding path could not be parsed
    InvalidPath,

    // =========================================================================
    // Generated code errors
    // =========================================================================
    /// Failed to parse generated code
    ParseFailed,

    /// A statement failed while being evaluated
    EvaluationFailed,

    /// An operation was applied to a value of the wrong type
    TypeMismatch,

    /// Invalid argument passed to a capability
    InvalidArgument,

    /// A capability failed while running
    CapabilityFailed,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// Authentication with the provider failed
    AuthenticationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::LimitExceeded => "LimitExceeded",

            // Namespace
            ErrorKind::LookupFailed => "LookupFailed",
            ErrorKind::InvalidPath => "InvalidPath",

            // Generated code
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::EvaluationFailed => "EvaluationFailed",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::CapabilityFailed => "CapabilityFailed",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::LookupFailed.to_string(), "LookupFailed");
        assert_eq!(ErrorKind::InferenceFailed.to_string(), "InferenceFailed");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::ParseFailed.is_retryable());
        assert!(!ErrorKind::TypeMismatch.is_retryable());
    }
}
