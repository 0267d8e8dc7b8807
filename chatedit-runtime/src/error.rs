//! Runtime error types
//!
//! Re-exports chatedit-error and provides runtime-specific conveniences.

pub use chatedit_error::{Error, ErrorKind, ErrorStatus, Result};

// =============================================================================
// Runtime-specific error constructors
// =============================================================================

/// Create a LookupFailed error for an undefined variable
pub fn name_not_defined(name: &str) -> Error {
    Error::new(ErrorKind::LookupFailed, format!("name '{}' is not defined", name))
        .with_context("name", name)
}

/// Create a LookupFailed error for a missing attribute
pub fn no_attribute(type_name: &str, attr: &str) -> Error {
    Error::new(
        ErrorKind::LookupFailed,
        format!("'{}' object has no attribute '{}'", type_name, attr),
    )
    .with_context("attribute", attr)
}

/// Create a LookupFailed error for a missing index or key
pub fn no_item(type_name: &str, key: impl std::fmt::Display) -> Error {
    let key = key.to_string();
    Error::new(
        ErrorKind::LookupFailed,
        format!("'{}' object has no item {}", type_name, key),
    )
    .with_context("key", key)
}

/// Create a TypeMismatch error for an unsupported operation
pub fn unsupported_operand(op: &str, left: &str, right: &str) -> Error {
    Error::type_mismatch(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op, left, right
    ))
}

/// Create an EvaluationFailed error for a division or modulo by zero
pub fn division_by_zero() -> Error {
    Error::evaluation_failed("division by zero")
}

/// Create an EvaluationFailed error for integer overflow
pub fn integer_overflow(op: &str) -> Error {
    Error::evaluation_failed(format!("integer overflow in '{}'", op)).with_context("op", op)
}

/// Create an InvalidArgument error raised while binding call arguments
pub fn bad_call(capability: &str, reason: impl Into<String>) -> Error {
    Error::invalid_argument(format!("{}() {}", capability, reason.into()))
        .with_context("capability", capability)
}
