//! # Feedback
//!
//! Feedback is the recoverable signal handed back to the model after an
//! attempt went wrong. The set of kinds is closed; each kind carries the
//! data the model needs to correct itself.

use crate::binding::Binding;
use crate::error::Error;
use crate::message::{timestamp_ns, Message};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a piece of feedback is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Serializable record of a terminal or unexpected error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    #[serde(default)]
    pub trace: String,
    pub timestamp: u64,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: String::new(),
            timestamp: timestamp_ns(),
        }
    }

    /// Keep the compact rendering as message and the verbose one as trace
    pub fn from_error(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            trace: format!("{:?}", err),
            timestamp: timestamp_ns(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The closed set of feedback kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedbackKind {
    /// An argument does not match the declared parameter type
    InvalidArgumentType {
        capability: String,
        parameter: String,
        expected: String,
        received: String,
    },
    /// A capability's result was thrown away
    UnassignedReturnValue {
        capability: String,
        return_type: String,
    },
    /// Generated code tried to write to a caller-owned attachment
    ModifiedCallerObject { variable: String, member: String },
    /// A statement failed with something other than feedback
    UnexpectedError { failure: Failure },
    /// The code ran to the end without responding
    IncompleteCycle,
    /// A capability talked back to the model directly
    CapabilityMessage {
        capability: String,
        message: Message<Binding>,
    },
    EmptyListParameters {
        capability: String,
        parameters: Vec<String>,
    },
    MismatchedListParameters {
        capability: String,
        parameters: Vec<String>,
        lengths: Vec<usize>,
    },
    MissingOptionalParameters {
        capability: String,
        parameters: Vec<String>,
    },
}

impl FeedbackKind {
    /// Snake-case tag of the kind
    pub fn name(&self) -> &'static str {
        match self {
            FeedbackKind::InvalidArgumentType { .. } => "invalid_argument_type",
            FeedbackKind::UnassignedReturnValue { .. } => "unassigned_return_value",
            FeedbackKind::ModifiedCallerObject { .. } => "modified_caller_object",
            FeedbackKind::UnexpectedError { .. } => "unexpected_error",
            FeedbackKind::IncompleteCycle => "incomplete_cycle",
            FeedbackKind::CapabilityMessage { .. } => "capability_message",
            FeedbackKind::EmptyListParameters { .. } => "empty_list_parameters",
            FeedbackKind::MismatchedListParameters { .. } => "mismatched_list_parameters",
            FeedbackKind::MissingOptionalParameters { .. } => "missing_optional_parameters",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackKind::InvalidArgumentType {
                capability,
                parameter,
                expected,
                received,
            } => write!(
                f,
                "argument '{}' of {}() expects {}, received {}",
                parameter, capability, expected, received
            ),
            FeedbackKind::UnassignedReturnValue {
                capability,
                return_type,
            } => write!(
                f,
                "{}() returns {}; assign its result to a variable",
                capability, return_type
            ),
            FeedbackKind::ModifiedCallerObject { variable, member } => write!(
                f,
                "'{}' belongs to the user and cannot be modified (writing '{}'); \
                 work on copy({}) instead",
                variable, member, variable
            ),
            FeedbackKind::UnexpectedError { failure } => {
                write!(f, "unexpected error: {}", failure.message)
            }
            FeedbackKind::IncompleteCycle => write!(
                f,
                "the commands finished without a response; call respond(...) to answer the user"
            ),
            FeedbackKind::CapabilityMessage {
                capability,
                message,
            } => {
                write!(f, "{}(): {}", capability, message.text)?;
                if !message.attachments.is_empty() {
                    let paths: Vec<&str> =
                        message.attachments.iter().map(|b| b.path.as_str()).collect();
                    write!(f, " (attached: {})", paths.join(", "))?;
                }
                Ok(())
            }
            FeedbackKind::EmptyListParameters {
                capability,
                parameters,
            } => write!(
                f,
                "{}() received empty lists for: {}",
                capability,
                parameters.join(", ")
            ),
            FeedbackKind::MismatchedListParameters {
                capability,
                parameters,
                lengths,
            } => {
                let pairs: Vec<String> = parameters
                    .iter()
                    .zip(lengths)
                    .map(|(p, n)| format!("{}={}", p, n))
                    .collect();
                write!(
                    f,
                    "{}() requires lists of equal length, got {}",
                    capability,
                    pairs.join(", ")
                )
            }
            FeedbackKind::MissingOptionalParameters {
                capability,
                parameters,
            } => write!(
                f,
                "{}() needs at least one of: {}",
                capability,
                parameters.join(", ")
            ),
        }
    }
}

/// A severity-tagged, timestamped feedback signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: FeedbackKind,
    pub timestamp: u64,
}

impl Feedback {
    pub fn new(severity: Severity, kind: FeedbackKind) -> Self {
        Self {
            severity,
            kind,
            timestamp: timestamp_ns(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn invalid_argument_type(
        capability: &str,
        parameter: &str,
        expected: impl fmt::Display,
        received: impl Into<String>,
    ) -> Self {
        Self::new(
            Severity::Error,
            FeedbackKind::InvalidArgumentType {
                capability: capability.to_string(),
                parameter: parameter.to_string(),
                expected: expected.to_string(),
                received: received.into(),
            },
        )
    }

    pub fn unassigned_return_value(capability: &str, return_type: impl fmt::Display) -> Self {
        Self::new(
            Severity::Error,
            FeedbackKind::UnassignedReturnValue {
                capability: capability.to_string(),
                return_type: return_type.to_string(),
            },
        )
    }

    pub fn modified_caller_object(variable: &str, member: &str) -> Self {
        Self::new(
            Severity::Error,
            FeedbackKind::ModifiedCallerObject {
                variable: variable.to_string(),
                member: member.to_string(),
            },
        )
    }

    pub fn unexpected_error(failure: Failure) -> Self {
        Self::new(Severity::Error, FeedbackKind::UnexpectedError { failure })
    }

    pub fn incomplete_cycle() -> Self {
        Self::new(Severity::Info, FeedbackKind::IncompleteCycle)
    }

    pub fn capability_message(
        capability: &str,
        severity: Severity,
        message: Message<Binding>,
    ) -> Self {
        Self::new(
            severity,
            FeedbackKind::CapabilityMessage {
                capability: capability.to_string(),
                message,
            },
        )
    }

    pub fn empty_list_parameters(capability: &str, parameters: Vec<String>) -> Self {
        Self::new(
            Severity::Error,
            FeedbackKind::EmptyListParameters {
                capability: capability.to_string(),
                parameters,
            },
        )
    }

    pub fn mismatched_list_parameters(
        capability: &str,
        parameters: Vec<String>,
        lengths: Vec<usize>,
    ) -> Self {
        Self::new(
            Severity::Error,
            FeedbackKind::MismatchedListParameters {
                capability: capability.to_string(),
                parameters,
                lengths,
            },
        )
    }

    pub fn missing_optional_parameters(capability: &str, parameters: Vec<String>) -> Self {
        Self::new(
            Severity::Error,
            FeedbackKind::MissingOptionalParameters {
                capability: capability.to_string(),
                parameters,
            },
        )
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.kind)
    }
}

/// What a capability or statement can fail with: structured feedback meant
/// for the model, or an ordinary error.
#[derive(Debug)]
pub enum Raised {
    Feedback(Box<Feedback>),
    Error(Error),
}

impl Raised {
    /// Demote an ordinary error to `unexpected_error` feedback
    pub fn into_feedback(self) -> Feedback {
        match self {
            Raised::Feedback(feedback) => *feedback,
            Raised::Error(err) => Feedback::unexpected_error(Failure::from_error(&err)),
        }
    }
}

impl From<Error> for Raised {
    fn from(err: Error) -> Self {
        Raised::Error(err)
    }
}

impl From<Feedback> for Raised {
    fn from(feedback: Feedback) -> Self {
        Raised::Feedback(Box::new(feedback))
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Raised::Feedback(feedback) => write!(f, "{}", feedback),
            Raised::Error(err) => write!(f, "{}", err),
        }
    }
}
