//! Messages exchanged between the user and the agent

use crate::attachment::Attachment;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum characters of message text
pub const MESSAGE_TEXT_MAX_CHARACTERS: usize = 10_000;

/// Maximum attachments carried by one message
pub const MESSAGE_MAX_ATTACHMENTS: usize = 100;

/// Nanoseconds since the Unix epoch
pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Text plus ordered attachments.
///
/// `Message<Attachment>` is the live form passed in and out of the
/// orchestrator; `Message<Binding>` is the form kept in history and shown to
/// the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<A = Attachment> {
    pub text: String,
    pub timestamp: u64,
    #[serde(default = "Vec::new")]
    pub attachments: Vec<A>,
}

impl<A> Message<A> {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: timestamp_ns(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<A>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Check text and attachment limits
    pub fn validate(&self) -> Result<()> {
        if self.text.chars().count() > MESSAGE_TEXT_MAX_CHARACTERS {
            return Err(Error::limit_exceeded("message text", MESSAGE_TEXT_MAX_CHARACTERS)
                .with_operation("message::validate"));
        }
        if self.attachments.len() > MESSAGE_MAX_ATTACHMENTS {
            return Err(Error::limit_exceeded("message attachments", MESSAGE_MAX_ATTACHMENTS)
                .with_operation("message::validate"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::error::ErrorKind;
    use crate::value::Value;

    #[test]
    fn test_new_message() {
        let message: Message = Message::new("make it brighter");
        assert_eq!(message.text, "make it brighter");
        assert!(message.attachments.is_empty());
        assert!(message.timestamp > 0);
    }

    #[test]
    fn test_validate_limits() {
        let message: Message = Message::new("x".repeat(MESSAGE_TEXT_MAX_CHARACTERS));
        assert!(message.validate().is_ok());

        let message: Message = Message::new("x".repeat(MESSAGE_TEXT_MAX_CHARACTERS + 1));
        assert!(message
            .validate()
            .is_err_and(|e| e.kind() == ErrorKind::LimitExceeded));

        let attachments = (0..=MESSAGE_MAX_ATTACHMENTS)
            .map(|i| Attachment::new(Value::Int(i as i64)))
            .collect();
        let message = Message::new("many").with_attachments(attachments);
        assert!(message
            .validate()
            .is_err_and(|e| e.kind() == ErrorKind::LimitExceeded));
    }

    #[test]
    fn test_deserialize_without_attachments() {
        let message: Message<Binding> =
            serde_json::from_str(r#"{"text": "hi", "timestamp": 1}"#).unwrap();
        assert_eq!(message.text, "hi");
        assert!(message.attachments.is_empty());
    }
}
