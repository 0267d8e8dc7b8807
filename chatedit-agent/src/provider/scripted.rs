//! Model that replays canned replies

use super::Model;
use chatedit_runtime::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Replies from a fixed script, one per call. A scripted `Err` makes that
/// call fail; an exhausted script repeats its fallback or fails.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Answer every call with the same reply
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Queue a failing call
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(message.into()));
        self
    }

    /// Transcripts received so far, one per call
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, transcript: &[String]) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transcript.to_vec());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (next, &self.fallback) {
            (Some(Ok(reply)), _) => Ok(reply),
            (Some(Err(message)), _) => Err(Error::inference_failed(message)),
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(Error::inference_failed("script exhausted")),
        }
    }
}
