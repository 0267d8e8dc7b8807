//! # Model Interface
//!
//! The orchestrator only needs one thing from a language model: given the
//! transcript so far, produce the next reply.
//!
//! ## Design
//! - `Model` trait: alternating transcript in, reply text out
//! - `OpenAiModel` for OpenAI-compatible chat completion APIs
//! - `ScriptedModel` replays canned replies

pub mod openai;
pub mod scripted;

pub use openai::{ModelConfig, OpenAiModel};
pub use scripted::ScriptedModel;

use chatedit_runtime::Result;

/// A language model the prompting loop can ask for code.
///
/// The transcript alternates prompt and reply, starting with a prompt:
/// even entries come from us, odd entries from the model.
#[allow(async_fn_in_trait)]
pub trait Model: Send + Sync {
    /// Get the model name, for logs
    fn name(&self) -> &str;

    /// Produce the reply to the last prompt in `transcript`
    async fn generate(&self, transcript: &[String]) -> Result<String>;
}
