//! # chatedit agent
//!
//! The agent drives the model <-> runtime loop:
//! 1. User sends a message, its attachments get bound into the namespace
//! 2. The model is prompted with the conversation and writes code
//! 3. The runtime executes the code statement by statement
//! 4. Feedback goes back into the next prompt
//! 5. Repeat until a response, an error, or the edit-cycle budget runs out
//!
//! The model only ever sees names and types; the host keeps the values.

pub mod config;
pub mod context;
pub mod cycle;
pub mod orchestrator;
pub mod prompting;
pub mod provider;
pub mod strategy;

pub use config::Config;
pub use context::{ContextProvider, StaticContextProvider};
pub use cycle::{
    ChatCycle, Context, EditCycle, ExemplaryChatCycle, ExemplaryEditCycle, ExemplaryOutcome,
    PromptingResult, CONTEXT_MAX_EXEMPLARY_CYCLES,
};
pub use orchestrator::Orchestrator;
pub use prompting::prompt;
pub use provider::{Model, ModelConfig, OpenAiModel, ScriptedModel};
pub use strategy::{OtcStrategy, PromptStrategy};
