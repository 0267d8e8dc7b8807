//! # chatedit runtime
//!
//! Where generated code runs. The model writes statements; the engine runs
//! them one by one against a persistent namespace.
//!
//! ## Core Concepts
//! - **Attachments**: Shared handles onto user-supplied values that remember where they came from
//! - **Namespace**: Variables plus the capabilities code may call
//! - **Bindings**: Attachments named and described by their namespace paths
//! - **Capabilities**: Host functions with typed signatures, optionally suspending
//! - **Feedback**: Structured, recoverable signals for the model
//! - **Engine**: Statement-by-statement execution ending in an error, feedback or a response

pub mod attachment;
pub mod binding;
pub mod capability;
pub mod engine;
pub mod error;
pub mod feedback;
mod interpreter;
pub mod message;
pub mod namespace;
pub mod syntax;
pub mod value;
pub mod wrappers;

pub use attachment::{Attachment, OriginModification, OriginObserver};
pub use binding::{
    assign, assign_message, contextualize_message, find_free_name, locate, resolve,
    resolve_message, Binding,
};
pub use capability::{
    Argument, Arguments, AsyncFnCapability, CallArgs, CallContext, Capability, FnCapability,
    Param, PendingFeedback, Respond, Signals, Signature, TypeSpec,
};
pub use engine::{execute, execute_with, ExecutionOutcome, ExecutionResult};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use feedback::{Failure, Feedback, FeedbackKind, Raised, Severity};
pub use message::Message;
pub use namespace::Namespace;
pub use value::{Fields, Record, Segment, Value};
pub use wrappers::CapabilityExt;
