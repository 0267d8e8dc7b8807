//! Where chat cycles get their namespace and examples from

use crate::cycle::{Context, ExemplaryChatCycle};
use chatedit_runtime::{Attachment, Capability, Namespace, Result, Value};
use std::sync::Arc;

/// Supplies a fresh context per chat cycle and wraps host values as
/// attachments
pub trait ContextProvider: Send + Sync {
    fn get_context(&self) -> Context;

    fn attach(&self, value: Value) -> Attachment;
}

/// Hands out copies of one prepared namespace
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: Context,
}

impl StaticContextProvider {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            context: Context::new(namespace),
        }
    }

    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Result<Self> {
        self.context.namespace.register(capability)?;
        Ok(self)
    }

    pub fn with_exemplary_cycles(mut self, cycles: Vec<ExemplaryChatCycle>) -> Result<Self> {
        self.context = self.context.with_exemplary_cycles(cycles)?;
        Ok(self)
    }
}

impl ContextProvider for StaticContextProvider {
    fn get_context(&self) -> Context {
        self.context.clone()
    }

    fn attach(&self, value: Value) -> Attachment {
        Attachment::new(value)
    }
}
