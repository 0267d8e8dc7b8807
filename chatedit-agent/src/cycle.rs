//! Cycle bookkeeping: what was asked, what the model answered, what ran

use chatedit_runtime::{
    Binding, Error, ExecutionOutcome, ExecutionResult, Failure, Feedback, Message, Namespace,
    Result,
};
use serde::{Deserialize, Serialize};

/// Most exemplary chat cycles a context may carry
pub const CONTEXT_MAX_EXEMPLARY_CYCLES: usize = 3;

// ============================================================================
// Prompting and edit cycles
// ============================================================================

/// Transcript of one prompting loop and what came out of it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptingResult {
    /// Prompt, reply, refine prompt, reply, ...
    pub transcript: Vec<String>,
    #[serde(default)]
    pub code: Option<String>,
    /// Terminal model failure
    #[serde(default)]
    pub error: Option<Failure>,
}

impl PromptingResult {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            transcript: vec![prompt.into()],
            code: None,
            error: None,
        }
    }

    /// Number of model replies received
    pub fn attempts(&self) -> usize {
        self.transcript.len() / 2
    }

    /// The model's last reply
    pub fn answer(&self) -> Option<&str> {
        if self.transcript.len() < 2 {
            return None;
        }
        let last = if self.transcript.len() % 2 == 0 {
            self.transcript.len() - 1
        } else {
            self.transcript.len() - 2
        };
        self.transcript.get(last).map(String::as_str)
    }
}

/// One attempt at answering: a prompting loop and, given code, its execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditCycle {
    pub prompting: PromptingResult,
    #[serde(default)]
    pub execution: Option<ExecutionResult>,
}

impl EditCycle {
    pub fn new(prompting: PromptingResult) -> Self {
        Self {
            prompting,
            execution: None,
        }
    }

    pub fn response(&self) -> Option<&Message<Binding>> {
        self.execution.as_ref().and_then(ExecutionResult::response)
    }
}

// ============================================================================
// Context and chat cycles
// ============================================================================

/// Namespace snapshot plus few-shot material for prompting
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub namespace: Namespace,
    exemplary_cycles: Vec<ExemplaryChatCycle>,
}

impl Context {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            exemplary_cycles: Vec::new(),
        }
    }

    pub fn with_exemplary_cycles(mut self, cycles: Vec<ExemplaryChatCycle>) -> Result<Self> {
        if cycles.len() > CONTEXT_MAX_EXEMPLARY_CYCLES {
            return Err(Error::limit_exceeded(
                "exemplary chat cycles",
                CONTEXT_MAX_EXEMPLARY_CYCLES,
            ));
        }
        self.exemplary_cycles = cycles;
        Ok(self)
    }

    pub fn exemplary_cycles(&self) -> &[ExemplaryChatCycle] {
        &self.exemplary_cycles
    }
}

/// One user request and every edit cycle spent on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCycle {
    pub request: Message<Binding>,
    /// Live namespace; not part of the serialized history
    #[serde(skip)]
    pub context: Context,
    #[serde(default)]
    pub edit_cycles: Vec<EditCycle>,
}

impl ChatCycle {
    pub fn new(request: Message<Binding>, context: Context) -> Self {
        Self {
            request,
            context,
            edit_cycles: Vec::new(),
        }
    }

    /// Completed when the last edit cycle produced a response
    pub fn is_completed(&self) -> bool {
        self.edit_cycles
            .last()
            .is_some_and(|cycle| cycle.response().is_some())
    }

    pub fn response(&self) -> Option<&Message<Binding>> {
        self.edit_cycles.last().and_then(EditCycle::response)
    }
}

// ============================================================================
// Exemplary cycles
// ============================================================================

/// How an exemplary edit cycle ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExemplaryOutcome {
    Feedback(Feedback),
    Response(Message<Binding>),
}

impl From<ExemplaryOutcome> for ExecutionOutcome {
    fn from(outcome: ExemplaryOutcome) -> Self {
        match outcome {
            ExemplaryOutcome::Feedback(feedback) => ExecutionOutcome::Feedback(feedback),
            ExemplaryOutcome::Response(message) => ExecutionOutcome::Response(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExemplaryEditCycle {
    pub answer: String,
    pub statements: Vec<String>,
    pub outcome: ExemplaryOutcome,
}

/// Hand-written chat cycle shown to the model as an example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExemplaryChatCycle {
    pub request: Message<Binding>,
    pub edit_cycles: Vec<ExemplaryEditCycle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatedit_runtime::ErrorKind;

    fn executed(outcome: ExecutionOutcome) -> EditCycle {
        let mut cycle = EditCycle::new(PromptingResult::new("prompt"));
        cycle.execution = Some(ExecutionResult {
            statements: Vec::new(),
            logs: Vec::new(),
            outcome,
        });
        cycle
    }

    #[test]
    fn test_completion_follows_last_edit_cycle() {
        let mut cycle = ChatCycle::new(Message::new("hi"), Context::default());
        assert!(!cycle.is_completed());

        cycle
            .edit_cycles
            .push(executed(ExecutionOutcome::Feedback(Feedback::incomplete_cycle())));
        assert!(!cycle.is_completed());

        cycle
            .edit_cycles
            .push(executed(ExecutionOutcome::Response(Message::new("done"))));
        assert!(cycle.is_completed());
        assert_eq!(cycle.response().unwrap().text, "done");

        cycle
            .edit_cycles
            .push(EditCycle::new(PromptingResult::new("prompt")));
        assert!(!cycle.is_completed());
    }

    #[test]
    fn test_prompting_answer() {
        let mut result = PromptingResult::new("prompt");
        assert_eq!(result.answer(), None);
        result.transcript.push("reply 1".into());
        assert_eq!(result.answer(), Some("reply 1"));
        result.transcript.push("refine".into());
        assert_eq!(result.answer(), Some("reply 1"));
        assert_eq!(result.attempts(), 1);
    }

    #[test]
    fn test_exemplary_cycle_limit() {
        let exemplar = ExemplaryChatCycle {
            request: Message::new("q"),
            edit_cycles: Vec::new(),
        };
        let err = Context::default()
            .with_exemplary_cycles(vec![exemplar; 4])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_history_serializes_without_namespace() {
        let mut cycle = ChatCycle::new(Message::new("hi"), Context::default());
        cycle
            .edit_cycles
            .push(executed(ExecutionOutcome::Response(Message::new("done"))));

        let json = serde_json::to_string(&cycle).unwrap();
        assert!(!json.contains("namespace"));
        let back: ChatCycle = serde_json::from_str(&json).unwrap();
        assert!(back.is_completed());
        assert!(back.context.namespace.is_empty());
    }
}
