//! Orchestrator - drives chat cycles and the edit cycles inside them

use crate::config::Config;
use crate::context::ContextProvider;
use crate::cycle::{ChatCycle, EditCycle};
use crate::prompting;
use crate::provider::Model;
use crate::strategy::{OtcStrategy, PromptStrategy};
use chatedit_runtime::{assign_message, execute, resolve_message, ExecutionOutcome, Message, Result};
use tracing::{debug, info, warn};

/// Turns user messages into responses by letting the model write code.
///
/// Each [`send`](Orchestrator::send) opens a chat cycle, then runs up to
/// `max_edit_cycles` rounds of prompting and execution, feeding every
/// round's feedback into the next prompt.
pub struct Orchestrator<P, M, S = OtcStrategy> {
    provider: P,
    model: M,
    strategy: S,
    config: Config,
    history: Vec<ChatCycle>,
}

impl<P, M, S> Orchestrator<P, M, S>
where
    P: ContextProvider,
    M: Model,
    S: PromptStrategy,
{
    pub fn new(provider: P, model: M, strategy: S) -> Self {
        Self {
            provider,
            model,
            strategy,
            config: Config::default(),
            history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config.clamped();
        self
    }

    pub fn with_history(mut self, history: Vec<ChatCycle>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn history(&self) -> &[ChatCycle] {
        &self.history
    }

    pub fn set_history(&mut self, history: Vec<ChatCycle>) {
        self.history = history;
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn pop_history(&mut self) -> Option<ChatCycle> {
        self.history.pop()
    }

    /// Handle one user message.
    ///
    /// Returns the response, or `None` when the edit-cycle budget ran out,
    /// the model produced no code, or execution failed terminally. The
    /// details stay in [`history`](Orchestrator::history). Errors only come
    /// from an invalid `message`.
    pub async fn send(&mut self, message: Message) -> Result<Option<Message>> {
        message.validate()?;

        let mut context = self.provider.get_context();
        if let Some(previous) = self.history.last() {
            let inherited = context.namespace.inherit(&previous.context.namespace);
            debug!(inherited, "carried variables over from previous chat cycle");
        }
        let request = assign_message(&message, &mut context.namespace)?;
        self.history.push(ChatCycle::new(request, context));
        let current = self.history.len() - 1;
        info!(chat_cycle = current, "chat cycle started");

        for round in 0..self.config.max_edit_cycles {
            let prompting = {
                let window = self.window();
                let context = &self.history[current].context;
                prompting::prompt(
                    &window,
                    context,
                    &self.model,
                    &self.strategy,
                    self.config.max_prompt_attempts,
                )
                .await
            };

            let code = prompting.code.clone();
            let cycle = &mut self.history[current];
            cycle.edit_cycles.push(EditCycle::new(prompting));
            let Some(code) = code else {
                info!(edit_cycle = round, "no code produced");
                return Ok(None);
            };

            let execution = execute(&code, &mut cycle.context.namespace).await;
            let outcome = execution.outcome.clone();
            if let Some(edit) = cycle.edit_cycles.last_mut() {
                edit.execution = Some(execution);
            }

            match outcome {
                ExecutionOutcome::Error(failure) => {
                    warn!(edit_cycle = round, error = %failure.message, "execution failed");
                    return Ok(None);
                }
                ExecutionOutcome::Response(response) => {
                    info!(edit_cycle = round, "chat cycle completed");
                    return match resolve_message(&response, &cycle.context.namespace) {
                        Ok(message) => Ok(Some(message)),
                        Err(err) => {
                            warn!(error = %err, "response does not resolve");
                            Ok(None)
                        }
                    };
                }
                ExecutionOutcome::Feedback(feedback) => {
                    info!(edit_cycle = round, feedback = %feedback, "feeding back to model");
                }
            }
        }

        info!(
            max_edit_cycles = self.config.max_edit_cycles,
            "edit cycle budget exhausted"
        );
        Ok(None)
    }

    /// The last completed chat cycles, capped by config, plus the current one
    fn window(&self) -> Vec<&ChatCycle> {
        let Some((current, previous)) = self.history.split_last() else {
            return Vec::new();
        };
        let completed: Vec<&ChatCycle> = previous.iter().filter(|c| c.is_completed()).collect();
        let skip = completed.len().saturating_sub(self.config.max_chat_cycles);
        completed
            .into_iter()
            .skip(skip)
            .chain(std::iter::once(current))
            .collect()
    }
}
