//! # Execution engine
//!
//! Runs a block of generated code statement by statement against a
//! namespace and reports how the run ended: a terminal error, feedback for
//! the model, or a response for the user.

use crate::attachment::{OriginModification, OriginObserver};
use crate::binding::{contextualize_message, Binding};
use crate::capability::{PendingFeedback, Signals};
use crate::feedback::{Failure, Feedback};
use crate::interpreter::Interpreter;
use crate::message::Message;
use crate::namespace::Namespace;
use crate::syntax::{parse_program, Statement};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The code could not run at all
    Error(Failure),
    /// Something for the model to react to
    Feedback(Feedback),
    /// The answer for the user, attachments given as namespace paths
    Response(Message<Binding>),
}

impl ExecutionOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionOutcome::Error(_) => "error",
            ExecutionOutcome::Feedback(_) => "feedback",
            ExecutionOutcome::Response(_) => "response",
        }
    }
}

/// Result of running one code block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Text of every statement that started running, in order
    pub statements: Vec<String>,
    /// Lines written by `print`
    pub logs: Vec<String>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    pub fn error(&self) -> Option<&Failure> {
        match &self.outcome {
            ExecutionOutcome::Error(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        match &self.outcome {
            ExecutionOutcome::Feedback(feedback) => Some(feedback),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Message<Binding>> {
        match &self.outcome {
            ExecutionOutcome::Response(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

/// Run `code` against `namespace`, awaiting calls of the namespace's
/// suspending capabilities automatically
pub async fn execute(code: &str, namespace: &mut Namespace) -> ExecutionResult {
    let suspending = namespace.suspending_capabilities();
    execute_with(code, namespace, &suspending).await
}

/// Run `code` with an explicit set of suspending capability names
pub async fn execute_with(
    code: &str,
    namespace: &mut Namespace,
    suspending: &BTreeSet<String>,
) -> ExecutionResult {
    let mut statements = Vec::new();
    let mut logs = Vec::new();

    let program = match parse_program(code) {
        Ok(program) => program,
        Err(err) => {
            warn!(error = %err, "code does not parse");
            return ExecutionResult {
                statements,
                logs,
                outcome: ExecutionOutcome::Error(Failure::from_error(&err)),
            };
        }
    };

    let (observer, guarded) = guard_originals(namespace);
    debug!(statements = program.len(), guarded, "executing code");

    let mut signals = Signals::default();
    let outcome = run(
        program,
        namespace,
        suspending,
        &mut signals,
        &mut statements,
        &mut logs,
    )
    .await;
    signals.clear();
    release_originals(namespace, &observer);

    info!(
        outcome = outcome.name(),
        executed = statements.len(),
        "execution finished"
    );
    ExecutionResult {
        statements,
        logs,
        outcome,
    }
}

async fn run(
    program: Vec<Statement>,
    namespace: &mut Namespace,
    suspending: &BTreeSet<String>,
    signals: &mut Signals,
    statements: &mut Vec<String>,
    logs: &mut Vec<String>,
) -> ExecutionOutcome {
    signals.clear();
    for Statement { text, mut stmt } in program {
        stmt.await_suspending(suspending);
        statements.push(text.clone());
        debug!(statement = %text, "executing statement");

        let result = {
            let mut interpreter = Interpreter {
                namespace: &mut *namespace,
                signals: &mut *signals,
                logs: &mut *logs,
                statement: &text,
            };
            interpreter.exec(&stmt).await
        };

        if let Err(raised) = result {
            return ExecutionOutcome::Feedback(raised.into_feedback());
        }
        if let Some(response) = signals.take_response() {
            return match contextualize_message(&response, namespace) {
                Ok(message) => ExecutionOutcome::Response(message),
                Err(err) => unexpected(&err),
            };
        }
        if let Some(pending) = signals.take_feedback() {
            return match pending {
                PendingFeedback::Ready(feedback) => ExecutionOutcome::Feedback(feedback),
                PendingFeedback::Message {
                    capability,
                    severity,
                    message,
                } => match contextualize_message(&message, namespace) {
                    Ok(message) => ExecutionOutcome::Feedback(Feedback::capability_message(
                        &capability,
                        severity,
                        message,
                    )),
                    Err(err) => unexpected(&err),
                },
            };
        }
    }
    ExecutionOutcome::Feedback(Feedback::incomplete_cycle())
}

fn unexpected(err: &crate::error::Error) -> ExecutionOutcome {
    ExecutionOutcome::Feedback(Feedback::unexpected_error(Failure::from_error(err)))
}

/// Veto writes to caller objects held directly by a variable for the
/// length of one run. Original attachments the caller never handed in were
/// made by capabilities, so they stop counting as original.
/// Returns the installed observer and how many attachments it guards.
fn guard_originals(namespace: &mut Namespace) -> (OriginObserver, usize) {
    let observer: OriginObserver = Arc::new(
        |modification: &OriginModification| -> std::result::Result<(), Feedback> {
            Err(Feedback::modified_caller_object(
                &modification.variable,
                &modification.member,
            ))
        },
    );
    let callers = namespace.caller_objects().to_vec();
    let mut guarded = 0;
    for (_, value) in namespace.iter_mut() {
        let Value::Attachment(attachment) = value else {
            continue;
        };
        if !attachment.is_original() {
            continue;
        }
        if callers.iter().any(|caller| caller.same_payload(attachment)) {
            attachment.set_observer(Some(observer.clone()));
            guarded += 1;
        } else {
            attachment.set_original(false);
        }
    }
    (observer, guarded)
}

/// Take the run's observer off every variable it was installed on
fn release_originals(namespace: &mut Namespace, observer: &OriginObserver) {
    for (_, value) in namespace.iter_mut() {
        if let Value::Attachment(attachment) = value {
            if attachment.is_observed_by(observer) {
                attachment.set_observer(None);
            }
        }
    }
}
