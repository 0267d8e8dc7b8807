//! Prompting loop: ask until the model answers with code

use crate::cycle::{ChatCycle, Context, PromptingResult};
use crate::provider::Model;
use crate::strategy::PromptStrategy;
use chatedit_runtime::Failure;
use tracing::{debug, warn};

/// Ask `model` for code over the window `cycles`.
///
/// Stops at the first reply with code, after `max_attempts` replies, or at
/// the first model failure, which is recorded rather than retried.
pub async fn prompt<M, S>(
    cycles: &[&ChatCycle],
    context: &Context,
    model: &M,
    strategy: &S,
    max_attempts: usize,
) -> PromptingResult
where
    M: Model + ?Sized,
    S: PromptStrategy + ?Sized,
{
    let mut result = PromptingResult::new(strategy.create_prompt(cycles, context));

    while result.attempts() < max_attempts {
        debug!(
            model = model.name(),
            attempt = result.attempts() + 1,
            "requesting code"
        );
        let reply = match model.generate(&result.transcript).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(model = model.name(), error = %err, "model call failed");
                result.error = Some(Failure::from_error(&err));
                break;
            }
        };

        result.code = strategy.extract_code(&reply);
        result.transcript.push(reply);
        if result.code.is_some() {
            break;
        }
        result.transcript.push(strategy.refine_prompt());
    }
    result
}
