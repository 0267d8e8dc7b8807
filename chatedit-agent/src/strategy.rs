//! Prompt construction and code extraction

use crate::cycle::{ChatCycle, Context, EditCycle, ExemplaryChatCycle};
use chatedit_runtime::{Binding, ExecutionOutcome, FeedbackKind, Message};
use std::fmt::Write;

/// Turns cycles into prompts and replies into code
pub trait PromptStrategy: Send + Sync {
    /// Initial prompt for the window of `cycles`, the last one in progress
    fn create_prompt(&self, cycles: &[&ChatCycle], context: &Context) -> String;

    /// Sent when a reply carried no code
    fn refine_prompt(&self) -> String;

    fn extract_code(&self, text: &str) -> Option<String>;
}

const OTC_INSTRUCTIONS: &str = "\
You operate on the user's objects by writing short code. Every answer has three parts:
observation: what the last system message tells you (omit when there is none)
thinking: how you will fulfil the request
commands:
```python
<statements>
```

Rules:
- Statements run one by one; names you assign stay available in later answers.
- Only the listed functions can be called; method calls are not available.
- Bind the result of every function that returns a value to a variable.
- Never modify the user's objects in place; work on `copy(obj)` instead.
- Finish by calling `respond(text, attachments)` once the request is fulfilled.";

const OTC_REFINE_PROMPT: &str = "\
Your answer did not contain any commands. Answer again using the format:
thinking: ...
commands:
```python
...
```";

/// Observation / thinking / commands prompting
#[derive(Debug, Clone, Default)]
pub struct OtcStrategy {
    manifest: Option<String>,
}

impl OtcStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the available functions with `manifest` instead of the
    /// signatures registered in the namespace
    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    fn render_request(out: &mut String, request: &Message<Binding>) {
        let _ = writeln!(out, "user: {}", request.text);
        render_attachments(out, &request.attachments);
    }

    fn render_exemplar(out: &mut String, cycle: &ExemplaryChatCycle) {
        Self::render_request(out, &cycle.request);
        for edit in &cycle.edit_cycles {
            let _ = writeln!(out, "assistant:\n{}", edit.answer.trim());
            render_outcome(out, &edit.outcome.clone().into(), &[]);
        }
    }

    fn render_edit_cycle(out: &mut String, edit: &EditCycle) {
        let (Some(answer), Some(execution)) = (edit.prompting.answer(), &edit.execution) else {
            return;
        };
        let _ = writeln!(out, "assistant:\n{}", answer.trim());
        render_outcome(out, &execution.outcome, &execution.logs);
    }
}

fn render_attachments(out: &mut String, attachments: &[Binding]) {
    if attachments.is_empty() {
        return;
    }
    let names: Vec<String> = attachments
        .iter()
        .map(|b| format!("{} ({})", b.path, b.type_name))
        .collect();
    let _ = writeln!(out, "attachments: {}", names.join(", "));
}

fn render_outcome(out: &mut String, outcome: &ExecutionOutcome, logs: &[String]) {
    out.push_str("system:\n");
    if !logs.is_empty() {
        let _ = writeln!(out, "logs:\n{}", logs.join("\n"));
    }
    match outcome {
        ExecutionOutcome::Error(failure) => {
            let _ = writeln!(out, "observation: [error] {}", failure.message);
        }
        ExecutionOutcome::Feedback(feedback) => {
            let _ = writeln!(out, "observation: {}", feedback);
            if let FeedbackKind::CapabilityMessage { message, .. } = &feedback.kind {
                render_attachments(out, &message.attachments);
            }
        }
        ExecutionOutcome::Response(message) => {
            let _ = writeln!(out, "response: {}", message.text);
            render_attachments(out, &message.attachments);
        }
    }
}

impl PromptStrategy for OtcStrategy {
    fn create_prompt(&self, cycles: &[&ChatCycle], context: &Context) -> String {
        let mut out = String::from(OTC_INSTRUCTIONS);

        let manifest = match &self.manifest {
            Some(manifest) => manifest.clone(),
            None => context.namespace.manifest(),
        };
        let _ = write!(out, "\n\n# Functions\n```python\n{}\n```\n", manifest.trim_end());

        if !context.exemplary_cycles().is_empty() {
            out.push_str("\n# Examples\n");
            for (i, cycle) in context.exemplary_cycles().iter().enumerate() {
                let _ = writeln!(out, "\n## Example {}", i + 1);
                Self::render_exemplar(&mut out, cycle);
            }
        }

        out.push_str("\n# Conversation\n");
        for cycle in cycles {
            Self::render_request(&mut out, &cycle.request);
            for edit in &cycle.edit_cycles {
                Self::render_edit_cycle(&mut out, edit);
            }
        }
        out.push_str("\nWrite the next answer for the last user message.");
        out
    }

    fn refine_prompt(&self) -> String {
        OTC_REFINE_PROMPT.to_string()
    }

    /// Code of the first fenced block after `commands:`
    fn extract_code(&self, text: &str) -> Option<String> {
        let start = text.find("commands:")? + "commands:".len();
        let rest = &text[start..];
        let fence = rest.find("```")?;
        let body = &rest[fence + 3..];
        // skip the language tag
        let body = &body[body.find('\n')? + 1..];
        let end = body.find("```").unwrap_or(body.len());
        let code = body[..end].trim_end();
        if code.trim().is_empty() {
            None
        } else {
            Some(code.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::{ExemplaryEditCycle, ExemplaryOutcome, PromptingResult};
    use chatedit_runtime::{ExecutionResult, Feedback, Namespace};

    #[test]
    fn test_extract_code() {
        let strategy = OtcStrategy::new();
        let reply = "thinking: crop it\ncommands:\n\
            ```python\nimg = crop(image0)\nrespond('ok', [img])\n```\n";
        assert_eq!(
            strategy.extract_code(reply).as_deref(),
            Some("img = crop(image0)\nrespond('ok', [img])")
        );
        assert_eq!(strategy.extract_code("commands:\n```\nx = 1\n```").as_deref(), Some("x = 1"));
        assert_eq!(strategy.extract_code("```python\nx = 1\n```"), None);
        assert_eq!(strategy.extract_code("commands:\n```python\n\n```"), None);
        assert_eq!(strategy.extract_code("thinking: no idea"), None);
    }

    #[test]
    fn test_prompt_layout() {
        let exemplar = ExemplaryChatCycle {
            request: Message::new("What is 2 + 2?"),
            edit_cycles: vec![ExemplaryEditCycle {
                answer: "thinking: add\ncommands:\n```python\nrespond(str(2 + 2))\n```".into(),
                statements: vec!["respond(str(2 + 2))".into()],
                outcome: ExemplaryOutcome::Response(Message::new("4")),
            }],
        };
        let context = Context::new(Namespace::new())
            .with_exemplary_cycles(vec![exemplar])
            .unwrap();

        let mut current = ChatCycle::new(
            Message::new("Brighten it").with_attachments(vec![Binding::new("Image", "image0")]),
            context.clone(),
        );
        let mut prompting = PromptingResult::new("earlier prompt");
        prompting.transcript.push("commands:\n```python\nimage0.b = 1\n```".into());
        current.edit_cycles.push(EditCycle {
            prompting,
            execution: Some(ExecutionResult {
                statements: vec!["image0.b = 1".into()],
                logs: vec!["hello".into()],
                outcome: ExecutionOutcome::Feedback(Feedback::modified_caller_object(
                    "image0", "b",
                )),
            }),
        });

        let strategy = OtcStrategy::new().with_manifest("def respond(text: str) -> None");
        let prompt = strategy.create_prompt(&[&current], &context);

        assert!(prompt.starts_with("You operate on the user's objects"));
        assert!(prompt.contains("def respond(text: str) -> None"));
        assert!(prompt.contains("## Example 1\nuser: What is 2 + 2?"));
        assert!(prompt.contains("response: 4"));
        assert!(prompt.contains("user: Brighten it\nattachments: image0 (Image)"));
        assert!(prompt.contains("logs:\nhello"));
        assert!(prompt.contains("observation: [error]"));
        assert!(prompt.ends_with("Write the next answer for the last user message."));
        let examples = prompt.find("# Examples").unwrap();
        let conversation = prompt.find("# Conversation").unwrap();
        assert!(examples < conversation);
    }
}
