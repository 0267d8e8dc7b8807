//! Calculator capability set
//!
//! A small math toolbox plus a `Vector` type so the CLI can be driven end to
//! end: numbers stay in the namespace, vectors travel as attachments.

use chatedit_agent::{
    Context, ContextProvider, ExemplaryChatCycle, ExemplaryEditCycle, ExemplaryOutcome,
};
use chatedit_runtime::{
    Arguments, AsyncFnCapability, Attachment, Binding, Capability, CapabilityExt, Error,
    Feedback, FnCapability, Message, Namespace, Param, Raised, Record, Respond, Result,
    Segment, Severity, Signature, TypeSpec, Value,
};
use std::sync::Arc;
use std::time::Duration;

type CallResult = std::result::Result<Value, Raised>;

/// Hands out namespaces with the calculator capabilities registered
pub struct CalculatorProvider {
    context: Context,
}

impl CalculatorProvider {
    pub fn new() -> Result<Self> {
        let mut namespace = Namespace::new();
        for capability in capabilities() {
            namespace.register(capability)?;
        }
        let context = Context::new(namespace).with_exemplary_cycles(exemplary_cycles())?;
        Ok(Self { context })
    }

    pub fn manifest(&self) -> String {
        self.context.namespace.manifest()
    }
}

impl ContextProvider for CalculatorProvider {
    fn get_context(&self) -> Context {
        self.context.clone()
    }

    fn attach(&self, value: Value) -> Attachment {
        let attachment = Attachment::new(value);
        if attachment.type_name() == "Vector" {
            attachment.with_attr_paths(["x", "y"])
        } else {
            attachment
        }
    }
}

fn number(args: &Arguments, name: &str) -> std::result::Result<f64, Raised> {
    args.require(name)?
        .as_float()
        .ok_or_else(|| Error::type_mismatch(format!("'{}' is not a number", name)).into())
}

fn unary(name: &str, description: &str, f: fn(f64) -> f64) -> Arc<dyn Capability> {
    FnCapability::new(
        Signature::new(name)
            .describe(description)
            .param(Param::new("x", TypeSpec::Number))
            .returns(TypeSpec::Float),
        move |_, args| Ok(Value::Float(f(number(&args, "x")?))),
    )
    .validated()
    .require_assignment()
    .catch_unexpected()
    .shared()
}

fn sqrt() -> Arc<dyn Capability> {
    FnCapability::new(
        Signature::new("sqrt")
            .param(Param::new("x", TypeSpec::Number))
            .returns(TypeSpec::Float),
        |ctx, args| {
            let x = number(&args, "x")?;
            if x < 0.0 {
                ctx.feedback_message(
                    Severity::Warning,
                    Message::new(format!("cannot take the square root of {}", x)),
                );
                return Ok(Value::Null);
            }
            Ok(Value::Float(x.sqrt()))
        },
    )
    .validated()
    .require_assignment()
    .catch_unexpected()
    .shared()
}

fn pow() -> Arc<dyn Capability> {
    FnCapability::new(
        Signature::new("pow")
            .param(Param::new("base", TypeSpec::Number))
            .param(Param::new("exponent", TypeSpec::Number))
            .returns(TypeSpec::Float),
        |_, args| Ok(Value::Float(number(&args, "base")?.powf(number(&args, "exponent")?))),
    )
    .validated()
    .require_assignment()
    .catch_unexpected()
    .shared()
}

fn components(vector: &Value) -> std::result::Result<(f64, f64), Raised> {
    let component = |name: &str| -> std::result::Result<f64, Raised> {
        vector
            .get_attr(name)?
            .as_float()
            .ok_or_else(|| Error::type_mismatch(format!("Vector.{} is not a number", name)).into())
    };
    Ok((component("x")?, component("y")?))
}

fn norm() -> Arc<dyn Capability> {
    FnCapability::new(
        Signature::new("norm")
            .describe("length of a vector")
            .param(Param::new("vector", TypeSpec::named("Vector")))
            .returns(TypeSpec::Float),
        |_, args| {
            let (x, y) = components(args.require("vector")?)?;
            Ok(Value::Float(x.hypot(y)))
        },
    )
    .validated()
    .require_assignment()
    .catch_unexpected()
    .shared()
}

fn scale() -> Arc<dyn Capability> {
    FnCapability::new(
        Signature::new("scale")
            .describe("scaled copy of a vector")
            .param(Param::new("vector", TypeSpec::named("Vector")))
            .param(Param::new("factor", TypeSpec::Number))
            .returns(TypeSpec::named("Vector")),
        |_, args| {
            let factor = number(&args, "factor")?;
            let vector = args.require("vector")?;
            let (x, y) = components(vector)?;
            let scaled = [("x", x * factor), ("y", y * factor)];
            match vector {
                Value::Attachment(attachment) => {
                    for (name, value) in scaled {
                        attachment.set_path(
                            "vector",
                            &[Segment::Attr(name.to_string())],
                            Value::Float(value),
                        )?;
                    }
                    Ok(vector.clone())
                }
                _ => Ok(Value::from(
                    Record::new("Vector")
                        .with_field("x", scaled[0].1)
                        .with_field("y", scaled[1].1),
                )),
            }
        },
    )
    .validated()
    .copy_arguments(&["vector"])
    .require_assignment()
    .catch_unexpected()
    .shared()
}

async fn lookup_constant(args: Arguments) -> CallResult {
    let name = args.require("name")?.to_string();
    // stands in for a remote lookup
    tokio::time::sleep(Duration::from_millis(5)).await;
    let value = match name.as_str() {
        "pi" => std::f64::consts::PI,
        "e" => std::f64::consts::E,
        "tau" => std::f64::consts::TAU,
        "phi" => 1.618_033_988_749_895,
        other => {
            return Err(Error::invalid_argument(format!("unknown constant '{}'", other))
                .with_operation("fetch_constant")
                .into())
        }
    };
    Ok(Value::Float(value))
}

fn fetch_constant() -> Arc<dyn Capability> {
    AsyncFnCapability::new(
        Signature::new("fetch_constant")
            .describe("one of pi, e, tau, phi")
            .param(Param::new("name", TypeSpec::Str))
            .returns(TypeSpec::Float),
        lookup_constant,
    )
    .validated()
    .require_assignment()
    .catch_unexpected()
    .shared()
}

fn capabilities() -> Vec<Arc<dyn Capability>> {
    vec![
        sqrt(),
        unary("sin", "sine of an angle in radians", f64::sin),
        unary("cos", "cosine of an angle in radians", f64::cos),
        unary("radians", "degrees to radians", f64::to_radians),
        pow(),
        norm(),
        scale(),
        fetch_constant(),
        Respond::new().shared(),
    ]
}

fn answer(thinking: &str, code: &str) -> String {
    format!("thinking: {}\ncommands:\n```python\n{}\n```", thinking, code)
}

fn exemplary_cycles() -> Vec<ExemplaryChatCycle> {
    vec![
        ExemplaryChatCycle {
            request: Message::new("What is the square root of 16 plus 2?"),
            edit_cycles: vec![
                ExemplaryEditCycle {
                    answer: answer("take the root first", "sqrt(16)"),
                    statements: vec!["sqrt(16)".into()],
                    outcome: ExemplaryOutcome::Feedback(Feedback::unassigned_return_value(
                        "sqrt",
                        TypeSpec::Float,
                    )),
                },
                ExemplaryEditCycle {
                    answer: answer(
                        "bind the root, then add",
                        "root = sqrt(16)\nresult = root + 2\nrespond(str(result))",
                    ),
                    statements: vec![
                        "root = sqrt(16)".into(),
                        "result = root + 2".into(),
                        "respond(str(result))".into(),
                    ],
                    outcome: ExemplaryOutcome::Response(Message::new("6.0")),
                },
            ],
        },
        ExemplaryChatCycle {
            request: Message::new("Double this vector")
                .with_attachments(vec![Binding::new("Vector", "vector0")]),
            edit_cycles: vec![ExemplaryEditCycle {
                answer: answer(
                    "scale returns a new vector",
                    "doubled = scale(vector0, 2)\nrespond('Here it is.', [doubled])",
                ),
                statements: vec![
                    "doubled = scale(vector0, 2)".into(),
                    "respond('Here it is.', [doubled])".into(),
                ],
                outcome: ExemplaryOutcome::Response(
                    Message::new("Here it is.")
                        .with_attachments(vec![Binding::new("Vector", "doubled")]),
                ),
            }],
        },
    ]
}
