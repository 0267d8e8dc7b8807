//! # Capabilities
//!
//! Host functions exposed to generated code. Each capability declares a
//! [`Signature`] (parameters, types, defaults, whether it suspends) and is
//! invoked with bound [`Arguments`] and a [`CallContext`] through which it can
//! signal a response or feedback out of band.

use crate::attachment::Attachment;
use crate::error::{self, Result};
use crate::feedback::{Feedback, Raised, Severity};
use crate::message::Message;
use crate::value::Value;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;

// =============================================================================
// Types
// =============================================================================

/// Declared type of a parameter or return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    Any,
    None,
    Bool,
    Int,
    Float,
    /// `int` or `float`
    Number,
    Str,
    List(Box<TypeSpec>),
    /// String-keyed dict with values of the given type
    Dict(Box<TypeSpec>),
    /// Record (or attachment whose payload is a record) of this type name
    Named(String),
    Optional(Box<TypeSpec>),
    Union(Vec<TypeSpec>),
}

impl TypeSpec {
    pub fn list(item: TypeSpec) -> Self {
        TypeSpec::List(Box::new(item))
    }

    pub fn dict(value: TypeSpec) -> Self {
        TypeSpec::Dict(Box::new(value))
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeSpec::Named(name.into())
    }

    pub fn optional(inner: TypeSpec) -> Self {
        TypeSpec::Optional(Box::new(inner))
    }

    /// Whether `value` conforms to this type
    pub fn accepts(&self, value: &Value) -> bool {
        if let Value::Attachment(attachment) = value {
            return attachment.with_payload(|payload| self.accepts(payload));
        }
        match self {
            TypeSpec::Any => true,
            TypeSpec::None => value.is_null(),
            TypeSpec::Bool => matches!(value, Value::Bool(_)),
            TypeSpec::Int => matches!(value, Value::Int(_)),
            TypeSpec::Float => matches!(value, Value::Float(_)),
            TypeSpec::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            TypeSpec::Str => matches!(value, Value::Str(_)),
            TypeSpec::List(item) => value
                .as_list()
                .is_some_and(|items| items.iter().all(|v| item.accepts(v))),
            TypeSpec::Dict(inner) => match value {
                Value::Dict(entries) => entries.values().all(|v| inner.accepts(v)),
                _ => false,
            },
            TypeSpec::Named(name) => {
                matches!(value, Value::Record(record) if &record.type_name == name)
            }
            TypeSpec::Optional(inner) => value.is_null() || inner.accepts(value),
            TypeSpec::Union(options) => options.iter().any(|t| t.accepts(value)),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => write!(f, "Any"),
            TypeSpec::None => write!(f, "None"),
            TypeSpec::Bool => write!(f, "bool"),
            TypeSpec::Int => write!(f, "int"),
            TypeSpec::Float => write!(f, "float"),
            TypeSpec::Number => write!(f, "int | float"),
            TypeSpec::Str => write!(f, "str"),
            TypeSpec::List(item) => write!(f, "list[{}]", item),
            TypeSpec::Dict(value) => write!(f, "dict[str, {}]", value),
            TypeSpec::Named(name) => write!(f, "{}", name),
            TypeSpec::Optional(inner) => write!(f, "Optional[{}]", inner),
            TypeSpec::Union(options) => {
                let options: Vec<String> = options.iter().map(ToString::to_string).collect();
                write!(f, "{}", options.join(" | "))
            }
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Declared `Optional[...]` with a default
    pub fn is_optional(&self) -> bool {
        self.default.is_some() && matches!(self.ty, TypeSpec::Optional(_))
    }
}

/// Name, parameters and return type of a capability
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub description: String,
    pub params: Vec<Param>,
    pub returns: TypeSpec,
    /// Must be awaited; unawaited calls are awaited automatically
    pub suspending: bool,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            returns: TypeSpec::None,
            suspending: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: TypeSpec) -> Self {
        self.returns = returns;
        self
    }

    pub fn suspending(mut self) -> Self {
        self.suspending = true;
        self
    }

    /// `async def name(a: int, b: str = 'x') -> float  # description`
    pub fn render(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match &p.default {
                Some(default) => format!("{}: {} = {}", p.name, p.ty, default.repr()),
                None => format!("{}: {}", p.name, p.ty),
            })
            .collect();
        let prefix = if self.suspending { "async def" } else { "def" };
        let mut line = format!(
            "{} {}({}) -> {}",
            prefix,
            self.name,
            params.join(", "),
            self.returns
        );
        if !self.description.is_empty() {
            line.push_str("  # ");
            line.push_str(&self.description);
        }
        line
    }

    /// Match call arguments to parameters, filling defaults
    pub fn bind(&self, call: CallArgs) -> Result<Arguments> {
        if call.positional.len() > self.params.len() {
            return Err(error::bad_call(
                &self.name,
                format!(
                    "takes {} positional arguments but {} were given",
                    self.params.len(),
                    call.positional.len()
                ),
            ));
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        for (slot, value) in slots.iter_mut().zip(call.positional) {
            *slot = Some(value);
        }
        for (name, value) in call.keyword {
            let index = self
                .params
                .iter()
                .position(|p| p.name == name)
                .ok_or_else(|| {
                    error::bad_call(
                        &self.name,
                        format!("got an unexpected keyword argument '{}'", name),
                    )
                })?;
            if slots[index].is_some() {
                return Err(error::bad_call(
                    &self.name,
                    format!("got multiple values for argument '{}'", name),
                ));
            }
            slots[index] = Some(value);
        }

        let args = self
            .params
            .iter()
            .zip(slots)
            .map(|(param, slot)| match slot {
                Some(value) => Ok(Argument {
                    name: param.name.clone(),
                    value,
                    provided: true,
                }),
                None => match &param.default {
                    Some(default) => Ok(Argument {
                        name: param.name.clone(),
                        value: default.clone(),
                        provided: false,
                    }),
                    None => Err(error::bad_call(
                        &self.name,
                        format!("missing required argument '{}'", param.name),
                    )),
                },
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arguments { args })
    }

    /// Check bound arguments against the declared parameter types
    pub fn check(&self, args: &Arguments) -> std::result::Result<(), Feedback> {
        for (param, arg) in self.params.iter().zip(args.iter()) {
            if !param.ty.accepts(&arg.value) {
                return Err(Feedback::invalid_argument_type(
                    &self.name,
                    &param.name,
                    &param.ty,
                    arg.value.type_name(),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// Arguments as written at the call site
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keyword: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }
}

/// One bound argument
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: Value,
    /// Passed at the call site rather than defaulted
    pub provided: bool,
}

/// Arguments bound to a signature, in parameter order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    args: Vec<Argument>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    /// Argument by name, as a capability failure when absent
    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| error::bad_call("capability", format!("missing argument '{}'", name)))
    }

    pub fn is_provided(&self, name: &str) -> bool {
        self.args.iter().any(|a| a.name == name && a.provided)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Argument> {
        self.args.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.args.into_iter().map(|a| a.value).collect()
    }
}

// =============================================================================
// Signals and call context
// =============================================================================

/// Feedback set by a capability, before its attachments are contextualized
#[derive(Debug, Clone)]
pub enum PendingFeedback {
    Ready(Feedback),
    Message {
        capability: String,
        severity: Severity,
        message: Message,
    },
}

/// Out-of-band results of a run: at most one response and one feedback
#[derive(Debug, Default)]
pub struct Signals {
    response: Option<Message>,
    feedback: Option<PendingFeedback>,
}

impl Signals {
    pub fn clear(&mut self) {
        self.response = None;
        self.feedback = None;
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn has_feedback(&self) -> bool {
        self.feedback.is_some()
    }

    pub fn take_response(&mut self) -> Option<Message> {
        self.response.take()
    }

    pub fn take_feedback(&mut self) -> Option<PendingFeedback> {
        self.feedback.take()
    }
}

/// What a capability sees of the statement calling it
pub struct CallContext<'a> {
    capability: &'a str,
    statement: &'a str,
    signals: &'a mut Signals,
}

impl<'a> CallContext<'a> {
    pub fn new(capability: &'a str, statement: &'a str, signals: &'a mut Signals) -> Self {
        Self {
            capability,
            statement,
            signals,
        }
    }

    /// Name the capability was called under
    pub fn capability(&self) -> &str {
        self.capability
    }

    /// Source text of the calling statement
    pub fn statement(&self) -> &str {
        self.statement
    }

    /// Answer the user; ends the run after the current statement
    pub fn respond(&mut self, message: Message) {
        self.signals.response = Some(message);
    }

    /// Hand feedback to the model; ends the run after the current statement
    pub fn give_feedback(&mut self, feedback: Feedback) {
        self.signals.feedback = Some(PendingFeedback::Ready(feedback));
    }

    /// Hand a message, possibly carrying attachments, to the model
    pub fn feedback_message(&mut self, severity: Severity, message: Message) {
        self.signals.feedback = Some(PendingFeedback::Message {
            capability: self.capability.to_string(),
            severity,
            message,
        });
    }
}

// =============================================================================
// Capability trait
// =============================================================================

/// A host function callable from generated code
#[async_trait]
pub trait Capability: Send + Sync {
    fn signature(&self) -> &Signature;

    async fn call(
        &self,
        ctx: &mut CallContext<'_>,
        args: Arguments,
    ) -> std::result::Result<Value, Raised>;
}

type SyncFn =
    dyn Fn(&mut CallContext<'_>, Arguments) -> std::result::Result<Value, Raised> + Send + Sync;

/// Capability backed by a synchronous closure
pub struct FnCapability {
    signature: Signature,
    func: Box<SyncFn>,
}

impl FnCapability {
    pub fn new<F>(signature: Signature, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, Arguments) -> std::result::Result<Value, Raised>
            + Send
            + Sync
            + 'static,
    {
        Self {
            signature,
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn call(
        &self,
        ctx: &mut CallContext<'_>,
        args: Arguments,
    ) -> std::result::Result<Value, Raised> {
        (self.func)(ctx, args)
    }
}

type AsyncFn =
    dyn Fn(Arguments) -> BoxFuture<'static, std::result::Result<Value, Raised>> + Send + Sync;

/// Suspending capability backed by an async closure
pub struct AsyncFnCapability {
    signature: Signature,
    func: Box<AsyncFn>,
}

impl AsyncFnCapability {
    /// The signature is marked suspending
    pub fn new<F, Fut>(signature: Signature, func: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, Raised>> + Send + 'static,
    {
        Self {
            signature: signature.suspending(),
            func: Box::new(move |args| func(args).boxed()),
        }
    }
}

#[async_trait]
impl Capability for AsyncFnCapability {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn call(
        &self,
        _ctx: &mut CallContext<'_>,
        args: Arguments,
    ) -> std::result::Result<Value, Raised> {
        (self.func)(args).await
    }
}

/// `respond(text, attachments=[])`: answer the user and end the run
pub struct Respond {
    signature: Signature,
}

impl Respond {
    pub fn new() -> Self {
        Self {
            signature: Signature::new("respond")
                .describe("answer the user and finish")
                .param(Param::new("text", TypeSpec::Str))
                .param(
                    Param::new("attachments", TypeSpec::list(TypeSpec::Any))
                        .with_default(Value::List(Vec::new())),
                )
                .returns(TypeSpec::None),
        }
    }
}

impl Default for Respond {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for Respond {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn call(
        &self,
        ctx: &mut CallContext<'_>,
        args: Arguments,
    ) -> std::result::Result<Value, Raised> {
        self.signature.check(&args)?;
        let mut values = args.into_values().into_iter();
        let text = values.next().unwrap_or_default().to_string();
        let attachments = match values.next() {
            Some(Value::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Attachment(attachment) => attachment,
                    plain => Attachment::new(plain).with_original(false),
                })
                .collect(),
            _ => Vec::new(),
        };
        ctx.respond(Message::new(text).with_attachments(attachments));
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::feedback::FeedbackKind;
    use crate::value::Record;

    fn crop() -> Signature {
        Signature::new("crop")
            .describe("crop an image")
            .param(Param::new("image", TypeSpec::named("Image")))
            .param(Param::new("box", TypeSpec::list(TypeSpec::Int)))
            .param(
                Param::new("padding", TypeSpec::optional(TypeSpec::Int)).with_default(Value::Null),
            )
            .returns(TypeSpec::named("Image"))
    }

    #[test]
    fn test_type_accepts() {
        let image = Value::from(Record::new("Image"));
        assert!(TypeSpec::named("Image").accepts(&image));
        assert!(!TypeSpec::named("Mask").accepts(&image));
        assert!(TypeSpec::named("Image").accepts(&Value::Attachment(Attachment::new(image))));
        assert!(TypeSpec::Number.accepts(&Value::Int(1)));
        assert!(TypeSpec::Number.accepts(&Value::Float(1.5)));
        assert!(!TypeSpec::Int.accepts(&Value::Float(1.5)));
        assert!(TypeSpec::list(TypeSpec::Int).accepts(&Value::List(vec![Value::Int(1)])));
        assert!(!TypeSpec::list(TypeSpec::Int).accepts(&Value::List(vec![Value::from("a")])));
        assert!(TypeSpec::optional(TypeSpec::Str).accepts(&Value::Null));
        assert!(TypeSpec::Union(vec![TypeSpec::Int, TypeSpec::Str]).accepts(&Value::from("a")));
    }

    #[test]
    fn test_render() {
        assert_eq!(
            crop().render(),
            "def crop(image: Image, box: list[int], padding: Optional[int] = None) -> Image  \
             # crop an image"
        );
        let sig = Signature::new("fetch")
            .param(Param::new("url", TypeSpec::Str))
            .returns(TypeSpec::Str)
            .suspending();
        assert_eq!(sig.render(), "async def fetch(url: str) -> str");
    }

    #[test]
    fn test_bind_positional_keyword_default() {
        let call = CallArgs::positional(vec![Value::from("img")])
            .with_keyword("box", Value::List(vec![]));
        let args = crop().bind(call).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args.get("image"), Some(&Value::from("img")));
        assert!(args.is_provided("box"));
        assert!(!args.is_provided("padding"));
        assert_eq!(args.get("padding"), Some(&Value::Null));
    }

    #[test]
    fn test_bind_errors() {
        let too_many = CallArgs::positional(vec![Value::Null; 4]);
        assert!(crop().bind(too_many).is_err_and(|e| e.kind() == ErrorKind::InvalidArgument));

        let missing = CallArgs::positional(vec![Value::Null]);
        assert!(crop()
            .bind(missing)
            .is_err_and(|e| e.message().contains("missing required argument 'box'")));

        let unknown = CallArgs::positional(vec![Value::Null, Value::Null]).with_keyword("zoom", 2);
        assert!(crop().bind(unknown).is_err_and(|e| e.message().contains("'zoom'")));

        let twice = CallArgs::positional(vec![Value::Null, Value::Null]).with_keyword("image", 1);
        assert!(crop().bind(twice).is_err_and(|e| e.message().contains("multiple values")));
    }

    #[test]
    fn test_respond_sets_signal() {
        let respond = Respond::new();
        let mut signals = Signals::default();
        let img = Attachment::new(Record::new("Image"));
        let call = CallArgs::positional(vec![
            Value::from("done"),
            Value::List(vec![Value::Attachment(img.clone()), Value::Int(3)]),
        ]);
        let args = respond.signature().bind(call).unwrap();

        let mut ctx = CallContext::new("respond", "respond('done', [img])", &mut signals);
        let out = tokio_test::block_on(respond.call(&mut ctx, args)).unwrap();
        assert!(out.is_null());

        let message = signals.take_response().unwrap();
        assert_eq!(message.text, "done");
        assert!(message.attachments[0].same_payload(&img));
        assert!(!message.attachments[1].is_original());
        assert!(!signals.has_response());
    }

    #[test]
    fn test_respond_rejects_bare_attachment() {
        let respond = Respond::new();
        let mut signals = Signals::default();
        let img = Attachment::new(Record::new("Image"));
        let call = CallArgs::positional(vec![Value::from("here"), Value::Attachment(img)]);
        let args = respond.signature().bind(call).unwrap();

        let mut ctx = CallContext::new("respond", "respond('here', img)", &mut signals);
        let Err(Raised::Feedback(feedback)) = tokio_test::block_on(respond.call(&mut ctx, args))
        else {
            panic!("expected feedback");
        };
        assert!(matches!(
            &feedback.kind,
            FeedbackKind::InvalidArgumentType { parameter, received, .. }
                if parameter == "attachments" && received == "Image"
        ));
        assert!(!signals.has_response());
    }

    #[test]
    fn test_async_capability_is_suspending() {
        let cap = AsyncFnCapability::new(
            Signature::new("double").param(Param::new("x", TypeSpec::Int)).returns(TypeSpec::Int),
            |args: Arguments| async move {
                let x = args.get("x").and_then(Value::as_int).unwrap_or(0);
                Ok::<_, Raised>(Value::Int(x * 2))
            },
        );
        assert!(cap.signature().suspending);

        let mut signals = Signals::default();
        let mut ctx = CallContext::new("double", "y = await double(4)", &mut signals);
        let args = cap.signature().bind(CallArgs::positional(vec![Value::Int(4)])).unwrap();
        let out = tokio_test::block_on(cap.call(&mut ctx, args)).unwrap();
        assert_eq!(out, Value::Int(8));
    }
}
