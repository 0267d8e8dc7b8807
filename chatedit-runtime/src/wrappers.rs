//! # Capability wrappers
//!
//! Decorators around a [`Capability`] that check its arguments or its call
//! site and turn violations into typed feedback. They compose through
//! [`CapabilityExt`] and behave the same for sync and suspending
//! capabilities:
//!
//! ```rust
//! use chatedit_runtime::{
//!     Capability, CapabilityExt, FnCapability, Param, Signature, TypeSpec, Value,
//! };
//!
//! let sqrt = FnCapability::new(
//!     Signature::new("sqrt")
//!         .param(Param::new("x", TypeSpec::Number))
//!         .returns(TypeSpec::Float),
//!     |_, args| Ok(Value::Float(args.get("x").and_then(Value::as_float).unwrap_or(0.0).sqrt())),
//! )
//! .validated()
//! .require_assignment()
//! .catch_unexpected()
//! .shared();
//! assert_eq!(sqrt.signature().name, "sqrt");
//! ```

use crate::capability::{Arguments, CallContext, Capability, Signature};
use crate::feedback::{Failure, Feedback, Raised};
use crate::syntax;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

type CallResult = std::result::Result<Value, Raised>;

/// Reject arguments that do not match their declared types
pub struct Validated<C> {
    inner: C,
}

#[async_trait]
impl<C: Capability> Capability for Validated<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, args: Arguments) -> CallResult {
        self.inner.signature().check(&args)?;
        self.inner.call(ctx, args).await
    }
}

/// Insist that the calling statement binds the result
pub struct RequireAssignment<C> {
    inner: C,
}

#[async_trait]
impl<C: Capability> Capability for RequireAssignment<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, args: Arguments) -> CallResult {
        if !syntax::binds_result(ctx.statement()) {
            let signature = self.inner.signature();
            return Err(
                Feedback::unassigned_return_value(&signature.name, &signature.returns).into(),
            );
        }
        self.inner.call(ctx, args).await
    }
}

/// Demote any non-feedback failure to `unexpected_error`
pub struct CatchUnexpected<C> {
    inner: C,
}

#[async_trait]
impl<C: Capability> Capability for CatchUnexpected<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, args: Arguments) -> CallResult {
        match self.inner.call(ctx, args).await {
            Err(Raised::Error(err)) => {
                let capability = &self.inner.signature().name;
                debug!(capability = %capability, error = %err, "capability failed");
                Err(Feedback::unexpected_error(Failure::from_error(&err)).into())
            }
            other => other,
        }
    }
}

/// Deep-copy arguments before the call so the capability never touches the
/// caller's objects. An empty parameter list copies every argument.
pub struct CopyArguments<C> {
    inner: C,
    params: Vec<String>,
}

#[async_trait]
impl<C: Capability> Capability for CopyArguments<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, mut args: Arguments) -> CallResult {
        for arg in args.iter_mut() {
            if self.params.is_empty() || self.params.contains(&arg.name) {
                arg.value = arg.value.deep_copy();
            }
        }
        self.inner.call(ctx, args).await
    }
}

/// Reject empty lists for the named parameters
pub struct NonEmptyLists<C> {
    inner: C,
    params: Vec<String>,
}

#[async_trait]
impl<C: Capability> Capability for NonEmptyLists<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, args: Arguments) -> CallResult {
        let empty: Vec<String> = args
            .iter()
            .filter(|a| self.params.contains(&a.name))
            .filter(|a| matches!(&a.value, Value::List(items) if items.is_empty()))
            .map(|a| a.name.clone())
            .collect();
        if !empty.is_empty() {
            return Err(Feedback::empty_list_parameters(&self.inner.signature().name, empty).into());
        }
        self.inner.call(ctx, args).await
    }
}

/// Require the named list parameters to have equal lengths
pub struct MatchedLengths<C> {
    inner: C,
    params: Vec<String>,
}

#[async_trait]
impl<C: Capability> Capability for MatchedLengths<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, args: Arguments) -> CallResult {
        let (names, lengths): (Vec<String>, Vec<usize>) = args
            .iter()
            .filter(|a| self.params.contains(&a.name))
            .filter_map(|a| a.value.as_list().map(|items| (a.name.clone(), items.len())))
            .unzip();
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Err(Feedback::mismatched_list_parameters(
                &self.inner.signature().name,
                names,
                lengths,
            )
            .into());
        }
        self.inner.call(ctx, args).await
    }
}

/// Require at least one optional parameter to be given a non-`None` value
pub struct AnyOptional<C> {
    inner: C,
}

#[async_trait]
impl<C: Capability> Capability for AnyOptional<C> {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, ctx: &mut CallContext<'_>, args: Arguments) -> CallResult {
        let signature = self.inner.signature();
        let optional: Vec<String> = signature
            .params
            .iter()
            .filter(|p| p.is_optional())
            .map(|p| p.name.clone())
            .collect();
        let any_given = args
            .iter()
            .any(|a| optional.contains(&a.name) && a.provided && !a.value.is_null());
        if !optional.is_empty() && !any_given {
            return Err(Feedback::missing_optional_parameters(&signature.name, optional).into());
        }
        self.inner.call(ctx, args).await
    }
}

/// Wrapper combinators available on every capability
pub trait CapabilityExt: Capability + Sized + 'static {
    fn validated(self) -> Validated<Self> {
        Validated { inner: self }
    }

    fn require_assignment(self) -> RequireAssignment<Self> {
        RequireAssignment { inner: self }
    }

    fn catch_unexpected(self) -> CatchUnexpected<Self> {
        CatchUnexpected { inner: self }
    }

    fn copy_arguments(self, params: &[&str]) -> CopyArguments<Self> {
        CopyArguments {
            inner: self,
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn non_empty_lists(self, params: &[&str]) -> NonEmptyLists<Self> {
        NonEmptyLists {
            inner: self,
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn matched_lengths(self, params: &[&str]) -> MatchedLengths<Self> {
        MatchedLengths {
            inner: self,
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn any_optional(self) -> AnyOptional<Self> {
        AnyOptional { inner: self }
    }

    /// Erase into a shareable trait object for [`Namespace::register`](crate::Namespace::register)
    fn shared(self) -> Arc<dyn Capability> {
        Arc::new(self)
    }
}

impl<C: Capability + 'static> CapabilityExt for C {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;
    use crate::capability::{CallArgs, FnCapability, Param, Signals, TypeSpec};
    use crate::error::Error;
    use crate::feedback::FeedbackKind;
    use crate::value::Record;

    fn call(capability: &dyn Capability, statement: &str, call: CallArgs) -> CallResult {
        let args = capability.signature().bind(call).map_err(Raised::from)?;
        let mut signals = Signals::default();
        let mut ctx = CallContext::new(&capability.signature().name, statement, &mut signals);
        tokio_test::block_on(capability.call(&mut ctx, args))
    }

    fn feedback_kind(result: CallResult) -> FeedbackKind {
        match result {
            Err(Raised::Feedback(feedback)) => feedback.kind,
            other => panic!("expected feedback, got {:?}", other),
        }
    }

    fn brighten() -> FnCapability {
        FnCapability::new(
            Signature::new("brighten")
                .param(Param::new("image", TypeSpec::named("Image")))
                .param(Param::new("amount", TypeSpec::Number))
                .returns(TypeSpec::named("Image")),
            |_, args| Ok(args.get("image").cloned().unwrap_or_default()),
        )
    }

    fn image() -> Value {
        Value::Attachment(Attachment::new(Record::new("Image").with_field("level", 1)))
    }

    #[test]
    fn test_validated_rejects_wrong_type() {
        let cap = brighten().validated();
        let kind = feedback_kind(call(
            &cap,
            "x = brighten(3, 1)",
            CallArgs::positional(vec![Value::Int(3), Value::Int(1)]),
        ));
        assert_eq!(
            kind,
            FeedbackKind::InvalidArgumentType {
                capability: "brighten".into(),
                parameter: "image".into(),
                expected: "Image".into(),
                received: "int".into(),
            }
        );

        assert!(call(
            &cap,
            "x = brighten(img, 0.5)",
            CallArgs::positional(vec![image(), Value::Float(0.5)]),
        )
        .is_ok());
    }

    #[test]
    fn test_require_assignment() {
        let cap = brighten().require_assignment();
        let args = || CallArgs::positional(vec![image(), Value::Int(1)]);

        let kind = feedback_kind(call(&cap, "brighten(image0, 1)", args()));
        assert!(matches!(
            kind,
            FeedbackKind::UnassignedReturnValue { ref capability, .. } if capability == "brighten"
        ));

        assert!(call(&cap, "image1 = brighten(image0, 1)", args()).is_ok());
        assert!(call(&cap, "out[0] = brighten(image0, 1)", args()).is_ok());
        assert!(matches!(
            feedback_kind(call(&cap, "brighten(image0, 1) == image0", args())),
            FeedbackKind::UnassignedReturnValue { .. }
        ));
    }

    #[test]
    fn test_catch_unexpected() {
        let failing = FnCapability::new(Signature::new("explode"), |_, _| {
            Err(Error::capability_failed("explode", "boom").into())
        })
        .catch_unexpected();
        match feedback_kind(call(&failing, "explode()", CallArgs::default())) {
            FeedbackKind::UnexpectedError { failure } => assert!(failure.message.contains("boom")),
            other => panic!("unexpected kind {:?}", other),
        }

        let talking = FnCapability::new(Signature::new("talk"), |_, _| {
            Err(Feedback::incomplete_cycle().into())
        })
        .catch_unexpected();
        assert_eq!(
            feedback_kind(call(&talking, "talk()", CallArgs::default())),
            FeedbackKind::IncompleteCycle
        );
    }

    #[test]
    fn test_copy_arguments_protects_caller() {
        let original = image();
        let cap = FnCapability::new(
            Signature::new("scribble").param(Param::new("image", TypeSpec::Any)),
            |_, args| {
                let image = args.get("image").cloned().unwrap_or_default();
                if let Value::Attachment(attachment) = &image {
                    attachment.set_attr("image", "level", Value::Int(99))?;
                }
                Ok(image)
            },
        )
        .copy_arguments(&["image"]);

        let args = CallArgs::positional(vec![original.clone()]);
        let out = call(&cap, "x = scribble(img)", args).unwrap();
        assert_eq!(original.get_attr("level").unwrap(), Value::Int(1));
        assert_eq!(out.get_attr("level").unwrap(), Value::Int(99));
        assert!(!out.as_attachment().unwrap().is_original());
    }

    fn blend() -> FnCapability {
        FnCapability::new(
            Signature::new("blend")
                .param(Param::new("images", TypeSpec::list(TypeSpec::Any)))
                .param(Param::new("weights", TypeSpec::list(TypeSpec::Number))),
            |_, _| Ok(Value::Null),
        )
    }

    #[test]
    fn test_non_empty_lists() {
        let cap = blend().non_empty_lists(&["images", "weights"]);
        let kind = feedback_kind(call(
            &cap,
            "x = blend([], [])",
            CallArgs::positional(vec![Value::List(vec![]), Value::List(vec![])]),
        ));
        assert_eq!(
            kind,
            FeedbackKind::EmptyListParameters {
                capability: "blend".into(),
                parameters: vec!["images".into(), "weights".into()],
            }
        );
    }

    #[test]
    fn test_matched_lengths() {
        let cap = blend().matched_lengths(&["images", "weights"]);
        let kind = feedback_kind(call(
            &cap,
            "x = blend([a, b], [1])",
            CallArgs::positional(vec![
                Value::List(vec![Value::Null, Value::Null]),
                Value::List(vec![Value::Int(1)]),
            ]),
        ));
        assert!(matches!(
            kind,
            FeedbackKind::MismatchedListParameters { ref lengths, .. } if lengths == &vec![2, 1]
        ));

        assert!(call(
            &cap,
            "x = blend([a], [1])",
            CallArgs::positional(vec![
                Value::List(vec![Value::Null]),
                Value::List(vec![Value::Int(1)]),
            ]),
        )
        .is_ok());
    }

    #[test]
    fn test_any_optional() {
        let cap = FnCapability::new(
            Signature::new("resize")
                .param(
                    Param::new("width", TypeSpec::optional(TypeSpec::Int))
                        .with_default(Value::Null),
                )
                .param(
                    Param::new("height", TypeSpec::optional(TypeSpec::Int))
                        .with_default(Value::Null),
                ),
            |_, _| Ok(Value::Null),
        )
        .any_optional();

        assert!(matches!(
            feedback_kind(call(&cap, "resize()", CallArgs::default())),
            FeedbackKind::MissingOptionalParameters { .. }
        ));
        let args = CallArgs::default().with_keyword("height", 3);
        assert!(call(&cap, "resize(height=3)", args).is_ok());
    }
}
