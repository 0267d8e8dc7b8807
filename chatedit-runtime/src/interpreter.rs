//! Tree-walking evaluator for parsed statements
//!
//! Runs one statement at a time against a [`Namespace`]. Capability calls
//! receive a [`CallContext`] pointing at the run's [`Signals`]; `print` output
//! is captured into the run's log lines.

use crate::capability::{CallArgs, CallContext, Signals};
use crate::error::{self, Error, Result};
use crate::feedback::Raised;
use crate::namespace::Namespace;
use crate::syntax::{BinaryOp, Expr, Literal, Stmt, Target, TargetSegment, UnaryOp};
use crate::value::{Fields, Segment, Value};
use futures_util::future::{BoxFuture, FutureExt};
use std::cmp::Ordering;
use tracing::debug;

type Eval<T> = std::result::Result<T, Raised>;

/// Functions available without registration
const INTRINSICS: &[&str] = &["print", "copy", "len", "str"];

pub(crate) struct Interpreter<'a> {
    pub namespace: &'a mut Namespace,
    pub signals: &'a mut Signals,
    pub logs: &'a mut Vec<String>,
    /// Source text of the statement being run
    pub statement: &'a str,
}

impl<'a> Interpreter<'a> {
    pub async fn exec(&mut self, stmt: &Stmt) -> Eval<()> {
        match stmt {
            Stmt::Assign { target, value } => {
                let value = self.eval(value).await?;
                self.assign(target, value).await
            }
            Stmt::Delete(target) => self.delete(target).await,
            Stmt::Expr(expr) => self.eval(expr).await.map(|_| ()),
        }
    }

    // =========================================================================
    // Targets
    // =========================================================================

    async fn assign(&mut self, target: &Target, value: Value) -> Eval<()> {
        match target {
            Target::Name(name) => {
                self.namespace.insert(name.clone(), value)?;
                Ok(())
            }
            Target::Path { root, segments } => {
                let path = self.segments(segments).await?;
                self.slot(root)?.set_path(root, &path, value)
            }
        }
    }

    async fn delete(&mut self, target: &Target) -> Eval<()> {
        match target {
            Target::Name(name) => match self.namespace.remove(name) {
                Some(_) => Ok(()),
                None => Err(error::name_not_defined(name).into()),
            },
            Target::Path { root, segments } => {
                let path = self.segments(segments).await?;
                self.slot(root)?.del_path(root, &path)
            }
        }
    }

    async fn segments(&mut self, segments: &[TargetSegment]) -> Eval<Vec<Segment>> {
        let mut path = Vec::with_capacity(segments.len());
        for segment in segments {
            path.push(match segment {
                TargetSegment::Attr(name) => Segment::Attr(name.clone()),
                TargetSegment::Index(expr) => Segment::Item(self.eval(expr).await?),
            });
        }
        Ok(path)
    }

    fn slot(&mut self, root: &str) -> Result<&mut Value> {
        self.namespace
            .get_mut(root)
            .ok_or_else(|| error::name_not_defined(root))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn eval<'b>(&'b mut self, expr: &'b Expr) -> BoxFuture<'b, Eval<Value>> {
        async move {
            match expr {
                Expr::Literal(literal) => Ok(literal_value(literal)),
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item).await?);
                    }
                    Ok(Value::List(values))
                }
                Expr::Dict(entries) => {
                    let mut fields = Fields::new();
                    for (key, value) in entries {
                        let key = match self.eval(key).await? {
                            Value::Str(key) => key,
                            other => {
                                return Err(Error::type_mismatch(format!(
                                    "dict keys must be str, not '{}'",
                                    other.type_name()
                                ))
                                .into())
                            }
                        };
                        let value = self.eval(value).await?;
                        fields.insert(key, value);
                    }
                    Ok(Value::Dict(fields))
                }
                Expr::Name(name) => self.lookup(name),
                Expr::Attr(base, name) => Ok(self.eval(base).await?.get_attr(name)?),
                Expr::Index(base, key) => {
                    let base = self.eval(base).await?;
                    let key = self.eval(key).await?;
                    Ok(base.get_item(&key)?)
                }
                Expr::Call {
                    callee,
                    args,
                    kwargs,
                } => self.call(callee, args, kwargs, false).await,
                Expr::Await(inner) => match inner.as_ref() {
                    Expr::Call {
                        callee,
                        args,
                        kwargs,
                    } => self.call(callee, args, kwargs, true).await,
                    _ => Err(Error::type_mismatch("only capability calls can be awaited").into()),
                },
                Expr::Unary(op, operand) => {
                    let value = self.eval(operand).await?;
                    Ok(unary(*op, value)?)
                }
                Expr::Binary(BinaryOp::And, left, right) => {
                    let left = self.eval(left).await?;
                    if left.is_truthy() {
                        self.eval(right).await
                    } else {
                        Ok(left)
                    }
                }
                Expr::Binary(BinaryOp::Or, left, right) => {
                    let left = self.eval(left).await?;
                    if left.is_truthy() {
                        Ok(left)
                    } else {
                        self.eval(right).await
                    }
                }
                Expr::Binary(op, left, right) => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Ok(binary(*op, left, right)?)
                }
            }
        }
        .boxed()
    }

    fn lookup(&self, name: &str) -> Eval<Value> {
        if let Some(value) = self.namespace.get(name) {
            return Ok(value.clone());
        }
        if self.namespace.is_capability(name) || INTRINSICS.contains(&name) {
            return Err(Error::type_mismatch(format!("'{}' must be called", name)).into());
        }
        Err(error::name_not_defined(name).into())
    }

    async fn call(
        &mut self,
        callee: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        awaited: bool,
    ) -> Eval<Value> {
        let mut call = CallArgs::default();
        for arg in args {
            call.positional.push(self.eval(arg).await?);
        }
        for (name, expr) in kwargs {
            let value = self.eval(expr).await?;
            call.keyword.push((name.clone(), value));
        }

        let Some(capability) = self.namespace.capability(callee).cloned() else {
            if INTRINSICS.contains(&callee) {
                if awaited {
                    return Err(
                        Error::type_mismatch(format!("{}() cannot be awaited", callee)).into(),
                    );
                }
                return self.intrinsic(callee, call);
            }
            return Err(match self.namespace.get(callee) {
                Some(value) => Error::type_mismatch(format!(
                    "'{}' object is not callable",
                    value.type_name()
                )),
                None => error::name_not_defined(callee),
            }
            .into());
        };

        let signature = capability.signature();
        if signature.suspending && !awaited {
            return Err(Error::evaluation_failed(format!(
                "{}() suspends and must be awaited",
                callee
            ))
            .into());
        }
        if !signature.suspending && awaited {
            return Err(Error::type_mismatch(format!(
                "{}() does not suspend and cannot be awaited",
                callee
            ))
            .into());
        }
        let arguments = signature.bind(call)?;

        debug!(capability = callee, awaited, "calling capability");
        let mut ctx = CallContext::new(callee, self.statement, &mut *self.signals);
        capability.call(&mut ctx, arguments).await
    }

    fn intrinsic(&mut self, name: &str, call: CallArgs) -> Eval<Value> {
        if !call.keyword.is_empty() {
            return Err(error::bad_call(name, "takes no keyword arguments").into());
        }
        let mut args = call.positional;
        if name == "print" {
            let line = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            self.logs.push(line);
            return Ok(Value::Null);
        }

        if args.len() != 1 {
            return Err(error::bad_call(
                name,
                format!("takes exactly one argument ({} given)", args.len()),
            )
            .into());
        }
        let value = args.remove(0);
        match name {
            "copy" => Ok(value.deep_copy()),
            "len" => match value.len() {
                Some(len) => Ok(Value::Int(len as i64)),
                None => Err(Error::type_mismatch(format!(
                    "object of type '{}' has no len()",
                    value.type_name()
                ))
                .into()),
            },
            _ => Ok(Value::Str(value.to_string())),
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::None => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(x) => Value::Float(*x),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

/// Operands held in attachments take part through their payload
fn plain(value: Value) -> Value {
    match value {
        Value::Attachment(attachment) => attachment.snapshot(),
        other => other,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    let value = plain(value);
    match (op, &value) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| error::integer_overflow("-")),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(value.clone()),
        (op, _) => {
            let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
            Err(Error::type_mismatch(format!(
                "bad operand type for unary {}: '{}'",
                symbol,
                value.type_name()
            )))
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    let (left, right) = (plain(left), plain(right));
    let symbol = op.to_string();
    let mismatch = || error::unsupported_operand(&symbol, &left.type_name(), &right.type_name());

    match (op, &left, &right) {
        (BinaryOp::Eq, _, _) => Ok(Value::Bool(left == right)),
        (BinaryOp::Ne, _, _) => Ok(Value::Bool(left != right)),
        (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge, _, _) => {
            let ordering = compare(&left, &right).ok_or_else(mismatch)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod,
            Value::Int(a),
            Value::Int(b),
        ) => integer(op, &symbol, *a, *b),
        (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod, _, _) => {
            let (a, b) = number(&left)
                .zip(number(&right))
                .ok_or_else(mismatch)?;
            float(op, a, b)
        }
        _ => Err(mismatch()),
    }
}

fn integer(op: BinaryOp, symbol: &str, a: i64, b: i64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        _ => {
            if b == 0 {
                return Err(error::division_by_zero());
            }
            // result takes the sign of the divisor
            a.checked_rem(b)
                .map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
    };
    result
        .map(Value::Int)
        .ok_or_else(|| error::integer_overflow(symbol))
}

fn float(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err(error::division_by_zero()),
        BinaryOp::Div => a / b,
        _ if b == 0.0 => return Err(error::division_by_zero()),
        _ => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
    };
    Ok(Value::Float(result))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => number(left)?.partial_cmp(&number(right)?),
    }
}
