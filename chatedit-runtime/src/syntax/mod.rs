//! # Statement language
//!
//! Generated code is a small Python-flavoured language: one statement per
//! line (or separated by `;`), assignments to names, attributes and items,
//! `del`, and expressions built from literals, lists, dicts, attribute
//! access, indexing, capability calls, `await`, arithmetic, comparisons and
//! boolean operators.
//!
//! ```rust
//! use chatedit_runtime::syntax::parse_program;
//!
//! let program = parse_program("
//!     image1 = crop(image0, box=[0, 0, 10, 10])
//!     respond('done', [image1])
//! ").unwrap();
//! assert_eq!(program.len(), 2);
//! assert_eq!(program[1].text, "respond('done', [image1])");
//! ```

mod parser;

pub use parser::{parse_path, parse_program, MAX_EXPR_DEPTH, MAX_NESTING};

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// Call of a capability or intrinsic by name
    Call {
        callee: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Await(Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetSegment {
    Attr(String),
    Index(Expr),
}

/// Left-hand side of an assignment or `del`
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Path {
        root: String,
        segments: Vec<TargetSegment>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { target: Target, value: Expr },
    Delete(Target),
    Expr(Expr),
}

/// A parsed top-level statement with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub stmt: Stmt,
}

impl Stmt {
    /// Wrap every call of a suspending capability that is not already
    /// awaited in an `await`.
    pub fn await_suspending(&mut self, suspending: &BTreeSet<String>) {
        match self {
            Stmt::Assign { target, value } => {
                target.await_suspending(suspending);
                await_calls(value, suspending);
            }
            Stmt::Delete(target) => target.await_suspending(suspending),
            Stmt::Expr(expr) => await_calls(expr, suspending),
        }
    }
}

impl Target {
    fn await_suspending(&mut self, suspending: &BTreeSet<String>) {
        if let Target::Path { segments, .. } = self {
            for segment in segments {
                if let TargetSegment::Index(expr) = segment {
                    await_calls(expr, suspending);
                }
            }
        }
    }
}

fn await_calls(expr: &mut Expr, suspending: &BTreeSet<String>) {
    match expr {
        Expr::Await(inner) => match inner.as_mut() {
            Expr::Call { args, kwargs, .. } => {
                args.iter_mut().for_each(|a| await_calls(a, suspending));
                kwargs.iter_mut().for_each(|(_, v)| await_calls(v, suspending));
            }
            other => await_calls(other, suspending),
        },
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            args.iter_mut().for_each(|a| await_calls(a, suspending));
            kwargs.iter_mut().for_each(|(_, v)| await_calls(v, suspending));
            if suspending.contains(callee.as_str()) {
                let call = std::mem::replace(expr, Expr::Literal(Literal::None));
                *expr = Expr::Await(Box::new(call));
            }
        }
        Expr::List(items) => items.iter_mut().for_each(|i| await_calls(i, suspending)),
        Expr::Dict(entries) => entries.iter_mut().for_each(|(k, v)| {
            await_calls(k, suspending);
            await_calls(v, suspending);
        }),
        Expr::Attr(base, _) => await_calls(base, suspending),
        Expr::Index(base, key) => {
            await_calls(base, suspending);
            await_calls(key, suspending);
        }
        Expr::Unary(_, operand) => await_calls(operand, suspending),
        Expr::Binary(_, left, right) => {
            await_calls(left, suspending);
            await_calls(right, suspending);
        }
        Expr::Literal(_) | Expr::Name(_) => {}
    }
}

/// Strip the indentation common to every non-blank line
pub fn dedent(source: &str) -> String {
    let indent_of = |line: &str| line.len() - line.trim_start_matches([' ', '\t']).len();
    let indent = source
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(indent_of)
        .min()
        .unwrap_or(0);
    source
        .lines()
        .map(|l| if l.trim().is_empty() { "" } else { &l[indent..] })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether a statement binds a value: it parses to a single assignment,
/// plain or augmented. `==` and keyword arguments do not count.
pub fn binds_result(statement: &str) -> bool {
    matches!(
        parse_program(statement).as_deref(),
        Ok([Statement {
            stmt: Stmt::Assign { .. },
            ..
        }])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("    a = 1\n\n      b = 2\n"), "a = 1\n\n  b = 2");
        assert_eq!(dedent("x"), "x");
        assert_eq!(dedent("\t\tx\n\t\ty"), "x\ny");
    }

    #[test]
    fn test_binds_result() {
        assert!(binds_result("x = f(1)"));
        assert!(binds_result("out[0] = f(1)"));
        assert!(binds_result("img.width = f(1)"));
        assert!(binds_result("total += f(1)"));
        assert!(!binds_result("f(1)"));
        assert!(!binds_result("f(x=1)"));
        assert!(!binds_result("f(1) == 2"));
        assert!(!binds_result("await f({'a': 1})"));
        assert!(!binds_result("x = 'unterminated"));
    }

    #[test]
    fn test_await_suspending() {
        let suspending: BTreeSet<String> = ["fetch".to_string()].into();
        let mut program = parse_program("x = fetch(fetch(1))\ny = await fetch(2)").unwrap();
        for statement in &mut program {
            statement.stmt.await_suspending(&suspending);
        }

        let Stmt::Assign { value, .. } = &program[0].stmt else {
            panic!("expected assignment");
        };
        let Expr::Await(outer) = value else {
            panic!("outer call not awaited: {:?}", value);
        };
        let Expr::Call { args, .. } = outer.as_ref() else {
            panic!("expected call");
        };
        assert!(matches!(args[0], Expr::Await(_)));

        let Stmt::Assign { value, .. } = &program[1].stmt else {
            panic!("expected assignment");
        };
        let Expr::Await(inner) = value else {
            panic!("expected await");
        };
        assert!(matches!(inner.as_ref(), Expr::Call { .. }));
    }
}
