//! pest grammar for generated code and the builder from parse pairs to the AST

use super::{dedent, BinaryOp, Expr, Literal, Statement, Stmt, Target, TargetSegment, UnaryOp};
use crate::error::{Error, Result};
use crate::value::{Segment, Value};
use lazy_static::lazy_static;
use pest::error::{Error as PestError, LineColLocation};
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use std::fmt;

/// Deepest bracket nesting a program may use
pub const MAX_NESTING: usize = 32;

/// Tallest expression tree a statement may build
pub const MAX_EXPR_DEPTH: usize = 100;

#[derive(pest_derive::Parser)]
#[grammar = "syntax/statement.pest"]
struct StatementParser;

lazy_static! {
    static ref PRATT: PrattParser<Rule> = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op))
        .op(Op::infix(Rule::eq, Assoc::Left)
            | Op::infix(Rule::ne, Assoc::Left)
            | Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left));
}

type Parsed<'i> = std::result::Result<Pairs<'i, Rule>, PestError<Rule>>;

/// An expression with the height of its tree
type Built = Result<(Expr, usize)>;

/// Positional and keyword arguments of a call, with their tallest height
type BuiltArguments = Result<(Vec<Expr>, Vec<(String, Expr)>, usize)>;

/// Dedent and parse source into top-level statements
pub fn parse_program(source: &str) -> Result<Vec<Statement>> {
    let source = dedent(source);
    check_nesting(&source)?;
    let program = top_pair(StatementParser::parse(Rule::program, &source))?;
    program
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(|pair| {
            let text = pair.as_str().to_string();
            Ok(Statement {
                text,
                stmt: statement(pair)?,
            })
        })
        .collect()
}

/// Parse a binding path: `name`, `name.attr`, `name[0]`, `name["key"]`
/// and chains of them
pub fn parse_path(path: &str) -> Result<(String, Vec<Segment>)> {
    let path = top_pair(StatementParser::parse(Rule::path, path.trim()))?;
    let mut inner = path.clone().into_inner();
    let root = child(&mut inner, &path)?.as_str().to_string();
    let mut segments = Vec::new();
    for segment in inner {
        match segment.as_rule() {
            Rule::attr => segments.push(Segment::Attr(attr_name(segment)?)),
            Rule::key => {
                let key = first(segment)?;
                let key = match key.as_rule() {
                    Rule::signed_int => Value::Int(
                        key.as_str()
                            .parse()
                            .map_err(|_| error_at(&key, "index out of range"))?,
                    ),
                    _ => Value::Str(unescape(first(key)?.as_str())),
                };
                segments.push(Segment::Item(key));
            }
            _ => {}
        }
    }
    Ok((root, segments))
}

fn top_pair(parsed: Parsed<'_>) -> Result<Pair<'_, Rule>> {
    parsed
        .map_err(syntax_error)?
        .next()
        .ok_or_else(|| Error::parse_failed("nothing was parsed").with_operation("syntax::parse"))
}

// =============================================================================
// Errors and limits
// =============================================================================

fn error_at(pair: &Pair<Rule>, message: impl fmt::Display) -> Error {
    let (line, _) = pair.as_span().start_pos().line_col();
    Error::parse_failed(format!("line {}: {}", line, message)).with_operation("syntax::parse")
}

fn too_deep(pair: &Pair<Rule>, what: &'static str, max: usize) -> Error {
    let (line, _) = pair.as_span().start_pos().line_col();
    Error::limit_exceeded(what, max)
        .with_operation("syntax::parse")
        .with_context("line", line.to_string())
}

fn syntax_error(err: PestError<Rule>) -> Error {
    let err = err.renamed_rules(describe);
    let line = match err.line_col {
        LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
    };
    Error::parse_failed(format!("line {}: {}", line, err.variant.message()))
        .with_operation("syntax::parse")
}

fn describe(rule: &Rule) -> String {
    let name = match rule {
        Rule::EOI => "end of statement",
        Rule::expr | Rule::operand | Rule::postfix => "expression",
        Rule::target | Rule::ident => "name",
        Rule::del_stmt | Rule::assign_stmt | Rule::aug_stmt | Rule::expr_stmt => "statement",
        Rule::aug_op | Rule::equals => "`=`",
        Rule::attr => "attribute",
        Rule::index | Rule::key => "index",
        Rule::call => "call arguments",
        Rule::keyword_arg => "keyword argument",
        Rule::string | Rule::strings | Rule::path_string => "string",
        Rule::int | Rule::signed_int | Rule::float => "number",
        Rule::not_op => "`not`",
        Rule::neg | Rule::pos => "sign",
        other => return format!("{:?}", other),
    };
    name.to_string()
}

/// Reject bracket nesting past [`MAX_NESTING`] with a flat scan, before the
/// recursive grammar runs.
fn check_nesting(source: &str) -> Result<()> {
    let scan = StatementParser::parse(Rule::brackets, source).map_err(syntax_error)?;
    let mut depth = 0usize;
    for pair in scan.flatten() {
        match pair.as_rule() {
            Rule::open => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(too_deep(&pair, "bracket nesting", MAX_NESTING));
                }
            }
            Rule::close => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Height of a node over children of the given heights
fn node(pair: &Pair<Rule>, heights: impl IntoIterator<Item = usize>) -> Result<usize> {
    let height = heights.into_iter().max().unwrap_or(0) + 1;
    if height > MAX_EXPR_DEPTH {
        return Err(too_deep(pair, "expression depth", MAX_EXPR_DEPTH));
    }
    Ok(height)
}

fn child<'i>(pairs: &mut Pairs<'i, Rule>, parent: &Pair<'i, Rule>) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| error_at(parent, format!("incomplete {}", describe(&parent.as_rule()))))
}

fn first(pair: Pair<Rule>) -> Result<Pair<Rule>> {
    let mut inner = pair.clone().into_inner();
    child(&mut inner, &pair)
}

// =============================================================================
// Statements
// =============================================================================

fn statement(pair: Pair<Rule>) -> Result<Stmt> {
    let mut inner = pair.clone().into_inner();
    match pair.as_rule() {
        Rule::del_stmt => {
            child(&mut inner, &pair)?;
            Ok(Stmt::Delete(target(child(&mut inner, &pair)?)?))
        }
        Rule::assign_stmt => {
            let target = target(child(&mut inner, &pair)?)?;
            let (value, _) = expr(child(&mut inner, &pair)?)?;
            Ok(Stmt::Assign { target, value })
        }
        Rule::aug_stmt => {
            let target = target(child(&mut inner, &pair)?)?;
            let op = aug_op(&child(&mut inner, &pair)?);
            let (value, _) = expr(child(&mut inner, &pair)?)?;
            let current = target_expr(&target);
            Ok(Stmt::Assign {
                target,
                value: Expr::Binary(op, Box::new(current), Box::new(value)),
            })
        }
        _ => Ok(Stmt::Expr(expr(child(&mut inner, &pair)?)?.0)),
    }
}

fn target(pair: Pair<Rule>) -> Result<Target> {
    let mut inner = pair.clone().into_inner();
    let root = child(&mut inner, &pair)?.as_str().to_string();
    let mut segments = Vec::new();
    for segment in inner {
        segments.push(match segment.as_rule() {
            Rule::attr => TargetSegment::Attr(attr_name(segment)?),
            _ => TargetSegment::Index(expr(first(segment)?)?.0),
        });
    }
    if segments.is_empty() {
        Ok(Target::Name(root))
    } else {
        Ok(Target::Path { root, segments })
    }
}

/// The current value of an augmented assignment's target
fn target_expr(target: &Target) -> Expr {
    match target {
        Target::Name(name) => Expr::Name(name.clone()),
        Target::Path { root, segments } => {
            segments
                .iter()
                .fold(Expr::Name(root.clone()), |base, segment| match segment {
                    TargetSegment::Attr(name) => Expr::Attr(Box::new(base), name.clone()),
                    TargetSegment::Index(key) => {
                        Expr::Index(Box::new(base), Box::new(key.clone()))
                    }
                })
        }
    }
}

fn aug_op(pair: &Pair<Rule>) -> BinaryOp {
    match pair.as_str() {
        "+=" => BinaryOp::Add,
        "-=" => BinaryOp::Sub,
        "*=" => BinaryOp::Mul,
        "/=" => BinaryOp::Div,
        _ => BinaryOp::Mod,
    }
}

fn attr_name(pair: Pair<Rule>) -> Result<String> {
    Ok(first(pair)?.as_str().to_string())
}

// =============================================================================
// Expressions
// =============================================================================

fn expr(pair: Pair<Rule>) -> Built {
    check_operators(&pair)?;
    PRATT
        .map_primary(operand)
        .map_prefix(|op, rhs| {
            let (rhs, height) = rhs?;
            let height = node(&op, [height])?;
            Ok((Expr::Unary(UnaryOp::Not, Box::new(rhs)), height))
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, left) = lhs?;
            let (rhs, right) = rhs?;
            let height = node(&op, [left, right])?;
            Ok((Expr::Binary(binary_op(&op)?, Box::new(lhs), Box::new(rhs)), height))
        })
        .parse(pair.into_inner())
}

/// Reject chained comparisons and bound runs of `not` before folding
fn check_operators(pair: &Pair<Rule>) -> Result<()> {
    let mut negations = 0usize;
    let mut compared = false;
    for item in pair.clone().into_inner() {
        match item.as_rule() {
            Rule::not_op => {
                negations += 1;
                if negations > MAX_EXPR_DEPTH {
                    return Err(too_deep(&item, "expression depth", MAX_EXPR_DEPTH));
                }
            }
            Rule::or_op | Rule::and_op => compared = false,
            Rule::eq | Rule::ne | Rule::lt | Rule::le | Rule::gt | Rule::ge => {
                if compared {
                    return Err(error_at(&item, "chained comparisons are not supported"));
                }
                compared = true;
            }
            _ => negations = 0,
        }
    }
    Ok(())
}

fn binary_op(pair: &Pair<Rule>) -> Result<BinaryOp> {
    Ok(match pair.as_rule() {
        Rule::or_op => BinaryOp::Or,
        Rule::and_op => BinaryOp::And,
        Rule::eq => BinaryOp::Eq,
        Rule::ne => BinaryOp::Ne,
        Rule::lt => BinaryOp::Lt,
        Rule::le => BinaryOp::Le,
        Rule::gt => BinaryOp::Gt,
        Rule::ge => BinaryOp::Ge,
        Rule::add => BinaryOp::Add,
        Rule::sub => BinaryOp::Sub,
        Rule::mul => BinaryOp::Mul,
        Rule::div => BinaryOp::Div,
        Rule::rem => BinaryOp::Mod,
        _ => return Err(error_at(pair, format!("unknown operator '{}'", pair.as_str()))),
    })
}

fn operand(pair: Pair<Rule>) -> Built {
    let mut signs = Vec::new();
    let mut built = None;
    for item in pair.clone().into_inner() {
        match item.as_rule() {
            Rule::neg => signs.push((UnaryOp::Neg, item)),
            Rule::pos => signs.push((UnaryOp::Pos, item)),
            Rule::awaited => {
                let mut inner = item.clone().into_inner();
                child(&mut inner, &item)?;
                let (call, height) = postfix(child(&mut inner, &item)?)?;
                let height = node(&item, [height])?;
                built = Some((Expr::Await(Box::new(call)), height));
            }
            _ => built = Some(postfix(item)?),
        }
    }
    let (mut value, mut height) = built.ok_or_else(|| error_at(&pair, "expected expression"))?;
    for (op, sign) in signs.into_iter().rev() {
        height = node(&sign, [height])?;
        value = Expr::Unary(op, Box::new(value));
    }
    Ok((value, height))
}

fn postfix(pair: Pair<Rule>) -> Built {
    let mut inner = pair.clone().into_inner();
    let (mut value, mut height) = primary(child(&mut inner, &pair)?)?;
    for suffix in inner {
        match suffix.as_rule() {
            Rule::attr => {
                height = node(&suffix, [height])?;
                value = Expr::Attr(Box::new(value), attr_name(suffix)?);
            }
            Rule::index => {
                let (key, key_height) = expr(first(suffix.clone())?)?;
                height = node(&suffix, [height, key_height])?;
                value = Expr::Index(Box::new(value), Box::new(key));
            }
            _ => {
                let Expr::Name(callee) = value else {
                    return Err(error_at(
                        &suffix,
                        "only capabilities can be called; method calls are not supported",
                    ));
                };
                let (args, kwargs, args_height) = arguments(suffix.clone())?;
                height = node(&suffix, [height, args_height])?;
                value = Expr::Call {
                    callee,
                    args,
                    kwargs,
                };
            }
        }
    }
    Ok((value, height))
}

fn arguments(pair: Pair<Rule>) -> BuiltArguments {
    let mut args = Vec::new();
    let mut kwargs: Vec<(String, Expr)> = Vec::new();
    let mut height = 0;
    for argument in pair.into_inner() {
        if argument.as_rule() == Rule::keyword_arg {
            let mut inner = argument.clone().into_inner();
            let name = child(&mut inner, &argument)?.as_str().to_string();
            if kwargs.iter().any(|(existing, _)| *existing == name) {
                return Err(error_at(&argument, format!("keyword argument repeated: {}", name)));
            }
            child(&mut inner, &argument)?;
            let (value, value_height) = expr(child(&mut inner, &argument)?)?;
            height = height.max(value_height);
            kwargs.push((name, value));
        } else {
            if !kwargs.is_empty() {
                return Err(error_at(&argument, "positional argument follows keyword argument"));
            }
            let (value, value_height) = expr(argument)?;
            height = height.max(value_height);
            args.push(value);
        }
    }
    Ok((args, kwargs, height))
}

fn primary(pair: Pair<Rule>) -> Built {
    let literal = |literal| -> Built { Ok((Expr::Literal(literal), 1)) };
    match pair.as_rule() {
        Rule::none => literal(Literal::None),
        Rule::true_lit => literal(Literal::Bool(true)),
        Rule::false_lit => literal(Literal::Bool(false)),
        Rule::int => {
            let int = pair.as_str().replace('_', "").parse().map_err(|_| {
                error_at(&pair, format!("integer literal '{}' is too large", pair.as_str()))
            })?;
            literal(Literal::Int(int))
        }
        Rule::float => {
            let float = pair
                .as_str()
                .replace('_', "")
                .parse()
                .map_err(|_| error_at(&pair, format!("invalid number '{}'", pair.as_str())))?;
            literal(Literal::Float(float))
        }
        Rule::strings => {
            let mut text = String::new();
            for string in pair.into_inner() {
                text.push_str(&unescape(first(string)?.as_str()));
            }
            literal(Literal::Str(text))
        }
        Rule::ident => Ok((Expr::Name(pair.as_str().to_string()), 1)),
        Rule::list => {
            let mut items = Vec::new();
            let mut heights = Vec::new();
            for item in pair.clone().into_inner() {
                let (item, height) = expr(item)?;
                items.push(item);
                heights.push(height);
            }
            Ok((Expr::List(items), node(&pair, heights)?))
        }
        Rule::dict => {
            let mut entries = Vec::new();
            let mut heights = Vec::new();
            for entry in pair.clone().into_inner() {
                let mut inner = entry.clone().into_inner();
                let (key, key_height) = expr(child(&mut inner, &entry)?)?;
                let (value, value_height) = expr(child(&mut inner, &entry)?)?;
                entries.push((key, value));
                heights.extend([key_height, value_height]);
            }
            Ok((Expr::Dict(entries), node(&pair, heights)?))
        }
        Rule::group => expr(first(pair)?),
        _ => Err(error_at(&pair, format!("unexpected '{}'", pair.as_str()))),
    }
}

/// Resolve backslash escapes; unknown escapes keep their backslash
fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some('0') => text.push('\0'),
            Some(c @ ('\\' | '\'' | '"')) => text.push(c),
            Some('\n') => {}
            Some(other) => {
                text.push('\\');
                text.push(other);
            }
            None => text.push('\\'),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn single(source: &str) -> Stmt {
        let mut program = parse_program(source).unwrap();
        assert_eq!(program.len(), 1, "{:?}", program);
        program.remove(0).stmt
    }

    fn value_of(source: &str) -> Expr {
        match single(source) {
            Stmt::Assign { value, .. } | Stmt::Expr(value) => value,
            other => panic!("no value in {:?}", other),
        }
    }

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_string()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Int(i)))
    }

    #[test]
    fn test_statement_texts() {
        let program = parse_program(
            "
            x = 1; y = 2  # two on one line
            data = {
                'a': [1, 2],
            }

            respond(str(x + y))
            ",
        )
        .unwrap();
        let texts: Vec<&str> = program.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "x = 1",
                "y = 2",
                "data = {\n    'a': [1, 2],\n}",
                "respond(str(x + y))"
            ]
        );
    }

    #[test]
    fn test_empty_and_comment_only() {
        assert!(parse_program("").unwrap().is_empty());
        assert!(parse_program("  # nothing\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            single("1 + 2 * 3"),
            Stmt::Expr(Expr::Binary(
                BinaryOp::Add,
                int(1),
                Box::new(Expr::Binary(BinaryOp::Mul, int(2), int(3)))
            ))
        );
        assert_eq!(
            single("not a == b or c"),
            Stmt::Expr(Expr::Binary(
                BinaryOp::Or,
                Box::new(Expr::Unary(
                    UnaryOp::Not,
                    Box::new(Expr::Binary(BinaryOp::Eq, name("a"), name("b")))
                )),
                name("c")
            ))
        );
        assert_eq!(
            single("1 - 2 - 3"),
            Stmt::Expr(Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, int(1), int(2))),
                int(3)
            ))
        );
        assert_eq!(
            single("-x * 2"),
            Stmt::Expr(Expr::Binary(
                BinaryOp::Mul,
                Box::new(Expr::Unary(UnaryOp::Neg, name("x"))),
                int(2)
            ))
        );
    }

    #[test]
    fn test_assign_targets() {
        assert_eq!(
            single("img.layers[0] = 3"),
            Stmt::Assign {
                target: Target::Path {
                    root: "img".into(),
                    segments: vec![
                        TargetSegment::Attr("layers".into()),
                        TargetSegment::Index(Expr::Literal(Literal::Int(0))),
                    ],
                },
                value: Expr::Literal(Literal::Int(3)),
            }
        );
        assert_eq!(
            single("del img"),
            Stmt::Delete(Target::Name("img".into()))
        );
    }

    #[test]
    fn test_augmented_assignment() {
        assert_eq!(
            single("total += 2"),
            Stmt::Assign {
                target: Target::Name("total".into()),
                value: Expr::Binary(BinaryOp::Add, name("total"), int(2)),
            }
        );
        assert_eq!(
            single("img.width *= 2"),
            Stmt::Assign {
                target: Target::Path {
                    root: "img".into(),
                    segments: vec![TargetSegment::Attr("width".into())],
                },
                value: Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Attr(name("img"), "width".into())),
                    int(2)
                ),
            }
        );
    }

    #[test]
    fn test_call_arguments() {
        assert_eq!(
            single("await crop(img, box=[1], pad=None)"),
            Stmt::Expr(Expr::Await(Box::new(Expr::Call {
                callee: "crop".into(),
                args: vec![Expr::Name("img".into())],
                kwargs: vec![
                    ("box".into(), Expr::List(vec![Expr::Literal(Literal::Int(1))])),
                    ("pad".into(), Expr::Literal(Literal::None)),
                ],
            })))
        );
        assert_eq!(
            value_of("f(a == b)"),
            Expr::Call {
                callee: "f".into(),
                args: vec![Expr::Binary(BinaryOp::Eq, name("a"), name("b"))],
                kwargs: vec![],
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "x = ",
            "1 = x",
            "f(a=1, 2)",
            "f(a=1, a=2)",
            "img.resize(2)",
            "x = y = 1",
            "a < b < c",
            "x = 1 2",
            "x = [1, 2",
            "if x: y",
            "x = 'open",
            "x = $",
            "99999999999999999999",
        ] {
            assert!(
                parse_program(source).is_err_and(|e| e.kind() == ErrorKind::ParseFailed),
                "accepted: {}",
                source
            );
        }
    }

    #[test]
    fn test_error_line() {
        let err = parse_program("x = 1\ny = (2\nz = 3").unwrap_err();
        assert!(err.message().starts_with("line "), "{}", err.message());
        assert_eq!(err.operation(), "syntax::parse");
    }

    #[test]
    fn test_literal_keywords() {
        assert_eq!(
            single("[None, null, True, false]"),
            Stmt::Expr(Expr::List(vec![
                Expr::Literal(Literal::None),
                Expr::Literal(Literal::None),
                Expr::Literal(Literal::Bool(true)),
                Expr::Literal(Literal::Bool(false)),
            ]))
        );
        assert_eq!(value_of("Nonesuch"), Expr::Name("Nonesuch".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            single("[1_000, 2.5, 1e3, 3.0e-2]"),
            Stmt::Expr(Expr::List(vec![
                Expr::Literal(Literal::Int(1000)),
                Expr::Literal(Literal::Float(2.5)),
                Expr::Literal(Literal::Float(1000.0)),
                Expr::Literal(Literal::Float(0.03)),
            ]))
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            value_of(r"s = 'it\'s # not a comment'  # comment"),
            Expr::Literal(Literal::Str("it's # not a comment".into()))
        );
        assert_eq!(
            value_of(r#""a\tb\n" 'c\d'"#),
            Expr::Literal(Literal::Str("a\tb\nc\\d".into()))
        );
    }

    #[test]
    fn test_newlines_inside_brackets() {
        let program = parse_program("x = [\n  1,  # one\n  2,\n]\ny = f(\n  a=1,\n)").unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let depth = 20_000;
        let source = format!("x = {}1{}", "[".repeat(depth), "]".repeat(depth));
        let err = parse_program(&source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);

        let source = format!("x = {}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse_program(&source).is_ok());
    }

    #[test]
    fn test_long_operator_chains_rejected() {
        for source in [
            format!("x = {}1", "-".repeat(20_000)),
            format!("x = {}y", "not ".repeat(20_000)),
            format!("x = y{}", ".a".repeat(20_000)),
            format!("x = 1{}", " + 1".repeat(20_000)),
        ] {
            assert!(parse_program(&source).is_err_and(|e| e.kind() == ErrorKind::LimitExceeded));
        }
        assert!(parse_program(&format!("x = 1{}", " + 1".repeat(50))).is_ok());
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(
            parse_path(r#"image0.layers[0]["na\"me"][-1]"#).unwrap(),
            (
                "image0".to_string(),
                vec![
                    Segment::Attr("layers".into()),
                    Segment::Item(Value::Int(0)),
                    Segment::Item(Value::Str("na\"me".into())),
                    Segment::Item(Value::Int(-1)),
                ]
            )
        );
        assert!(parse_path("image0.").is_err());
        assert!(parse_path("0abc").is_err());
        assert!(parse_path("a[1").is_err());
    }
}
