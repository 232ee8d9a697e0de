//! The `defaulttags` library: `with`, `if`, `for` and `comment`.

use crate::context::Context;
use crate::error::Result;
use crate::library::TagLibrary;
use crate::node::{Node, NodeList};
use crate::parser::{smart_split, Parser};
use crate::resolve::FilterExpression;
use crate::value::{Map, Value};
use std::fmt;
use tracing::debug;

pub const LIBRARY_NAME: &str = "defaulttags";

pub fn library() -> TagLibrary {
    TagLibrary::new()
        .tag("with", parse_with)
        .tag("if", parse_if)
        .tag("for", parse_for)
        .tag("comment", parse_comment)
}

fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

// ── with ──

/// `{% with value as name %}` or `{% with a=x b=y %}`: binds names for the
/// duration of the body.
#[derive(Debug)]
pub struct WithNode {
    bindings: Vec<(String, FilterExpression)>,
    body: NodeList,
}

impl Node for WithNode {
    fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        let mut frame = Map::new();
        for (name, expr) in &self.bindings {
            frame.insert(name.clone(), expr.resolve(ctx)?);
        }
        ctx.scoped(frame, |ctx| self.body.render(out, ctx))
    }
}

fn parse_with(args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    let words = smart_split(args);
    let bindings = match words.as_slice() {
        [] => return Err(parser.error("'with' expects 'value as name' or 'name=value'")),
        [value, kw, name] if kw == "as" => {
            if !is_name(name) {
                return Err(parser.error(format!("'with' cannot bind to '{name}'")));
            }
            vec![(name.clone(), parser.compile_filter(value)?)]
        }
        words => {
            let mut bindings = Vec::with_capacity(words.len());
            for word in words {
                let Some((name, value)) = word.split_once('=') else {
                    return Err(parser.error(format!(
                        "'with' expects 'value as name' or 'name=value', got '{word}'"
                    )));
                };
                if !is_name(name) {
                    return Err(parser.error(format!("'with' cannot bind to '{name}'")));
                }
                bindings.push((name.to_string(), parser.compile_filter(value)?));
            }
            bindings
        }
    };
    let (body, _) = parser.parse_until(&["endwith"])?;
    Ok(Box::new(WithNode { bindings, body }))
}

// ── if ──

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    NotEq,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LogicOp {
    And,
    Or,
}

#[derive(Debug)]
enum Condition {
    Operand(FilterExpression),
    Not(Box<Condition>),
    Compare(Box<Condition>, CmpOp, Box<Condition>),
    Logic(Box<Condition>, LogicOp, Box<Condition>),
}

impl Condition {
    fn eval(&self, ctx: &Context) -> Result<Value> {
        match self {
            Condition::Operand(expr) => expr.resolve(ctx),
            Condition::Not(inner) => Ok(Value::Bool(!inner.eval(ctx)?.is_truthy())),
            Condition::Logic(lhs, op, rhs) => {
                let l = lhs.eval(ctx)?.is_truthy();
                // short-circuit
                match (op, l) {
                    (LogicOp::And, false) => Ok(Value::Bool(false)),
                    (LogicOp::Or, true) => Ok(Value::Bool(true)),
                    _ => Ok(Value::Bool(rhs.eval(ctx)?.is_truthy())),
                }
            }
            Condition::Compare(lhs, op, rhs) => {
                let l = lhs.eval(ctx)?;
                let r = rhs.eval(ctx)?;
                let result = match op {
                    CmpOp::Eq => l == r,
                    CmpOp::NotEq => l != r,
                    CmpOp::In => r.contains(&l),
                    CmpOp::NotIn => !r.contains(&l),
                };
                Ok(Value::Bool(result))
            }
        }
    }
}

/// Precedence climbing over the words of an `if`/`elif` tag:
/// `or` < `and` < `not` < comparisons.
struct ConditionParser<'p, 'a> {
    words: Vec<String>,
    pos: usize,
    parser: &'p Parser<'a>,
}

impl ConditionParser<'_, '_> {
    fn peek(&self, n: usize) -> Option<&str> {
        self.words.get(self.pos + n).map(String::as_str)
    }

    fn parse(mut self) -> Result<Condition> {
        if self.words.is_empty() {
            return Err(self.parser.error("'if' requires a condition"));
        }
        let cond = self.parse_or()?;
        if let Some(extra) = self.peek(0) {
            return Err(self.parser.error(format!("unexpected '{extra}' in condition")));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Condition> {
        let mut lhs = self.parse_and()?;
        while self.peek(0) == Some("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Condition::Logic(Box::new(lhs), LogicOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Condition> {
        let mut lhs = self.parse_not()?;
        while self.peek(0) == Some("and") {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = Condition::Logic(Box::new(lhs), LogicOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Condition> {
        if self.peek(0) == Some("not") {
            self.pos += 1;
            return Ok(Condition::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Condition> {
        let lhs = self.parse_operand()?;
        let op = match (self.peek(0), self.peek(1)) {
            (Some("=="), _) => Some((CmpOp::Eq, 1)),
            (Some("!="), _) => Some((CmpOp::NotEq, 1)),
            (Some("in"), _) => Some((CmpOp::In, 1)),
            (Some("not"), Some("in")) => Some((CmpOp::NotIn, 2)),
            _ => None,
        };
        let Some((op, width)) = op else {
            return Ok(lhs);
        };
        self.pos += width;
        let rhs = self.parse_operand()?;
        Ok(Condition::Compare(Box::new(lhs), op, Box::new(rhs)))
    }

    fn parse_operand(&mut self) -> Result<Condition> {
        match self.peek(0) {
            None => Err(self.parser.error("condition ends unexpectedly")),
            Some(word @ ("and" | "or" | "not" | "in" | "==" | "!=")) => Err(self
                .parser
                .error(format!("expected a value in condition, found '{word}'"))),
            Some(word) => {
                let expr = self.parser.compile_filter(word)?;
                self.pos += 1;
                Ok(Condition::Operand(expr))
            }
        }
    }
}

fn parse_condition(args: &str, parser: &Parser<'_>) -> Result<Condition> {
    ConditionParser {
        words: smart_split(args),
        pos: 0,
        parser,
    }
    .parse()
}

/// Renders the first branch whose condition is truthy, else the `else` body.
#[derive(Debug)]
pub struct IfNode {
    branches: Vec<(Condition, NodeList)>,
    else_body: Option<NodeList>,
}

impl Node for IfNode {
    fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        for (cond, body) in &self.branches {
            if cond.eval(ctx)?.is_truthy() {
                return body.render(out, ctx);
            }
        }
        match &self.else_body {
            Some(body) => body.render(out, ctx),
            None => Ok(()),
        }
    }
}

fn parse_if(args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    let mut branches = Vec::new();
    let mut condition = parse_condition(args, parser)?;
    loop {
        let (body, end) = parser.parse_until(&["elif", "else", "endif"])?;
        branches.push((condition, body));
        let (tag, rest) = end.split_tag();
        match tag {
            "elif" => condition = parse_condition(rest, parser)?,
            "else" => {
                if !rest.is_empty() {
                    return Err(parser.error("'else' takes no arguments"));
                }
                let (else_body, _) = parser.parse_until(&["endif"])?;
                return Ok(Box::new(IfNode {
                    branches,
                    else_body: Some(else_body),
                }));
            }
            _ => {
                return Ok(Box::new(IfNode {
                    branches,
                    else_body: None,
                }))
            }
        }
    }
}

// ── for ──

/// `{% for x in seq [reversed] %}...{% empty %}...{% endfor %}`.
///
/// Each iteration runs in its own frame holding the loop targets and a
/// `forloop` map (`counter`, `counter0`, `revcounter`, `revcounter0`,
/// `first`, `last`, `parentloop`).
#[derive(Debug)]
pub struct ForNode {
    targets: Vec<String>,
    iterable: FilterExpression,
    reversed: bool,
    body: NodeList,
    empty: Option<NodeList>,
}

impl ForNode {
    fn items(&self, value: Value) -> Vec<Value> {
        match value {
            Value::List(items) => items,
            Value::Map(map) if self.targets.len() > 1 => map
                .into_iter()
                .map(|(k, v)| Value::List(vec![Value::String(k), v]))
                .collect(),
            Value::Map(map) => map.into_keys().map(Value::String).collect(),
            Value::String(s) | Value::Safe(s) => {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            }
            Value::Null => Vec::new(),
            other => {
                debug!(kind = other.kind(), "for loop over non-iterable value");
                Vec::new()
            }
        }
    }

    fn bind(&self, frame: &mut Map, item: Value) {
        if let [target] = self.targets.as_slice() {
            frame.insert(target.clone(), item);
            return;
        }
        let parts = match item {
            Value::List(parts) => parts,
            other => vec![other],
        };
        for (idx, target) in self.targets.iter().enumerate() {
            frame.insert(target.clone(), parts.get(idx).cloned().unwrap_or_default());
        }
    }
}

fn loop_info(index: usize, len: usize, parent: Value) -> Value {
    let mut info = Map::new();
    info.insert("counter".into(), Value::from(index + 1));
    info.insert("counter0".into(), Value::from(index));
    info.insert("revcounter".into(), Value::from(len - index));
    info.insert("revcounter0".into(), Value::from(len - index - 1));
    info.insert("first".into(), Value::Bool(index == 0));
    info.insert("last".into(), Value::Bool(index + 1 == len));
    info.insert("parentloop".into(), parent);
    Value::Map(info)
}

impl Node for ForNode {
    fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        let mut items = self.items(self.iterable.resolve(ctx)?);
        if self.reversed {
            items.reverse();
        }
        if items.is_empty() {
            return match &self.empty {
                Some(body) => body.render(out, ctx),
                None => Ok(()),
            };
        }

        let parent = ctx.lookup("forloop").cloned().unwrap_or_default();
        let len = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let mut frame = Map::new();
            frame.insert("forloop".into(), loop_info(index, len, parent.clone()));
            self.bind(&mut frame, item);
            ctx.scoped(frame, |ctx| self.body.render(out, ctx))?;
        }
        Ok(())
    }
}

fn parse_for(args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    let words = smart_split(args);
    let usage = || format!("'for' statements should use the format 'for x in y': for {args}");
    let Some(in_pos) = words.iter().position(|w| w == "in") else {
        return Err(parser.error(usage()));
    };
    let (reversed, iterable) = match &words[in_pos + 1..] {
        [iterable] => (false, iterable),
        [iterable, kw] if kw == "reversed" => (true, iterable),
        _ => return Err(parser.error(usage())),
    };

    let targets: Vec<String> = words[..in_pos]
        .join(" ")
        .split(',')
        .map(|t| t.trim().to_string())
        .collect();
    if targets.iter().any(|t| !is_name(t)) {
        return Err(parser.error(format!("'for' tag received invalid loop variables: {args}")));
    }

    let iterable = parser.compile_filter(iterable)?;
    let (body, end) = parser.parse_until(&["empty", "endfor"])?;
    let empty = match end.tag_name() {
        Some("empty") => Some(parser.parse_until(&["endfor"])?.0),
        _ => None,
    };

    Ok(Box::new(ForNode {
        targets,
        iterable,
        reversed,
        body,
        empty,
    }))
}

// ── comment ──

#[derive(Debug)]
pub struct CommentNode;

impl Node for CommentNode {
    fn render(&self, _out: &mut dyn fmt::Write, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }
}

fn parse_comment(_args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    parser.skip_past("endcomment")?;
    Ok(Box::new(CommentNode))
}
