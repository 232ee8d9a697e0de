//! Variable and filter-chain resolution.
//!
//! A filter expression is `path|filter1:arg|filter2...`. The path is either a
//! literal (quoted string or number) or a dotted lookup such as `a.b.0.c`;
//! each segment is resolved with [`Value::lookup`]. Filters apply in chain
//! order, each receiving the previous filter's output.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::filter::{Argument, Filter};
use crate::library::Registry;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Literal(Value),
    Path(Vec<String>),
}

impl Variable {
    pub fn parse(text: &str) -> std::result::Result<Variable, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty variable".to_string());
        }
        if let Some(lit) = parse_string_literal(text) {
            return lit.map(|s| Variable::Literal(Value::Safe(s)));
        }
        if let Some(num) = parse_number(text) {
            return Ok(Variable::Literal(num));
        }

        let segments: Vec<String> = text.split('.').map(str::to_string).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(format!("empty segment in variable '{text}'"));
            }
            if let Some(c) = segment.chars().find(|c| !(c.is_alphanumeric() || *c == '_')) {
                return Err(format!("unexpected character '{c}' in variable '{text}'"));
            }
        }
        Ok(Variable::Path(segments))
    }

    /// `None` when any segment fails to resolve.
    pub fn resolve(&self, ctx: &Context) -> Option<Value> {
        match self {
            Variable::Literal(v) => Some(v.clone()),
            Variable::Path(segments) => {
                let (first, rest) = segments.split_first()?;
                let mut value = ctx.lookup(first)?.clone();
                for segment in rest {
                    value = value.lookup(segment)?;
                }
                Some(value)
            }
        }
    }

    fn resolve_checked(&self, ctx: &Context) -> Result<Value> {
        match self.resolve(ctx) {
            Some(v) => Ok(v),
            None if ctx.is_strict() => Err(Error::VariableNotInContext {
                path: self.to_string(),
            }),
            None => Ok(Value::Null),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Literal(v) => write!(f, "{v}"),
            Variable::Path(segments) => f.write_str(&segments.join(".")),
        }
    }
}

struct FilterCall {
    name: String,
    filter: Arc<dyn Filter>,
    arg: Option<Variable>,
}

pub struct FilterExpression {
    source: String,
    variable: Variable,
    filters: Vec<FilterCall>,
}

impl FilterExpression {
    /// Compile `text`, looking filters up in `registry`. Syntax errors are
    /// attributed to `line`.
    pub fn parse(text: &str, registry: &Registry, line: usize) -> Result<Self> {
        let mut pieces = split_outside_quotes(text, '|').into_iter();
        let head = pieces.next().unwrap_or_default();
        let variable = Variable::parse(head).map_err(|msg| Error::syntax(line, msg))?;

        let mut filters = Vec::new();
        for piece in pieces {
            let (name, arg) = match split_once_outside_quotes(piece, ':') {
                Some((name, arg)) => (name.trim(), Some(arg)),
                None => (piece.trim(), None),
            };
            if !is_identifier(name) {
                return Err(Error::syntax(
                    line,
                    format!("invalid filter name '{name}' in '{}'", text.trim()),
                ));
            }
            let filter = registry
                .lookup_filter(name)
                .ok_or_else(|| Error::syntax(line, format!("unknown filter '{name}'")))?;
            let arg = match arg {
                Some(arg) => Some(Variable::parse(arg).map_err(|msg| {
                    Error::syntax(line, format!("bad argument to filter '{name}': {msg}"))
                })?),
                None => None,
            };
            filters.push(FilterCall {
                name: name.to_string(),
                filter,
                arg,
            });
        }

        Ok(Self {
            source: text.trim().to_string(),
            variable,
            filters,
        })
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.name.as_str())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolve the base variable and run the filter chain.
    ///
    /// An unresolved path yields [`Value::Null`], or
    /// [`Error::VariableNotInContext`] when the context is strict.
    pub fn resolve(&self, ctx: &Context) -> Result<Value> {
        let mut value = self.variable.resolve_checked(ctx)?;
        for call in &self.filters {
            let arg = match &call.arg {
                Some(var) => Some(var.resolve_checked(ctx)?),
                None => None,
            };
            match (call.filter.argument(), &arg) {
                (Argument::None, Some(_)) => {
                    return Err(Error::filter(&call.name, "takes no argument"));
                }
                (Argument::Required, None) => {
                    return Err(Error::filter(&call.name, "requires an argument"));
                }
                _ => {}
            }
            value = call.filter.apply(value, arg, ctx.autoescape())?;
        }
        Ok(value)
    }
}

impl fmt::Debug for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterExpression")
            .field("source", &self.source)
            .field("variable", &self.variable)
            .field("filters", &self.filter_names().collect::<Vec<_>>())
            .finish()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// `Some(Ok(..))` for a well-formed quoted string, `Some(Err(..))` for an
/// unterminated one, `None` if `text` is not quoted at all.
fn parse_string_literal(text: &str) -> Option<std::result::Result<String, String>> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let mut out = String::new();
    let mut chars = text[1..].char_indices();
    while let Some((idx, c)) = chars.next() {
        if c == quote {
            let rest = &text[1 + idx + c.len_utf8()..];
            if !rest.is_empty() {
                return Some(Err(format!("unexpected text after string literal: '{rest}'")));
            }
            return Some(Ok(out));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, esc)) => out.push(esc),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Some(Err(format!("unterminated string literal {text}")))
}

fn parse_number(text: &str) -> Option<Value> {
    let first = text.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    text.parse::<f64>().ok().map(Value::Float)
}

/// Split on `sep`, ignoring separators inside quoted strings.
pub(crate) fn split_outside_quotes(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        } else if c == sep {
            parts.push(&text[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn split_once_outside_quotes(text: &str, sep: char) -> Option<(&str, &str)> {
    let parts = split_outside_quotes(text, sep);
    if parts.len() < 2 {
        return None;
    }
    let head = parts[0];
    Some((head, &text[head.len() + sep.len_utf8()..]))
}
