//! The `defaultfilters` library.

use crate::error::{Error, Result};
use crate::filter::{filter_fn, Argument};
use crate::library::TagLibrary;
use crate::value::{escape_html, title_case, Value};

pub const LIBRARY_NAME: &str = "defaultfilters";

pub fn library() -> TagLibrary {
    TagLibrary::new()
        .filter("upper", filter_fn(Argument::None, |v, _, _| Ok(v.map_str(str::to_uppercase))))
        .filter("lower", filter_fn(Argument::None, |v, _, _| Ok(v.map_str(str::to_lowercase))))
        .filter("capfirst", filter_fn(Argument::None, |v, _, _| Ok(v.map_str(capfirst))))
        .filter("title", filter_fn(Argument::None, |v, _, _| Ok(v.map_str(title_case))))
        .filter("default", filter_fn(Argument::Required, default))
        .filter("length", filter_fn(Argument::None, length))
        .filter("join", filter_fn(Argument::Required, join))
        .filter("first", filter_fn(Argument::None, |v, _, _| Ok(edge(v, false))))
        .filter("last", filter_fn(Argument::None, |v, _, _| Ok(edge(v, true))))
        .filter("add", filter_fn(Argument::Required, add))
        .filter("cut", filter_fn(Argument::Required, cut))
        .filter("escape", filter_fn(Argument::None, |v, _, _| Ok(escape(&v))))
        .filter("safe", filter_fn(Argument::None, |v, _, _| Ok(Value::Safe(v.render()))))
}

fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn default(value: Value, arg: Option<Value>, _autoescape: bool) -> Result<Value> {
    if value.is_truthy() {
        Ok(value)
    } else {
        Ok(arg.unwrap_or_default())
    }
}

fn length(value: Value, _arg: Option<Value>, _autoescape: bool) -> Result<Value> {
    let len = match &value {
        Value::String(s) | Value::Safe(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Null => 0,
        other => {
            return Err(Error::filter(
                "length",
                format!("cannot take the length of a {}", other.kind()),
            ))
        }
    };
    Ok(Value::from(len))
}

fn escape(value: &Value) -> Value {
    match value {
        Value::Safe(_) => value.clone(),
        other => Value::Safe(escape_html(&other.render())),
    }
}

/// Joins items with the separator; with autoescaping on, items are escaped
/// and the result is marked safe.
fn join(value: Value, arg: Option<Value>, autoescape: bool) -> Result<Value> {
    let sep = match arg {
        Some(Value::String(s) | Value::Safe(s)) => s,
        Some(other) => {
            return Err(Error::filter(
                "join",
                format!("separator must be a string, got {}", other.kind()),
            ))
        }
        None => String::new(),
    };
    let Value::List(items) = value else {
        return Err(Error::filter(
            "join",
            format!("expected a list, got {}", value.kind()),
        ));
    };
    let parts: Vec<String> = items
        .iter()
        .map(|item| match (autoescape, item) {
            (true, Value::Safe(s)) => s.clone(),
            (true, other) => escape_html(&other.render()),
            (false, other) => other.render(),
        })
        .collect();
    if autoescape {
        Ok(Value::Safe(parts.join(&sep)))
    } else {
        Ok(Value::String(parts.join(&sep)))
    }
}

fn edge(value: Value, last: bool) -> Value {
    match value {
        Value::List(mut items) => {
            if last {
                items.pop().unwrap_or_default()
            } else if items.is_empty() {
                Value::Null
            } else {
                items.swap_remove(0)
            }
        }
        Value::String(s) | Value::Safe(s) => {
            let c = if last { s.chars().last() } else { s.chars().next() };
            c.map(|c| Value::String(c.to_string())).unwrap_or_default()
        }
        _ => Value::Null,
    }
}

fn add(value: Value, arg: Option<Value>, _autoescape: bool) -> Result<Value> {
    let arg = arg.unwrap_or_default();
    let sum = match (&value, &arg) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(*b)),
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 + b),
        (Value::Float(a), Value::Int(b)) => Value::Float(a + *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Value::List(a), Value::List(b)) => Value::List(a.iter().chain(b).cloned().collect()),
        (a, b) => match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => Value::String(format!("{a}{b}")),
            _ => {
                return Err(Error::filter(
                    "add",
                    format!("cannot add {} and {}", value.kind(), arg.kind()),
                ))
            }
        },
    };
    Ok(sum)
}

fn cut(value: Value, arg: Option<Value>, _autoescape: bool) -> Result<Value> {
    let Some(needle) = arg.as_ref().and_then(Value::as_str) else {
        return Err(Error::filter("cut", "argument must be a string"));
    };
    Ok(value.map_str(|s| s.replace(needle, "")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    fn apply(name: &str, input: Value, arg: Option<Value>) -> Result<Value> {
        let mut registry = crate::library::Registry::new();
        registry.register_library(&library());
        let filter = registry.lookup_filter(name).unwrap();
        filter.apply(input, arg, true)
    }

    #[test]
    fn case_filters_keep_safety() {
        assert_eq!(
            apply("upper", Value::Safe("<b>".into()), None).unwrap(),
            Value::Safe("<B>".into())
        );
        assert!(apply("upper", Value::Safe("x".into()), None).unwrap().is_safe());
        assert_eq!(apply("capfirst", "bob".into(), None).unwrap(), Value::from("Bob"));
    }

    #[test]
    fn add_numbers_strings_and_rejects_mixed() {
        assert_eq!(apply("add", Value::Int(2), Some(Value::Int(3))).unwrap(), Value::Int(5));
        assert_eq!(apply("add", "a".into(), Some("b".into())).unwrap(), Value::from("ab"));
        assert!(matches!(
            apply("add", Value::Int(1), Some("b".into())),
            Err(Error::FilterArgument { .. })
        ));
    }

    #[test]
    fn join_escapes_items_under_autoescape() {
        let items = Value::from(vec!["<a>", "b"]);
        let joined = apply("join", items, Some(", ".into())).unwrap();
        assert_eq!(joined, Value::Safe("&lt;a&gt;, b".into()));
        assert!(apply("join", Value::Int(1), Some(",".into())).is_err());
    }

    #[test]
    fn length_and_edges() {
        assert_eq!(apply("length", "héllo".into(), None).unwrap(), Value::Int(5));
        assert!(apply("length", Value::Int(3), None).is_err());
        let items = Value::from(vec![1, 2, 3]);
        assert_eq!(apply("first", items.clone(), None).unwrap(), Value::Int(1));
        assert_eq!(apply("last", items, None).unwrap(), Value::Int(3));
    }

    #[test]
    fn cut_requires_string() {
        assert_eq!(apply("cut", "a b c".into(), Some(" ".into())).unwrap(), Value::from("abc"));
        assert!(apply("cut", "abc".into(), Some(Value::Int(1))).is_err());
    }
}
