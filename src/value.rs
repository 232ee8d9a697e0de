//! Runtime values and the lookup rules used by dotted-path resolution.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type Map = IndexMap<String, Value>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Text that must not be escaped again on output.
    Safe(String),
    List(Vec<Value>),
    Map(Map),
    Object(Arc<dyn Object>),
}

/// Named access on an opaque host value.
///
/// Properties are tried before methods; a method is a zero-argument callable
/// whose result is substituted for the segment.
pub trait Object: Send + Sync {
    fn type_name(&self) -> &str;

    fn get_property(&self, _name: &str) -> Option<Value> {
        None
    }

    fn call_method(&self, _name: &str) -> Option<Value> {
        None
    }

    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

type Accessor<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;

/// Lookup table for one host type, registered once and shared by every value
/// of that type.
pub struct Accessors<T> {
    type_name: String,
    properties: HashMap<String, Accessor<T>>,
    methods: HashMap<String, Accessor<T>>,
    display: Option<Accessor<T>>,
}

impl<T> Accessors<T> {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: HashMap::new(),
            methods: HashMap::new(),
            display: None,
        }
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.properties.insert(name.into(), Box::new(get));
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        call: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Box::new(call));
        self
    }

    /// How the object renders when written directly to output.
    pub fn display(mut self, show: impl Fn(&T) -> Value + Send + Sync + 'static) -> Self {
        self.display = Some(Box::new(show));
        self
    }
}

struct TypedObject<T> {
    data: T,
    table: Arc<Accessors<T>>,
}

impl<T: Send + Sync> Object for TypedObject<T> {
    fn type_name(&self) -> &str {
        &self.table.type_name
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        self.table.properties.get(name).map(|get| get(&self.data))
    }

    fn call_method(&self, name: &str) -> Option<Value> {
        self.table.methods.get(name).map(|call| call(&self.data))
    }

    fn render(&self) -> String {
        match &self.table.display {
            Some(show) => show(&self.data).render(),
            None => format!("<{}>", self.table.type_name),
        }
    }
}

impl Value {
    /// Wrap host data together with its lookup table.
    pub fn object<T: Send + Sync + 'static>(data: T, table: Arc<Accessors<T>>) -> Value {
        Value::Object(Arc::new(TypedObject { data, table }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Value::Safe(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) | Value::Safe(s) => !s.is_empty(),
            Value::List(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) | Value::Safe(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    /// String form written to output (before escaping).
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) | Value::Safe(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.render()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Object(obj) => obj.render(),
        }
    }

    /// Apply `f` to string content, keeping the safe marker.
    pub fn map_str(&self, f: impl FnOnce(&str) -> String) -> Value {
        match self {
            Value::Safe(s) => Value::Safe(f(s)),
            other => Value::String(f(&other.render())),
        }
    }

    /// Look up one path segment.
    ///
    /// Order: mapping key, integer index into a sequence, named property,
    /// zero-argument method. The first rule that succeeds wins.
    pub fn lookup(&self, segment: &str) -> Option<Value> {
        if let Value::Map(map) = self {
            if let Some(v) = map.get(segment) {
                return Some(v.clone());
            }
        }
        if let (Value::List(items), Ok(idx)) = (self, segment.parse::<usize>()) {
            if let Some(v) = items.get(idx) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.property(segment) {
            return Some(v);
        }
        self.method(segment)
    }

    fn property(&self, name: &str) -> Option<Value> {
        match self {
            Value::List(items) if name == "length" => Some(Value::Int(items.len() as i64)),
            Value::Object(obj) => obj.get_property(name),
            _ => None,
        }
    }

    fn method(&self, name: &str) -> Option<Value> {
        match self {
            Value::String(s) | Value::Safe(s) => string_method(s, name),
            Value::Map(map) => match name {
                "keys" => Some(Value::List(
                    map.keys().map(|k| Value::String(k.clone())).collect(),
                )),
                "values" => Some(Value::List(map.values().cloned().collect())),
                "items" => Some(Value::List(
                    map.iter()
                        .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
                        .collect(),
                )),
                _ => None,
            },
            Value::Object(obj) => obj.call_method(name),
            _ => None,
        }
    }

    /// Membership test used by the `in` operator.
    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            Value::List(items) => items.iter().any(|v| v == needle),
            Value::Map(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
            Value::String(s) | Value::Safe(s) => match needle.as_str() {
                Some(n) => s.contains(n),
                None => s.contains(&needle.render()),
            },
            _ => false,
        }
    }
}

fn string_method(s: &str, name: &str) -> Option<Value> {
    let value = match name {
        "capitalize" => {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => Value::String(first.to_uppercase().chain(chars).collect()),
                None => Value::String(String::new()),
            }
        }
        "isalnum" => Value::Bool(s.chars().all(char::is_alphanumeric)),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isdigit" => Value::Bool(s.chars().all(char::is_numeric)),
        "islower" => Value::Bool(s.to_lowercase() == s),
        "isupper" => Value::Bool(s.to_uppercase() == s),
        "isspace" => Value::Bool(s.trim().is_empty()),
        "istitle" => Value::Bool(!word_starts(s).any(|c| c.is_ascii_lowercase())),
        "lower" => Value::String(s.to_lowercase()),
        "upper" => Value::String(s.to_uppercase()),
        "strip" => Value::String(s.trim().to_string()),
        "splitlines" => Value::List(s.split('\n').map(|l| Value::String(l.into())).collect()),
        "swapcase" => Value::String(
            s.chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect(),
        ),
        "title" => Value::String(upper_word_starts(s)),
        _ => return None,
    };
    Some(value)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters that begin a word.
fn word_starts(s: &str) -> impl Iterator<Item = char> + '_ {
    let mut prev_word = false;
    s.chars().filter(move |&c| {
        let starts = is_word_char(c) && !prev_word;
        prev_word = is_word_char(c);
        starts
    })
}

/// Uppercase the first character of every word and leave the rest as is.
fn upper_word_starts(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_word = false;
    for c in s.chars() {
        if is_word_char(c) && !prev_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_word = is_word_char(c);
    }
    out
}

/// Uppercase the first letter of every word, lowercase the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (String(a) | Safe(a), String(b) | Safe(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Safe(s) => write!(f, "Safe({s:?})"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Object(obj) => write!(f, "Object({})", obj.type_name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct User {
        first: String,
        last: String,
    }

    fn user_table() -> Arc<Accessors<User>> {
        Arc::new(
            Accessors::new("User")
                .property("first", |u: &User| Value::from(u.first.as_str()))
                .method("full_name", |u: &User| {
                    Value::from(format!("{} {}", u.first, u.last))
                })
                .display(|u: &User| Value::from(u.last.as_str())),
        )
    }

    #[test]
    fn mapping_key_then_index() {
        let v = Value::from(json!({"a": {"b": [10, 20]}}));
        let b = v.lookup("a").and_then(|a| a.lookup("b")).unwrap();
        assert_eq!(b.lookup("0"), Some(Value::Int(10)));
        assert_eq!(b.lookup("1"), Some(Value::Int(20)));
        assert_eq!(b.lookup("2"), None);
        assert_eq!(b.lookup("length"), Some(Value::Int(2)));
    }

    #[test]
    fn numeric_key_in_map_wins_over_index_rules() {
        let v = Value::from(json!({"0": "zero"}));
        assert_eq!(v.lookup("0"), Some(Value::from("zero")));
    }

    #[test]
    fn map_key_shadows_builtin_method() {
        let v = Value::from(json!({"items": 3, "x": 1}));
        assert_eq!(v.lookup("items"), Some(Value::Int(3)));
        let v = Value::from(json!({"x": 1}));
        assert_eq!(v.lookup("keys"), Some(Value::from(vec!["x"])));
    }

    #[test]
    fn object_properties_and_methods() {
        let user = Value::object(
            User {
                first: "Ada".into(),
                last: "Lovelace".into(),
            },
            user_table(),
        );
        assert_eq!(user.lookup("first"), Some(Value::from("Ada")));
        assert_eq!(user.lookup("full_name"), Some(Value::from("Ada Lovelace")));
        assert_eq!(user.lookup("missing"), None);
        assert_eq!(user.render(), "Lovelace");
    }

    #[test]
    fn string_methods() {
        let s = Value::from("hello world");
        assert_eq!(s.lookup("upper"), Some(Value::from("HELLO WORLD")));
        assert_eq!(s.lookup("title"), Some(Value::from("Hello World")));
        assert_eq!(s.lookup("capitalize"), Some(Value::from("Hello world")));
        assert_eq!(s.lookup("isalpha"), Some(Value::Bool(false)));
        assert_eq!(Value::from("AbC").lookup("swapcase"), Some(Value::from("aBc")));
    }

    #[test]
    fn title_methods_only_touch_word_starts() {
        let s = Value::from("hELLO wORLD_x 2nd");
        assert_eq!(s.lookup("title"), Some(Value::from("HELLO WORLD_x 2nd")));
        assert_eq!(Value::from("ABC").lookup("istitle"), Some(Value::Bool(true)));
        assert_eq!(Value::from("Hello wORLD").lookup("istitle"), Some(Value::Bool(false)));
        assert_eq!(Value::from("Hello World").lookup("istitle"), Some(Value::Bool(true)));
        assert_eq!(Value::from("").lookup("istitle"), Some(Value::Bool(true)));
    }

    #[test]
    fn rendering_and_truthiness() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::from(vec![1, 2]).render(), "[1, 2]");
        assert_eq!(Value::from(json!({"k": "v"})).render(), "{k: v}");
        assert!(!Value::from("").is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(Value::Safe("a".into()), Value::from("a"));
    }

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
