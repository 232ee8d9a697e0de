use crate::engine::Engine;
use crate::value::{Map, Value};
use std::sync::Arc;

/// Runtime variable scope stack consulted while rendering.
///
/// Lookups search frames from the most recently pushed to the oldest. Frames
/// are pushed and popped in strict stack order; the root frame is never
/// removed.
#[derive(Debug, Clone)]
pub struct Context {
    scopes: Vec<Map>,
    autoescape: bool,
    strict: bool,
    engine: Option<Arc<Engine>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Lenient context with autoescaping on.
    pub fn new() -> Self {
        Self {
            scopes: vec![Map::new()],
            autoescape: true,
            strict: false,
            engine: None,
        }
    }

    pub fn from_map(root: Map) -> Self {
        Self {
            scopes: vec![root],
            ..Self::new()
        }
    }

    /// Build a context whose root frame is the given JSON object. Non-object
    /// JSON yields an empty root frame.
    pub fn from_json(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Map(map) => Self::from_map(map),
            _ => Self::new(),
        }
    }

    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    pub fn set_autoescape(&mut self, on: bool) {
        self.autoescape = on;
    }

    /// Whether unresolved variables are errors instead of empty values.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Engine used by tags that load other templates (`include`).
    pub fn engine(&self) -> Option<&Arc<Engine>> {
        self.engine.as_ref()
    }

    pub fn set_engine(&mut self, engine: Arc<Engine>) {
        self.engine = Some(engine);
    }

    /// Bind `name` in the innermost frame.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value.into());
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push(&mut self) {
        self.scopes.push(Map::new());
    }

    pub fn push_frame(&mut self, frame: Map) {
        self.scopes.push(frame);
    }

    /// Pop the innermost frame. Returns `None` at the root frame.
    pub fn pop(&mut self) -> Option<Map> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Number of frames, including the root.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Run `f` with `frame` pushed; the frame is popped afterwards whatever
    /// `f` returns.
    pub fn scoped<R>(&mut self, frame: Map, f: impl FnOnce(&mut Context) -> R) -> R {
        let depth = self.scopes.len();
        self.scopes.push(frame);
        let result = f(self);
        self.scopes.truncate(depth);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_frame_wins() {
        let mut ctx = Context::new();
        ctx.insert("x", "outer");
        ctx.push();
        ctx.insert("x", "inner");
        assert_eq!(ctx.lookup("x"), Some(&Value::from("inner")));
        ctx.pop();
        assert_eq!(ctx.lookup("x"), Some(&Value::from("outer")));
    }

    #[test]
    fn root_frame_is_never_popped() {
        let mut ctx = Context::new();
        assert!(ctx.pop().is_none());
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn scoped_pops_on_error() {
        let mut ctx = Context::new();
        let mut frame = Map::new();
        frame.insert("tmp".into(), Value::Int(1));
        let result: Result<(), &str> = ctx.scoped(frame, |ctx| {
            assert!(ctx.lookup("tmp").is_some());
            ctx.push();
            Err("boom")
        });
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 1);
        assert!(ctx.lookup("tmp").is_none());
    }

    #[test]
    fn from_json_keeps_document_key_order() {
        let ctx = Context::from_json(serde_json::json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}}));
        let Some(Value::Map(mid)) = ctx.lookup("mid") else {
            panic!("expected a map");
        };
        assert_eq!(mid.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(Value::from(serde_json::json!({"z": 1, "a": 2})).render(), "{z: 1, a: 2}");
    }

    #[test]
    fn from_json_object_root() {
        let ctx = Context::from_json(serde_json::json!({"name": "bob"}));
        assert_eq!(ctx.lookup("name"), Some(&Value::from("bob")));
        assert!(Context::from_json(serde_json::json!([1])).lookup("0").is_none());
    }
}
