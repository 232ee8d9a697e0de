use crate::context::Context;
use crate::error::Result;
use crate::node::NodeList;
use crate::parser::compile;
use crate::library::Registry;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A compiled template: a name plus its root node list. Immutable once
/// built; rendering only touches the context passed in.
#[derive(Debug)]
pub struct Template {
    name: String,
    nodes: NodeList,
}

impl Template {
    pub fn compile(
        source: &str,
        name: impl Into<String>,
        registry: &Registry,
        trim_blocks: bool,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            nodes: compile(source, registry, trim_blocks)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    pub fn render(&self, ctx: &mut Context) -> Result<String> {
        let mut out = String::new();
        self.render_to(&mut out, ctx)?;
        Ok(out)
    }

    /// Render into an existing sink. On error the sink contents are
    /// unspecified.
    pub fn render_to(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        self.nodes.render(out, ctx)
    }
}

/// A template identity whose compiled content can be replaced in place.
///
/// Clones share the identity: after [`MutableTemplate::set_content`] every
/// holder renders the new content. Replacing content while another thread is
/// rendering is serialized by the inner lock.
#[derive(Debug, Clone)]
pub struct MutableTemplate {
    inner: Arc<RwLock<Template>>,
}

impl MutableTemplate {
    pub fn new(template: Template) -> Self {
        Self {
            inner: Arc::new(RwLock::new(template)),
        }
    }

    pub fn name(&self) -> String {
        self.read(|t| t.name.clone())
    }

    /// Recompile `source` and swap it in. On a syntax error the previous
    /// content stays in place.
    pub fn set_content(&self, source: &str, registry: &Registry, trim_blocks: bool) -> Result<()> {
        let nodes = compile(source, registry, trim_blocks)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.nodes = nodes;
        Ok(())
    }

    pub fn render(&self, ctx: &mut Context) -> Result<String> {
        self.read(|t| t.render(ctx))
    }

    pub fn render_to(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        self.read(|t| t.render_to(out, ctx))
    }

    /// Whether both handles refer to the same template identity.
    pub fn same_identity(&self, other: &MutableTemplate) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn read<R>(&self, f: impl FnOnce(&Template) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}
