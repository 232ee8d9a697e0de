//! The compiled node tree.

use crate::context::Context;
use crate::error::Result;
use crate::parser::Parser;
use crate::resolve::FilterExpression;
use crate::value::escape_html;
use std::fmt;

/// A unit of the compiled tree.
///
/// Rendering never mutates the node. A node may push frames onto the context
/// but must pop them again before returning, on error paths too
/// ([`Context::scoped`] does this).
pub trait Node: fmt::Debug + Send + Sync {
    fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()>;
}

/// Builds a node from the text following a block tag's name. Block tags with
/// a body call back into the parser (`parse_until`) to consume it.
pub trait NodeFactory: Send + Sync {
    fn parse(&self, args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>>;
}

impl<F> NodeFactory for F
where
    F: Fn(&str, &mut Parser<'_>) -> Result<Box<dyn Node>> + Send + Sync,
{
    fn parse(&self, args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>> {
        self(args, parser)
    }
}

#[derive(Debug, Default)]
pub struct NodeList {
    nodes: Vec<Box<dyn Node>>,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Box<dyn Node>) {
        self.nodes.push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Node> {
        self.nodes.iter().map(|n| &**n)
    }

    pub fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        for node in &self.nodes {
            node.render(out, ctx)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TextNode {
    text: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Node for TextNode {
    fn render(&self, out: &mut dyn fmt::Write, _ctx: &mut Context) -> Result<()> {
        out.write_str(&self.text)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct VariableNode {
    expr: FilterExpression,
}

impl VariableNode {
    pub fn new(expr: FilterExpression) -> Self {
        Self { expr }
    }
}

impl Node for VariableNode {
    fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        let value = self.expr.resolve(ctx)?;
        if ctx.autoescape() && !value.is_safe() {
            out.write_str(&escape_html(&value.render()))?;
        } else {
            out.write_str(&value.render())?;
        }
        Ok(())
    }
}
