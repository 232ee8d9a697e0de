//! The `loadertags` library: `include`.
//!
//! Included templates are fetched through the engine's template loaders at
//! render time, so the context must carry an engine handle
//! ([`Engine::shared_context`](crate::Engine::shared_context)). Bounding
//! recursive includes is left to the loaders.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::library::TagLibrary;
use crate::node::Node;
use crate::parser::{smart_split, Parser};
use crate::resolve::FilterExpression;
use crate::value::Map;
use std::fmt;
use tracing::debug;

pub const LIBRARY_NAME: &str = "loadertags";

pub fn library() -> TagLibrary {
    TagLibrary::new().tag("include", parse_include)
}

/// `{% include "name" %}` or `{% include var %}`: renders another template
/// against the current context.
#[derive(Debug)]
pub struct IncludeNode {
    name: FilterExpression,
}

impl Node for IncludeNode {
    fn render(&self, out: &mut dyn fmt::Write, ctx: &mut Context) -> Result<()> {
        let value = self.name.resolve(ctx)?;
        let Some(name) = value.as_str().map(str::to_string) else {
            return Err(Error::TemplateNotFound {
                name: value.render(),
            });
        };
        let Some(engine) = ctx.engine().cloned() else {
            debug!(template = %name, "include without an engine on the context");
            return Err(Error::TemplateNotFound { name });
        };
        let Some(template) = engine.load_by_name(&name)? else {
            return Err(Error::TemplateNotFound { name });
        };
        ctx.scoped(Map::new(), |ctx| template.render_to(out, ctx))
    }
}

fn parse_include(args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>> {
    let words = smart_split(args);
    let [name] = words.as_slice() else {
        return Err(parser.error("'include' takes one argument, the template name"));
    };
    Ok(Box::new(IncludeNode {
        name: parser.compile_filter(name)?,
    }))
}
