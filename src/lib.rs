//! templet: a Django-style text template engine with pluggable tag and
//! filter libraries.
//!
//! Pipeline:
//! - [`lexer`] splits template text into text, `{{ variable }}`,
//!   `{% block %}` and `{# comment #}` tokens, tagging each with its line.
//! - [`parser`] turns tokens into a [`NodeList`], handing every block tag to
//!   the factory registered for its name in the [`Registry`].
//! - Rendering walks the node tree against a [`Context`] scope stack;
//!   variables resolve through dotted paths and filter chains ([`resolve`]).
//!
//! An [`Engine`] owns the registry, the template loaders and library
//! resolution. The bundled `defaulttags` (`with`, `if`, `for`, `comment`),
//! `loadertags` (`include`) and `defaultfilters` libraries are loaded by
//! [`Engine::load_default_libraries`].
//!
//! ```
//! use templet::{Context, Engine};
//!
//! let engine = Engine::with_defaults();
//! let template = engine.new_template("Hello {{ name|upper }}!", "greeting").unwrap();
//!
//! let mut ctx = Context::new();
//! ctx.insert("name", "world");
//! assert_eq!(template.render(&mut ctx).unwrap(), "Hello WORLD!");
//! ```
//!
//! Unresolved variables render empty unless the context is strict, in which
//! case they raise [`Error::VariableNotInContext`].

pub mod context;
pub mod defaultfilters;
pub mod defaulttags;
pub mod engine;
pub mod error;
pub mod filter;
pub mod lexer;
pub mod library;
pub mod loader;
pub mod loadertags;
pub mod node;
pub mod parser;
pub mod plugin;
pub mod resolve;
pub mod template;
pub mod value;

pub use context::Context;
pub use engine::{builtin_resolver, Engine, EngineConfig};
pub use error::{Error, Result};
pub use filter::{filter_fn, Argument, Filter};
pub use lexer::{tokenize, Lexer, Token, TokenKind};
pub use library::{Registry, TagLibrary};
pub use loader::{FileSystemLoader, InMemoryLoader, TemplateLoader};
pub use node::{Node, NodeFactory, NodeList};
pub use parser::{smart_split, Parser};
pub use plugin::{LibraryResolver, PluginDirResolver, PluginVersion, StaticResolver};
pub use resolve::{FilterExpression, Variable};
pub use template::{MutableTemplate, Template};
pub use value::{Accessors, Map, Object, Value};

/// Compile and render `source` once with the default libraries.
pub fn render_str(source: &str, ctx: &mut Context) -> Result<String> {
    Engine::with_defaults()
        .new_template(source, "<string>")?
        .render(ctx)
}
