use thiserror::Error;

/// Errors surfaced while compiling or rendering a template.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed tag or filter syntax, unknown tag/filter, unclosed block.
    #[error("syntax error on line {line}: {message}")]
    TagSyntax { line: usize, message: String },

    /// An unresolved variable while the context is in strict mode.
    #[error("variable '{path}' not found in context")]
    VariableNotInContext { path: String },

    /// A filter received an argument of the wrong shape or arity.
    #[error("filter '{filter}': {message}")]
    FilterArgument { filter: String, message: String },

    /// No configured loader could produce the requested template.
    #[error("template '{name}' could not be loaded by any loader")]
    TemplateNotFound { name: String },

    #[error("failed to write template output")]
    Output(#[from] std::fmt::Error),
}

impl Error {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Error::TagSyntax {
            line,
            message: message.into(),
        }
    }

    pub fn filter(filter: &str, message: impl Into<String>) -> Self {
        Error::FilterArgument {
            filter: filter.to_string(),
            message: message.into(),
        }
    }

    /// True for errors that belong to the syntax class: bad template source, or
    /// a template identity that could not be established at all.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::TagSyntax { .. } | Error::TemplateNotFound { .. })
    }

    /// Source line of a syntax error, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::TagSyntax { line, .. } => Some(*line),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
