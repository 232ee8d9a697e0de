use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};
use crate::library::Registry;
use crate::node::{NodeList, TextNode, VariableNode};
use crate::resolve::FilterExpression;
use std::collections::VecDeque;
use tracing::trace;

/// Token stream → node tree.
///
/// There is no fixed grammar for block tags: each block token is handed to
/// the factory registered under its tag name, and factories with a body call
/// back into [`Parser::parse_until`] to consume it.
pub struct Parser<'a> {
    tokens: VecDeque<Token>,
    registry: &'a Registry,
    // Block tags whose factories are currently running, with their lines.
    open_tags: Vec<(String, usize)>,
    last_line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, registry: &'a Registry) -> Self {
        Self {
            tokens: tokens.into(),
            registry,
            open_tags: Vec::new(),
            last_line: 1,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// Parse to end of input.
    pub fn parse(&mut self) -> Result<NodeList> {
        let (nodes, _) = self.parse_inner(&[])?;
        Ok(nodes)
    }

    /// Parse until a block tag named in `stop`. The stop token is consumed and
    /// returned so the caller can tell which marker ended the body. Reaching
    /// end of input first is an unclosed-tag error.
    pub fn parse_until(&mut self, stop: &[&str]) -> Result<(NodeList, Token)> {
        match self.parse_inner(stop)? {
            (nodes, Some(token)) => Ok((nodes, token)),
            (_, None) => Err(self.unclosed(stop)),
        }
    }

    /// Discard tokens up to and including the block tag `end`.
    pub fn skip_past(&mut self, end: &str) -> Result<()> {
        while let Some(token) = self.tokens.pop_front() {
            self.last_line = token.line;
            if token.tag_name() == Some(end) {
                return Ok(());
            }
        }
        Err(self.unclosed(&[end]))
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.pop_front()?;
        self.last_line = token.line;
        Some(token)
    }

    pub fn peek_token(&self) -> Option<&Token> {
        self.tokens.front()
    }

    pub fn prepend_token(&mut self, token: Token) {
        self.tokens.push_front(token);
    }

    pub fn has_tokens(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Line of the block tag whose factory is running, else of the last token.
    pub fn current_line(&self) -> usize {
        self.open_tags
            .last()
            .map(|(_, line)| *line)
            .unwrap_or(self.last_line)
    }

    /// Compile a filter expression appearing in the current tag's arguments.
    pub fn compile_filter(&self, text: &str) -> Result<FilterExpression> {
        FilterExpression::parse(text, self.registry, self.current_line())
    }

    /// Syntax error attributed to the current tag.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(self.current_line(), message)
    }

    fn unclosed(&self, expected: &[&str]) -> Error {
        let expected = expected.join("', '");
        match self.open_tags.last() {
            Some((name, line)) => Error::syntax(
                *line,
                format!("unclosed tag '{name}'; expected one of '{expected}'"),
            ),
            None => Error::syntax(
                self.last_line,
                format!("unexpected end of template; expected one of '{expected}'"),
            ),
        }
    }

    fn parse_inner(&mut self, stop: &[&str]) -> Result<(NodeList, Option<Token>)> {
        let mut nodes = NodeList::new();
        while let Some(token) = self.tokens.pop_front() {
            self.last_line = token.line;
            match token.kind {
                TokenKind::Text => nodes.push(Box::new(TextNode::new(token.content))),
                TokenKind::Comment => {}
                TokenKind::Variable => {
                    if token.content.is_empty() {
                        return Err(Error::syntax(token.line, "empty variable tag"));
                    }
                    let expr = FilterExpression::parse(&token.content, self.registry, token.line)?;
                    nodes.push(Box::new(VariableNode::new(expr)));
                }
                TokenKind::Block => {
                    let (name, args) = token.split_tag();
                    if name.is_empty() {
                        return Err(Error::syntax(token.line, "empty block tag"));
                    }
                    if stop.contains(&name) {
                        return Ok((nodes, Some(token)));
                    }
                    let registry = self.registry;
                    let Some(factory) = registry.lookup_tag(name) else {
                        // A stray end marker inside an open block closes the wrong tag.
                        if name.starts_with("end") && !self.open_tags.is_empty() {
                            return Err(self.unclosed(stop));
                        }
                        return Err(Error::syntax(
                            token.line,
                            format!("invalid block tag '{name}'"),
                        ));
                    };
                    trace!(tag = name, line = token.line, "dispatching block tag");
                    self.open_tags.push((name.to_string(), token.line));
                    let node = factory.parse(args, self);
                    self.open_tags.pop();
                    nodes.push(node?);
                }
            }
        }
        Ok((nodes, None))
    }
}

/// Split tag arguments on whitespace, keeping quoted strings (with their
/// quotes) together: `a "b c" d` → `["a", "\"b c\"", "d"]`.
pub fn smart_split(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            if c == '"' || c == '\'' {
                quote = Some(c);
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Tokenize and parse `source` against `registry`.
pub fn compile(source: &str, registry: &Registry, trim_blocks: bool) -> Result<NodeList> {
    let tokens = crate::lexer::Lexer::new(source)
        .trim_blocks(trim_blocks)
        .tokenize();
    Parser::new(tokens, registry).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::node::Node;
    use crate::library::TagLibrary;

    #[derive(Debug)]
    struct Wrap {
        body: NodeList,
    }

    impl Node for Wrap {
        fn render(&self, out: &mut dyn std::fmt::Write, ctx: &mut Context) -> Result<()> {
            out.write_str("[")?;
            self.body.render(out, ctx)?;
            out.write_str("]")?;
            Ok(())
        }
    }

    fn parse_wrap(args: &str, parser: &mut Parser<'_>) -> Result<Box<dyn crate::node::Node>> {
        if !args.is_empty() {
            return Err(parser.error("'wrap' takes no arguments"));
        }
        let (body, _) = parser.parse_until(&["endwrap"])?;
        Ok(Box::new(Wrap { body }))
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_library(&TagLibrary::new().tag("wrap", parse_wrap));
        registry
    }

    fn render(source: &str) -> Result<String> {
        let nodes = compile(source, &registry(), false)?;
        let mut out = String::new();
        nodes.render(&mut out, &mut Context::new())?;
        Ok(out)
    }

    #[test]
    fn nested_block_bodies() {
        assert_eq!(
            render("a{% wrap %}b{% wrap %}c{% endwrap %}{% endwrap %}d").unwrap(),
            "a[b[c]]d"
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(render("a{# hidden #}b").unwrap(), "ab");
    }

    #[test]
    fn unknown_tag_names_the_tag() {
        let err = render("\n{% bogus %}").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn unclosed_block_reports_opening_line() {
        let err = render("x\n{% wrap %}\nbody\nmore").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("endwrap"));
    }

    #[test]
    fn factory_errors_carry_tag_line() {
        let err = render("\n\n{% wrap extra %}{% endwrap %}").unwrap_err();
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn stray_end_marker_is_invalid() {
        assert!(render("{% endwrap %}").unwrap_err().is_syntax());
    }

    #[test]
    fn mismatched_end_marker_reports_open_tag() {
        let err = render("{% wrap %}\n{% wrap %}\n{% endother %}").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("unclosed tag 'wrap'"));
    }

    #[test]
    fn empty_tags_are_rejected() {
        assert!(render("{{ }}").is_err());
        assert!(render("{% %}").is_err());
    }

    #[test]
    fn smart_split_keeps_quotes() {
        assert_eq!(
            smart_split(r#"a  "b c" d='e f'"#),
            vec!["a", "\"b c\"", "d='e f'"]
        );
    }
}
