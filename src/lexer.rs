//! Template text → token stream.
//!
//! The scan has two states. Outside a tag we look for the next opening
//! delimiter (`{{`, `{%`, `{#`); inside a tag we look for the matching closer,
//! skipping over quoted strings so that `{{ x|default:"}}" }}` stays one token.
//! An opener that never closes is left in the surrounding text.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Variable,
    Block,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text for `Text`, trimmed tag body for the others.
    pub content: String,
    /// 1-based line on which the token starts.
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, content: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            content: content.into(),
            line,
        }
    }

    /// Split a block token into its tag name and the remaining argument text.
    pub fn split_tag(&self) -> (&str, &str) {
        let content = self.content.as_str();
        match content.find(char::is_whitespace) {
            Some(idx) => (&content[..idx], content[idx..].trim()),
            None => (content, ""),
        }
    }

    /// Tag name of a block token, or `None` for other kinds.
    pub fn tag_name(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Block => Some(self.split_tag().0),
            _ => None,
        }
    }
}

const DELIMITERS: [(u8, &str, TokenKind); 3] = [
    (b'{', "}}", TokenKind::Variable),
    (b'%', "%}", TokenKind::Block),
    (b'#', "#}", TokenKind::Comment),
];

pub struct Lexer<'a> {
    input: &'a str,
    line: usize,
    trim_blocks: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            line: 1,
            trim_blocks: false,
        }
    }

    /// Drop a single newline directly following a `%}` block tag.
    pub fn trim_blocks(mut self, trim: bool) -> Self {
        self.trim_blocks = trim;
        self
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let input = self.input;
        let mut tokens = Vec::new();
        let mut text_start = 0;
        let mut scan = 0;

        while let Some((open, close, kind)) = find_opener(input, scan) {
            let body_start = open + 2;
            let body = &input[body_start..];
            let found = match kind {
                TokenKind::Comment => body.find(close),
                _ => find_close(body, close),
            };
            let Some(len) = found else {
                // Unclosed opener: keep it as literal text and keep scanning.
                scan = body_start;
                continue;
            };

            self.push_text(&mut tokens, &input[text_start..open]);

            let raw = &body[..len];
            tokens.push(Token::new(kind, raw.trim(), self.line));
            self.line += count_newlines(raw);
            scan = body_start + len + close.len();

            if self.trim_blocks && kind == TokenKind::Block {
                let after = &input[scan..];
                if after.starts_with("\r\n") {
                    scan += 2;
                    self.line += 1;
                } else if after.starts_with('\n') {
                    scan += 1;
                    self.line += 1;
                }
            }
            text_start = scan;
        }

        self.push_text(&mut tokens, &input[text_start..]);
        tokens
    }

    fn push_text(&mut self, tokens: &mut Vec<Token>, text: &str) {
        if text.is_empty() {
            return;
        }
        tokens.push(Token::new(TokenKind::Text, text, self.line));
        self.line += count_newlines(text);
    }
}

pub fn tokenize(input: &str) -> Vec<Token> {
    Lexer::new(input).tokenize()
}

fn count_newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

fn find_opener(input: &str, from: usize) -> Option<(usize, &'static str, TokenKind)> {
    let bytes = input.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            let next = bytes[i + 1];
            if let Some((_, close, kind)) = DELIMITERS.iter().find(|(b, _, _)| *b == next) {
                return Some((i, *close, *kind));
            }
        }
        i += 1;
    }
    None
}

/// Offset of `close` in `body`, ignoring occurrences inside quoted strings.
///
/// Quotes are only trusted while they stay inside the tag: if the quote-aware
/// match lies past a new opening delimiter, the apostrophe was plain text and
/// the first plain occurrence of `close` ends the tag.
fn find_close(body: &str, close: &str) -> Option<usize> {
    let plain = body.find(close)?;
    match find_close_quoted(body, close) {
        Some(end) if end == plain || !has_opener(&body[plain..end]) => Some(end),
        _ => Some(plain),
    }
}

fn has_opener(text: &str) -> bool {
    ["{{", "{%", "{#"].iter().any(|open| text.contains(*open))
}

fn find_close_quoted(body: &str, close: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let needle = close.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if bytes[i..].starts_with(needle) {
                    return Some(i);
                }
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                }
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn classifies_each_delimiter() {
        let tokens = tokenize("a{{ b }}c{% d e %}{# f #}");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Text,
                TokenKind::Variable,
                TokenKind::Text,
                TokenKind::Block,
                TokenKind::Comment,
            ]
        );
        assert_eq!(tokens[1].content, "b");
        assert_eq!(tokens[3].content, "d e");
        assert_eq!(tokens[3].split_tag(), ("d", "e"));
        assert_eq!(tokens[4].content, "f");
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = tokenize("one\ntwo {{ x }}\n{% if\ny %}\n{{ z }}");
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        // "one\ntwo ", x, "\n", if-tag, "\n", z
        assert_eq!(lines, vec![1, 2, 2, 3, 4, 5]);
    }

    #[test]
    fn closing_delimiter_inside_quotes_does_not_split() {
        let tokens = tokenize(r#"{{ x|default:"}}" }}!"#);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].content, r#"x|default:"}}""#);
        assert_eq!(tokens[1].content, "!");
    }

    #[test]
    fn unbalanced_quote_falls_back_to_plain_close() {
        let tokens = tokenize("{{ don't }}");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Variable);
        assert_eq!(tokens[0].content, "don't");
    }

    #[test]
    fn apostrophe_in_tag_does_not_swallow_following_tags() {
        let tokens = tokenize("{% comment don't %}It's hidden{% endcomment %}after");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Block, TokenKind::Text, TokenKind::Block, TokenKind::Text]
        );
        assert_eq!(tokens[0].content, "comment don't");
        assert_eq!(tokens[1].content, "It's hidden");
        assert_eq!(tokens[2].content, "endcomment");
        assert_eq!(tokens[3].content, "after");
    }

    #[test]
    fn unclosed_opener_degrades_to_text() {
        let tokens = tokenize("a {{ b {% if x %}c");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Text, TokenKind::Block, TokenKind::Text]
        );
        assert_eq!(tokens[0].content, "a {{ b ");
        assert_eq!(tokens[2].content, "c");

        let tokens = tokenize("tail {%");
        assert_eq!(tokens, vec![Token::new(TokenKind::Text, "tail {%", 1)]);
    }

    #[test]
    fn trim_blocks_drops_newline_after_block_only() {
        let tokens = Lexer::new("{% a %}\nx{{ y }}\nz").trim_blocks(true).tokenize();
        assert_eq!(tokens[1].content, "x");
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[3].content, "\nz");
    }

    #[test]
    fn tokenizing_twice_is_identical() {
        let src = "{% for x in y %}{{ x|upper }}\n{% endfor %}{# c #}";
        assert_eq!(tokenize(src), tokenize(src));
    }
}
