//! A small JavaScript tokenizer.
//!
//! Only precise enough to find module syntax: strings, template literals,
//! comments and regular expression literals are skipped correctly so that
//! `import`/`export` inside them are never mistaken for statements. Template
//! interpolations are lexed but their tokens are dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    String,
    Template,
    Number,
    Regex,
    Punct(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn is_punct(&self, c: u8) -> bool {
        self.kind == TokenKind::Punct(c)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub offset: usize,
    pub message: &'static str,
}

/// Keywords after which `/` starts a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Statements whose `( ... )` head is followed by an expression statement,
/// so a `/` right after the `)` starts a regular expression.
const CONDITION_KEYWORDS: &[&str] = &["if", "while", "for", "with"];

pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        src: src.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
        newline: false,
    };
    if src.starts_with("#!") {
        lexer.pos = src.find('\n').unwrap_or(src.len());
    }
    lexer.lex(false)?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    newline: bool,
}

const fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'\\' || b >= 0x80
}

impl Lexer<'_> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
            newline_before: std::mem::take(&mut self.newline),
        });
    }

    fn error(&self, offset: usize, message: &'static str) -> LexError {
        LexError { offset, message }
    }

    /// Lex until end of input, or until the `}` closing a template
    /// interpolation when `nested`.
    fn lex(&mut self, nested: bool) -> Result<(), LexError> {
        let mut depth = 0usize;
        let entry = self.pos;

        while let Some(c) = self.peek(0) {
            let start = self.pos;
            match c {
                b'\n' => {
                    self.newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => {
                    while self.peek(0).is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    let rest = &self.src[self.pos + 2..];
                    let close = rest
                        .windows(2)
                        .position(|w| w == b"*/")
                        .ok_or_else(|| self.error(start, "Unterminated comment"))?;
                    if rest[..close].contains(&b'\n') {
                        self.newline = true;
                    }
                    self.pos += close + 4;
                }
                b'/' if self.regex_allowed() => {
                    self.regex()?;
                    self.push(TokenKind::Regex, start);
                }
                b'\'' | b'"' => {
                    self.string(c)?;
                    self.push(TokenKind::String, start);
                }
                b'`' => {
                    self.template()?;
                    self.push(TokenKind::Template, start);
                }
                b'0'..=b'9' => {
                    self.number();
                    self.push(TokenKind::Number, start);
                }
                b'.' if self.peek(1).is_some_and(|b| b.is_ascii_digit()) => {
                    self.number();
                    self.push(TokenKind::Number, start);
                }
                _ if is_ident_byte(c) => {
                    while self.peek(0).is_some_and(is_ident_byte) {
                        self.pos += 1;
                    }
                    self.push(TokenKind::Ident, start);
                }
                b'}' if nested && depth == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => {
                    match c {
                        b'{' => depth += 1,
                        b'}' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    self.pos += 1;
                    self.push(TokenKind::Punct(c), start);
                }
            }
        }

        if nested {
            return Err(self.error(entry, "Unterminated template literal"));
        }
        Ok(())
    }

    fn regex_allowed(&self) -> bool {
        let Some(last) = self.tokens.last() else {
            return true;
        };
        match last.kind {
            TokenKind::Punct(b')') => self.closes_condition(),
            TokenKind::Punct(c) => c != b']',
            TokenKind::Ident => {
                let word = &self.src[last.start..last.end];
                REGEX_PREFIX_KEYWORDS.iter().any(|k| k.as_bytes() == word)
            }
            _ => false,
        }
    }

    /// Does the trailing `)` close the head of an `if`/`while`/`for`/`with`?
    fn closes_condition(&self) -> bool {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().rev() {
            match token.kind {
                TokenKind::Punct(b')') => depth += 1,
                TokenKind::Punct(b'(') => {
                    depth -= 1;
                    if depth == 0 {
                        return i
                            .checked_sub(1)
                            .map(|k| &self.tokens[k])
                            .filter(|t| t.kind == TokenKind::Ident)
                            .is_some_and(|t| {
                                let word = &self.src[t.start..t.end];
                                CONDITION_KEYWORDS.iter().any(|k| k.as_bytes() == word)
                            });
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// Skip a backslash escape, taking `\r\n` and U+2028/U+2029 line
    /// continuations as one unit.
    fn escape(&mut self) {
        self.pos += match &self.src[self.pos + 1..] {
            [b'\r', b'\n', ..] => 3,
            [0xe2, 0x80, 0xa8 | 0xa9, ..] => 4,
            _ => 2,
        };
    }

    fn regex(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek(0) {
                None | Some(b'\n') => {
                    return Err(self.error(start, "Unterminated regular expression"));
                }
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.peek(0).is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        Ok(())
    }

    fn string(&mut self, quote: u8) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some(b'\n' | b'\r') => {
                    return Err(self.error(start, "Unterminated string literal"));
                }
                Some(b'\\') => self.escape(),
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn template(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek(0) {
                None => return Err(self.error(start, "Unterminated template literal")),
                Some(b'\\') => self.escape(),
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    let saved = self.tokens.len();
                    let newline = self.newline;
                    self.lex(true)?;
                    self.tokens.truncate(saved);
                    self.newline = newline;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn number(&mut self) {
        while self
            .peek(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
        {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().iter().map(|t| t.kind).collect()
    }

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src)
            .unwrap()
            .iter()
            .map(|t| &src[t.start..t.end])
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            texts("import { a } from \"./a.js\";"),
            ["import", "{", "a", "}", "from", "\"./a.js\"", ";"]
        );
    }

    #[test]
    fn test_comments_and_strings_hide_keywords() {
        let src = "// import x from 'y'\n/* export default 1 */ const s = 'import \\' z';";
        assert_eq!(texts(src), ["const", "s", "=", "'import \\' z'", ";"]);
    }

    #[test]
    fn test_template_interpolation_is_skipped() {
        let src = "const t = `a ${ { b: `${c}` } } import`; x";
        assert_eq!(texts(src), ["const", "t", "=", "`a ${ { b: `${c}` } } import`", ";", "x"]);
    }

    #[test]
    fn test_regex_versus_division() {
        assert_eq!(
            kinds("a / b / c"),
            [
                TokenKind::Ident,
                TokenKind::Punct(b'/'),
                TokenKind::Ident,
                TokenKind::Punct(b'/'),
                TokenKind::Ident
            ]
        );
        let src = "x = /[/]import\\//g.test(y)";
        assert_eq!(texts(src)[2], "/[/]import\\//g");
        assert_eq!(texts("return /a/")[1], "/a/");
    }

    #[test]
    fn test_regex_after_condition() {
        assert_eq!(texts("if (x) /a'/.test(y)")[4], "/a'/");
        assert_eq!(texts("while (f(a)) /b/.exec(s)")[7], "/b/");
        assert_eq!(kinds("f(x) / 2")[4], TokenKind::Punct(b'/'));
        assert_eq!(kinds("if (a) b = (c) / 2")[9], TokenKind::Punct(b'/'));
    }

    #[test]
    fn test_line_continuations() {
        let src = "const s = 'a\\\r\nb';\r\nx";
        assert_eq!(texts(src), ["const", "s", "=", "'a\\\r\nb'", ";", "x"]);

        let src = "const s = \"a\\\rb\";";
        assert_eq!(texts(src)[3], "\"a\\\rb\"");

        let src = "const s = 'a\\\u{2028}b';";
        assert_eq!(texts(src)[3], "'a\\\u{2028}b'");

        let src = "const t = `a\\\r\nb`;";
        assert_eq!(texts(src)[3], "`a\\\r\nb`");

        assert!(tokenize("'a\r\nb'").is_err());
    }

    #[test]
    fn test_newline_flag() {
        let tokens = tokenize("a\n/* \n */ b c").unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(!tokens[2].newline_before);
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("'abc").unwrap_err().message, "Unterminated string literal");
        assert_eq!(tokenize("x = `a${b").unwrap_err().message, "Unterminated template literal");
        assert_eq!(tokenize("/* a").unwrap_err().offset, 0);
    }

    #[test]
    fn test_hashbang() {
        assert_eq!(texts("#!/usr/bin/env node\nfoo"), ["foo"]);
    }
}
