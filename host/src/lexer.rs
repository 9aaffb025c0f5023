//! Tokenizer with an indentation layout pass.
//!
//! Scanning produces a flat token stream with `Newline` tokens at logical
//! line ends (newlines inside brackets and after a backslash are dropped).
//! [`apply_layout`] then turns changes in leading indentation into
//! `Indent`/`Dedent` tokens using an indent stack.

use snafu::ensure;

use crate::error::{Result, SyntaxSnafu};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Keyword(&'static str),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    /// Column of the first character, counted in bytes from the line start.
    pub col: usize,
}

pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del",
    "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal",
    "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

// Longest operators first so prefix matching picks `**=` over `**` over `*`.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", "+=", "-=", "*=", "/=",
    "%=", "&=", "|=", "^=", "@=", ":=", "+", "-", "*", "/", "%", "@", "&", "|", "^", "~", "<", ">", "(", ")", "[",
    "]", "{", "}", ",", ":", ".", ";", "=",
];

/// Tokenize `source` and apply the layout pass.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    lexer.scan_all()?;
    apply_layout(lexer.tokens)
}

fn apply_layout(tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut out = Vec::with_capacity(tokens.len() + 8);
    let mut indent_stack: Vec<usize> = vec![0];
    let mut at_line_start = true;

    for token in tokens {
        if token.kind == TokenKind::Eof {
            if out.last().is_some_and(|t: &Token| t.kind != TokenKind::Newline) {
                out.push(Token { kind: TokenKind::Newline, line: token.line, col: token.col });
            }
            while indent_stack.len() > 1 {
                indent_stack.pop();
                out.push(Token { kind: TokenKind::Dedent, line: token.line, col: 0 });
            }
            out.push(token);
            break;
        }

        if at_line_start {
            let current = indent_stack.last().copied().unwrap_or(0);
            if token.col > current {
                indent_stack.push(token.col);
                out.push(Token { kind: TokenKind::Indent, line: token.line, col: token.col });
            } else if token.col < current {
                while token.col < indent_stack.last().copied().unwrap_or(0) {
                    indent_stack.pop();
                    out.push(Token { kind: TokenKind::Dedent, line: token.line, col: token.col });
                }
                ensure!(
                    indent_stack.last().copied().unwrap_or(0) == token.col,
                    SyntaxSnafu {
                        line: token.line,
                        message: format!(
                            "inconsistent indentation: expected one of {indent_stack:?} spaces, got {}",
                            token.col
                        ),
                    }
                );
            }
        }

        at_line_start = token.kind == TokenKind::Newline;
        out.push(token);
    }

    Ok(out)
}

struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    /// Open bracket depth; newlines inside brackets are not significant.
    depth: usize,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self { source: source.as_bytes(), pos: 0, line: 1, line_start: 0, depth: 0, tokens: Vec::new() }
    }

    fn scan_all(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace()?;
            if self.is_at_end() {
                self.emit(TokenKind::Eof, self.pos);
                return Ok(());
            }
            self.scan_token()?;
        }
    }

    fn scan_token(&mut self) -> Result<()> {
        let start = self.pos;
        let ch = self.peek().unwrap_or(b'\0');

        match ch {
            b'\n' => {
                self.advance();
                if self.depth == 0 && self.tokens.last().is_some_and(|t| t.kind != TokenKind::Newline) {
                    self.emit(TokenKind::Newline, start);
                }
                self.line += 1;
                self.line_start = self.pos;
            }
            b'#' => {
                while self.peek().is_some_and(|c| c != b'\n') {
                    self.advance();
                }
            }
            b'\\' if self.peek_next() == Some(b'\n') => {
                self.pos += 2;
                self.line += 1;
                self.line_start = self.pos;
            }
            b'"' | b'\'' => {
                let text = self.scan_string()?;
                self.emit(TokenKind::Str(String::from_utf8_lossy(&text).into_owned()), start);
            }
            b'b' | b'B' if matches!(self.peek_next(), Some(b'"' | b'\'')) => {
                self.advance();
                let bytes = self.scan_string()?;
                self.emit(TokenKind::Bytes(bytes), start);
            }
            b'0'..=b'9' => self.scan_number(start)?,
            b'.' if self.peek_next().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(start)?,
            c if c == b'_' || c.is_ascii_alphabetic() => self.scan_ident(start),
            _ => self.scan_operator(start)?,
        }
        Ok(())
    }

    fn scan_operator(&mut self, start: usize) -> Result<()> {
        let rest = &self.source[self.pos..];
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(op.as_bytes())) else {
            return SyntaxSnafu { line: self.line, message: format!("unexpected character {:?}", rest[0] as char) }
                .fail();
        };
        self.pos += op.len();
        match *op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.emit(TokenKind::Op(op), start);
        Ok(())
    }

    fn scan_ident(&mut self, start: usize) {
        while self.peek().is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        let kind = match KEYWORDS.iter().find(|k| **k == text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Name(text),
        };
        self.emit(kind, start);
    }

    fn scan_number(&mut self, start: usize) -> Result<()> {
        if self.peek() == Some(b'0') && matches!(self.peek_next(), Some(b'x' | b'X')) {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == b'_') {
                self.advance();
            }
            let digits: String = self.text(start + 2).chars().filter(|c| *c != '_').collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|e| SyntaxSnafu { line: self.line, message: format!("invalid hex literal: {e}") }.build())?;
            self.emit(TokenKind::Int(value), start);
            return Ok(());
        }

        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some(b'.') && self.peek_next() != Some(b'.') {
            is_float = true;
            self.advance();
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.eat_digits();
            } else {
                self.pos = save;
            }
        }

        let text: String = self.text(start).chars().filter(|c| *c != '_').collect();
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|e| {
                SyntaxSnafu { line: self.line, message: format!("invalid float literal {text}: {e}") }.build()
            })?)
        } else {
            TokenKind::Int(text.parse().map_err(|e| {
                SyntaxSnafu { line: self.line, message: format!("invalid integer literal {text}: {e}") }.build()
            })?)
        };
        self.emit(kind, start);
        Ok(())
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.advance();
        }
    }

    /// Scan a quoted literal starting at the opening quote, returning the
    /// unescaped bytes. Handles both single and triple quoting.
    fn scan_string(&mut self) -> Result<Vec<u8>> {
        let quote = self.advance();
        let triple = self.peek() == Some(quote) && self.peek_next() == Some(quote);
        if triple {
            self.pos += 2;
        }

        let mut out = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return SyntaxSnafu { line: self.line, message: "unterminated string literal" }.fail();
            };
            if c == quote {
                if !triple {
                    self.advance();
                    return Ok(out);
                }
                if self.source[self.pos..].starts_with(&[quote, quote, quote]) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            if c == b'\n' {
                ensure!(triple, SyntaxSnafu { line: self.line, message: "unterminated string literal" });
                self.line += 1;
                self.line_start = self.pos + 1;
            }
            self.advance();
            if c == b'\\' {
                let escaped = self.peek().map(|_| self.advance());
                match escaped {
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'r') => out.push(b'\r'),
                    Some(b'0') => out.push(b'\0'),
                    Some(b'\n') => {
                        self.line += 1;
                        self.line_start = self.pos;
                    }
                    Some(other @ (b'\\' | b'\'' | b'"')) => out.push(other),
                    Some(other) => out.extend_from_slice(&[b'\\', other]),
                    None => {}
                }
            } else {
                out.push(c);
            }
        }
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\r' => self.pos += 1,
                b'\t' => {
                    return SyntaxSnafu { line: self.line, message: "tabs are not allowed in indentation" }.fail();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        let col = start.saturating_sub(self.line_start);
        self.tokens.push(Token { kind, line: self.line, col });
    }

    fn text(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> u8 {
        let ch = self.source[self.pos];
        self.pos += 1;
        ch
    }
}
