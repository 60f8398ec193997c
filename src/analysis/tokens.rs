//! Lexical tokenizer for Python source.
//!
//! Produces a flat token stream in the same shape as Python's own
//! `tokenize` module: logical `Newline`s are suppressed inside brackets and
//! after backslash continuations, string literals are kept whole (prefix and
//! quotes included), and indentation changes become `Indent`/`Dedent`.
//!
//! The tokenizer does not build a syntax tree. It only guarantees that the
//! token stream is complete, so that the import scanner can walk it without
//! guessing where statements end.

use std::fmt;

use thiserror::Error;

/// Errors raised when a source text cannot be split into a complete token stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("EOF in multi-line string starting at line {0}")]
    UnterminatedTripleQuoted(usize),

    #[error("unterminated string literal at line {0}")]
    UnterminatedString(usize),

    #[error("EOF in multi-line statement")]
    UnclosedBracket,

    #[error("unexpected EOF after line continuation")]
    ContinuationAtEof,

    #[error("unexpected character after line continuation at line {0}")]
    StrayBackslash(usize),

    #[error("invalid character {ch:?} at line {line}")]
    InvalidCharacter { ch: char, line: usize },

    #[error("unindent does not match any outer indentation level at line {0}")]
    InconsistentDedent(usize),
}

/// Result type for tokenizer operations.
pub type TokenResult<T> = Result<T, TokenError>;

/// Exact kind of an operator token.
///
/// Only the operators the import scanner cares about get their own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Dot,
    Ellipsis,
    LPar,
    RPar,
    Comma,
    Semi,
    Other,
}

/// Category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Name,
    Number,
    /// A complete string literal, including prefix and delimiters.
    String,
    Op(OpKind),
    /// End of a logical line.
    Newline,
    /// Line break that does not end a logical line (blank line, inside brackets).
    Nl,
    Comment,
    Indent,
    Dedent,
    EndMarker,
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Line the token starts on (1-indexed).
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    /// Returns true if this token is the name `word`.
    pub fn is_name(&self, word: &str) -> bool {
        self.kind == TokenKind::Name && self.text == word
    }

    /// Returns true if this token is the operator `op`.
    pub fn is_op(&self, op: OpKind) -> bool {
        self.kind == TokenKind::Op(op)
    }

    /// Returns true if this token terminates a simple statement.
    pub fn ends_statement(&self) -> bool {
        matches!(self.kind, TokenKind::Newline | TokenKind::Op(OpKind::Semi))
    }

    /// Returns true for tokens with no syntactic weight inside a statement.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Nl | TokenKind::Comment | TokenKind::Indent | TokenKind::Dedent
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} (line {})", self.kind, self.text, self.line)
    }
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", ">>", "<<", "<=", ">=", "==", "!=", "->", ":=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];
const ONE_CHAR_OPS: &str = "+-*/%@&|^~<>=:!";

/// Splits `source` into a complete token stream.
///
/// # Example
///
/// ```
/// use bonded::analysis::tokens::{tokenize, TokenKind};
///
/// let tokens = tokenize("import foo\n").unwrap();
/// assert!(tokens[0].is_name("import"));
/// assert!(tokens[1].is_name("foo"));
/// assert_eq!(tokens[2].kind, TokenKind::Newline);
/// ```
pub fn tokenize(source: &str) -> TokenResult<Vec<Token>> {
    Tokenizer::new(source).run()
}

struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    continuation: bool,
    logical_has_content: bool,
    tokens: Vec<Token>,
}

impl Tokenizer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.trim_start_matches('\u{feff}').chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            continuation: false,
            logical_has_content: false,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, line: usize) {
        if !matches!(
            kind,
            TokenKind::Nl | TokenKind::Comment | TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        ) {
            self.logical_has_content = true;
        }
        self.tokens.push(Token::new(kind, text, line));
    }

    fn run(mut self) -> TokenResult<Vec<Token>> {
        loop {
            if self.at_line_start {
                self.at_line_start = false;
                if self.depth == 0 && !self.continuation {
                    if !self.handle_indentation()? {
                        continue;
                    }
                } else {
                    self.continuation = false;
                }
            }

            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => self.lex_comment(),
                '\\' => self.lex_continuation()?,
                '\n' | '\r' => self.lex_line_break(),
                '"' | '\'' => self.lex_string(self.pos)?,
                '0'..='9' => self.lex_number(),
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.lex_number(),
                c if c == '_' || c.is_alphabetic() => self.lex_name_or_string()?,
                _ => self.lex_operator()?,
            }
        }

        if self.continuation {
            return Err(TokenError::ContinuationAtEof);
        }
        if self.depth > 0 {
            return Err(TokenError::UnclosedBracket);
        }
        if self.logical_has_content {
            self.tokens.push(Token::new(TokenKind::Newline, "", self.line));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", self.line));
        }
        self.tokens.push(Token::new(TokenKind::EndMarker, "", self.line));
        Ok(self.tokens)
    }

    /// Measures indentation at the start of a physical line.
    ///
    /// Returns `false` when the line was blank or comment-only and has been
    /// fully consumed.
    fn handle_indentation(&mut self) -> TokenResult<bool> {
        let mut column = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / 8 + 1) * 8,
                '\x0c' => column = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(false),
            Some('#') => {
                self.lex_comment();
                if self.peek().is_some() {
                    self.consume_line_break(TokenKind::Nl);
                }
                return Ok(false);
            }
            Some('\n') | Some('\r') => {
                self.consume_line_break(TokenKind::Nl);
                return Ok(false);
            }
            Some('\\') => {
                // a continuation before any content does not open an indented block
                return Ok(true);
            }
            _ => {}
        }

        let current = *self.indents.last().unwrap_or(&0);
        if column > current {
            self.indents.push(column);
            self.tokens.push(Token::new(TokenKind::Indent, "", self.line));
        } else if column < current {
            while self.indents.last().is_some_and(|&top| top > column) {
                self.indents.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, "", self.line));
            }
            if self.indents.last() != Some(&column) {
                return Err(TokenError::InconsistentDedent(self.line));
            }
        }
        Ok(true)
    }

    fn consume_line_break(&mut self, kind: TokenKind) {
        let start = self.pos;
        if self.peek() == Some('\r') {
            self.pos += 1;
        }
        if self.peek() == Some('\n') {
            self.pos += 1;
        }
        let text = self.slice(start);
        self.tokens.push(Token::new(kind, text, self.line));
        self.line += 1;
        self.at_line_start = true;
    }

    fn lex_line_break(&mut self) {
        if self.depth == 0 && self.logical_has_content {
            self.consume_line_break(TokenKind::Newline);
            self.logical_has_content = false;
        } else {
            self.consume_line_break(TokenKind::Nl);
        }
    }

    fn lex_comment(&mut self) {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '\n' && c != '\r') {
            self.pos += 1;
        }
        let text = self.slice(start);
        self.tokens.push(Token::new(TokenKind::Comment, text, self.line));
    }

    fn lex_continuation(&mut self) -> TokenResult<()> {
        self.pos += 1;
        match self.peek() {
            None => Err(TokenError::ContinuationAtEof),
            Some('\r') | Some('\n') => {
                if self.peek() == Some('\r') {
                    self.pos += 1;
                }
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
                self.line += 1;
                self.continuation = true;
                self.at_line_start = true;
                if self.peek().is_none() {
                    return Err(TokenError::ContinuationAtEof);
                }
                Ok(())
            }
            Some(_) => Err(TokenError::StrayBackslash(self.line)),
        }
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let line = self.line;
        let mut previous = '\0';
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(previous, 'e' | 'E')
                && !self.slice(start).to_ascii_lowercase().starts_with("0x");
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                previous = c;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = self.slice(start);
        self.push(TokenKind::Number, text, line);
    }

    fn lex_name_or_string(&mut self) -> TokenResult<()> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c == '_' || c.is_alphanumeric())
        {
            self.pos += 1;
        }
        let word = self.slice(start);
        if matches!(self.peek(), Some('"') | Some('\'')) && is_string_prefix(&word) {
            return self.lex_string(start);
        }
        let line = self.line;
        self.push(TokenKind::Name, word, line);
        Ok(())
    }

    /// Lexes a string literal whose prefix (possibly empty) began at `start`.
    fn lex_string(&mut self, start: usize) -> TokenResult<()> {
        let line = self.line;
        let formatted = self.slice(start).contains(|c| c == 'f' || c == 'F');
        self.skip_string(formatted)?;
        let text = self.slice(start);
        self.push(TokenKind::String, text, line);
        Ok(())
    }

    /// Advances past the string literal whose opening quote is at `pos`.
    ///
    /// Inside the replacement fields of an f-string, nested literals may reuse
    /// the outer quote, so each field is followed to its closing brace.
    fn skip_string(&mut self, formatted: bool) -> TokenResult<()> {
        let line = self.line;
        let Some(quote) = self.peek() else {
            return Err(TokenError::UnterminatedString(line));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let unterminated = if triple {
            TokenError::UnterminatedTripleQuoted(line)
        } else {
            TokenError::UnterminatedString(line)
        };
        self.pos += if triple { 3 } else { 1 };

        let mut fields: Vec<ReplacementField> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(unterminated);
            };

            if let Some(top) = fields.len().checked_sub(1).filter(|&i| !fields[i].in_spec) {
                match c {
                    '"' | '\'' => {
                        let nested = self.prefix_is_formatted();
                        self.skip_string(nested)?;
                        continue;
                    }
                    '(' | '[' | '{' => fields[top].depth += 1,
                    ')' | ']' => fields[top].depth = fields[top].depth.saturating_sub(1),
                    '}' if fields[top].depth > 0 => fields[top].depth -= 1,
                    '}' => {
                        fields.pop();
                    }
                    ':' if fields[top].depth == 0 => fields[top].in_spec = true,
                    '!' if fields[top].depth == 0 && self.peek_at(1) != Some('=') => {
                        fields[top].in_spec = true
                    }
                    '\n' => self.line += 1,
                    _ => {}
                }
                self.pos += 1;
                continue;
            }

            match c {
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(unterminated),
                        Some('\r') => {
                            self.pos += 1;
                            if self.peek() == Some('\n') {
                                self.pos += 1;
                            }
                            self.line += 1;
                        }
                        Some('\n') => {
                            self.pos += 1;
                            self.line += 1;
                        }
                        Some(_) => self.pos += 1,
                    }
                }
                '\n' | '\r' if !triple => return Err(unterminated),
                c if c == quote
                    && (!triple
                        || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote))) =>
                {
                    self.pos += if triple { 3 } else { 1 };
                    return Ok(());
                }
                '{' if formatted => {
                    if fields.is_empty() && self.peek_at(1) == Some('{') {
                        self.pos += 2;
                    } else {
                        fields.push(ReplacementField::default());
                        self.pos += 1;
                    }
                }
                '}' if formatted => {
                    if fields.pop().is_none() && self.peek_at(1) == Some('}') {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                c => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    self.pos += 1;
                }
            }
        }
    }

    /// Returns true if the letters just before `pos` form an f-string prefix.
    fn prefix_is_formatted(&self) -> bool {
        let start = self.chars[..self.pos]
            .iter()
            .rposition(|c| !c.is_ascii_alphabetic())
            .map_or(0, |i| i + 1);
        let prefix: String = self.chars[start..self.pos].iter().collect();
        is_string_prefix(&prefix) && prefix.contains(|c| c == 'f' || c == 'F')
    }

    fn lex_operator(&mut self) -> TokenResult<()> {
        let line = self.line;
        let Some(c) = self.peek() else { return Ok(()) };

        let three: String = self.chars[self.pos..(self.pos + 3).min(self.chars.len())]
            .iter()
            .collect();
        if three == "..." {
            self.pos += 3;
            self.push(TokenKind::Op(OpKind::Ellipsis), three, line);
            return Ok(());
        }

        let kind = match c {
            '.' => Some(OpKind::Dot),
            '(' => Some(OpKind::LPar),
            ')' => Some(OpKind::RPar),
            ',' => Some(OpKind::Comma),
            ';' => Some(OpKind::Semi),
            '[' | '{' | ']' | '}' => Some(OpKind::Other),
            _ => None,
        };
        if let Some(kind) = kind {
            match c {
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            self.pos += 1;
            self.push(TokenKind::Op(kind), c.to_string(), line);
            return Ok(());
        }

        if THREE_CHAR_OPS.contains(&three.as_str()) {
            self.pos += 3;
            self.push(TokenKind::Op(OpKind::Other), three, line);
            return Ok(());
        }
        let two: String = three.chars().take(2).collect();
        if TWO_CHAR_OPS.contains(&two.as_str()) {
            self.pos += 2;
            self.push(TokenKind::Op(OpKind::Other), two, line);
            return Ok(());
        }
        if ONE_CHAR_OPS.contains(c) {
            self.pos += 1;
            self.push(TokenKind::Op(OpKind::Other), c.to_string(), line);
            return Ok(());
        }

        Err(TokenError::InvalidCharacter { ch: c, line })
    }
}

/// Returns true if `word` is a valid string literal prefix.
/// Open `{...}` field of an f-string: bracket depth of its expression, and
/// whether the format spec after `:` or `!` has started.
#[derive(Debug, Default)]
struct ReplacementField {
    depth: u32,
    in_spec: bool,
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf"
    )
}
