//! Lexer for thtml expressions.
//!
//! Tokenizes the small expression language used in `{{ }}` interpolation and
//! directive attributes (`on`, `continue`, `break`, `t-with` bindings).
//! Nothing here executes code; it only produces tokens for [`ExprParser`].
//!
//! [`ExprParser`]: crate::expr_parser::ExprParser
//!
//! # Examples
//!
//! ```
//! use thtml_parser::expr_lexer::{ExprLexer, TokenKind};
//!
//! let tokens = ExprLexer::tokenize("count + 1").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Identifier);
//! assert_eq!(tokens[1].kind, TokenKind::Plus);
//! assert_eq!(tokens[2].kind, TokenKind::Number);
//! ```

use crate::ast::ExprSpan;

/// A token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: ExprSpan,
    pub value: TokenValue,
}

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,
    String,
    Boolean,
    Null,
    Undefined,

    Identifier,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    Lte,
    Gte,

    // Logical
    And,
    Or,
    Not,
    QuestionQuestion,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Punctuation
    Dot,
    Comma,
    Colon,
    Question,
    OptionalChain,

    Eof,
}

/// The value carried by a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    String(String),
    Boolean(bool),
    Identifier(String),
}

/// Expression lexer error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Expression lexer error at position {}: {message}", .span.start)]
pub struct ExprLexerError {
    pub message: String,
    pub span: ExprSpan,
}

/// Expression lexer over a single expression string.
///
/// Spans are character offsets into that string.
pub struct ExprLexer {
    chars: Vec<char>,
    pos: usize,
}

impl ExprLexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire source. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprLexerError> {
        let mut lexer = ExprLexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Read the next token from the source.
    pub fn next_token(&mut self) -> Result<Token, ExprLexerError> {
        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(self.token(TokenKind::Eof, self.pos, TokenValue::None));
        }

        let start = self.pos;
        let ch = self.current();

        match ch {
            '0'..='9' => self.read_number(start),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(start),

            '\'' | '"' => self.read_string(start),

            'a'..='z' | 'A'..='Z' | '_' | '$' => Ok(self.read_identifier(start)),

            // Multi-character operators first
            '=' if self.peek() == Some('=') => {
                if self.peek_at(2) == Some('=') {
                    Ok(self.symbol(TokenKind::StrictEq, 3))
                } else {
                    Ok(self.symbol(TokenKind::EqEq, 2))
                }
            }
            '!' if self.peek() == Some('=') => {
                if self.peek_at(2) == Some('=') {
                    Ok(self.symbol(TokenKind::StrictNotEq, 3))
                } else {
                    Ok(self.symbol(TokenKind::NotEq, 2))
                }
            }
            '&' if self.peek() == Some('&') => Ok(self.symbol(TokenKind::And, 2)),
            '|' if self.peek() == Some('|') => Ok(self.symbol(TokenKind::Or, 2)),
            '<' if self.peek() == Some('=') => Ok(self.symbol(TokenKind::Lte, 2)),
            '>' if self.peek() == Some('=') => Ok(self.symbol(TokenKind::Gte, 2)),
            '?' if self.peek() == Some('?') => Ok(self.symbol(TokenKind::QuestionQuestion, 2)),
            // `a?.5:1` is a ternary, not optional chaining
            '?' if self.peek() == Some('.')
                && !self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) =>
            {
                Ok(self.symbol(TokenKind::OptionalChain, 2))
            }

            '+' => Ok(self.symbol(TokenKind::Plus, 1)),
            '-' => Ok(self.symbol(TokenKind::Minus, 1)),
            '*' => Ok(self.symbol(TokenKind::Star, 1)),
            '/' => Ok(self.symbol(TokenKind::Slash, 1)),
            '%' => Ok(self.symbol(TokenKind::Percent, 1)),
            '!' => Ok(self.symbol(TokenKind::Not, 1)),
            '<' => Ok(self.symbol(TokenKind::Lt, 1)),
            '>' => Ok(self.symbol(TokenKind::Gt, 1)),
            '(' => Ok(self.symbol(TokenKind::LParen, 1)),
            ')' => Ok(self.symbol(TokenKind::RParen, 1)),
            '[' => Ok(self.symbol(TokenKind::LBracket, 1)),
            ']' => Ok(self.symbol(TokenKind::RBracket, 1)),
            '{' => Ok(self.symbol(TokenKind::LBrace, 1)),
            '}' => Ok(self.symbol(TokenKind::RBrace, 1)),
            '.' => Ok(self.symbol(TokenKind::Dot, 1)),
            ',' => Ok(self.symbol(TokenKind::Comma, 1)),
            ':' => Ok(self.symbol(TokenKind::Colon, 1)),
            '?' => Ok(self.symbol(TokenKind::Question, 1)),

            _ => Err(ExprLexerError {
                message: format!("Unexpected character: '{ch}'"),
                span: ExprSpan::new(start, start + 1),
            }),
        }
    }

    // --- Private helpers ---

    fn read_number(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        while !self.is_at_end() && (self.current().is_ascii_digit() || self.current() == '.') {
            self.advance();
        }

        let text = self.text(start);
        let value: f64 = text.parse().map_err(|_| ExprLexerError {
            message: format!("Invalid number: '{text}'"),
            span: ExprSpan::new(start, self.pos),
        })?;

        Ok(self.token(TokenKind::Number, start, TokenValue::Number(value)))
    }

    fn read_string(&mut self, start: usize) -> Result<Token, ExprLexerError> {
        let quote = self.current();
        self.advance(); // skip opening quote

        let mut value = String::new();

        while !self.is_at_end() && self.current() != quote {
            if self.current() == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err(ExprLexerError {
                        message: "Unterminated escape sequence".into(),
                        span: ExprSpan::new(start, self.pos),
                    });
                }
                match self.current() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    c if c == quote => value.push(c),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
            } else {
                value.push(self.current());
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(ExprLexerError {
                message: "Unterminated string".into(),
                span: ExprSpan::new(start, self.pos),
            });
        }

        self.advance(); // skip closing quote

        Ok(self.token(TokenKind::String, start, TokenValue::String(value)))
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        while !self.is_at_end()
            && (self.current().is_alphanumeric() || self.current() == '_' || self.current() == '$')
        {
            self.advance();
        }

        let text = self.text(start);

        match text.as_str() {
            "true" => self.token(TokenKind::Boolean, start, TokenValue::Boolean(true)),
            "false" => self.token(TokenKind::Boolean, start, TokenValue::Boolean(false)),
            "null" => self.token(TokenKind::Null, start, TokenValue::None),
            "undefined" => self.token(TokenKind::Undefined, start, TokenValue::None),
            _ => self.token(TokenKind::Identifier, start, TokenValue::Identifier(text)),
        }
    }

    fn symbol(&mut self, kind: TokenKind, width: usize) -> Token {
        let start = self.pos;
        self.pos += width;
        self.token(kind, start, TokenValue::None)
    }

    fn token(&self, kind: TokenKind, start: usize, value: TokenValue) -> Token {
        Token {
            kind,
            span: ExprSpan::new(start, self.pos),
            value,
        }
    }

    fn text(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn current(&self) -> char {
        self.chars[self.pos]
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current().is_whitespace() {
            self.advance();
        }
    }
}
