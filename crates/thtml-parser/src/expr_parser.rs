//! Expression parser for thtml.
//!
//! Parses expression token streams (from `expr_lexer`) into `Expression` AST
//! nodes using recursive descent with Pratt parsing for binary operators.
//!
//! Precedence, lowest first: `?:`, `??`, `||`, `&&`, equality, relational,
//! additive, multiplicative, unary, member access.

use crate::ast::{BinaryOp, ExprKind, ExprSpan, Expression, ObjectProperty, UnaryOp};
use crate::expr_lexer::{ExprLexer, Token, TokenKind, TokenValue};
use crate::ParseError;

/// thtml expression parser.
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    /// Create a new expression parser for the given tokens.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let end = tokens.last().map_or(0, |t| t.span.end);
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: ExprSpan::new(end, end),
                value: TokenValue::None,
            });
        }
        Self { tokens, pos: 0 }
    }

    /// Parse a complete expression from a source string.
    ///
    /// Errors report `line: 1` and a 1-based character column.
    pub fn parse(source: &str) -> Result<Expression, ParseError> {
        let tokens = ExprLexer::tokenize(source).map_err(|e| ParseError {
            message: e.message,
            line: 1,
            column: e.span.start + 1,
        })?;

        let mut parser = ExprParser::new(tokens);
        let expr = parser.parse_expression()?;
        if parser.peek().kind != TokenKind::Eof {
            return Err(parser.error(format!(
                "Unexpected token {:?} after expression",
                parser.peek().kind
            )));
        }
        Ok(expr)
    }

    /// Parse a ternary-level expression.
    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let condition = self.parse_binary(0)?;
        if self.peek().kind != TokenKind::Question {
            return Ok(condition);
        }
        self.advance();
        let consequent = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':' in conditional expression")?;
        let alternate = self.parse_expression()?;
        let span = ExprSpan::new(condition.span.start, alternate.span.end);
        Ok(Expression {
            kind: ExprKind::Ternary {
                condition: Box::new(condition),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        })
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some((op, bp)) = binary_op(self.peek().kind) {
            if bp <= min_bp {
                break;
            }
            self.advance();
            // Left-associative: the right side binds strictly tighter.
            let right = self.parse_binary(bp)?;
            let span = ExprSpan::new(left.span.start, right.span.end);
            left = Expression {
                kind: ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => {
                // Unary plus is the identity on the values templates use.
                self.advance();
                return self.parse_unary();
            }
            _ => return self.parse_postfix(),
        };
        let start = self.peek().span.start;
        self.advance();
        let operand = self.parse_unary()?;
        let span = ExprSpan::new(start, operand.span.end);
        Ok(Expression {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot | TokenKind::OptionalChain => {
                    let optional = self.peek().kind == TokenKind::OptionalChain;
                    self.advance();
                    // `a?.[0]` indexes optionally
                    if optional && self.peek().kind == TokenKind::LBracket {
                        expr = self.parse_index(expr, true)?;
                        continue;
                    }
                    let token = self.peek().clone();
                    let name = match &token.value {
                        TokenValue::Identifier(name) => name.clone(),
                        // Keywords are valid property names: `a.null`, `a.true`
                        _ if matches!(
                            token.kind,
                            TokenKind::Boolean | TokenKind::Null | TokenKind::Undefined
                        ) =>
                        {
                            keyword_text(&token)
                        }
                        _ => return Err(self.error("Expected property name after '.'".into())),
                    };
                    self.advance();
                    let span = ExprSpan::new(expr.span.start, token.span.end);
                    expr = Expression {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(Expression {
                                kind: ExprKind::String(name),
                                span: token.span,
                            }),
                            computed: false,
                            optional,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    expr = self.parse_index(expr, false)?;
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_index(&mut self, object: Expression, optional: bool) -> Result<Expression, ParseError> {
        self.expect(TokenKind::LBracket, "'['")?;
        let property = self.parse_expression()?;
        let end = self.expect(TokenKind::RBracket, "']'")?.span.end;
        let span = ExprSpan::new(object.span.start, end);
        Ok(Expression {
            kind: ExprKind::Member {
                object: Box::new(object),
                property: Box::new(property),
                computed: true,
                optional,
            },
            span,
        })
    }

    // =========================================================================
    // Primary expressions
    // =========================================================================

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = self.peek().clone();
        let kind = match (&token.kind, &token.value) {
            (TokenKind::Number, TokenValue::Number(n)) => ExprKind::Number(*n),
            (TokenKind::String, TokenValue::String(s)) => ExprKind::String(s.clone()),
            (TokenKind::Boolean, TokenValue::Boolean(b)) => ExprKind::Boolean(*b),
            (TokenKind::Null, _) => ExprKind::Null,
            (TokenKind::Undefined, _) => ExprKind::Undefined,
            (TokenKind::Identifier, TokenValue::Identifier(name)) => {
                ExprKind::Identifier(name.clone())
            }
            (TokenKind::LParen, _) => {
                self.advance();
                let mut inner = self.parse_expression()?;
                let end = self.expect(TokenKind::RParen, "')'")?.span.end;
                inner.span = ExprSpan::new(token.span.start, end);
                return Ok(inner);
            }
            (TokenKind::LBracket, _) => return self.parse_array(),
            (TokenKind::LBrace, _) => return self.parse_object(),
            (TokenKind::Eof, _) => return Err(self.error("Unexpected end of expression".into())),
            (kind, _) => return Err(self.error(format!("Unexpected token {kind:?}"))),
        };
        self.advance();
        Ok(Expression {
            kind,
            span: token.span,
        })
    }

    fn parse_array(&mut self) -> Result<Expression, ParseError> {
        let start = self.expect(TokenKind::LBracket, "'['")?.span.start;
        let mut elements = Vec::new();

        while self.peek().kind != TokenKind::RBracket {
            elements.push(self.parse_expression()?);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }

        let end = self.expect(TokenKind::RBracket, "']' to close array")?.span.end;
        Ok(Expression {
            kind: ExprKind::Array(elements),
            span: ExprSpan::new(start, end),
        })
    }

    fn parse_object(&mut self) -> Result<Expression, ParseError> {
        let start = self.expect(TokenKind::LBrace, "'{'")?.span.start;
        let mut properties = Vec::new();

        while self.peek().kind != TokenKind::RBrace {
            let token = self.peek().clone();
            let key = match &token.value {
                TokenValue::Identifier(name) | TokenValue::String(name) => name.clone(),
                TokenValue::Number(n) => crate::format_number(*n),
                _ => return Err(self.error("Expected property key in object literal".into())),
            };
            self.advance();

            let property = if self.peek().kind == TokenKind::Colon {
                self.advance();
                ObjectProperty {
                    key,
                    value: self.parse_expression()?,
                    shorthand: false,
                }
            } else if token.kind == TokenKind::Identifier {
                ObjectProperty {
                    value: Expression {
                        kind: ExprKind::Identifier(key.clone()),
                        span: token.span,
                    },
                    key,
                    shorthand: true,
                }
            } else {
                return Err(self.error("Expected ':' after property key".into()));
            };
            properties.push(property);

            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }

        let end = self.expect(TokenKind::RBrace, "'}' to close object")?.span.end;
        Ok(Expression {
            kind: ExprKind::Object(properties),
            span: ExprSpan::new(start, end),
        })
    }

    // =========================================================================
    // Token navigation helpers
    // =========================================================================

    fn peek(&self) -> &Token {
        // `new` guarantees a trailing Eof and `advance` never moves past it.
        &self.tokens[self.pos]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.peek().kind != kind {
            return Err(self.error(format!("Expected {what}, got {:?}", self.peek().kind)));
        }
        let token = self.peek().clone();
        self.advance();
        Ok(token)
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            line: 1,
            column: self.peek().span.start + 1,
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::QuestionQuestion => (BinaryOp::NullishCoalescing, 1),
        TokenKind::Or => (BinaryOp::Or, 2),
        TokenKind::And => (BinaryOp::And, 3),
        TokenKind::EqEq => (BinaryOp::Eq, 4),
        TokenKind::NotEq => (BinaryOp::Neq, 4),
        TokenKind::StrictEq => (BinaryOp::StrictEq, 4),
        TokenKind::StrictNotEq => (BinaryOp::StrictNeq, 4),
        TokenKind::Lt => (BinaryOp::Lt, 5),
        TokenKind::Gt => (BinaryOp::Gt, 5),
        TokenKind::Lte => (BinaryOp::Lte, 5),
        TokenKind::Gte => (BinaryOp::Gte, 5),
        TokenKind::Plus => (BinaryOp::Add, 6),
        TokenKind::Minus => (BinaryOp::Sub, 6),
        TokenKind::Star => (BinaryOp::Mul, 7),
        TokenKind::Slash => (BinaryOp::Div, 7),
        TokenKind::Percent => (BinaryOp::Mod, 7),
        _ => return None,
    };
    Some(entry)
}

fn keyword_text(token: &Token) -> String {
    match (token.kind, &token.value) {
        (TokenKind::Boolean, TokenValue::Boolean(b)) => b.to_string(),
        (TokenKind::Null, _) => "null".into(),
        _ => "undefined".into(),
    }
}
