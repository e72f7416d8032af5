// Recursive descent parser for the expression language
//
// Precedence tower, lowest to highest: ternary, or, and, |, ^, &, equality,
// relational, shift, additive, multiplicative, unary, postfix, primary.
// All binary operators are left-associative; ternary is right-associative.

use crate::error::Error;
use crate::span::Span;

use super::ast::{BinOp, Expr, ExprKind, UnaryOp};
use super::token::{Token, TokenKind};

/// Parser that converts a token stream into an expression AST
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse the token stream as a single expression. A trailing token
    /// after the top-level expression is a parse error.
    pub fn parse(mut self) -> Result<Expr, Error> {
        let expr = self.parse_ternary()?;
        if !matches!(self.peek(), TokenKind::Eof) {
            return Err(Error::parse_at(
                format!("unexpected trailing token {}", self.peek()),
                self.peek_span(),
            ));
        }
        Ok(expr)
    }

    // ========== Token helpers ==========

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(Span::dummy())
    }

    fn advance(&mut self) -> Token {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, Span::dummy()));
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, Error> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(expected) {
            Ok(self.advance())
        } else {
            Err(Error::parse_at(
                format!("unexpected token {}, expected {}", self.peek(), expected),
                self.peek_span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), Error> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                let span = self.peek_span();
                self.advance();
                Ok((name, span))
            }
            other => Err(Error::parse_at(
                format!("unexpected token {}, expected identifier", other),
                self.peek_span(),
            )),
        }
    }

    // ========== Precedence levels ==========

    fn parse_ternary(&mut self) -> Result<Expr, Error> {
        let cond = self.parse_or()?;
        if self.eat(&TokenKind::Question) {
            let then_expr = self.parse_ternary()?;
            self.expect(&TokenKind::Colon)?;
            let else_expr = self.parse_ternary()?;
            let span = cond.span.merge(else_expr.span);
            return Ok(Expr::new(
                ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            ));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::KwOr) {
            let rhs = self.parse_and()?;
            lhs = binary(BinOp::LogOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_bit_or()?;
        while self.eat(&TokenKind::KwAnd) {
            let rhs = self.parse_bit_or()?;
            lhs = binary(BinOp::LogAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_bit_xor()?;
        while self.eat(&TokenKind::Pipe) {
            let rhs = self.parse_bit_xor()?;
            lhs = binary(BinOp::BitOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_bit_and()?;
        while self.eat(&TokenKind::Caret) {
            let rhs = self.parse_bit_and()?;
            lhs = binary(BinOp::BitXor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::Ampersand) {
            let rhs = self.parse_equality()?;
            lhs = binary(BinOp::BitAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEq => BinOp::Le,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEq => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::LShift => BinOp::Shl,
                TokenKind::RShift => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::KwNot => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let op_span = self.peek_span();
            self.advance();
            let expr = self.parse_unary()?;
            let span = op_span.merge(expr.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let (member, member_span) = self.expect_ident()?;
                let span = expr.span.merge(member_span);
                // A call is only a call when it immediately follows the member
                if self.eat(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !matches!(self.peek(), TokenKind::RParen) {
                        loop {
                            args.push(self.parse_ternary()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let close = self.expect(&TokenKind::RParen)?;
                    expr = Expr::new(
                        ExprKind::MethodCall {
                            expr: Box::new(expr),
                            method: member,
                            args,
                        },
                        span.merge(close.span),
                    );
                } else {
                    expr = Expr::new(
                        ExprKind::Member {
                            expr: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_ternary()?;
                let close = self.expect(&TokenKind::RBracket)?;
                let span = expr.span.merge(close.span);
                expr = Expr::new(
                    ExprKind::Index {
                        expr: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let span = self.peek_span();
        match self.peek().clone() {
            TokenKind::IntLiteral(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLiteral(v), span))
            }
            TokenKind::FloatLiteral(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::FloatLiteral(v), span))
            }
            TokenKind::StringLiteral(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLiteral(v), span))
            }
            TokenKind::BoolLiteral(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(v), span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat(&TokenKind::ColonColon) {
                    let (member, member_span) = self.expect_ident()?;
                    Ok(Expr::new(
                        ExprKind::EnumAccess {
                            scope: name,
                            member,
                        },
                        span.merge(member_span),
                    ))
                } else {
                    Ok(Expr::new(ExprKind::Ident(name), span))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_ternary()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            other => Err(Error::parse_at(
                format!("unexpected token {}", other),
                span,
            )),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.merge(rhs.span);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}
