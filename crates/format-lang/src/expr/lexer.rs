// Hand-written lexer for the expression language

use crate::error::Error;
use crate::span::Span;

use super::token::{Token, TokenKind};

/// Lexer that converts an expression source string into tokens
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the entire source. An unknown character fails the lexer.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                tokens.push(Token::new(
                    TokenKind::Eof,
                    Span::new(self.pos as u32, self.pos as u32),
                ));
                return Ok(tokens);
            }
            tokens.push(self.next_token()?);
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let start = self.pos;
        let b = self.bytes[self.pos];

        if b.is_ascii_digit() {
            return self.lex_number(start);
        }
        if b == b'"' || b == b'\'' {
            return self.lex_string(start, b);
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            return Ok(self.lex_ident(start));
        }
        self.lex_operator(start)
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, Error> {
        if self.bytes[self.pos] == b'0'
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X'))
        {
            return self.lex_hex_number(start);
        }
        self.lex_decimal_number(start)
    }

    fn lex_hex_number(&mut self, start: usize) -> Result<Token, Error> {
        self.pos += 2; // skip 0x
        let digit_start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_hexdigit() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let digits: String = self.source[digit_start..self.pos]
            .chars()
            .filter(|&c| c != '_')
            .collect();
        let span = Span::new(start as u32, self.pos as u32);
        if digits.is_empty() {
            return Err(Error::parse_at("hex literal with no digits", span));
        }
        let value = i128::from_str_radix(&digits, 16)
            .map_err(|_| Error::parse_at("hex literal out of range", span))?;
        Ok(Token::new(TokenKind::IntLiteral(value), span))
    }

    fn lex_decimal_number(&mut self, start: usize) -> Result<Token, Error> {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }

        // Fractional part: '.' followed by a digit (a lone '.' is member access)
        let mut is_float = false;
        if self.peek() == Some(b'.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.pos += 1;
            while self.pos < self.bytes.len()
                && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'_')
            {
                self.pos += 1;
            }
        }

        // Exponent
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += lookahead;
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let span = Span::new(start as u32, self.pos as u32);
        let text: String = self.source[start..self.pos]
            .chars()
            .filter(|&c| c != '_')
            .collect();
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| Error::parse_at("malformed float literal", span))?;
            Ok(Token::new(TokenKind::FloatLiteral(value), span))
        } else {
            let value = text
                .parse::<i128>()
                .map_err(|_| Error::parse_at("integer literal out of range", span))?;
            Ok(Token::new(TokenKind::IntLiteral(value), span))
        }
    }

    fn lex_string(&mut self, start: usize, quote: u8) -> Result<Token, Error> {
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(Error::parse_at(
                        "unterminated string literal",
                        Span::new(start as u32, self.pos as u32),
                    ));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let esc = self.peek_at(1);
                    self.pos += 2;
                    match esc {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'r') => value.push('\r'),
                        Some(b'\\') => value.push('\\'),
                        Some(b'"') => value.push('"'),
                        Some(b'\'') => value.push('\''),
                        _ => {
                            return Err(Error::parse_at(
                                "unknown escape sequence",
                                Span::new(start as u32, self.pos as u32),
                            ));
                        }
                    }
                }
                Some(_) => {
                    // Consume one UTF-8 character
                    let rest = &self.source[self.pos..];
                    let ch = rest.chars().next().unwrap_or('\u{FFFD}');
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Ok(Token::new(
            TokenKind::StringLiteral(value),
            Span::new(start as u32, self.pos as u32),
        ))
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        let span = Span::new(start as u32, self.pos as u32);
        match TokenKind::keyword_from_str(text) {
            Some(kind) => Token::new(kind, span),
            None => Token::new(TokenKind::Ident(text.to_string()), span),
        }
    }

    fn lex_operator(&mut self, start: usize) -> Result<Token, Error> {
        let b = self.bytes[self.pos];
        let next = self.peek_at(1);

        // Multi-char operators first
        let (kind, len) = match (b, next) {
            (b'<', Some(b'<')) => (TokenKind::LShift, 2),
            (b'>', Some(b'>')) => (TokenKind::RShift, 2),
            (b'<', Some(b'=')) => (TokenKind::LessEq, 2),
            (b'>', Some(b'=')) => (TokenKind::GreaterEq, 2),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'!', Some(b'=')) => (TokenKind::BangEq, 2),
            (b':', Some(b':')) => (TokenKind::ColonColon, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'<', _) => (TokenKind::Less, 1),
            (b'>', _) => (TokenKind::Greater, 1),
            (b'=', _) => (TokenKind::Eq, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'&', _) => (TokenKind::Ampersand, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'?', _) => (TokenKind::Question, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b',', _) => (TokenKind::Comma, 1),
            _ => {
                let ch = self.source[start..].chars().next().unwrap_or('?');
                return Err(Error::parse_at(
                    format!("unexpected character '{}'", ch),
                    Span::new(start as u32, start as u32 + 1),
                ));
            }
        };
        self.pos += len;
        Ok(Token::new(kind, Span::new(start as u32, self.pos as u32)))
    }
}
