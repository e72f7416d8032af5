// Error types for the format interpreter
//
// Every failure is exactly one of five kinds: end-of-stream, parse error,
// validation error, not-implemented, or the base escape hatch.

use crate::span::Span;
use std::fmt;

/// Read past the end of a stream. Carries the position at which the read
/// was attempted; the stream position itself is left unchanged.
#[derive(Debug, Clone)]
pub struct EosError {
    pub pos: usize,
}

impl fmt::Display for EosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "end of stream at byte {}", self.pos)
    }
}

/// Expression or interpretation failure.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    /// Byte position in the input data, when the failure is tied to one.
    pub byte_pos: Option<usize>,
    /// Position within the offending expression source, when known.
    pub span: Option<Span>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            byte_pos: None,
            span: None,
        }
    }

    pub fn with_span(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            byte_pos: None,
            span: Some(span),
        }
    }

    /// Set span if not already present
    pub fn with_span_if_none(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.message)?;
        if let Some(span) = self.span {
            write!(f, " (at expression offset {})", span.start)?;
        }
        if let Some(pos) = self.byte_pos {
            write!(f, " (at byte {})", pos)?;
        }
        Ok(())
    }
}

/// Schema or contents violation.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    /// Path within the schema document (e.g. "/types/header/seq/2").
    pub path: Option<String>,
    /// Byte position in the input data (contents mismatches).
    pub byte_pos: Option<usize>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            byte_pos: None,
        }
    }

    pub fn at_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
            byte_pos: None,
        }
    }

    pub fn at_byte(message: impl Into<String>, byte_pos: usize) -> Self {
        Self {
            message: message.into(),
            path: None,
            byte_pos: Some(byte_pos),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error: {}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at {})", path)?;
        }
        if let Some(pos) = self.byte_pos {
            write!(f, " (at byte {})", pos)?;
        }
        Ok(())
    }
}

/// Top-level error type for the engine.
#[derive(Debug, Clone)]
pub enum Error {
    Eos(EosError),
    Parse(ParseError),
    Validation(ValidationError),
    /// Reserved feature encountered; carries the feature name.
    NotImplemented(String),
    /// Escape hatch for unexpected conditions.
    Base(String),
}

impl Error {
    pub fn eos(pos: usize) -> Self {
        Error::Eos(EosError { pos })
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(ParseError::new(message))
    }

    pub fn parse_at(message: impl Into<String>, span: Span) -> Self {
        Error::Parse(ParseError::with_span(message, span))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::new(message))
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Error::NotImplemented(feature.into())
    }

    /// True when the error is caused by reading past end of stream.
    /// Used to gracefully terminate repeat-until loops instead of hard-failing.
    pub fn is_eos(&self) -> bool {
        matches!(self, Error::Eos(_))
    }

    /// Attach an expression span to a parse error that lacks one.
    pub fn with_span_if_none(self, span: Span) -> Self {
        match self {
            Error::Parse(e) => Error::Parse(e.with_span_if_none(span)),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Eos(e) => write!(f, "{}", e),
            Error::Parse(e) => write!(f, "{}", e),
            Error::Validation(e) => write!(f, "{}", e),
            Error::NotImplemented(feature) => write!(f, "not implemented: {}", feature),
            Error::Base(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Error {}
