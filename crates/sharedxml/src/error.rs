//! Error types for sharedxml

use std::fmt;
use thiserror::Error;

/// Position in source text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pos {
    pub offset: usize,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl Pos {
    pub const fn new(offset: usize, line: u32, col: u32) -> Self {
        Self { offset, line, col }
    }
}

/// Span representing a range in source text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    pub const fn at(pos: Pos) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub const fn empty() -> Self {
        Self {
            start: Pos::new(0, 0, 0),
            end: Pos::new(0, 0, 0),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.start.line == 0 && self.end.line == 0
    }
}

/// Coarse failure class reported to callers that only need to react, not diagnose
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Parse,
    Storage,
    Acquisition,
    Timeout,
    NotFound,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::Storage => "storage",
            Self::Acquisition => "acquisition",
            Self::Timeout => "timeout",
            Self::NotFound => "not found",
        };
        f.write_str(name)
    }
}

/// Error kind for detailed categorization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidToken,
    UnexpectedEof,
    MismatchedTag { expected: String, found: String },
    DuplicateAttribute { name: String },
    InvalidEntity { entity: String },
    InvalidUtf8,
    TrailingContent,
    MaxDepthExceeded { max: u16 },
    MaxSizeExceeded { max: usize },
    /// A record or sequence handle does not resolve in the store
    DanglingHandle { handle: String },
    /// A handle resolved to the wrong kind of shared object
    WrongHandleKind { expected: &'static str },
    IndexOutOfRange { index: usize, len: usize },
    MissingField { field: &'static str },
    Storage,
    Acquisition { document: String },
    Timeout { waited_ms: u128 },
    NotFound { what: String },
}

impl ErrorKind {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidToken
            | Self::UnexpectedEof
            | Self::MismatchedTag { .. }
            | Self::DuplicateAttribute { .. }
            | Self::InvalidEntity { .. }
            | Self::InvalidUtf8
            | Self::TrailingContent
            | Self::MaxDepthExceeded { .. }
            | Self::MaxSizeExceeded { .. } => ErrorCategory::Parse,
            Self::DanglingHandle { .. }
            | Self::WrongHandleKind { .. }
            | Self::IndexOutOfRange { .. }
            | Self::MissingField { .. }
            | Self::Storage => ErrorCategory::Storage,
            Self::Acquisition { .. } => ErrorCategory::Acquisition,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::NotFound { .. } => ErrorCategory::NotFound,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken => write!(f, "invalid token"),
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::MismatchedTag { expected, found } => {
                write!(f, "mismatched closing tag: expected </{expected}>, found </{found}>")
            }
            Self::DuplicateAttribute { name } => write!(f, "duplicate attribute: {name}"),
            Self::InvalidEntity { entity } => write!(f, "invalid xml entity: &{entity};"),
            Self::InvalidUtf8 => write!(f, "invalid utf-8"),
            Self::TrailingContent => write!(f, "unexpected content after root element"),
            Self::MaxDepthExceeded { max } => write!(f, "max depth exceeded: {max}"),
            Self::MaxSizeExceeded { max } => write!(f, "max size exceeded: {max}"),
            Self::DanglingHandle { handle } => write!(f, "handle {handle} does not resolve"),
            Self::WrongHandleKind { expected } => write!(f, "expected a {expected} handle"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for sequence of length {len}")
            }
            Self::MissingField { field } => write!(f, "record is missing field {field}"),
            Self::Storage => write!(f, "storage failure"),
            Self::Acquisition { document } => write!(f, "could not acquire document {document}"),
            Self::Timeout { waited_ms } => write!(f, "timed out after {waited_ms} ms"),
            Self::NotFound { what } => write!(f, "{what} not found"),
        }
    }
}

/// Main error type for sharedxml
#[derive(Error, Clone, Debug, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    span: Span,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        let message = kind.to_string();
        Self {
            kind,
            span,
            message,
        }
    }

    pub fn with_message(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }

    /// Error that has no source position (storage, acquisition, ...)
    pub fn unpositioned(kind: ErrorKind) -> Self {
        Self::new(kind, Span::empty())
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create error at specific position
    pub fn at(kind: ErrorKind, offset: usize, line: u32, col: u32) -> Self {
        Self::new(kind, Span::at(Pos::new(offset, line, col)))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::unpositioned(ErrorKind::NotFound { what: what.into() })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_empty() {
            write!(f, "{} error: {}", self.category(), self.message)
        } else {
            write!(f, "error at {}: {}", self.span.start, self.message)
        }
    }
}

/// Result type alias for sharedxml
pub type Result<T> = std::result::Result<T, Error>;
