//! Error types for the rule language.

use thiserror::Error;

use crate::lexer::LexError;

/// Result type alias for language operations.
pub type LangResult<T> = Result<T, LangError>;

/// What went wrong while parsing a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("expected {0}")]
    Expected(&'static str),

    #[error("unknown constant '{0}'")]
    UnknownConstant(String),

    #[error("unknown property {property}={value} for block '{block}'")]
    UnknownProperty {
        block: String,
        property: String,
        value: String,
    },

    #[error("unknown neighborhood '{0}'")]
    UnknownNeighborhood(String),

    #[error("'{0}' addresses several cells where a single offset is required")]
    MultipleTargets(String),

    #[error("count predicate must precede a neighbor condition")]
    DanglingCountPredicate,
}

/// A rule that failed to parse. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}, found {found}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
    pub found: String,
}

/// Rules the kernel backend cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("kernel backend does not support {0}")]
    Unsupported(&'static str),

    #[error("offset {offset} lies outside the kernel window of radius {radius}")]
    OffsetOutOfRange { offset: String, radius: u32 },

    #[error("literal {0} does not fit in a 32-bit kernel integer")]
    LiteralOutOfRange(i64),

    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),
}

/// Errors surfaced by the language front end and compilers.
#[derive(Debug, Error)]
pub enum LangError {
    #[error("line {line}: {source}")]
    Lex {
        line: usize,
        #[source]
        source: LexError,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// I/O error (file operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl LangError {
    /// Source line the error refers to, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            LangError::Lex { line, .. } => Some(*line),
            LangError::Parse(e) => Some(e.line),
            LangError::Kernel(_) | LangError::Io(_) => None,
        }
    }
}
