#![forbid(unsafe_code)]

//! Parse and evaluation errors, each pinned to a source location.
//!
//! Parse errors are fatal to the parse that produced them. Evaluation
//! errors are fatal to a single binding's evaluation; the caller decides
//! whether to skip the binding or abort, so every variant carries enough
//! context to log on its own.

use graft_core::object::ObjectError;
use graft_core::SourceLocation;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// A syntax error in a binding string or expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{location}: unterminated string literal")]
    UnterminatedString { location: SourceLocation },

    #[error("{location}: malformed number '{text}'")]
    BadNumber {
        text: String,
        location: SourceLocation,
    },

    #[error("{location}: unexpected character '{found}'")]
    UnexpectedChar {
        found: char,
        location: SourceLocation,
    },

    #[error("{location}: unexpected end of expression")]
    UnexpectedEnd { location: SourceLocation },

    #[error("{location}: expected {what}")]
    Expected {
        what: &'static str,
        location: SourceLocation,
    },

    #[error("{location}: expression opened here is never closed")]
    UnterminatedExpression { location: SourceLocation },
}

impl ParseError {
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::UnterminatedString { location }
            | Self::BadNumber { location, .. }
            | Self::UnexpectedChar { location, .. }
            | Self::UnexpectedEnd { location }
            | Self::Expected { location, .. }
            | Self::UnterminatedExpression { location } => location,
        }
    }
}

/// A failure while evaluating an expression or binding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{location}: undefined name '{name}'")]
    UndefinedName {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: undefined property '{property}'")]
    UndefinedProperty {
        property: String,
        location: SourceLocation,
    },

    #[error("{location}: undefined signal '{signal}'")]
    UndefinedSignal {
        signal: String,
        location: SourceLocation,
    },

    #[error("{location}: {message}")]
    InvalidType {
        message: String,
        location: SourceLocation,
    },

    #[error(
        "{location}: invalid number of arguments to '{signal}': expected {expected}, got {found}"
    )]
    InvalidArgumentCount {
        signal: String,
        expected: usize,
        found: usize,
        location: SourceLocation,
    },

    #[error("{location}: signal '{signal}' {reason}")]
    InvalidDetail {
        signal: String,
        reason: &'static str,
        location: SourceLocation,
    },

    #[error("{location}: binding cannot push values back to its source")]
    NonBidirectional { location: SourceLocation },
}

impl EvalError {
    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::UndefinedName { location, .. }
            | Self::UndefinedProperty { location, .. }
            | Self::UndefinedSignal { location, .. }
            | Self::InvalidType { location, .. }
            | Self::InvalidArgumentCount { location, .. }
            | Self::InvalidDetail { location, .. }
            | Self::NonBidirectional { location } => location,
        }
    }

    /// Lift an error from the host-object seam, pinning it to `location`.
    #[must_use]
    pub fn from_object(error: ObjectError, location: &SourceLocation) -> Self {
        let location = location.clone();
        match error {
            ObjectError::UndefinedProperty { property, .. } => {
                Self::UndefinedProperty { property, location }
            }
            ObjectError::UndefinedSignal { signal, .. } => Self::UndefinedSignal { signal, location },
            other => Self::InvalidType {
                message: other.to_string(),
                location,
            },
        }
    }
}
