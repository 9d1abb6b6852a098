#![forbid(unsafe_code)]

//! String-to-value parsing driven by the target type.
//!
//! Constant attribute text has no type of its own; it is parsed against
//! the type of the property it is assigned to. Parsers register in a
//! process-wide registry so host toolkits can add coverage for their own
//! types next to the built-ins.
//!
//! # Invariants
//!
//! 1. **First claim wins**: parsers are consulted in registration order,
//!    and the first one that claims the target type owns the outcome.
//!    Later parsers never see the request, so a claiming parser's failure
//!    is final.
//!
//! 2. **Built-ins are always present in the global registry**: the
//!    process-wide registry starts with string, bool, int, float, and
//!    enum-nick parsers.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | No parser claims the target type | `Err(ValueParseError::NoMatch)` |
//! | A claiming parser rejects the text | `Err(ValueParseError::BadValue)` |

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use crate::value::{EnumValue, Value, ValueType};

// ============================================================================
// Errors
// ============================================================================

/// Why a string failed to parse into a target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueParseError {
    /// No registered parser claims the target type.
    NoMatch { target: String },
    /// A parser claimed the type but rejected the text.
    BadValue {
        target: String,
        text: String,
        reason: String,
    },
}

impl ValueParseError {
    fn bad_value(target: &ValueType, text: &str, reason: impl Into<String>) -> Self {
        Self::BadValue {
            target: target.name(),
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch { target } => {
                write!(f, "no value parser handles type {target}")
            }
            Self::BadValue {
                target,
                text,
                reason,
            } => {
                write!(f, "cannot parse '{text}' as {target}: {reason}")
            }
        }
    }
}

impl std::error::Error for ValueParseError {}

// ============================================================================
// The parser trait and registry
// ============================================================================

/// Parses strings into values of the types it claims.
pub trait ValueParser: Send + Sync {
    /// Name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this parser claims `target`.
    fn claims(&self, target: &ValueType) -> bool;

    /// Parse `text` into a value of type `target`. Only called when
    /// [`ValueParser::claims`] returned true.
    fn parse(&self, text: &str, target: &ValueType) -> Result<Value, ValueParseError>;
}

/// An ordered collection of [`ValueParser`]s.
#[derive(Default)]
pub struct ValueParserRegistry {
    parsers: RwLock<Vec<Arc<dyn ValueParser>>>,
}

impl ValueParserRegistry {
    /// An empty registry with no parsers at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `parser` to the consultation order.
    pub fn register(&self, parser: Arc<dyn ValueParser>) {
        self.parsers
            .write()
            .expect("value parser registry lock poisoned")
            .push(parser);
    }

    /// Convert `value` to `target`, falling back to string parsing when
    /// the value is a string and no built-in transform applies.
    pub fn try_transform(&self, value: &Value, target: &ValueType) -> Result<Value, ValueParseError> {
        if let Some(transformed) = value.transform_to(target) {
            return Ok(transformed);
        }
        if let Value::Str(text) = value {
            return self.try_parse(text, target);
        }
        Err(ValueParseError::BadValue {
            target: target.name(),
            text: value.to_string(),
            reason: format!("no conversion from {}", value.value_type().name()),
        })
    }

    /// Parse `text` against `target` using the registered parsers.
    pub fn try_parse(&self, text: &str, target: &ValueType) -> Result<Value, ValueParseError> {
        let parsers = self
            .parsers
            .read()
            .expect("value parser registry lock poisoned");
        for parser in parsers.iter() {
            if parser.claims(target) {
                return parser.parse(text, target);
            }
        }
        Err(ValueParseError::NoMatch {
            target: target.name(),
        })
    }

    /// The process-wide registry, created on first use with the built-in
    /// parsers already registered.
    #[must_use]
    pub fn global() -> &'static ValueParserRegistry {
        static REGISTRY: OnceLock<ValueParserRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let registry = ValueParserRegistry::new();
            registry.register(Arc::new(StrParser));
            registry.register(Arc::new(BoolParser));
            registry.register(Arc::new(IntParser));
            registry.register(Arc::new(FloatParser));
            registry.register(Arc::new(EnumNickParser));
            registry
        })
    }
}

// ============================================================================
// Built-in parsers
// ============================================================================

/// Passes text through unchanged for string targets.
struct StrParser;

impl ValueParser for StrParser {
    fn name(&self) -> &'static str {
        "str"
    }

    fn claims(&self, target: &ValueType) -> bool {
        matches!(target, ValueType::Str)
    }

    fn parse(&self, text: &str, _target: &ValueType) -> Result<Value, ValueParseError> {
        Ok(Value::str(text))
    }
}

/// Accepts exactly `true` and `false`.
struct BoolParser;

impl ValueParser for BoolParser {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn claims(&self, target: &ValueType) -> bool {
        matches!(target, ValueType::Bool)
    }

    fn parse(&self, text: &str, target: &ValueType) -> Result<Value, ValueParseError> {
        match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ValueParseError::bad_value(
                target,
                text,
                "expected 'true' or 'false'",
            )),
        }
    }
}

struct IntParser;

impl ValueParser for IntParser {
    fn name(&self) -> &'static str {
        "int"
    }

    fn claims(&self, target: &ValueType) -> bool {
        matches!(target, ValueType::Int)
    }

    fn parse(&self, text: &str, target: &ValueType) -> Result<Value, ValueParseError> {
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|e| ValueParseError::bad_value(target, text, e.to_string()))
    }
}

struct FloatParser;

impl ValueParser for FloatParser {
    fn name(&self) -> &'static str {
        "float"
    }

    fn claims(&self, target: &ValueType) -> bool {
        matches!(target, ValueType::Float)
    }

    fn parse(&self, text: &str, target: &ValueType) -> Result<Value, ValueParseError> {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|e| ValueParseError::bad_value(target, text, e.to_string()))
    }
}

/// Resolves enum variants by nick for any enum target type.
struct EnumNickParser;

impl ValueParser for EnumNickParser {
    fn name(&self) -> &'static str {
        "enum-nick"
    }

    fn claims(&self, target: &ValueType) -> bool {
        matches!(target, ValueType::Enum(_))
    }

    fn parse(&self, text: &str, target: &ValueType) -> Result<Value, ValueParseError> {
        let ValueType::Enum(info) = target else {
            return Err(ValueParseError::NoMatch {
                target: target.name(),
            });
        };
        match info.value_by_nick(text) {
            Some(value) => Ok(Value::Enum(EnumValue::new(info, value))),
            None => Err(ValueParseError::bad_value(
                target,
                text,
                format!("no variant of {} has this nick", info.name),
            )),
        }
    }
}
