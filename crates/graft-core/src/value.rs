#![forbid(unsafe_code)]

//! The dynamic value model threaded through the engine.
//!
//! Bindings evaluate to [`Value`]s, properties are read and written as
//! [`Value`]s, and the value parser coerces between them. The engine never
//! needs to know the host toolkit's native value representation; the
//! reflection seam (see [`crate::object`]) converts at the boundary.
//!
//! # Invariants
//!
//! 1. **Object equality is identity**: two `Value::Object`s compare equal
//!    iff they hold the same reference, never structurally.
//!
//! 2. **Built-in transforms are total or absent**: [`Value::transform_to`]
//!    either yields a value of exactly the requested type or `None`; it
//!    never approximates the type.
//!
//! 3. **Enum descriptors are static**: an enum value's [`EnumInfo`] lives
//!    for the process lifetime and is compared by address, so type checks
//!    are pointer comparisons.

use std::fmt;
use std::rc::Rc;

use crate::object::{Object, ObjectRef};

/// Static descriptor for an enumerated type: a display name plus
/// `(nick, value)` pairs.
///
/// Descriptors are declared as `static`s by whoever owns the enum and are
/// identified by address.
#[derive(Debug)]
pub struct EnumInfo {
    pub name: &'static str,
    pub values: &'static [(&'static str, i32)],
}

impl EnumInfo {
    /// Look up a variant by nick.
    #[must_use]
    pub fn value_by_nick(&self, nick: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(n, _)| *n == nick)
            .map(|(_, v)| *v)
    }

    /// Look up a variant's nick by value.
    #[must_use]
    pub fn nick_of(&self, value: i32) -> Option<&'static str> {
        self.values
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| *n)
    }

    /// Whether `value` names a declared variant.
    #[must_use]
    pub fn contains(&self, value: i32) -> bool {
        self.values.iter().any(|(_, v)| *v == value)
    }
}

/// A typed enum value: descriptor plus raw variant value.
#[derive(Debug, Clone, Copy)]
pub struct EnumValue {
    pub info: &'static EnumInfo,
    pub value: i32,
}

impl EnumValue {
    #[must_use]
    pub fn new(info: &'static EnumInfo, value: i32) -> Self {
        Self { info, value }
    }

    /// The variant's nick, or `None` for an out-of-range value.
    #[must_use]
    pub fn nick(&self) -> Option<&'static str> {
        self.info.nick_of(self.value)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.info, other.info) && self.value == other.value
    }
}

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Enum(&'static EnumInfo),
    Object,
}

impl ValueType {
    /// Human-readable name for diagnostics.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Null => "nothing".into(),
            Self::Bool => "bool".into(),
            Self::Int => "int".into(),
            Self::Float => "float".into(),
            Self::Str => "string".into(),
            Self::Enum(info) => format!("enum {}", info.name),
            Self::Object => "object".into(),
        }
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null)
            | (Self::Bool, Self::Bool)
            | (Self::Int, Self::Int)
            | (Self::Float, Self::Float)
            | (Self::Str, Self::Str)
            | (Self::Object, Self::Object) => true,
            (Self::Enum(a), Self::Enum(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Eq for ValueType {}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A dynamically typed value.
///
/// Cloning is cheap: strings are shared, objects are reference handles.
#[derive(Clone)]
pub enum Value {
    /// No value; also the result of invoking a void signal.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Enum(EnumValue),
    Object(ObjectRef),
}

impl Value {
    /// Build a string value.
    #[must_use]
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    /// This value's type tag.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
            Self::Enum(e) => ValueType::Enum(e.info),
            Self::Object(_) => ValueType::Object,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Convert to `target` using the built-in transform table, or `None`
    /// when no built-in applies.
    ///
    /// Built-ins: identity; `Int ↔ Float`; `Bool ↔ Int`; `Int → Enum`
    /// (declared variants only) and `Enum → Int`; everything except
    /// `Object` renders `→ Str`. String *parsing* is not a transform; it
    /// goes through the value parser registry.
    #[must_use]
    pub fn transform_to(&self, target: &ValueType) -> Option<Value> {
        if self.value_type() == *target {
            return Some(self.clone());
        }
        match (self, target) {
            (Self::Int(i), ValueType::Float) => Some(Self::Float(*i as f64)),
            (Self::Float(f), ValueType::Int) => Some(Self::Int(*f as i64)),
            (Self::Bool(b), ValueType::Int) => Some(Self::Int(i64::from(*b))),
            (Self::Int(i), ValueType::Bool) => Some(Self::Bool(*i != 0)),
            (Self::Enum(e), ValueType::Int) => Some(Self::Int(i64::from(e.value))),
            (Self::Int(i), ValueType::Enum(info)) => {
                let raw = i32::try_from(*i).ok()?;
                info.contains(raw)
                    .then(|| Self::Enum(EnumValue::new(info, raw)))
            }
            (Self::Object(_), _) | (_, ValueType::Object) => None,
            (_, ValueType::Str) => Some(Self::str(self.to_string())),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Enum(e) => match e.nick() {
                Some(nick) => f.write_str(nick),
                None => write!(f, "{}", e.value),
            },
            Self::Object(o) => write!(f, "<{}>", o.object_type().name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Enum(e) => write!(f, "Enum({}::{})", e.info.name, e.value),
            Self::Object(o) => write!(f, "Object({})", o.object_type().name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Self::Enum(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DIRECTION: EnumInfo = EnumInfo {
        name: "Direction",
        values: &[("north", 0), ("south", 1), ("east", 2), ("west", 3)],
    };

    #[test]
    fn enum_lookup_by_nick_and_value() {
        assert_eq!(DIRECTION.value_by_nick("south"), Some(1));
        assert_eq!(DIRECTION.value_by_nick("up"), None);
        assert_eq!(DIRECTION.nick_of(2), Some("east"));
        assert_eq!(DIRECTION.nick_of(9), None);
    }

    #[test]
    fn value_types_match_variants() {
        assert_eq!(Value::Null.value_type(), ValueType::Null);
        assert_eq!(Value::Bool(true).value_type(), ValueType::Bool);
        assert_eq!(Value::Int(3).value_type(), ValueType::Int);
        assert_eq!(Value::str("x").value_type(), ValueType::Str);
        assert_eq!(
            Value::Enum(EnumValue::new(&DIRECTION, 0)).value_type(),
            ValueType::Enum(&DIRECTION)
        );
    }

    #[test]
    fn identity_transform_clones() {
        let v = Value::Int(7);
        assert_eq!(v.transform_to(&ValueType::Int), Some(Value::Int(7)));
    }

    #[test]
    fn numeric_transforms() {
        assert_eq!(
            Value::Int(3).transform_to(&ValueType::Float),
            Some(Value::Float(3.0))
        );
        assert_eq!(
            Value::Float(3.9).transform_to(&ValueType::Int),
            Some(Value::Int(3))
        );
        assert_eq!(
            Value::Bool(true).transform_to(&ValueType::Int),
            Some(Value::Int(1))
        );
        assert_eq!(
            Value::Int(0).transform_to(&ValueType::Bool),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn enum_transforms() {
        let south = Value::Enum(EnumValue::new(&DIRECTION, 1));
        assert_eq!(south.transform_to(&ValueType::Int), Some(Value::Int(1)));
        assert_eq!(
            Value::Int(2).transform_to(&ValueType::Enum(&DIRECTION)),
            Some(Value::Enum(EnumValue::new(&DIRECTION, 2)))
        );
        assert_eq!(Value::Int(9).transform_to(&ValueType::Enum(&DIRECTION)), None);
    }

    #[test]
    fn everything_but_objects_renders_to_string() {
        assert_eq!(
            Value::Int(12).transform_to(&ValueType::Str),
            Some(Value::str("12"))
        );
        assert_eq!(
            Value::Bool(false).transform_to(&ValueType::Str),
            Some(Value::str("false"))
        );
        assert_eq!(
            Value::Enum(EnumValue::new(&DIRECTION, 3)).transform_to(&ValueType::Str),
            Some(Value::str("west"))
        );
        assert_eq!(Value::Null.transform_to(&ValueType::Str), Some(Value::str("")));
    }

    #[test]
    fn string_parsing_is_not_a_transform() {
        assert_eq!(Value::str("12").transform_to(&ValueType::Int), None);
        assert_eq!(Value::str("true").transform_to(&ValueType::Bool), None);
    }

    #[test]
    fn null_renders_empty() {
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn float_equality_is_structural() {
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
        assert_ne!(Value::Float(1.5), Value::Float(2.5));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }
}
