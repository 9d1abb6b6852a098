#![forbid(unsafe_code)]

//! Core value model and host-object seam for Graft.
//!
//! This crate provides:
//! - [`Value`] and [`ValueType`] for the engine's dynamic values
//! - [`Object`] as the reflection seam onto a host toolkit
//! - [`ValueHolder`] for evaluation results that accept pushes
//! - [`Key`] for matching entries across incremental update passes
//! - [`ValueParserRegistry`] for type-driven string parsing

pub mod holder;
pub mod key;
pub mod location;
pub mod object;
pub mod property_set;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testobj;
pub mod value;
pub mod value_parser;

pub use holder::ValueHolder;
pub use key::{IdentityKey, Key};
pub use location::SourceLocation;
pub use object::{
    Attachments, Notifier, NotifyGuard, Object, ObjectError, ObjectRef, ObjectType, SignalGuard,
    SignalHub, SignalSpec,
};
pub use property_set::{PropertySet, PropertySetDiff};
#[cfg(any(test, feature = "test-helpers"))]
pub use testobj::{as_test_object, TestObject, ALIGN};
pub use value::{EnumInfo, EnumValue, Value, ValueType};
pub use value_parser::{ValueParseError, ValueParser, ValueParserRegistry};
