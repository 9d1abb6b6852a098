#![forbid(unsafe_code)]

//! Expression parsing, evaluation, and dependency tracking for Graft.
//!
//! This crate provides:
//! - [`Expression`] and [`parse_expression`] for the expression language
//! - [`ExpressionContext`] for name resolution and change notification
//! - [`Binding`] for mixed literal and expression attribute text
//! - [`EvalFlags`] to opt evaluations into pushing and tracking

pub mod binding;
pub mod context;
pub mod error;
pub mod expression;
pub mod parser;

pub use binding::{Binding, BindingBuilder, BindingKind};
pub use context::{ContextGuard, ExpressionContext, FreezeGuard};
pub use error::{EvalError, EvalResult, ParseError};
pub use expression::{EvalFlags, Expression};
pub use parser::parse_expression;
