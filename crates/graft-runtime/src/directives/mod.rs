#![forbid(unsafe_code)]

//! Built-in directives shipped with the runtime.

pub mod cond;

pub use cond::IfDirectiveFactory;
