#![forbid(unsafe_code)]

//! Graft: reactive templating over a reflectable object model.
//!
//! This facade re-exports the crates that make up the engine:
//! - [`graft_core`]: values, the [`Object`] seam, holders, keys
//! - [`graft_expr`]: expression parsing, bindings, contexts
//! - [`graft_runtime`]: fragments, incremental inflation, reactivity
//!
//! The typical flow: parse markup into a [`Fragment`] tree, put the data
//! into an [`ExpressionContext`], and hand both to a [`ReactiveInflator`]
//! that keeps a live object tree in sync.

pub use graft_core;
pub use graft_expr;
pub use graft_runtime;

pub use graft_core::{
    Key, Object, ObjectError, ObjectRef, ObjectType, SourceLocation, Value, ValueHolder,
    ValueType,
};
pub use graft_expr::{
    parse_expression, Binding, BindingKind, EvalError, EvalFlags, Expression, ExpressionContext,
    ParseError,
};
pub use graft_runtime::{
    ContainerAdapter, DirectiveFlags, Fragment, FragmentBuilder, FragmentHost, InflationFlags,
    Inflator, PropertyDirective, PropertyDirectiveFactory, PropertyFormat, ReactiveInflator,
    StructuralDirective, StructuralDirectiveFactory,
};

/// Everything needed to inflate a fragment tree, in one import.
pub mod prelude {
    pub use graft_core::{Object, ObjectRef, ObjectType, SourceLocation, Value, ValueType};
    pub use graft_expr::{Binding, ExpressionContext};
    pub use graft_runtime::{
        Fragment, FragmentHost, InflationFlags, Inflator, ReactiveInflator,
    };
}
