#![forbid(unsafe_code)]

//! The Graft runtime: incremental, reactive fragment inflation.
//!
//! This crate turns immutable [`Fragment`] trees into live object trees
//! and keeps them in sync:
//! - [`FragmentHost`] holds per-target inflation state and the keyed
//!   diffs that make repeated passes incremental
//! - [`Inflator`] drives the pass protocol: bindings, directives,
//!   children
//! - [`ReactiveInflator`] re-runs passes automatically when tracked data
//!   changes
//! - [`ContainerAdapter`] and the directive traits are the seams a host
//!   toolkit plugs into

pub mod container;
pub mod diff;
pub mod directive;
pub mod directives;
pub mod fragment;
pub mod host;
pub mod inflator;
pub mod reactive;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testkit;

pub use container::ContainerAdapter;
pub use diff::{Slot, TableDiff};
pub use directive::{
    as_directive_props, classify_binding_target, BindingTargetKind, DirectiveFlags,
    DirectiveProps, PropertyDirective, PropertyDirectiveFactory, PropertyFormat,
    StructuralDirective, StructuralDirectiveFactory,
};
pub use directives::IfDirectiveFactory;
pub use fragment::{Fragment, FragmentBuilder};
pub use host::FragmentHost;
pub use inflator::{InflationFlags, Inflator};
pub use reactive::ReactiveInflator;
