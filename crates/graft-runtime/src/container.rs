#![forbid(unsafe_code)]

//! The seam between inflation and a host toolkit's child containers.
//!
//! The fragment host knows *which* children a target should have and in
//! what order; a [`ContainerAdapter`] knows *how* to realize that in the
//! host toolkit. Adapters are attached to a host per target, usually by a
//! property directive during its attach callback, which runs before any
//! child is positioned.
//!
//! Insertion calls are position assertions, not append operations: the
//! host re-issues them on every pass, and an adapter receiving a child it
//! already contains must treat the call as a possible reorder.

use graft_core::ObjectRef;

/// Toolkit-specific child insertion and removal.
pub trait ContainerAdapter {
    /// Make `child` the first child of `container`.
    ///
    /// If `child` is already in `container`, move it to the front instead
    /// of re-adding it.
    fn insert_at_front(&self, container: &ObjectRef, child: &ObjectRef);

    /// Place `child` immediately after `sibling` in `container`.
    ///
    /// If `child` is already in `container` at another position, move it.
    /// A `child` parented elsewhere is a caller bug; adapters log and
    /// leave it where it is.
    fn insert_next_to(&self, container: &ObjectRef, child: &ObjectRef, sibling: &ObjectRef);

    /// Remove `child` from `container`.
    fn remove(&self, container: &ObjectRef, child: &ObjectRef);
}
