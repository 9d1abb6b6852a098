#![forbid(unsafe_code)]

//! Evaluation scope and change propagation for expressions.
//!
//! An [`ExpressionContext`] owns the name resolution environment: an
//! ordered list of scope objects plus an overlay of extra names (template
//! parameters and the like). It also carries the two notification
//! channels reactive inflation is built on: `changed` fires when any
//! tracked source mutates, `reset` fires when stale dependency
//! subscriptions are torn down before a fresh evaluation pass.
//!
//! # Invariants
//!
//! 1. **Teardown precedes resubscription**: [`ExpressionContext::reset_dependencies`]
//!    drops every subscription from the previous pass before the `reset`
//!    hook runs, so a pass never observes its predecessor's watches.
//!
//! 2. **`changed` coalesces under freeze**: any number of
//!    [`ExpressionContext::emit_changed`] calls while a [`FreezeGuard`]
//!    is alive collapse into a single emission at thaw.
//!
//! 3. **Scope objects are not kept alive by their own watches**: the
//!    notify callbacks installed by dependency tracking hold only weak
//!    context references, so a context and its scopes never form a
//!    reference cycle.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use graft_core::holder::ValueHolder;
use graft_core::object::{NotifyGuard, Object, ObjectRef};
use graft_core::property_set::PropertySet;
use graft_core::value::Value;
use graft_core::value_parser::ValueParserRegistry;

// ============================================================================
// Parameterless observer hooks
// ============================================================================

#[derive(Default)]
struct Hook {
    next_id: Cell<u64>,
    subs: RefCell<Vec<(u64, Rc<dyn Fn()>)>>,
}

impl Hook {
    fn connect(self: &Rc<Self>, callback: impl Fn() + 'static) -> ContextGuard {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subs.borrow_mut().push((id, Rc::new(callback)));
        ContextGuard {
            hook: Rc::downgrade(self),
            id,
        }
    }

    fn fire(&self) {
        let callbacks: Vec<Rc<dyn Fn()>> = self
            .subs
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in callbacks {
            callback();
        }
    }
}

/// RAII handle for a `changed` or `reset` subscription.
pub struct ContextGuard {
    hook: Weak<Hook>,
    id: u64,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.upgrade() {
            hook.subs.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

// ============================================================================
// The context
// ============================================================================

struct ContextInner {
    scopes: RefCell<Vec<ObjectRef>>,
    extra: RefCell<PropertySet>,
    parser: Option<Rc<ValueParserRegistry>>,
    changed: Rc<Hook>,
    reset: Rc<Hook>,
    deps: RefCell<Vec<NotifyGuard>>,
    freeze_depth: Cell<u32>,
    changed_pending: Cell<bool>,
    emitting: Cell<bool>,
}

/// The environment an expression evaluates in.
#[derive(Clone)]
pub struct ExpressionContext {
    inner: Rc<ContextInner>,
}

impl Default for ExpressionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A context using `parser` instead of the process-wide registry.
    #[must_use]
    pub fn with_parser(parser: Rc<ValueParserRegistry>) -> Self {
        Self::build(Some(parser))
    }

    fn build(parser: Option<Rc<ValueParserRegistry>>) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                scopes: RefCell::new(Vec::new()),
                extra: RefCell::new(PropertySet::new()),
                parser,
                changed: Rc::new(Hook::default()),
                reset: Rc::new(Hook::default()),
                deps: RefCell::new(Vec::new()),
                freeze_depth: Cell::new(0),
                changed_pending: Cell::new(false),
                emitting: Cell::new(false),
            }),
        }
    }

    /// The parser registry used for coercions in this context.
    #[must_use]
    pub fn parser(&self) -> &ValueParserRegistry {
        match &self.inner.parser {
            Some(parser) => parser,
            None => ValueParserRegistry::global(),
        }
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    /// Append an object to the scope list. Later scopes are consulted
    /// after earlier ones.
    pub fn add_scope(&self, scope: ObjectRef) {
        self.inner.scopes.borrow_mut().push(scope);
    }

    /// Bind `name` directly to a value, shadowing scope properties.
    /// Returns true when the name was not bound before. Emits `changed`.
    pub fn insert(&self, name: &str, value: Value) -> bool {
        let newly_bound = {
            let mut extra = self.inner.extra.borrow_mut();
            let newly_bound = !extra.contains(name);
            extra.insert(name, ValueHolder::new(value));
            newly_bound
        };
        self.emit_changed();
        newly_bound
    }

    /// Look `name` up in the extra-name overlay.
    #[must_use]
    pub fn lookup_extra(&self, name: &str) -> Option<Value> {
        self.inner
            .extra
            .borrow()
            .get(name)
            .map(|holder| holder.value().clone())
    }

    /// First scope object exposing a property called `property`.
    #[must_use]
    pub fn find_object_with_property(&self, property: &str) -> Option<ObjectRef> {
        self.inner
            .scopes
            .borrow()
            .iter()
            .find(|scope| scope.has_property(property))
            .cloned()
    }

    /// First scope object exposing a signal called `signal`.
    #[must_use]
    pub fn find_object_with_signal(&self, signal: &str) -> Option<ObjectRef> {
        self.inner
            .scopes
            .borrow()
            .iter()
            .find(|scope| scope.has_signal(signal))
            .cloned()
    }

    // ------------------------------------------------------------------
    // Change propagation
    // ------------------------------------------------------------------

    #[must_use = "dropping the guard disconnects the subscription"]
    pub fn connect_changed(&self, callback: impl Fn() + 'static) -> ContextGuard {
        self.inner.changed.connect(callback)
    }

    #[must_use = "dropping the guard disconnects the subscription"]
    pub fn connect_reset(&self, callback: impl Fn() + 'static) -> ContextGuard {
        self.inner.reset.connect(callback)
    }

    /// Announce that something an expression depends on changed.
    ///
    /// While frozen or already emitting, the emission is latched and
    /// delivered once afterwards.
    pub fn emit_changed(&self) {
        let inner = &self.inner;
        if inner.freeze_depth.get() > 0 || inner.emitting.get() {
            inner.changed_pending.set(true);
            return;
        }
        inner.emitting.set(true);
        loop {
            inner.changed.fire();
            if !inner.changed_pending.replace(false) {
                break;
            }
        }
        inner.emitting.set(false);
    }

    /// Suppress `changed` deliveries until the guard drops.
    #[must_use = "changed emissions are only coalesced while the guard lives"]
    pub fn freeze(&self) -> FreezeGuard {
        self.inner.freeze_depth.set(self.inner.freeze_depth.get() + 1);
        FreezeGuard {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Dependency tracking
    // ------------------------------------------------------------------

    /// Watch `property` on `object`, routing its change notifications to
    /// this context's `changed` hook until the next dependency reset.
    pub fn track_dependency(&self, object: &ObjectRef, property: &str) {
        let weak = Rc::downgrade(&self.inner);
        let guard = object.notifier().connect(Some(property), move |_| {
            if let Some(inner) = weak.upgrade() {
                ExpressionContext { inner }.emit_changed();
            }
        });
        self.inner.deps.borrow_mut().push(guard);
    }

    /// Number of live dependency watches.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Drop every dependency watch from the previous evaluation pass,
    /// then fire the `reset` hook.
    pub fn reset_dependencies(&self) {
        self.inner.deps.borrow_mut().clear();
        self.inner.reset.fire();
    }
}

/// RAII handle holding `changed` emissions back; see
/// [`ExpressionContext::freeze`].
pub struct FreezeGuard {
    inner: Weak<ContextInner>,
}

impl Drop for FreezeGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let depth = inner.freeze_depth.get().saturating_sub(1);
        inner.freeze_depth.set(depth);
        if depth == 0 && inner.changed_pending.replace(false) {
            ExpressionContext { inner }.emit_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::testobj::TestObject;
    use std::cell::Cell;

    #[test]
    fn scope_lookup_prefers_earlier_scopes() {
        let context = ExpressionContext::new();
        let first = TestObject::new();
        first.add_property("label", Value::str("first"));
        let second = TestObject::new();
        second.add_property("label", Value::str("second"));
        second.add_property("only", Value::Int(1));

        context.add_scope(first.clone());
        context.add_scope(second.clone());

        let found = context.find_object_with_property("label").unwrap();
        assert!(graft_core::testobj::as_test_object(&found)
            .is_some_and(|o| Rc::ptr_eq(&o, &first)));
        assert!(context.find_object_with_property("only").is_some());
        assert!(context.find_object_with_property("missing").is_none());
    }

    #[test]
    fn extra_names_shadow_scopes() {
        let context = ExpressionContext::new();
        assert!(context.insert("$0", Value::Int(4)));
        assert!(!context.insert("$0", Value::Int(5)));
        assert_eq!(context.lookup_extra("$0"), Some(Value::Int(5)));
    }

    #[test]
    fn inserting_a_name_emits_changed() {
        let context = ExpressionContext::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _guard = context.connect_changed(move || counter.set(counter.get() + 1));

        context.insert("x", Value::Int(1));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn freeze_coalesces_changed_emissions() {
        let context = ExpressionContext::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _guard = context.connect_changed(move || counter.set(counter.get() + 1));

        {
            let _freeze = context.freeze();
            context.emit_changed();
            context.emit_changed();
            context.emit_changed();
            assert_eq!(hits.get(), 0);
        }
        assert_eq!(hits.get(), 1);

        context.emit_changed();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn nested_freezes_thaw_only_at_the_outermost() {
        let context = ExpressionContext::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _guard = context.connect_changed(move || counter.set(counter.get() + 1));

        let outer = context.freeze();
        {
            let _inner = context.freeze();
            context.emit_changed();
        }
        assert_eq!(hits.get(), 0);
        drop(outer);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reset_fires_once_and_drops_watches() {
        let context = ExpressionContext::new();
        let resets = Rc::new(Cell::new(0));
        let counter = Rc::clone(&resets);
        let _guard = context.connect_reset(move || counter.set(counter.get() + 1));

        let scope = TestObject::new();
        scope.add_property("x", Value::Int(1));
        let scope: ObjectRef = scope;
        context.track_dependency(&scope, "x");
        assert_eq!(context.dependency_count(), 1);

        context.reset_dependencies();
        assert_eq!(resets.get(), 1);
        assert_eq!(context.dependency_count(), 0);
    }

    #[test]
    fn tracked_dependency_routes_notifications_to_changed() {
        let context = ExpressionContext::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _guard = context.connect_changed(move || counter.set(counter.get() + 1));

        let scope = TestObject::new();
        scope.add_property("x", Value::Int(1));
        context.add_scope(scope.clone());
        let scope_ref: ObjectRef = scope.clone();
        context.track_dependency(&scope_ref, "x");

        scope.set_property("x", Value::Int(2)).unwrap();
        assert_eq!(hits.get(), 1);

        context.reset_dependencies();
        scope.set_property("x", Value::Int(3)).unwrap();
        assert_eq!(hits.get(), 1, "watch must not survive a reset");
    }

    #[test]
    fn changed_recursion_is_flattened() {
        let context = ExpressionContext::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let reentrant = context.clone();
        let _guard = context.connect_changed(move || {
            let n = counter.get() + 1;
            counter.set(n);
            if n == 1 {
                reentrant.emit_changed();
            }
        });

        context.emit_changed();
        assert_eq!(hits.get(), 2);
    }
}
