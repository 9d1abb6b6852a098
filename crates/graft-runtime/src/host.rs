#![forbid(unsafe_code)]

//! Per-target inflation state: the fragment host.
//!
//! A [`FragmentHost`] lives in its target object's attachments and
//! carries everything one target accumulates across inflation passes:
//! the properties applied so far, the directive instances attached to it,
//! and the child objects inflated under it. Each pass runs the same
//! protocol; whatever the pass does not re-add is torn down at commit.
//!
//! # Invariants
//!
//! 1. **Passes bracket strictly**: every mutation between
//!    [`FragmentHost::begin_inflation`] and
//!    [`FragmentHost::commit_inflation`] belongs to one pass; calls
//!    outside a pass are contract violations, logged and ignored.
//!
//! 2. **Idempotent passes are silent**: re-adding the same properties,
//!    directives, and children produces no target writes, no
//!    notifications, and no container operations.
//!
//! 3. **Children are positioned in add order**: the first child added in
//!    a pass goes to the front, each later one directly after its
//!    predecessor, so declaration order is container order even when
//!    entries are reused out of order.
//!
//! 4. **Withdrawn state is restored**: a property absent from a pass is
//!    reset to its declared default; an absent directive is detached; an
//!    absent child is removed from the container.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | mutation outside a pass | `error!`, call ignored |
//! | duplicate key within a pass | `warn!`, first entry kept |
//! | same child key, different object | `error!`, stale object removed |
//! | property write rejected by the target | `warn!`, property skipped |
//! | child added with no container adapter | `warn!`, object kept untracked by the toolkit |

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use graft_core::holder::ValueHolder;
use graft_core::object::{NotifyGuard, Object, ObjectRef};
use graft_core::property_set::PropertySet;
use graft_core::Key;
use smallvec::SmallVec;
use tracing::{error, warn};

use crate::container::ContainerAdapter;
use crate::diff::{Slot, TableDiff};
use crate::directive::{PropertyDirective, StructuralDirective};
use crate::fragment::Fragment;

const HOST_ATTACHMENT: &str = "graft.fragment-host";

/// Inflation state attached to one target object.
pub struct FragmentHost {
    target: Weak<dyn Object>,
    applied_properties: RefCell<PropertySet>,
    pending_properties: RefCell<PropertySet>,
    adapter: RefCell<Option<Rc<dyn ContainerAdapter>>>,
    property_directives: RefCell<TableDiff<Rc<dyn PropertyDirective>>>,
    structural_directives: RefCell<TableDiff<Rc<dyn StructuralDirective>>>,
    children: RefCell<TableDiff<ObjectRef>>,
    push_guards: RefCell<AHashMap<Rc<str>, NotifyGuard>>,
    fresh_directives: RefCell<SmallVec<[Rc<dyn PropertyDirective>; 2]>>,
    last_child: RefCell<Option<ObjectRef>>,
    in_inflation: Cell<bool>,
    updates_applied: Cell<bool>,
    properties_applied: Cell<bool>,
    /// Set while this host is writing target properties, so the push
    /// guards can tell the engine's own writes from external ones.
    applying: Rc<Cell<bool>>,
}

impl FragmentHost {
    /// Create a host for `target` and hang it off the target's
    /// attachments, replacing any previous host.
    #[must_use]
    pub fn new(target: &ObjectRef) -> Rc<Self> {
        let host = Rc::new(Self {
            target: Rc::downgrade(target),
            applied_properties: RefCell::new(PropertySet::new()),
            pending_properties: RefCell::new(PropertySet::new()),
            adapter: RefCell::new(None),
            property_directives: RefCell::new(TableDiff::new()),
            structural_directives: RefCell::new(TableDiff::new()),
            children: RefCell::new(TableDiff::new()),
            push_guards: RefCell::new(AHashMap::new()),
            fresh_directives: RefCell::new(SmallVec::new()),
            last_child: RefCell::new(None),
            in_inflation: Cell::new(false),
            updates_applied: Cell::new(false),
            properties_applied: Cell::new(false),
            applying: Rc::new(Cell::new(false)),
        });
        target
            .attachments()
            .set(HOST_ATTACHMENT, Rc::clone(&host) as Rc<dyn Any>);
        host
    }

    /// The host previously created for `target`, if any.
    #[must_use]
    pub fn for_target(target: &ObjectRef) -> Option<Rc<FragmentHost>> {
        target.attachments().get::<FragmentHost>(HOST_ATTACHMENT)
    }

    /// The existing host for `target`, or a fresh one.
    #[must_use]
    pub fn find_or_create(target: &ObjectRef) -> Rc<FragmentHost> {
        Self::for_target(target).unwrap_or_else(|| Self::new(target))
    }

    /// The target object. `None` only if the target was dropped while the
    /// host is still referenced elsewhere.
    #[must_use]
    pub fn target(&self) -> Option<ObjectRef> {
        self.target.upgrade()
    }

    /// Whether this host's target is the fragment's declared type or a
    /// subtype of it.
    #[must_use]
    pub fn matches_fragment_type(&self, fragment: &Fragment) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.object_type().is_a(fragment.target_type()))
    }

    /// Snapshot of the properties applied as of the last pass.
    #[must_use]
    pub fn applied_properties(&self) -> PropertySet {
        self.applied_properties.borrow().clone()
    }

    #[must_use]
    pub fn container_adapter(&self) -> Option<Rc<dyn ContainerAdapter>> {
        self.adapter.borrow().clone()
    }

    /// Pick the adapter used to realize this host's children. Usually
    /// called by a container directive during attach.
    pub fn set_container_adapter(&self, adapter: Rc<dyn ContainerAdapter>) {
        *self.adapter.borrow_mut() = Some(adapter);
    }

    #[must_use]
    pub fn in_inflation(&self) -> bool {
        self.in_inflation.get()
    }

    fn assert_in_pass(&self, operation: &str) -> bool {
        if self.in_inflation.get() {
            return true;
        }
        error!(operation, "fragment host mutated outside an inflation pass");
        false
    }

    // ------------------------------------------------------------------
    // Pass protocol
    // ------------------------------------------------------------------

    /// Open an inflation pass.
    pub fn begin_inflation(&self) {
        if self.in_inflation.get() {
            error!("inflation pass already open");
            return;
        }
        self.in_inflation.set(true);
        self.updates_applied.set(false);
        self.properties_applied.set(false);
        *self.last_child.borrow_mut() = None;
        *self.pending_properties.borrow_mut() = PropertySet::new();
        self.property_directives.borrow_mut().begin();
        self.structural_directives.borrow_mut().begin();
        self.children.borrow_mut().begin();
    }

    /// Close the pass, tearing down whatever was not re-added.
    pub fn commit_inflation(&self) {
        if !self.assert_in_pass("commit_inflation") {
            return;
        }
        self.apply_pending_directive_updates();
        self.apply_latest_properties();
        self.in_inflation.set(false);

        let mut detached: Vec<Rc<dyn PropertyDirective>> = Vec::new();
        self.property_directives
            .borrow_mut()
            .commit(|_, directive| detached.push(directive));
        for directive in detached {
            directive.detach(self);
        }

        self.structural_directives.borrow_mut().commit(|_, _| {});

        let mut removed: Vec<ObjectRef> = Vec::new();
        self.children
            .borrow_mut()
            .commit(|_, child| removed.push(child));
        if !removed.is_empty() {
            let adapter = self.container_adapter();
            let target = self.target.upgrade();
            match (adapter, target) {
                (Some(adapter), Some(target)) => {
                    for child in &removed {
                        adapter.remove(&target, child);
                    }
                }
                _ => {
                    warn!(
                        count = removed.len(),
                        "leftover children dropped with no container adapter"
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Stage an evaluated property for this pass.
    pub fn add_property(&self, name: &str, value: ValueHolder) {
        if !self.assert_in_pass("add_property") {
            return;
        }
        self.pending_properties.borrow_mut().insert(name, value);
    }

    /// Flush the staged properties onto the target.
    ///
    /// Writes are value-diffed against the previous pass, so an identical
    /// pass touches nothing. Properties staged before are reset to their
    /// declared defaults when absent now. Runs at most once per pass;
    /// [`FragmentHost::commit_inflation`] calls it if nobody else did.
    pub fn apply_latest_properties(&self) {
        if !self.assert_in_pass("apply_latest_properties") || self.properties_applied.get() {
            return;
        }
        self.properties_applied.set(true);
        let Some(target) = self.target.upgrade() else {
            error!("fragment host target dropped mid-pass");
            return;
        };
        let pending = std::mem::take(&mut *self.pending_properties.borrow_mut());
        let diff = self.applied_properties.borrow().diff_names(&pending);

        self.applying.set(true);
        for (name, holder) in pending.iter() {
            let unchanged =
                self.applied_properties.borrow().get_value(name) == Some(holder.value());
            if !unchanged {
                if let Err(error) = target.set_property(name, holder.value().clone()) {
                    warn!(property = name, %error, "could not apply property");
                    self.push_guards.borrow_mut().remove(name);
                    self.applied_properties.borrow_mut().remove(name);
                    continue;
                }
            }
            self.push_guards.borrow_mut().remove(name);
            if holder.can_push() {
                let weak_target = Rc::downgrade(&target);
                let applying = Rc::clone(&self.applying);
                let route = holder.clone();
                let guard = target.notifier().connect(Some(name), move |property| {
                    if applying.get() {
                        return;
                    }
                    let Some(target) = weak_target.upgrade() else {
                        return;
                    };
                    if let Ok(value) = target.get_property(property) {
                        route.push(value);
                    }
                });
                self.push_guards.borrow_mut().insert(Rc::from(name), guard);
            }
            // The applied table is a value snapshot; the push route lives
            // in the notify guard.
            let mut applied = holder.clone();
            applied.disable_push();
            self.applied_properties.borrow_mut().insert(name, applied);
        }
        for name in &diff.removed {
            self.push_guards.borrow_mut().remove(&**name);
            self.applied_properties.borrow_mut().remove(name);
            if let Some(default) = target.property_default(name) {
                if let Err(error) = target.set_property(name, default) {
                    warn!(property = &**name, %error, "could not reset property to its default");
                }
            }
        }
        self.applying.set(false);
    }

    // ------------------------------------------------------------------
    // Property directives
    // ------------------------------------------------------------------

    /// The unclaimed property directive under `key` from the previous
    /// pass.
    #[must_use]
    pub fn leftover_property_directive(&self, key: &Key) -> Option<Rc<dyn PropertyDirective>> {
        if !self.assert_in_pass("leftover_property_directive") {
            return None;
        }
        self.property_directives.borrow().leftover(key).cloned()
    }

    /// Record a property directive for this pass. A fresh instance is
    /// attached when the pass's pending updates run.
    pub fn add_property_directive(&self, key: Key, directive: Rc<dyn PropertyDirective>) {
        if !self.assert_in_pass("add_property_directive") {
            return;
        }
        let slot = self
            .property_directives
            .borrow_mut()
            .add(key.clone(), Rc::clone(&directive), |a, b| Rc::ptr_eq(a, b));
        match slot {
            Slot::Fresh => self.fresh_directives.borrow_mut().push(directive),
            Slot::Reused => {}
            Slot::Replaced(old) => {
                old.detach(self);
                self.fresh_directives.borrow_mut().push(directive);
            }
            Slot::Duplicate => {
                warn!(%key, "property directive added twice in one pass; keeping the first");
            }
        }
    }

    /// Run `attach` on directives new this pass, then `update` on every
    /// directive present, in add order. Runs at most once per pass;
    /// [`FragmentHost::commit_inflation`] calls it if nobody else did.
    pub fn apply_pending_directive_updates(&self) {
        if !self.assert_in_pass("apply_pending_directive_updates") || self.updates_applied.get() {
            return;
        }
        self.updates_applied.set(true);
        let fresh: Vec<Rc<dyn PropertyDirective>> =
            self.fresh_directives.borrow_mut().drain(..).collect();
        for directive in fresh {
            directive.attach(self);
        }
        let present: Vec<Rc<dyn PropertyDirective>> = self
            .property_directives
            .borrow()
            .current_in_order()
            .cloned()
            .collect();
        for directive in present {
            directive.update(self);
        }
    }

    // ------------------------------------------------------------------
    // Structural directives
    // ------------------------------------------------------------------

    /// The unclaimed structural directive under `key` from the previous
    /// pass.
    #[must_use]
    pub fn leftover_structural_directive(&self, key: &Key) -> Option<Rc<dyn StructuralDirective>> {
        if !self.assert_in_pass("leftover_structural_directive") {
            return None;
        }
        self.structural_directives.borrow().leftover(key).cloned()
    }

    /// Record a structural directive for this pass.
    pub fn add_structural_directive(&self, key: Key, directive: Rc<dyn StructuralDirective>) {
        if !self.assert_in_pass("add_structural_directive") {
            return;
        }
        let slot = self
            .structural_directives
            .borrow_mut()
            .add(key.clone(), directive, |a, b| Rc::ptr_eq(a, b));
        if matches!(slot, Slot::Duplicate) {
            warn!(%key, "structural directive added twice in one pass; keeping the first");
        }
    }

    // ------------------------------------------------------------------
    // Children
    // ------------------------------------------------------------------

    /// The unclaimed child object under `key` from the previous pass.
    #[must_use]
    pub fn leftover_child(&self, key: &Key) -> Option<ObjectRef> {
        if !self.assert_in_pass("leftover_child") {
            return None;
        }
        self.children.borrow().leftover(key).cloned()
    }

    /// Record `child` for this pass and position it after the previously
    /// added child through the container adapter.
    pub fn add_inflated_child(&self, key: Key, child: ObjectRef) {
        if !self.assert_in_pass("add_inflated_child") {
            return;
        }
        let slot = self
            .children
            .borrow_mut()
            .add(key.clone(), Rc::clone(&child), |a, b| Rc::ptr_eq(a, b));
        let stale = match slot {
            Slot::Duplicate => {
                warn!(%key, "child added twice in one pass; keeping the first");
                return;
            }
            Slot::Replaced(old) => {
                error!(%key, "child key reused for a different object; replacing");
                Some(old)
            }
            Slot::Fresh | Slot::Reused => None,
        };

        let adapter = self.container_adapter();
        let target = self.target.upgrade();
        match (adapter, target) {
            (Some(adapter), Some(target)) => {
                if let Some(stale) = stale {
                    adapter.remove(&target, &stale);
                }
                match &*self.last_child.borrow() {
                    Some(sibling) => adapter.insert_next_to(&target, &child, sibling),
                    None => adapter.insert_at_front(&target, &child),
                }
            }
            (None, _) => {
                warn!(%key, "child added with no container adapter; not realized in the toolkit");
            }
            (_, None) => {
                error!("fragment host target dropped mid-pass");
            }
        }
        *self.last_child.borrow_mut() = Some(child);
    }
}
