#![forbid(unsafe_code)]

//! Runtime doubles over the test object model.
//!
//! Behind the `test-helpers` feature. [`TreeContainerAdapter`] realizes
//! child positioning on a [`TestObject`] tree and counts its actual
//! mutations, so tests can assert not just final order but that
//! idempotent passes moved nothing. [`RecordingPropertyDirective`] logs
//! its lifecycle, and [`TreeContainerDirectiveFactory`] is a container
//! directive that auto-attaches the adapter by target type name.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use graft_core::object::{Object, ObjectType};
use graft_core::testobj::{as_test_object, TestObject};
use graft_core::ObjectRef;
use tracing::warn;

use crate::container::ContainerAdapter;
use crate::directive::{
    DirectiveProps, PropertyDirective, PropertyDirectiveFactory, PropertyFormat,
};
use crate::fragment::Fragment;
use crate::host::FragmentHost;

// ============================================================================
// Container adapter
// ============================================================================

/// A [`ContainerAdapter`] over the [`TestObject`] child tree.
///
/// Every call that actually mutates the tree bumps a counter; calls that
/// find the child already in position are free.
#[derive(Default)]
pub struct TreeContainerAdapter {
    inserts: Cell<u32>,
    moves: Cell<u32>,
    removals: Cell<u32>,
}

impl TreeContainerAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Children newly added to a container.
    #[must_use]
    pub fn inserts(&self) -> u32 {
        self.inserts.get()
    }

    /// Children repositioned within their container.
    #[must_use]
    pub fn moves(&self) -> u32 {
        self.moves.get()
    }

    #[must_use]
    pub fn removals(&self) -> u32 {
        self.removals.get()
    }

    pub fn reset_counters(&self) {
        self.inserts.set(0);
        self.moves.set(0);
        self.removals.set(0);
    }

    fn cast(container: &ObjectRef, child: &ObjectRef) -> Option<(Rc<TestObject>, Rc<TestObject>)> {
        match (as_test_object(container), as_test_object(child)) {
            (Some(container), Some(child)) => Some((container, child)),
            _ => {
                warn!("tree container adapter used with a non-test object");
                None
            }
        }
    }
}

impl ContainerAdapter for TreeContainerAdapter {
    fn insert_at_front(&self, container: &ObjectRef, child: &ObjectRef) {
        let Some((container, child)) = Self::cast(container, child) else {
            return;
        };
        match child.parent() {
            Some(parent) if Rc::ptr_eq(&parent, &container) => {
                if container.child_index(&child) == Some(0) {
                    return;
                }
                self.moves.set(self.moves.get() + 1);
                TestObject::insert_child(&container, 0, &child);
            }
            Some(_) => {
                warn!("child is parented elsewhere; refusing to steal it");
            }
            None => {
                self.inserts.set(self.inserts.get() + 1);
                TestObject::insert_child(&container, 0, &child);
            }
        }
    }

    fn insert_next_to(&self, container: &ObjectRef, child: &ObjectRef, sibling: &ObjectRef) {
        let Some((container, child)) = Self::cast(container, child) else {
            return;
        };
        let Some(sibling) = as_test_object(sibling) else {
            warn!("tree container adapter used with a non-test sibling");
            return;
        };
        let Some(sibling_index) = container.child_index(&sibling) else {
            warn!("sibling is not in the container");
            return;
        };
        match child.parent() {
            Some(parent) if Rc::ptr_eq(&parent, &container) => {
                if container.child_index(&child) == Some(sibling_index + 1) {
                    return;
                }
                self.moves.set(self.moves.get() + 1);
                TestObject::remove_child(&container, &child);
                // sibling index may have shifted once the child left
                let index = container
                    .child_index(&sibling)
                    .map_or(container.children().len(), |i| i + 1);
                TestObject::insert_child(&container, index, &child);
            }
            Some(_) => {
                warn!("child is parented elsewhere; refusing to steal it");
            }
            None => {
                self.inserts.set(self.inserts.get() + 1);
                TestObject::insert_child(&container, sibling_index + 1, &child);
            }
        }
    }

    fn remove(&self, container: &ObjectRef, child: &ObjectRef) {
        let Some((container, child)) = Self::cast(container, child) else {
            return;
        };
        if TestObject::remove_child(&container, &child) {
            self.removals.set(self.removals.get() + 1);
        }
    }
}

// ============================================================================
// Container directive
// ============================================================================

struct TreeContainerDirective {
    props: Rc<DirectiveProps>,
    adapter: Rc<TreeContainerAdapter>,
}

impl PropertyDirective for TreeContainerDirective {
    fn target(&self) -> ObjectRef {
        Rc::clone(&self.props) as ObjectRef
    }

    fn attach(&self, host: &FragmentHost) {
        host.set_container_adapter(Rc::clone(&self.adapter) as Rc<dyn ContainerAdapter>);
    }
}

/// Factory for a container directive that installs a shared
/// [`TreeContainerAdapter`] on hosts whose target type matches.
pub struct TreeContainerDirectiveFactory {
    attach_to: Rc<str>,
    adapter: Rc<TreeContainerAdapter>,
}

impl TreeContainerDirectiveFactory {
    /// Auto-attach to targets whose type is named `type_name`.
    #[must_use]
    pub fn attach_to(type_name: &str) -> Self {
        Self {
            attach_to: Rc::from(type_name),
            adapter: Rc::new(TreeContainerAdapter::new()),
        }
    }

    /// The adapter every created directive installs; tests read its
    /// counters here.
    #[must_use]
    pub fn adapter(&self) -> Rc<TreeContainerAdapter> {
        Rc::clone(&self.adapter)
    }
}

impl PropertyDirectiveFactory for TreeContainerDirectiveFactory {
    fn name(&self) -> &str {
        "tree-container"
    }

    fn property_format(&self) -> PropertyFormat {
        PropertyFormat::None
    }

    fn create(&self) -> Rc<dyn PropertyDirective> {
        Rc::new(TreeContainerDirective {
            props: DirectiveProps::new("TreeContainerDirective"),
            adapter: Rc::clone(&self.adapter),
        })
    }

    fn should_auto_attach(&self, host: &FragmentHost, _fragment: &Fragment) -> bool {
        host.target()
            .is_some_and(|target| target.object_type().is_a(&ObjectType::named(&self.attach_to)))
    }
}

// ============================================================================
// Recording directive
// ============================================================================

/// A property directive that logs its lifecycle into a shared event
/// list as `label:attach`, `label:update`, `label:detach`.
pub struct RecordingPropertyDirective {
    label: Rc<str>,
    props: Rc<DirectiveProps>,
    events: Rc<RefCell<Vec<String>>>,
}

impl RecordingPropertyDirective {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self::with_events(label, Rc::new(RefCell::new(Vec::new())))
    }

    #[must_use]
    pub fn with_events(label: &str, events: Rc<RefCell<Vec<String>>>) -> Self {
        let props = DirectiveProps::new("RecordingDirective");
        props.add_property("value", graft_core::Value::str(""));
        Self {
            label: Rc::from(label),
            props,
            events,
        }
    }

    #[must_use]
    pub fn events_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.events)
    }

    /// The directive's bindable property bag, for value assertions.
    #[must_use]
    pub fn props(&self) -> Rc<DirectiveProps> {
        Rc::clone(&self.props)
    }

    fn log(&self, event: &str) {
        self.events.borrow_mut().push(format!("{}:{event}", self.label));
    }
}

impl PropertyDirective for RecordingPropertyDirective {
    fn target(&self) -> ObjectRef {
        Rc::clone(&self.props) as ObjectRef
    }

    fn attach(&self, _host: &FragmentHost) {
        self.log("attach");
    }

    fn update(&self, _host: &FragmentHost) {
        self.log("update");
    }

    fn detach(&self, _host: &FragmentHost) {
        self.log("detach");
    }
}

/// Factory producing [`RecordingPropertyDirective`]s that share one
/// event list.
pub struct RecordingDirectiveFactory {
    name: Rc<str>,
    format: PropertyFormat,
    auto_attach_type: Option<Rc<str>>,
    events: Rc<RefCell<Vec<String>>>,
    instances: RefCell<Vec<Rc<RecordingPropertyDirective>>>,
}

impl RecordingDirectiveFactory {
    #[must_use]
    pub fn new(name: &str, format: PropertyFormat) -> Self {
        Self {
            name: Rc::from(name),
            format,
            auto_attach_type: None,
            events: Rc::new(RefCell::new(Vec::new())),
            instances: RefCell::new(Vec::new()),
        }
    }

    /// Auto-attach to targets whose type is named `type_name`.
    #[must_use]
    pub fn auto_attach_to(mut self, type_name: &str) -> Self {
        self.auto_attach_type = Some(Rc::from(type_name));
        self
    }

    #[must_use]
    pub fn events_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.events)
    }

    /// Every directive instance this factory has created, in order.
    #[must_use]
    pub fn instances(&self) -> Vec<Rc<RecordingPropertyDirective>> {
        self.instances.borrow().clone()
    }
}

impl PropertyDirectiveFactory for RecordingDirectiveFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn property_format(&self) -> PropertyFormat {
        self.format
    }

    fn create(&self) -> Rc<dyn PropertyDirective> {
        let directive = Rc::new(RecordingPropertyDirective::with_events(
            &self.name,
            Rc::clone(&self.events),
        ));
        self.instances.borrow_mut().push(Rc::clone(&directive));
        directive
    }

    fn should_auto_attach(&self, host: &FragmentHost, _fragment: &Fragment) -> bool {
        let Some(type_name) = &self.auto_attach_type else {
            return false;
        };
        host.target()
            .is_some_and(|target| target.object_type().is_a(&ObjectType::named(type_name)))
    }
}
