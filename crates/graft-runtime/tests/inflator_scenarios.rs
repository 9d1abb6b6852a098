//! End-to-end inflation scenarios over the test object model.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use graft_core::object::{Object, ObjectRef, ObjectType};
use graft_core::testobj::{as_test_object, TestObject};
use graft_core::{SourceLocation, Value};
use graft_expr::ExpressionContext;
use graft_runtime::testkit::{RecordingDirectiveFactory, TreeContainerDirectiveFactory};
use graft_runtime::{
    DirectiveFlags, DirectiveProps, Fragment, InflationFlags, Inflator, PropertyDirective,
    PropertyDirectiveFactory, PropertyFormat, StructuralDirective, StructuralDirectiveFactory,
};

fn here() -> SourceLocation {
    SourceLocation::new(Some("scenario"), 1, 1)
}

/// A constructible Label type: one string property.
fn label_type() -> ObjectType {
    let prototype = TestObject::with_type_name("Label");
    prototype.add_property("label", Value::str(""));
    prototype.object_type()
}

fn box_type() -> ObjectType {
    TestObject::with_type_name("Box").object_type()
}

fn scope_with(props: &[(&str, Value)]) -> (ExpressionContext, Rc<TestObject>) {
    let context = ExpressionContext::new();
    let scope = TestObject::new();
    for (name, value) in props {
        scope.add_property(name, value.clone());
    }
    context.add_scope(scope.clone());
    (context, scope)
}

fn box_inflator(context: ExpressionContext) -> (Inflator, Rc<TreeContainerDirectiveFactory>) {
    let mut inflator = Inflator::new(context);
    let container = Rc::new(TreeContainerDirectiveFactory::attach_to("Box"));
    inflator.add_property_directive(DirectiveFlags::empty(), container.clone());
    (inflator, container)
}

fn label_child(text: &str) -> Rc<Fragment> {
    Fragment::builder(label_type(), here())
        .bind("label", text)
        .unwrap()
        .build()
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn inflating_a_new_target_applies_constant_bindings() {
    let (context, _scope) = scope_with(&[]);
    let inflator = Inflator::new(context);
    let fragment = label_child("hello");

    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();
    assert_eq!(target.object_type().name(), "Label");
    assert_eq!(target.get_property("label").unwrap(), Value::str("hello"));
}

#[test]
fn reinflating_with_a_new_fragment_updates_properties() {
    let (context, scope) = scope_with(&[("name", Value::str("world"))]);
    let inflator = Inflator::new(context);

    let target = inflator
        .inflate_new_target(&label_child("first"), InflationFlags::empty())
        .unwrap();
    assert_eq!(target.get_property("label").unwrap(), Value::str("first"));

    let updated = label_child("hello [name]");
    inflator.inflate_existing_target(&target, &updated, InflationFlags::empty());
    assert_eq!(
        target.get_property("label").unwrap(),
        Value::str("hello world")
    );

    scope.set_property("name", Value::str("again")).unwrap();
    inflator.inflate_existing_target(&target, &updated, InflationFlags::empty());
    assert_eq!(
        target.get_property("label").unwrap(),
        Value::str("hello again")
    );
}

#[test]
fn withdrawn_binding_restores_the_declared_default() {
    let (context, _scope) = scope_with(&[]);
    let inflator = Inflator::new(context);

    let target = inflator
        .inflate_new_target(&label_child("temporary"), InflationFlags::empty())
        .unwrap();

    let bare = Fragment::builder(label_type(), here()).build();
    inflator.inflate_existing_target(&target, &bare, InflationFlags::empty());
    assert_eq!(target.get_property("label").unwrap(), Value::str(""));
}

#[test]
fn failed_bindings_do_not_abort_the_pass() {
    let (context, _scope) = scope_with(&[]);
    let inflator = Inflator::new(context);

    let fragment = Fragment::builder(label_type(), here())
        .bind("label", "[missing_name]")
        .unwrap()
        .bind("ghost", "anything")
        .unwrap()
        .build();
    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    // the bad expression and the unknown property are skipped, the pass
    // itself completes
    assert_eq!(target.get_property("label").unwrap(), Value::str(""));
}

#[test]
fn two_way_binding_routes_target_edits_back_to_the_scope() {
    let (context, scope) = scope_with(&[("draft", Value::str("start"))]);
    let inflator = Inflator::new(context);

    let fragment = Fragment::builder(label_type(), here())
        .bind("label", "{draft}")
        .unwrap()
        .build();
    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();
    assert_eq!(target.get_property("label").unwrap(), Value::str("start"));

    target.set_property("label", Value::str("typed")).unwrap();
    assert_eq!(scope.get_property("draft").unwrap(), Value::str("typed"));
}

// ============================================================================
// Children
// ============================================================================

#[test]
fn children_inflate_through_an_auto_attached_container() {
    let (context, _scope) = scope_with(&[]);
    let (inflator, _container) = box_inflator(context);

    let fragment = Fragment::builder(box_type(), here())
        .child(label_child("a"))
        .child(label_child("b"))
        .build();
    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    let container = as_test_object(&target).unwrap();
    assert_eq!(container.child_property_strings("label"), ["a", "b"]);
}

#[test]
fn identical_reinflation_is_free() {
    let (context, _scope) = scope_with(&[]);
    let (inflator, container_factory) = box_inflator(context);
    let adapter = container_factory.adapter();

    let fragment = Fragment::builder(box_type(), here())
        .child(label_child("a"))
        .child(label_child("b"))
        .build();
    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    adapter.reset_counters();
    inflator.inflate_existing_target(&target, &fragment, InflationFlags::empty());

    assert_eq!(adapter.inserts(), 0);
    assert_eq!(adapter.moves(), 0);
    assert_eq!(adapter.removals(), 0);
    let container = as_test_object(&target).unwrap();
    assert_eq!(container.child_property_strings("label"), ["a", "b"]);
}

#[test]
fn reordered_child_fragments_reuse_their_objects() {
    let (context, _scope) = scope_with(&[]);
    let (inflator, container_factory) = box_inflator(context);
    let adapter = container_factory.adapter();

    let (a, b, c) = (label_child("a"), label_child("b"), label_child("c"));
    let v1 = Fragment::builder(box_type(), here())
        .child(a.clone())
        .child(b.clone())
        .child(c.clone())
        .build();
    let target = inflator
        .inflate_new_target(&v1, InflationFlags::empty())
        .unwrap();
    let container = as_test_object(&target).unwrap();
    let before = container.children();
    assert_eq!(container.child_property_strings("label"), ["a", "b", "c"]);

    adapter.reset_counters();
    let v2 = Fragment::builder(box_type(), here())
        .child(a)
        .child(c)
        .child(b)
        .build();
    inflator.inflate_existing_target(&target, &v2, InflationFlags::empty());

    assert_eq!(container.child_property_strings("label"), ["a", "c", "b"]);
    assert_eq!(adapter.inserts(), 0, "every child object is reused");
    assert_eq!(adapter.removals(), 0);
    let after = container.children();
    assert!(Rc::ptr_eq(&before[0], &after[0]));
    assert!(Rc::ptr_eq(&before[1], &after[2]));
    assert!(Rc::ptr_eq(&before[2], &after[1]));
}

#[test]
fn dropped_child_fragment_removes_its_object() {
    let (context, _scope) = scope_with(&[]);
    let (inflator, _container) = box_inflator(context);

    let (a, b) = (label_child("a"), label_child("b"));
    let v1 = Fragment::builder(box_type(), here())
        .child(a.clone())
        .child(b.clone())
        .build();
    let target = inflator
        .inflate_new_target(&v1, InflationFlags::empty())
        .unwrap();
    let container = as_test_object(&target).unwrap();
    let orphaned = container.children()[1].clone();

    let v2 = Fragment::builder(box_type(), here()).child(a).build();
    inflator.inflate_existing_target(&target, &v2, InflationFlags::empty());

    assert_eq!(container.child_property_strings("label"), ["a"]);
    assert!(orphaned.parent().is_none());
}

// ============================================================================
// Property directives
// ============================================================================

#[test]
fn property_directive_lifecycle_across_passes() {
    let (context, _scope) = scope_with(&[]);
    let mut inflator = Inflator::new(context);
    let factory = Rc::new(RecordingDirectiveFactory::new(
        "rec",
        PropertyFormat::ImplicitValue,
    ));
    inflator.add_property_directive(DirectiveFlags::NO_AUTO_ATTACH, factory.clone());
    let events = factory.events_handle();

    let with_directive = Fragment::builder(label_type(), here())
        .bind("_rec", "present")
        .unwrap()
        .build();
    let without = Fragment::builder(label_type(), here()).build();

    let target = inflator
        .inflate_new_target(&with_directive, InflationFlags::empty())
        .unwrap();
    assert_eq!(&*events.borrow(), &["rec:attach", "rec:update"]);

    events.borrow_mut().clear();
    inflator.inflate_existing_target(&target, &with_directive, InflationFlags::empty());
    assert_eq!(&*events.borrow(), &["rec:update"], "reuse never re-attaches");
    assert_eq!(factory.instances().len(), 1);

    events.borrow_mut().clear();
    inflator.inflate_existing_target(&target, &without, InflationFlags::empty());
    assert_eq!(&*events.borrow(), &["rec:detach"]);

    events.borrow_mut().clear();
    inflator.inflate_existing_target(&target, &with_directive, InflationFlags::empty());
    assert_eq!(&*events.borrow(), &["rec:attach", "rec:update"]);
    assert_eq!(factory.instances().len(), 2, "re-adding creates a fresh instance");
}

#[test]
fn implicit_value_directive_receives_its_binding_text() {
    let (context, _scope) = scope_with(&[("pct", Value::str("10%"))]);
    let mut inflator = Inflator::new(context);
    let factory = Rc::new(RecordingDirectiveFactory::new(
        "progress",
        PropertyFormat::ImplicitValue,
    ));
    inflator.add_property_directive(DirectiveFlags::NO_AUTO_ATTACH, factory.clone());

    let fragment = Fragment::builder(label_type(), here())
        .bind("_progress", "[pct]")
        .unwrap()
        .build();
    inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    let instance = &factory.instances()[0];
    assert_eq!(
        instance.props().get_property("value").unwrap(),
        Value::str("10%")
    );
}

#[test]
fn explicit_format_directive_takes_named_properties() {
    struct StampFactory {
        instances: RefCell<Vec<Rc<DirectiveProps>>>,
    }

    struct StampDirective {
        props: Rc<DirectiveProps>,
    }

    impl PropertyDirective for StampDirective {
        fn target(&self) -> ObjectRef {
            self.props.clone()
        }
    }

    impl PropertyDirectiveFactory for StampFactory {
        fn name(&self) -> &str {
            "stamp"
        }
        fn property_format(&self) -> PropertyFormat {
            PropertyFormat::Explicit
        }
        fn create(&self) -> Rc<dyn PropertyDirective> {
            let props = DirectiveProps::new("StampDirective");
            props.add_property("row", Value::str(""));
            props.add_property("column", Value::str(""));
            self.instances.borrow_mut().push(props.clone());
            Rc::new(StampDirective { props })
        }
    }

    let (context, _scope) = scope_with(&[]);
    let mut inflator = Inflator::new(context);
    let factory = Rc::new(StampFactory {
        instances: RefCell::new(Vec::new()),
    });
    inflator.add_property_directive(DirectiveFlags::NO_AUTO_ATTACH, factory.clone());

    let fragment = Fragment::builder(label_type(), here())
        .bind("_stamp.row", "2")
        .unwrap()
        .bind("_stamp.column", "5")
        .unwrap()
        .build();
    inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    let instances = factory.instances.borrow();
    assert_eq!(instances.len(), 1, "both bindings land on one instance");
    assert_eq!(instances[0].get_property("row").unwrap(), Value::str("2"));
    assert_eq!(instances[0].get_property("column").unwrap(), Value::str("5"));
}

#[test]
fn bare_explicit_directive_binding_is_rejected() {
    let (context, _scope) = scope_with(&[]);
    let mut inflator = Inflator::new(context);
    let factory = Rc::new(RecordingDirectiveFactory::new(
        "grid",
        PropertyFormat::Explicit,
    ));
    inflator.add_property_directive(DirectiveFlags::NO_AUTO_ATTACH, factory.clone());

    let fragment = Fragment::builder(label_type(), here())
        .bind("_grid", "oops")
        .unwrap()
        .build();
    inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    assert!(factory.instances().is_empty());
    assert!(factory.events_handle().borrow().is_empty());
}

#[test]
fn auto_attach_by_target_type() {
    let (context, _scope) = scope_with(&[]);
    let mut inflator = Inflator::new(context);
    let factory = Rc::new(
        RecordingDirectiveFactory::new("auto", PropertyFormat::ImplicitValue)
            .auto_attach_to("Label"),
    );
    inflator.add_property_directive(DirectiveFlags::empty(), factory.clone());

    // a Label attracts the directive with an empty constant value
    inflator
        .inflate_new_target(&label_child("x"), InflationFlags::empty())
        .unwrap();
    assert_eq!(
        &*factory.events_handle().borrow(),
        &["auto:attach", "auto:update"]
    );
    assert_eq!(
        factory.instances()[0].props().get_property("value").unwrap(),
        Value::str("")
    );

    // a Box does not
    factory.events_handle().borrow_mut().clear();
    let plain_box = Fragment::builder(box_type(), here()).build();
    inflator
        .inflate_new_target(&plain_box, InflationFlags::empty())
        .unwrap();
    assert!(factory.events_handle().borrow().is_empty());
}

#[test]
fn explicit_binding_overrides_auto_attach_for_the_pass() {
    let (context, _scope) = scope_with(&[]);
    let mut inflator = Inflator::new(context);
    let factory = Rc::new(
        RecordingDirectiveFactory::new("auto", PropertyFormat::ImplicitValue)
            .auto_attach_to("Label"),
    );
    inflator.add_property_directive(DirectiveFlags::empty(), factory.clone());

    let fragment = Fragment::builder(label_type(), here())
        .bind("_auto", "explicit")
        .unwrap()
        .build();
    inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    let instances = factory.instances();
    assert_eq!(instances.len(), 1, "no second auto-attached instance");
    assert_eq!(
        instances[0].props().get_property("value").unwrap(),
        Value::str("explicit")
    );
}

// ============================================================================
// Structural directives
// ============================================================================

#[test]
fn if_directive_gates_a_child_across_passes() {
    let (context, scope) = scope_with(&[("show", Value::Bool(false))]);
    let (inflator, _container) = box_inflator(context);

    let gated = Fragment::builder(label_type(), here())
        .bind("label", "gated")
        .unwrap()
        .bind("__if", "[show]")
        .unwrap()
        .build();
    let fragment = Fragment::builder(box_type(), here()).child(gated).build();

    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();
    let container = as_test_object(&target).unwrap();
    assert!(container.children().is_empty());

    scope.set_property("show", Value::Bool(true)).unwrap();
    inflator.inflate_existing_target(&target, &fragment, InflationFlags::empty());
    assert_eq!(container.child_property_strings("label"), ["gated"]);
    let first_instance = container.children()[0].clone();

    scope.set_property("show", Value::Bool(false)).unwrap();
    inflator.inflate_existing_target(&target, &fragment, InflationFlags::empty());
    assert!(container.children().is_empty());
    assert!(first_instance.parent().is_none());

    scope.set_property("show", Value::Bool(true)).unwrap();
    inflator.inflate_existing_target(&target, &fragment, InflationFlags::empty());
    assert_eq!(container.children().len(), 1);
    assert!(
        !Rc::ptr_eq(&container.children()[0], &first_instance),
        "a re-shown child is a fresh instance"
    );
}

#[test]
fn sibling_gated_children_keep_separate_directive_slots() {
    struct CountingGate {
        props: Rc<DirectiveProps>,
    }

    impl StructuralDirective for CountingGate {
        fn target(&self) -> ObjectRef {
            self.props.clone()
        }
        fn apply(
            &self,
            inflator: &Inflator,
            parent: &graft_runtime::FragmentHost,
            key: &graft_core::Key,
            child: &Rc<Fragment>,
            flags: InflationFlags,
        ) {
            inflator.inflate_child(parent, key, child, flags);
        }
    }

    struct CountingGateFactory {
        created: Rc<Cell<u32>>,
    }

    impl StructuralDirectiveFactory for CountingGateFactory {
        fn name(&self) -> &str {
            "gate"
        }
        fn property_format(&self) -> PropertyFormat {
            PropertyFormat::None
        }
        fn create(&self) -> Rc<dyn StructuralDirective> {
            self.created.set(self.created.get() + 1);
            Rc::new(CountingGate {
                props: DirectiveProps::new("CountingGate"),
            })
        }
    }

    let created = Rc::new(Cell::new(0));
    let (context, _scope) = scope_with(&[]);
    let (mut inflator, _container) = box_inflator(context);
    inflator.add_structural_directive(Rc::new(CountingGateFactory {
        created: Rc::clone(&created),
    }));

    let first = Fragment::builder(label_type(), here())
        .bind("label", "a")
        .unwrap()
        .bind("__gate", "")
        .unwrap()
        .build();
    let second = Fragment::builder(label_type(), here())
        .bind("label", "b")
        .unwrap()
        .bind("__gate", "")
        .unwrap()
        .build();
    let fragment = Fragment::builder(box_type(), here())
        .child(first)
        .child(second)
        .build();

    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();
    let container = as_test_object(&target).unwrap();
    assert_eq!(container.child_property_strings("label"), ["a", "b"]);
    assert_eq!(created.get(), 2);

    inflator.inflate_existing_target(&target, &fragment, InflationFlags::empty());
    inflator.inflate_existing_target(&target, &fragment, InflationFlags::empty());
    assert_eq!(container.child_property_strings("label"), ["a", "b"]);
    assert_eq!(
        created.get(),
        2,
        "each sibling keeps its directive instance across passes"
    );
}

#[test]
fn unknown_structural_directive_inflates_the_child_normally() {
    let (context, _scope) = scope_with(&[]);
    let (inflator, _container) = box_inflator(context);

    let child = Fragment::builder(label_type(), here())
        .bind("label", "still here")
        .unwrap()
        .bind("__nonsense", "x")
        .unwrap()
        .build();
    let fragment = Fragment::builder(box_type(), here()).child(child).build();
    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    let container = as_test_object(&target).unwrap();
    assert_eq!(container.child_property_strings("label"), ["still here"]);
}

#[test]
fn conflicting_structural_directives_skip_the_child() {
    struct AlwaysDirective {
        props: Rc<DirectiveProps>,
    }

    impl StructuralDirective for AlwaysDirective {
        fn target(&self) -> ObjectRef {
            self.props.clone()
        }
        fn apply(
            &self,
            inflator: &Inflator,
            parent: &graft_runtime::FragmentHost,
            key: &graft_core::Key,
            child: &Rc<Fragment>,
            flags: InflationFlags,
        ) {
            inflator.inflate_child(parent, key, child, flags);
        }
    }

    struct AlwaysFactory;

    impl StructuralDirectiveFactory for AlwaysFactory {
        fn name(&self) -> &str {
            "always"
        }
        fn property_format(&self) -> PropertyFormat {
            PropertyFormat::None
        }
        fn create(&self) -> Rc<dyn StructuralDirective> {
            Rc::new(AlwaysDirective {
                props: DirectiveProps::new("AlwaysDirective"),
            })
        }
    }

    let (context, _scope) = scope_with(&[]);
    let (mut inflator, _container) = box_inflator(context);
    inflator.add_structural_directive(Rc::new(AlwaysFactory));

    let child = Fragment::builder(label_type(), here())
        .bind("__if", "true")
        .unwrap()
        .bind("__always", "")
        .unwrap()
        .build();
    let fragment = Fragment::builder(box_type(), here()).child(child).build();
    let target = inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();

    let container = as_test_object(&target).unwrap();
    assert!(
        container.children().is_empty(),
        "a child naming two structural directives is skipped"
    );
}

// ============================================================================
// Dependency tracking
// ============================================================================

#[test]
fn tracked_inflation_subscribes_to_what_it_read() {
    let (context, scope) = scope_with(&[("name", Value::str("a"))]);
    let inflator = Inflator::new(context.clone());

    let fragment = Fragment::builder(label_type(), here())
        .bind("label", "[name]")
        .unwrap()
        .build();
    inflator
        .inflate_new_target(&fragment, InflationFlags::TRACK_DEPENDENCIES)
        .unwrap();
    assert!(context.dependency_count() > 0);

    let fired = Rc::new(std::cell::Cell::new(0));
    let counter = Rc::clone(&fired);
    let _guard = context.connect_changed(move || counter.set(counter.get() + 1));
    scope.set_property("name", Value::str("b")).unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn untracked_inflation_subscribes_to_nothing() {
    let (context, _scope) = scope_with(&[("name", Value::str("a"))]);
    let inflator = Inflator::new(context.clone());

    let fragment = Fragment::builder(label_type(), here())
        .bind("label", "[name]")
        .unwrap()
        .build();
    inflator
        .inflate_new_target(&fragment, InflationFlags::empty())
        .unwrap();
    assert_eq!(context.dependency_count(), 0);
}
