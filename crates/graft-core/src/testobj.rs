#![forbid(unsafe_code)]

//! A scriptable host object for exercising the engine without a real
//! toolkit.
//!
//! [`TestObject`] implements [`Object`] over a plain property table and
//! keeps a parent/children tree, which is enough to drive every runtime
//! path: binding application, change notification, signal wiring, and
//! container insertion order.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::object::{
    Attachments, Notifier, Object, ObjectError, ObjectRef, ObjectType, SignalHub, SignalSpec,
};
use crate::value::{EnumInfo, Value, ValueType};

/// Alignment enum mirroring a typical toolkit's values, for coercion and
/// parsing tests.
pub static ALIGN: EnumInfo = EnumInfo {
    name: "Align",
    values: &[
        ("fill", 0),
        ("start", 1),
        ("end", 2),
        ("center", 3),
        ("baseline", 4),
    ],
};

struct Prop {
    name: Rc<str>,
    ty: ValueType,
    value: Value,
    default: Value,
}

/// A host object double with declared properties, declared signals, and a
/// child tree.
pub struct TestObject {
    type_name: Rc<str>,
    props: RefCell<Vec<Prop>>,
    declared_signals: RefCell<Vec<(Rc<str>, SignalSpec)>>,
    children: RefCell<Vec<Rc<TestObject>>>,
    parent: RefCell<Weak<TestObject>>,
    notifier: Notifier,
    signals: SignalHub,
    attachments: Attachments,
}

impl TestObject {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_type_name("TestObject")
    }

    #[must_use]
    pub fn with_type_name(type_name: &str) -> Rc<Self> {
        Rc::new(Self {
            type_name: Rc::from(type_name),
            props: RefCell::new(Vec::new()),
            declared_signals: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            notifier: Notifier::new(),
            signals: SignalHub::new(),
            attachments: Attachments::new(),
        })
    }

    /// Declare a property. Its type is inferred from `initial`; a `Null`
    /// initial leaves the property untyped until the first non-null
    /// write, which fixes the type.
    pub fn add_property(&self, name: &str, initial: Value) {
        let ty = initial.value_type();
        self.props.borrow_mut().push(Prop {
            name: Rc::from(name),
            ty,
            default: initial.clone(),
            value: initial,
        });
    }

    /// Declare an untyped, undetailed signal.
    pub fn add_signal(&self, name: &str) {
        self.add_signal_spec(name, SignalSpec::default());
    }

    /// Declare a signal that takes a detail string.
    pub fn add_detailed_signal(&self, name: &str) {
        self.add_signal_spec(
            name,
            SignalSpec {
                detailed: true,
                ..SignalSpec::default()
            },
        );
    }

    /// Declare a signal with fixed parameter types.
    pub fn add_typed_signal(&self, name: &str, params: &[ValueType]) {
        self.add_signal_spec(
            name,
            SignalSpec {
                params: Some(params.to_vec()),
                ..SignalSpec::default()
            },
        );
    }

    fn add_signal_spec(&self, name: &str, spec: SignalSpec) {
        self.declared_signals
            .borrow_mut()
            .push((Rc::from(name), spec));
    }

    /// Emit a declared signal through the hub.
    pub fn emit_signal(&self, name: &str, detail: Option<&str>, args: &[Value]) -> Value {
        self.signals.emit(name, detail, args)
    }

    // ------------------------------------------------------------------
    // Child tree
    // ------------------------------------------------------------------

    /// Insert `child` under `parent` at `index`, detaching it from any
    /// previous parent first.
    pub fn insert_child(parent: &Rc<TestObject>, index: usize, child: &Rc<TestObject>) {
        Self::detach(child);
        *child.parent.borrow_mut() = Rc::downgrade(parent);
        let mut children = parent.children.borrow_mut();
        let index = index.min(children.len());
        children.insert(index, Rc::clone(child));
    }

    /// Remove `child` from `parent`. Returns false when it was not a
    /// child of `parent`.
    pub fn remove_child(parent: &Rc<TestObject>, child: &Rc<TestObject>) -> bool {
        let mut children = parent.children.borrow_mut();
        let Some(index) = children.iter().position(|c| Rc::ptr_eq(c, child)) else {
            return false;
        };
        children.remove(index);
        *child.parent.borrow_mut() = Weak::new();
        true
    }

    fn detach(child: &Rc<TestObject>) {
        if let Some(old_parent) = child.parent.borrow().upgrade() {
            old_parent
                .children
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(c, child));
        }
        *child.parent.borrow_mut() = Weak::new();
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<TestObject>> {
        self.parent.borrow().upgrade()
    }

    #[must_use]
    pub fn children(&self) -> Vec<Rc<TestObject>> {
        self.children.borrow().clone()
    }

    #[must_use]
    pub fn child_index(&self, child: &Rc<TestObject>) -> Option<usize> {
        self.children
            .borrow()
            .iter()
            .position(|c| Rc::ptr_eq(c, child))
    }

    /// A named property of every child in order, for order assertions.
    #[must_use]
    pub fn child_property_strings(&self, property: &str) -> Vec<String> {
        self.children
            .borrow()
            .iter()
            .map(|c| {
                c.get_property(property)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl Object for TestObject {
    fn object_type(&self) -> ObjectType {
        let type_name = self.type_name.to_string();
        let props: Vec<(Rc<str>, Value)> = self
            .props
            .borrow()
            .iter()
            .map(|p| (Rc::clone(&p.name), p.value.clone()))
            .collect();
        let signals: Vec<(Rc<str>, SignalSpec)> = self.declared_signals.borrow().clone();
        ObjectType::with_constructor(&self.type_name, move || {
            let instance = TestObject::with_type_name(&type_name);
            for (name, value) in &props {
                instance.add_property(name, value.clone());
            }
            for (name, spec) in &signals {
                instance.add_signal_spec(name, spec.clone());
            }
            instance as ObjectRef
        })
    }

    fn has_property(&self, name: &str) -> bool {
        self.props.borrow().iter().any(|p| &*p.name == name)
    }

    fn property_type(&self, name: &str) -> Option<ValueType> {
        self.props
            .borrow()
            .iter()
            .find(|p| &*p.name == name)
            .map(|p| p.ty)
    }

    fn property_default(&self, name: &str) -> Option<Value> {
        self.props
            .borrow()
            .iter()
            .find(|p| &*p.name == name)
            .map(|p| p.default.clone())
    }

    fn get_property(&self, name: &str) -> Result<Value, ObjectError> {
        self.props
            .borrow()
            .iter()
            .find(|p| &*p.name == name)
            .map(|p| p.value.clone())
            .ok_or_else(|| ObjectError::UndefinedProperty {
                type_name: self.type_name.to_string(),
                property: name.to_string(),
            })
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), ObjectError> {
        let changed = {
            let mut props = self.props.borrow_mut();
            let Some(prop) = props.iter_mut().find(|p| &*p.name == name) else {
                return Err(ObjectError::UndefinedProperty {
                    type_name: self.type_name.to_string(),
                    property: name.to_string(),
                });
            };
            if matches!(prop.ty, ValueType::Null) && !matches!(value, Value::Null) {
                prop.ty = value.value_type();
            }
            let coerced = if value.value_type() == prop.ty {
                value
            } else {
                value
                    .transform_to(&prop.ty)
                    .ok_or_else(|| ObjectError::InvalidType {
                        property: name.to_string(),
                        expected: prop.ty.name(),
                        found: value.value_type().name(),
                    })?
            };
            let changed = coerced != prop.value;
            if changed {
                prop.value = coerced;
            }
            changed
        };
        if changed {
            self.notifier.emit(name);
        }
        Ok(())
    }

    fn find_signal(&self, name: &str) -> Option<SignalSpec> {
        self.declared_signals
            .borrow()
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, spec)| spec.clone())
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn signals(&self) -> &SignalHub {
        &self.signals
    }

    fn attachments(&self) -> &Attachments {
        &self.attachments
    }
}

/// Downcast an [`ObjectRef`] to a [`TestObject`].
#[must_use]
pub fn as_test_object(object: &ObjectRef) -> Option<Rc<TestObject>> {
    let any: Rc<dyn Any> = object.clone();
    any.downcast::<TestObject>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EnumValue;
    use std::cell::Cell;

    #[test]
    fn declared_properties_round_trip() {
        let obj = TestObject::new();
        obj.add_property("label", Value::str("hello"));

        assert!(obj.has_property("label"));
        assert!(!obj.has_property("missing"));
        assert_eq!(obj.get_property("label").unwrap(), Value::str("hello"));
        assert_eq!(obj.property_type("label"), Some(ValueType::Str));

        obj.set_property("label", Value::str("world")).unwrap();
        assert_eq!(obj.get_property("label").unwrap(), Value::str("world"));
    }

    #[test]
    fn undefined_property_access_errors() {
        let obj = TestObject::new();
        let err = obj.get_property("ghost").unwrap_err();
        assert_eq!(
            err,
            ObjectError::UndefinedProperty {
                type_name: "TestObject".into(),
                property: "ghost".into(),
            }
        );
        assert!(obj.set_property("ghost", Value::Int(1)).is_err());
    }

    #[test]
    fn declared_initial_value_is_the_default() {
        let obj = TestObject::new();
        obj.add_property("count", Value::Int(7));

        obj.set_property("count", Value::Int(99)).unwrap();
        assert_eq!(obj.property_default("count"), Some(Value::Int(7)));
        assert_eq!(obj.property_default("missing"), None);
    }

    #[test]
    fn writes_coerce_to_the_declared_type() {
        let obj = TestObject::new();
        obj.add_property("opacity", Value::Float(1.0));
        obj.set_property("opacity", Value::Int(0)).unwrap();
        assert_eq!(obj.get_property("opacity").unwrap(), Value::Float(0.0));

        let err = obj.set_property("opacity", Value::str("solid")).unwrap_err();
        assert!(matches!(err, ObjectError::InvalidType { .. }));
    }

    #[test]
    fn untyped_property_adopts_the_first_written_type() {
        let obj = TestObject::new();
        obj.add_property("content", Value::Null);
        assert_eq!(obj.property_type("content"), Some(ValueType::Null));

        obj.set_property("content", Value::Int(3)).unwrap();
        assert_eq!(obj.property_type("content"), Some(ValueType::Int));
        assert!(obj.set_property("content", Value::str("x")).is_err());
    }

    #[test]
    fn notify_fires_only_on_actual_change() {
        let obj = TestObject::new();
        obj.add_property("value", Value::Int(1));

        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _guard = obj
            .notifier()
            .connect(Some("value"), move |_| counter.set(counter.get() + 1));

        obj.set_property("value", Value::Int(2)).unwrap();
        obj.set_property("value", Value::Int(2)).unwrap();
        obj.set_property("value", Value::Int(3)).unwrap();

        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn enum_property_accepts_nick_parsed_values() {
        let obj = TestObject::new();
        obj.add_property("align", Value::Enum(EnumValue::new(&ALIGN, 0)));
        assert_eq!(obj.property_type("align"), Some(ValueType::Enum(&ALIGN)));

        obj.set_property("align", Value::Enum(EnumValue::new(&ALIGN, 3)))
            .unwrap();
        assert_eq!(obj.get_property("align").unwrap().to_string(), "center");
    }

    #[test]
    fn instantiation_clones_the_declared_shape() {
        let prototype = TestObject::new();
        prototype.add_property("label", Value::str("proto"));
        prototype.add_signal("activated");

        let instance = prototype.object_type().instantiate().unwrap();
        assert_eq!(instance.object_type().name(), "TestObject");
        assert_eq!(instance.get_property("label").unwrap(), Value::str("proto"));
        assert!(instance.has_signal("activated"));

        instance.set_property("label", Value::str("copy")).unwrap();
        assert_eq!(prototype.get_property("label").unwrap(), Value::str("proto"));
    }

    #[test]
    fn child_insertion_and_removal() {
        let parent = TestObject::new();
        let a = TestObject::new();
        let b = TestObject::new();

        TestObject::insert_child(&parent, 0, &a);
        TestObject::insert_child(&parent, 1, &b);
        assert_eq!(parent.child_index(&a), Some(0));
        assert_eq!(parent.child_index(&b), Some(1));
        assert!(Rc::ptr_eq(&a.parent().unwrap(), &parent));

        assert!(TestObject::remove_child(&parent, &a));
        assert!(!TestObject::remove_child(&parent, &a));
        assert_eq!(parent.children().len(), 1);
        assert!(a.parent().is_none());
    }

    #[test]
    fn inserting_into_a_new_parent_reparents() {
        let first = TestObject::new();
        let second = TestObject::new();
        let child = TestObject::new();

        TestObject::insert_child(&first, 0, &child);
        TestObject::insert_child(&second, 0, &child);

        assert!(first.children().is_empty());
        assert_eq!(second.child_index(&child), Some(0));
        assert!(Rc::ptr_eq(&child.parent().unwrap(), &second));
    }

    #[test]
    fn child_property_strings_reports_order() {
        let parent = TestObject::new();
        for label in ["a", "b", "c"] {
            let child = TestObject::new();
            child.add_property("label", Value::str(label));
            let index = parent.children().len();
            TestObject::insert_child(&parent, index, &child);
        }
        assert_eq!(
            parent.child_property_strings("label"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn downcast_from_object_ref() {
        let obj: ObjectRef = TestObject::new();
        assert!(as_test_object(&obj).is_some());
    }
}
