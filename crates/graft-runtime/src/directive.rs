#![forbid(unsafe_code)]

//! Directives: engine plugins addressed through reserved binding names.
//!
//! A binding target starting with one underscore (`_grid.row`) names a
//! property directive: an object attached to the host that reacts to the
//! inflation lifecycle. Two underscores (`__if`) name a structural
//! directive: it is resolved by the parent and governs whether and how a
//! child fragment inflates at all.
//!
//! Directive instances are themselves inflation targets. Each exposes a
//! bindable property object through [`PropertyDirective::target`] /
//! [`StructuralDirective::target`], and the inflator runs a nested
//! inflation pass over it before any lifecycle callback fires, so a
//! callback always reads fresh property values.
//!
//! # Invariants
//!
//! 1. **Lifecycle order**: `attach` fires exactly once, on the first pass
//!    an instance is present; `update` fires once per pass it is present;
//!    `detach` fires exactly once, on the first pass it is absent.
//!
//! 2. **One structural directive per fragment**: a fragment naming two
//!    different structural directives is a contract violation and the
//!    child is skipped for the pass.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use graft_core::object::{
    Attachments, Notifier, Object, ObjectError, ObjectRef, ObjectType, SignalHub, SignalSpec,
};
use graft_core::{Key, Value, ValueType};

use crate::fragment::Fragment;
use crate::host::FragmentHost;
use crate::inflator::{InflationFlags, Inflator};

// ============================================================================
// Binding-target classification
// ============================================================================

/// What a binding target name addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingTargetKind<'a> {
    /// A plain property on the inflation target.
    Property,
    /// A property directive; the payload is the name with the `_` prefix
    /// stripped (it may still carry a `.property` suffix).
    PropertyDirective(&'a str),
    /// A structural directive, `__` prefix stripped.
    StructuralDirective(&'a str),
}

/// Classify a binding target by its underscore prefix.
#[must_use]
pub fn classify_binding_target(target: &str) -> BindingTargetKind<'_> {
    if let Some(rest) = target.strip_prefix("__") {
        BindingTargetKind::StructuralDirective(rest)
    } else if let Some(rest) = target.strip_prefix('_') {
        BindingTargetKind::PropertyDirective(rest)
    } else {
        BindingTargetKind::Property
    }
}

// ============================================================================
// Property directives
// ============================================================================

/// How a property directive's binding text maps onto its properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFormat {
    /// The directive has no bindable properties; its binding text is
    /// ignored.
    None,
    /// The binding text binds the directive's `value` property.
    ImplicitValue,
    /// Each binding names a property explicitly: `_name.property`.
    Explicit,
}

bitflags::bitflags! {
    /// Registration-time options for a property directive factory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirectiveFlags: u8 {
        /// Never consult [`PropertyDirectiveFactory::should_auto_attach`];
        /// the directive only appears where a binding names it.
        const NO_AUTO_ATTACH = 1 << 0;
    }
}

/// A directive attached to a host through `_name` bindings.
pub trait PropertyDirective {
    /// The object the directive's own bindings are applied to.
    fn target(&self) -> ObjectRef;

    /// First pass the directive is present on a host.
    fn attach(&self, host: &FragmentHost) {
        let _ = host;
    }

    /// Every pass the directive is present, after its properties and the
    /// host's pending properties are staged.
    fn update(&self, host: &FragmentHost) {
        let _ = host;
    }

    /// First pass the directive is absent again.
    fn detach(&self, host: &FragmentHost) {
        let _ = host;
    }
}

/// Creates and describes instances of one property directive.
pub trait PropertyDirectiveFactory {
    /// The name bindings use, without underscores.
    fn name(&self) -> &str;

    fn property_format(&self) -> PropertyFormat;

    fn create(&self) -> Rc<dyn PropertyDirective>;

    /// Whether the directive should attach to `host` even though no
    /// binding names it. Never consulted for factories registered with
    /// [`DirectiveFlags::NO_AUTO_ATTACH`], and an [`PropertyFormat::Explicit`]
    /// factory cannot auto-attach regardless.
    fn should_auto_attach(&self, host: &FragmentHost, fragment: &Fragment) -> bool {
        let _ = (host, fragment);
        false
    }
}

// ============================================================================
// Structural directives
// ============================================================================

/// A directive that governs how one child fragment inflates.
pub trait StructuralDirective {
    /// The object the directive's own bindings are applied to.
    fn target(&self) -> ObjectRef;

    /// Decide the child's fate. Inflating it means calling
    /// [`Inflator::inflate_child`] with the given slot key; not calling it
    /// makes the pass treat the child as absent, tearing down any previous
    /// instance at commit.
    fn apply(
        &self,
        inflator: &Inflator,
        parent: &FragmentHost,
        key: &Key,
        child: &Rc<Fragment>,
        flags: InflationFlags,
    );
}

/// Creates and describes instances of one structural directive.
pub trait StructuralDirectiveFactory {
    /// The name bindings use, without underscores.
    fn name(&self) -> &str;

    fn property_format(&self) -> PropertyFormat;

    fn create(&self) -> Rc<dyn StructuralDirective>;
}

// ============================================================================
// Directive property bags
// ============================================================================

struct DirectiveProp {
    name: Rc<str>,
    ty: ValueType,
    value: Value,
    default: Value,
}

/// A minimal [`Object`] implementation backing a directive's bindable
/// properties.
///
/// Directives that are not widgets still need a reflectable target for
/// the nested inflation pass; this is that target. Properties are
/// declared up front and typed by their initial value.
pub struct DirectiveProps {
    type_name: Rc<str>,
    props: RefCell<Vec<DirectiveProp>>,
    notifier: Notifier,
    signals: SignalHub,
    attachments: Attachments,
}

impl DirectiveProps {
    #[must_use]
    pub fn new(type_name: &str) -> Rc<Self> {
        Rc::new(Self {
            type_name: Rc::from(type_name),
            props: RefCell::new(Vec::new()),
            notifier: Notifier::new(),
            signals: SignalHub::new(),
            attachments: Attachments::new(),
        })
    }

    /// Declare a property, typed by `initial`.
    pub fn add_property(&self, name: &str, initial: Value) {
        let ty = initial.value_type();
        self.props.borrow_mut().push(DirectiveProp {
            name: Rc::from(name),
            ty,
            default: initial.clone(),
            value: initial,
        });
    }

    /// Convenience read of a `Bool` property; anything else is `false`.
    #[must_use]
    pub fn bool_value(&self, name: &str) -> bool {
        matches!(self.get_property(name), Ok(Value::Bool(true)))
    }
}

impl Object for DirectiveProps {
    fn object_type(&self) -> ObjectType {
        ObjectType::named(&self.type_name)
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

    fn find_signal(&self, _name: &str) -> Option<SignalSpec> {
        None
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

/// Downcast an [`ObjectRef`] to a [`DirectiveProps`].
#[must_use]
pub fn as_directive_props(object: &ObjectRef) -> Option<Rc<DirectiveProps>> {
    let any: Rc<dyn Any> = object.clone();
    any.downcast::<DirectiveProps>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_classify_by_prefix() {
        assert_eq!(classify_binding_target("label"), BindingTargetKind::Property);
        assert_eq!(
            classify_binding_target("_grid.row"),
            BindingTargetKind::PropertyDirective("grid.row")
        );
        assert_eq!(
            classify_binding_target("_box-container"),
            BindingTargetKind::PropertyDirective("box-container")
        );
        assert_eq!(
            classify_binding_target("__if"),
            BindingTargetKind::StructuralDirective("if")
        );
    }

    #[test]
    fn directive_props_behave_like_a_declared_object() {
        let props = DirectiveProps::new("TestDirective");
        props.add_property("value", Value::Bool(false));

        assert!(props.has_property("value"));
        assert_eq!(props.property_type("value"), Some(ValueType::Bool));
        assert_eq!(props.property_default("value"), Some(Value::Bool(false)));
        assert!(!props.bool_value("value"));

        props.set_property("value", Value::Bool(true)).unwrap();
        assert!(props.bool_value("value"));

        assert!(props.set_property("missing", Value::Int(1)).is_err());
        assert!(props.get_property("missing").is_err());
    }

    #[test]
    fn directive_props_coerce_writes() {
        let props = DirectiveProps::new("TestDirective");
        props.add_property("fraction", Value::Float(0.0));
        props.set_property("fraction", Value::Int(1)).unwrap();
        assert_eq!(props.get_property("fraction").unwrap(), Value::Float(1.0));

        let err = props
            .set_property("fraction", Value::str("full"))
            .unwrap_err();
        assert!(matches!(err, ObjectError::InvalidType { .. }));
    }

    #[test]
    fn directive_props_notify_only_on_change() {
        let props = DirectiveProps::new("TestDirective");
        props.add_property("value", Value::Int(1));

        let hits = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&hits);
        let _guard = props
            .notifier()
            .connect(Some("value"), move |_| counter.set(counter.get() + 1));

        props.set_property("value", Value::Int(2)).unwrap();
        props.set_property("value", Value::Int(2)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn downcast_from_object_ref() {
        let props: ObjectRef = DirectiveProps::new("TestDirective");
        assert!(as_directive_props(&props).is_some());
    }
}
