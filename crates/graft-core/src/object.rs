#![forbid(unsafe_code)]

//! The reflection seam between the engine and a host object system.
//!
//! Everything the engine touches at runtime (binding targets, scope
//! objects, directive instances' targets) is a [`Object`]: a dynamically
//! inspectable bag of properties and signals. A host toolkit integrates by
//! implementing this trait over its native widgets; the test double in
//! [`crate::testobj`] implements it over a plain hash map.
//!
//! # Invariants
//!
//! 1. **Notification follows mutation**: an implementation emits on its
//!    [`Notifier`] only after the new property value is observable through
//!    [`Object::get_property`].
//!
//! 2. **Subscriber lists are snapshot before delivery**: connecting or
//!    disconnecting from inside a callback affects the next emission,
//!    never the one in flight.
//!
//! 3. **Guards own the connection**: dropping a [`NotifyGuard`] or
//!    [`SignalGuard`] disconnects; nothing else does.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Reading an undefined property | `Err(ObjectError::UndefinedProperty)` |
//! | Writing a value with no coercion to the property's type | `Err(ObjectError::InvalidType)` |
//! | Instantiating a type descriptor with no constructor | `Err(ObjectError::NotConstructible)` |
//! | Emitting with no subscribers | no-op |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::value::{Value, ValueType};

/// Shared handle to a host object.
pub type ObjectRef = Rc<dyn Object>;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the host-object seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The type has no property with this name.
    UndefinedProperty { type_name: String, property: String },
    /// The type has no signal with this name.
    UndefinedSignal { type_name: String, signal: String },
    /// A write carried a value the property cannot accept.
    InvalidType {
        property: String,
        expected: String,
        found: String,
    },
    /// The type descriptor cannot construct instances.
    NotConstructible { type_name: String },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedProperty {
                type_name,
                property,
            } => {
                write!(f, "type {type_name} has no property '{property}'")
            }
            Self::UndefinedSignal { type_name, signal } => {
                write!(f, "type {type_name} has no signal '{signal}'")
            }
            Self::InvalidType {
                property,
                expected,
                found,
            } => {
                write!(
                    f,
                    "property '{property}' expects {expected}, found {found}"
                )
            }
            Self::NotConstructible { type_name } => {
                write!(f, "type {type_name} cannot be constructed")
            }
        }
    }
}

impl std::error::Error for ObjectError {}

// ============================================================================
// Type descriptors
// ============================================================================

/// A named host type, optionally able to construct fresh instances.
///
/// Descriptors compare by name. The constructor hook is what lets the
/// inflator build a brand-new target for a fragment.
#[derive(Clone)]
pub struct ObjectType {
    name: Rc<str>,
    parent: Option<Rc<ObjectType>>,
    construct: Option<Rc<dyn Fn() -> ObjectRef>>,
}

impl ObjectType {
    /// A descriptor that names a type but cannot instantiate it.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            parent: None,
            construct: None,
        }
    }

    /// A descriptor with a constructor hook.
    #[must_use]
    pub fn with_constructor(name: &str, construct: impl Fn() -> ObjectRef + 'static) -> Self {
        Self {
            name: Rc::from(name),
            parent: None,
            construct: Some(Rc::new(construct)),
        }
    }

    /// Declare `parent` as this type's supertype.
    #[must_use]
    pub fn with_parent(mut self, parent: ObjectType) -> Self {
        self.parent = Some(Rc::new(parent));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this type is `other` or descends from it.
    #[must_use]
    pub fn is_a(&self, other: &Self) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.name == other.name {
                return true;
            }
            current = ty.parent.as_deref();
        }
        false
    }

    /// Build a fresh instance of this type.
    pub fn instantiate(&self) -> Result<ObjectRef, ObjectError> {
        match &self.construct {
            Some(construct) => Ok(construct()),
            None => Err(ObjectError::NotConstructible {
                type_name: self.name.to_string(),
            }),
        }
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ObjectType {}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name)
            .field("constructible", &self.construct.is_some())
            .finish()
    }
}

// ============================================================================
// The object trait
// ============================================================================

/// Declared shape of a signal: whether it takes a detail string, and its
/// parameter types when the host declares them (`None` means untyped,
/// accepting any arguments).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSpec {
    pub detailed: bool,
    pub params: Option<Vec<ValueType>>,
    /// Declared return type; `None` for void signals.
    pub returns: Option<ValueType>,
}

/// A host object the engine can reflect over.
///
/// `Any` is a supertrait so directive code can downcast an [`ObjectRef`]
/// to the concrete host type it was written for.
pub trait Object: Any {
    /// The object's type descriptor.
    fn object_type(&self) -> ObjectType;

    /// Whether the object exposes a property with this name.
    fn has_property(&self, name: &str) -> bool;

    /// The value type `name` accepts, or `None` for undefined properties.
    ///
    /// Constant attribute text is parsed against this type, and evaluated
    /// values are coerced to it before a write.
    fn property_type(&self, name: &str) -> Option<ValueType>;

    /// The declared default for `name`, written back when a previously
    /// applied property is withdrawn. `None` when the property is
    /// undefined or the host declares no default.
    fn property_default(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Read a property.
    fn get_property(&self, name: &str) -> Result<Value, ObjectError>;

    /// Write a property. Implementations emit on their [`Notifier`] after
    /// the store when the value actually changed.
    fn set_property(&self, name: &str, value: Value) -> Result<(), ObjectError>;

    /// Look up a declared signal's shape.
    fn find_signal(&self, name: &str) -> Option<SignalSpec>;

    /// Whether the object exposes a signal with this name.
    fn has_signal(&self, name: &str) -> bool {
        self.find_signal(name).is_some()
    }

    /// Property-change notification hub.
    fn notifier(&self) -> &Notifier;

    /// Signal connection and emission hub.
    fn signals(&self) -> &SignalHub;

    /// Engine-private storage hung off this object.
    fn attachments(&self) -> &Attachments;
}

// ============================================================================
// Property-change notification
// ============================================================================

struct NotifySub {
    id: u64,
    property: Option<Rc<str>>,
    callback: Rc<dyn Fn(&str)>,
}

#[derive(Default)]
struct NotifierInner {
    next_id: u64,
    subs: Vec<NotifySub>,
}

/// Per-object property-change notification hub.
///
/// Subscribers pick a single property or all of them; callbacks receive
/// the changed property's name.
#[derive(Default)]
pub struct Notifier {
    inner: Rc<RefCell<NotifierInner>>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes of `property`, or of every property when
    /// `None`.
    #[must_use = "dropping the guard disconnects the subscription"]
    pub fn connect(&self, property: Option<&str>, callback: impl Fn(&str) + 'static) -> NotifyGuard {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subs.push(NotifySub {
            id,
            property: property.map(Rc::from),
            callback: Rc::new(callback),
        });
        NotifyGuard {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Announce that `property` changed.
    pub fn emit(&self, property: &str) {
        let callbacks: Vec<Rc<dyn Fn(&str)>> = self
            .inner
            .borrow()
            .subs
            .iter()
            .filter(|s| s.property.as_deref().is_none_or(|p| p == property))
            .map(|s| Rc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(property);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subs.len()
    }
}

/// RAII handle for a [`Notifier`] subscription.
pub struct NotifyGuard {
    inner: Weak<RefCell<NotifierInner>>,
    id: u64,
}

impl Drop for NotifyGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.borrow_mut().subs.retain(|s| s.id != self.id);
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

struct SignalSub {
    id: u64,
    signal: Rc<str>,
    detail: Option<Rc<str>>,
    callback: Rc<dyn Fn(&[Value]) -> Value>,
}

#[derive(Default)]
struct SignalInner {
    next_id: u64,
    subs: Vec<SignalSub>,
}

/// Per-object signal hub.
///
/// A handler connected with a detail fires only for emissions carrying
/// that detail; a handler connected without one fires for every emission
/// of the signal. Emission returns the last handler's return value, or
/// [`Value::Null`] when nothing ran.
#[derive(Default)]
pub struct SignalHub {
    inner: Rc<RefCell<SignalInner>>,
}

impl SignalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "dropping the guard disconnects the handler"]
    pub fn connect(
        &self,
        signal: &str,
        detail: Option<&str>,
        callback: impl Fn(&[Value]) -> Value + 'static,
    ) -> SignalGuard {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subs.push(SignalSub {
            id,
            signal: Rc::from(signal),
            detail: detail.map(Rc::from),
            callback: Rc::new(callback),
        });
        SignalGuard {
            inner: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Fire `signal` with `args`, returning the last handler's result.
    pub fn emit(&self, signal: &str, detail: Option<&str>, args: &[Value]) -> Value {
        let callbacks: Vec<Rc<dyn Fn(&[Value]) -> Value>> = self
            .inner
            .borrow()
            .subs
            .iter()
            .filter(|s| {
                &*s.signal == signal
                    && s.detail
                        .as_deref()
                        .is_none_or(|d| Some(d) == detail)
            })
            .map(|s| Rc::clone(&s.callback))
            .collect();
        let mut result = Value::Null;
        for callback in callbacks {
            result = callback(args);
        }
        result
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.borrow().subs.len()
    }
}

/// RAII handle for a [`SignalHub`] connection.
pub struct SignalGuard {
    inner: Weak<RefCell<SignalInner>>,
    id: u64,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.borrow_mut().subs.retain(|s| s.id != self.id);
        }
    }
}

// ============================================================================
// Attachments
// ============================================================================

/// Keyed engine-private storage hung off a host object.
///
/// The runtime uses this to associate state with a target without the
/// host type knowing about it: the fragment host living on an inflated
/// widget, the container adapter picked for it, and so on.
#[derive(Default)]
pub struct Attachments {
    inner: RefCell<AHashMap<&'static str, Rc<dyn Any>>>,
}

impl Attachments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous attachment.
    pub fn set(&self, key: &'static str, value: Rc<dyn Any>) {
        self.inner.borrow_mut().insert(key, value);
    }

    /// Fetch the attachment under `key`, downcast to `T`.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    #[must_use]
    pub fn get<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        let any = Rc::clone(self.inner.borrow().get(key)?);
        any.downcast::<T>().ok()
    }

    /// Remove and return the attachment under `key`.
    pub fn remove(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.inner.borrow_mut().remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().contains_key(key)
    }
}
