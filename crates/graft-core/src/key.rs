#![forbid(unsafe_code)]

//! Keys that identify entries across incremental update passes.
//!
//! The inflation diff matches old and new entries by key: properties key
//! on their name, directives on their factory, children on the fragment
//! that produced them. A key is a namespace plus a payload; payloads are
//! integers, strings, or object identities.
//!
//! # Invariants
//!
//! 1. **Identity keys pin their anchor**: an identity key holds a strong
//!    reference, so the anchor's address cannot be reused while any copy
//!    of the key is alive.
//!
//! 2. **Equality implies hash equality**: keys are usable in hash maps
//!    across passes; equal keys from different passes collide.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// An identity payload: compares and hashes by allocation address.
#[derive(Clone)]
pub struct IdentityKey {
    anchor: Rc<dyn Any>,
    addr: usize,
}

impl IdentityKey {
    #[must_use]
    pub fn new(anchor: Rc<dyn Any>) -> Self {
        let addr = Rc::as_ptr(&anchor) as *const () as usize;
        Self { anchor, addr }
    }

    /// The anchored allocation, for callers that need it back.
    #[must_use]
    pub fn anchor(&self) -> &Rc<dyn Any> {
        &self.anchor
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum KeyPayload {
    Int(i64),
    Str(Rc<str>),
    Identity(IdentityKey),
}

/// A namespaced diff key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    namespace: Rc<str>,
    payload: KeyPayload,
}

impl Key {
    /// Key on an integer payload.
    #[must_use]
    pub fn new_int(namespace: &str, value: i64) -> Self {
        Self {
            namespace: Rc::from(namespace),
            payload: KeyPayload::Int(value),
        }
    }

    /// Key on a string payload.
    #[must_use]
    pub fn new_str(namespace: &str, value: &str) -> Self {
        Self {
            namespace: Rc::from(namespace),
            payload: KeyPayload::Str(Rc::from(value)),
        }
    }

    /// Key on an allocation's identity.
    #[must_use]
    pub fn new_identity(namespace: &str, anchor: Rc<dyn Any>) -> Self {
        Self {
            namespace: Rc::from(namespace),
            payload: KeyPayload::Identity(IdentityKey::new(anchor)),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            KeyPayload::Int(v) => write!(f, "{}:{v}", self.namespace),
            KeyPayload::Str(s) => write!(f, "{}:{s}", self.namespace),
            KeyPayload::Identity(id) => write!(f, "{}:@{:x}", self.namespace, id.addr),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    #[test]
    fn int_keys_compare_by_namespace_and_value() {
        assert_eq!(Key::new_int("a", 1), Key::new_int("a", 1));
        assert_ne!(Key::new_int("a", 1), Key::new_int("a", 2));
        assert_ne!(Key::new_int("a", 1), Key::new_int("b", 1));
    }

    #[test]
    fn str_keys_compare_by_namespace_and_payload() {
        assert_eq!(Key::new_str("a", "x"), Key::new_str("a", "x"));
        assert_ne!(Key::new_str("a", "x"), Key::new_str("a", "y"));
        assert_ne!(Key::new_str("a", "x"), Key::new_str("b", "x"));
    }

    #[test]
    fn payload_kinds_never_collide() {
        assert_ne!(Key::new_int("a", 1), Key::new_str("a", "1"));
    }

    #[test]
    fn identity_keys_compare_by_anchor() {
        let first: Rc<dyn Any> = Rc::new(5u8);
        let second: Rc<dyn Any> = Rc::new(5u8);

        assert_eq!(
            Key::new_identity("a", Rc::clone(&first)),
            Key::new_identity("a", Rc::clone(&first))
        );
        assert_ne!(
            Key::new_identity("a", Rc::clone(&first)),
            Key::new_identity("a", second)
        );
        assert_ne!(
            Key::new_identity("a", Rc::clone(&first)),
            Key::new_identity("b", first)
        );
    }

    #[test]
    fn equal_keys_find_each_other_in_a_map() {
        let anchor: Rc<dyn Any> = Rc::new(String::from("anchor"));
        let mut map: AHashMap<Key, u32> = AHashMap::new();
        map.insert(Key::new_int("p", 3), 1);
        map.insert(Key::new_str("p", "width"), 2);
        map.insert(Key::new_identity("c", Rc::clone(&anchor)), 3);

        assert_eq!(map.get(&Key::new_int("p", 3)), Some(&1));
        assert_eq!(map.get(&Key::new_str("p", "width")), Some(&2));
        assert_eq!(map.get(&Key::new_identity("c", anchor)), Some(&3));
    }

    #[test]
    fn describe_includes_namespace_and_payload() {
        assert_eq!(Key::new_int("children", 4).to_string(), "children:4");
        assert_eq!(Key::new_str("props", "label").to_string(), "props:label");
        let identity = Key::new_identity("dir", Rc::new(1u8));
        assert!(identity.to_string().starts_with("dir:@"));
    }
}
