#![forbid(unsafe_code)]

//! An insertion-ordered set of named value holders.
//!
//! Property sets carry the evaluated attribute values staged for a
//! target during an inflation pass. Iteration order is declaration
//! order, so applying a set is deterministic. Entries are
//! [`ValueHolder`]s rather than bare values: a two-way binding's holder
//! keeps its push route all the way to the point of application.

use std::rc::Rc;

use crate::holder::ValueHolder;
use crate::value::Value;

/// Named value holders in insertion order.
#[derive(Default, Clone, Debug)]
pub struct PropertySet {
    entries: Vec<(Rc<str>, ValueHolder)>,
}

/// Name partition produced by [`PropertySet::diff_names`].
#[derive(Debug, Default, PartialEq)]
pub struct PropertySetDiff {
    /// Present only in the newer set.
    pub added: Vec<Rc<str>>,
    /// Present only in the older set.
    pub removed: Vec<Rc<str>>,
    /// Present in both, whatever the values.
    pub kept: Vec<Rc<str>>,
}

impl PropertySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`. Overwriting keeps the original
    /// position.
    pub fn insert(&mut self, name: &str, value: ValueHolder) {
        match self.entries.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((Rc::from(name), value)),
        }
    }

    /// Remove `name`, returning its holder if present.
    pub fn remove(&mut self, name: &str) -> Option<ValueHolder> {
        let index = self.entries.iter().position(|(n, _)| &**n == name)?;
        Some(self.entries.remove(index).1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| &**n == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ValueHolder> {
        self.entries
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v)
    }

    /// The held value under `name`, without the holder.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(ValueHolder::value)
    }

    /// Names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| &**n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueHolder)> {
        self.entries.iter().map(|(n, v)| (&**n, v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Partition names against a newer set.
    #[must_use]
    pub fn diff_names(&self, newer: &PropertySet) -> PropertySetDiff {
        let mut diff = PropertySetDiff::default();
        for (name, _) in &self.entries {
            if newer.contains(name) {
                diff.kept.push(Rc::clone(name));
            } else {
                diff.removed.push(Rc::clone(name));
            }
        }
        for (name, _) in &newer.entries {
            if !self.contains(name) {
                diff.added.push(Rc::clone(name));
            }
        }
        diff
    }
}

impl<'a> IntoIterator for &'a PropertySet {
    type Item = (&'a str, &'a ValueHolder);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a ValueHolder)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
