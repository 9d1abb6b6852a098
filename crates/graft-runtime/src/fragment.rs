#![forbid(unsafe_code)]

//! The immutable parsed form of one markup node.
//!
//! A [`Fragment`] is what a markup front-end hands to the inflator: a
//! target type, the bindings declared on it (keyed by target name, in
//! declaration order), and its child fragments. Fragments are built once
//! through [`FragmentBuilder`] and never mutated afterwards, so a single
//! tree can back any number of live inflations and survive hot-reload
//! swaps untouched.
//!
//! Child identity matters to the runtime: the inflation diff keys each
//! child slot on the `Rc<Fragment>` allocation, so the same tree
//! re-inflated reuses the same target objects.

use std::rc::Rc;

use graft_core::object::ObjectType;
use graft_core::SourceLocation;
use graft_expr::error::ParseError;
use graft_expr::Binding;

/// One immutable markup node: target type, bindings, children.
#[derive(Debug)]
pub struct Fragment {
    target_type: ObjectType,
    location: SourceLocation,
    is_root: bool,
    bindings: Vec<(Rc<str>, Rc<Binding>)>,
    children: Vec<Rc<Fragment>>,
}

impl Fragment {
    /// Start building a fragment for `target_type`.
    #[must_use]
    pub fn builder(target_type: ObjectType, location: SourceLocation) -> FragmentBuilder {
        FragmentBuilder {
            target_type,
            location,
            is_root: false,
            bindings: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The type this fragment inflates into.
    #[must_use]
    pub fn target_type(&self) -> &ObjectType {
        &self.target_type
    }

    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Whether this fragment is the root of its document.
    ///
    /// Auto-attach predicates use this to treat top-level targets
    /// differently from nested ones.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Rc<Binding>)> {
        self.bindings.iter().map(|(name, binding)| (&**name, binding))
    }

    /// The binding declared for `target`, if any.
    #[must_use]
    pub fn binding(&self, target: &str) -> Option<&Rc<Binding>> {
        self.bindings
            .iter()
            .find(|(name, _)| &**name == target)
            .map(|(_, binding)| binding)
    }

    /// Binding target names in declaration order.
    pub fn binding_targets(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| &**name)
    }

    /// Child fragments in declaration order.
    #[must_use]
    pub fn children(&self) -> &[Rc<Fragment>] {
        &self.children
    }
}

/// Assembles an immutable [`Fragment`].
#[derive(Debug)]
pub struct FragmentBuilder {
    target_type: ObjectType,
    location: SourceLocation,
    is_root: bool,
    bindings: Vec<(Rc<str>, Rc<Binding>)>,
    children: Vec<Rc<Fragment>>,
}

impl FragmentBuilder {
    /// Mark the fragment as the root of its document.
    #[must_use]
    pub fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    /// Add a pre-built binding. A binding with the same target name as an
    /// earlier one replaces it in place.
    #[must_use]
    pub fn binding(mut self, binding: Binding) -> Self {
        let target: Rc<str> = Rc::from(binding.target());
        let binding = Rc::new(binding);
        match self
            .bindings
            .iter_mut()
            .find(|(name, _)| *name == target)
        {
            Some((_, slot)) => *slot = binding,
            None => self.bindings.push((target, binding)),
        }
        self
    }

    /// Parse `text` as binding syntax for `target`, at the fragment's own
    /// location.
    pub fn bind(self, target: &str, text: &str) -> Result<Self, ParseError> {
        let location = self.location.clone();
        let binding = Binding::parse(target, text, &location)?;
        Ok(self.binding(binding))
    }

    /// Append a child fragment.
    #[must_use]
    pub fn child(mut self, child: Rc<Fragment>) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<Fragment> {
        Rc::new(Fragment {
            target_type: self.target_type,
            location: self.location,
            is_root: self.is_root,
            bindings: self.bindings,
            children: self.children,
        })
    }
}
