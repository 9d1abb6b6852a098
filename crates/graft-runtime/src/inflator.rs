#![forbid(unsafe_code)]

//! Turning fragments into live object trees.
//!
//! The [`Inflator`] owns the evaluation context and the directive
//! registries, and drives the per-target pass protocol of
//! [`FragmentHost`]: begin, stage properties, resolve directives, run
//! their updates, flush properties, inflate children, commit. Every
//! error along the way is per-binding or per-child; one bad binding
//! never aborts the pass.
//!
//! Pass order matters and is fixed:
//!
//! 1. plain property bindings are evaluated and staged
//! 2. property directives are resolved; each directive's own properties
//!    go through a nested inflation pass on its target
//! 3. fresh directives attach, all present directives update (attach
//!    runs before children so a container directive can install its
//!    adapter in time)
//! 4. staged properties are value-diffed onto the target
//! 5. children inflate in declaration order, each through its structural
//!    directive when it names one
//! 6. commit tears down everything the pass did not re-add

use std::any::Any;
use std::rc::Rc;

use ahash::AHashMap;
use graft_core::object::{Object, ObjectError, ObjectRef};
use graft_core::{Key, SourceLocation};
use graft_expr::{Binding, BindingBuilder, BindingKind, EvalFlags, ExpressionContext};
use tracing::{error, warn};

use crate::directive::{
    classify_binding_target, BindingTargetKind, DirectiveFlags, PropertyDirective,
    PropertyDirectiveFactory, PropertyFormat, StructuralDirectiveFactory,
};
use crate::directives::IfDirectiveFactory;
use crate::fragment::Fragment;
use crate::host::FragmentHost;

bitflags::bitflags! {
    /// Options for one inflation pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InflationFlags: u8 {
        /// Subscribe the context to every property an expression reads,
        /// so mutations re-fire the context's `changed` hook.
        const TRACK_DEPENDENCIES = 1 << 0;
    }
}

/// Inflates fragments against an expression context.
pub struct Inflator {
    context: ExpressionContext,
    property_factories: AHashMap<Rc<str>, Rc<dyn PropertyDirectiveFactory>>,
    structural_factories: AHashMap<Rc<str>, Rc<dyn StructuralDirectiveFactory>>,
    /// Property factory names eligible for auto-attach, in registration
    /// order.
    auto_attach: Vec<Rc<str>>,
}

impl Inflator {
    /// An inflator over `context`, with the built-in directives
    /// registered.
    #[must_use]
    pub fn new(context: ExpressionContext) -> Self {
        let mut inflator = Self {
            context,
            property_factories: AHashMap::new(),
            structural_factories: AHashMap::new(),
            auto_attach: Vec::new(),
        };
        inflator.add_structural_directive(Rc::new(IfDirectiveFactory));
        inflator
    }

    /// An inflator whose context resolves names against `scope`.
    #[must_use]
    pub fn with_scope(scope: ObjectRef) -> Self {
        let context = ExpressionContext::new();
        context.add_scope(scope);
        Self::new(context)
    }

    #[must_use]
    pub fn context(&self) -> &ExpressionContext {
        &self.context
    }

    // ------------------------------------------------------------------
    // Directive registration
    // ------------------------------------------------------------------

    /// Register a property directive factory. A factory with the same
    /// name replaces the previous registration.
    pub fn add_property_directive(
        &mut self,
        flags: DirectiveFlags,
        factory: Rc<dyn PropertyDirectiveFactory>,
    ) {
        let name: Rc<str> = Rc::from(factory.name());
        if !flags.contains(DirectiveFlags::NO_AUTO_ATTACH)
            && !self.auto_attach.iter().any(|n| *n == name)
        {
            self.auto_attach.push(Rc::clone(&name));
        }
        self.property_factories.insert(name, factory);
    }

    /// Register a structural directive factory. A factory with the same
    /// name replaces the previous registration.
    pub fn add_structural_directive(&mut self, factory: Rc<dyn StructuralDirectiveFactory>) {
        self.structural_factories
            .insert(Rc::from(factory.name()), factory);
    }

    // ------------------------------------------------------------------
    // Inflation entry points
    // ------------------------------------------------------------------

    /// Instantiate `fragment`'s target type and inflate into it.
    pub fn inflate_new_target(
        &self,
        fragment: &Rc<Fragment>,
        flags: InflationFlags,
    ) -> Result<ObjectRef, ObjectError> {
        let target = fragment.target_type().instantiate()?;
        self.inflate_existing_target(&target, fragment, flags);
        Ok(target)
    }

    /// Run one inflation pass of `fragment` over `target`.
    pub fn inflate_existing_target(
        &self,
        target: &ObjectRef,
        fragment: &Rc<Fragment>,
        flags: InflationFlags,
    ) {
        let host = FragmentHost::find_or_create(target);
        if !host.matches_fragment_type(fragment) {
            error!(
                location = %fragment.location(),
                expected = fragment.target_type().name(),
                found = target.object_type().name(),
                "fragment type does not match the inflation target"
            );
            return;
        }

        host.begin_inflation();
        for (name, binding) in fragment.bindings() {
            if classify_binding_target(name) == BindingTargetKind::Property {
                self.apply_binding(&host, name, binding, flags);
            }
        }
        self.apply_property_directives(&host, fragment, flags);
        host.apply_pending_directive_updates();
        host.apply_latest_properties();
        for child in fragment.children() {
            let key = Key::new_identity("graft.child", Rc::clone(child) as Rc<dyn Any>);
            self.inflate_child_slot(&host, key, child, flags);
        }
        host.commit_inflation();
    }

    /// Inflate `child` into the slot `key` of `parent`: reuse the
    /// previous pass's object when its type still matches, otherwise
    /// instantiate a fresh one.
    ///
    /// This is also the callback surface for structural directives; it
    /// never re-runs structural resolution for the slot.
    pub fn inflate_child(
        &self,
        parent: &FragmentHost,
        key: &Key,
        child: &Rc<Fragment>,
        flags: InflationFlags,
    ) {
        let reusable = parent.leftover_child(key).filter(|existing| {
            existing.object_type().is_a(child.target_type())
        });
        let object = match reusable {
            Some(existing) => {
                self.inflate_existing_target(&existing, child, flags);
                existing
            }
            None => match self.inflate_new_target(child, flags) {
                Ok(object) => object,
                Err(error) => {
                    warn!(
                        location = %child.location(),
                        %error,
                        "cannot materialize child fragment"
                    );
                    return;
                }
            },
        };
        parent.add_inflated_child(key.clone(), object);
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Evaluate `binding` against the context and stage the result on
    /// `host` under `name`. Failures are logged and skipped.
    fn apply_binding(
        &self,
        host: &FragmentHost,
        name: &str,
        binding: &Binding,
        flags: InflationFlags,
    ) {
        let Some(target) = host.target() else {
            error!("inflation target dropped mid-pass");
            return;
        };
        if !target.has_property(name) {
            warn!(
                location = %binding.location(),
                property = name,
                type_name = target.object_type().name(),
                "binding targets an unknown property"
            );
            return;
        }
        let expected = target.property_type(name);
        let mut eval_flags = EvalFlags::empty();
        if flags.contains(InflationFlags::TRACK_DEPENDENCIES) {
            eval_flags |= EvalFlags::TRACK_DEPENDENCIES;
        }
        if binding.kind() == BindingKind::TwoWay {
            eval_flags |= EvalFlags::ENABLE_PUSH;
        }
        match binding.evaluate(&self.context, eval_flags, expected.as_ref()) {
            Ok(holder) => host.add_property(name, holder),
            Err(error) => {
                warn!(location = %binding.location(), %error, "failed to evaluate binding");
            }
        }
    }

    // ------------------------------------------------------------------
    // Property directives
    // ------------------------------------------------------------------

    fn apply_property_directives(
        &self,
        host: &FragmentHost,
        fragment: &Rc<Fragment>,
        flags: InflationFlags,
    ) {
        let mut inserted: AHashMap<Rc<str>, Rc<dyn PropertyDirective>> = AHashMap::new();
        let mut begun: Vec<Rc<FragmentHost>> = Vec::new();

        for (name, binding) in fragment.bindings() {
            let BindingTargetKind::PropertyDirective(rest) = classify_binding_target(name) else {
                continue;
            };
            let Some((factory, property)) =
                self.resolve_property_directive(rest, binding.location())
            else {
                continue;
            };
            let factory_name: Rc<str> = Rc::from(factory.name());
            let directive = match inserted.get(&factory_name) {
                Some(directive) => Rc::clone(directive),
                None => {
                    let directive = self.insert_property_directive(host, &factory, &mut begun);
                    inserted.insert(factory_name, Rc::clone(&directive));
                    directive
                }
            };
            if let Some(property) = property {
                let directive_host = FragmentHost::find_or_create(&directive.target());
                self.apply_binding(&directive_host, property, binding, flags);
            }
        }

        for name in &self.auto_attach {
            if inserted.contains_key(name) {
                continue;
            }
            let Some(factory) = self.property_factories.get(name) else {
                continue;
            };
            let factory = Rc::clone(factory);
            if !factory.should_auto_attach(host, fragment) {
                continue;
            }
            let format = factory.property_format();
            if format == PropertyFormat::Explicit {
                warn!(
                    directive = &**name,
                    "explicitly formatted directive cannot auto-attach"
                );
                continue;
            }
            let directive = self.insert_property_directive(host, &factory, &mut begun);
            if format == PropertyFormat::ImplicitValue {
                // an auto-attached value is the empty constant
                let binding = BindingBuilder::new("value", fragment.location()).build();
                let directive_host = FragmentHost::find_or_create(&directive.target());
                self.apply_binding(&directive_host, "value", &binding, InflationFlags::empty());
            }
            inserted.insert(Rc::clone(name), directive);
        }

        for directive_host in begun {
            directive_host.apply_latest_properties();
            directive_host.commit_inflation();
        }
    }

    /// Record one directive instance on `host`, reusing the previous
    /// pass's instance under the factory's key, and open a nested pass on
    /// the directive's own target.
    fn insert_property_directive(
        &self,
        host: &FragmentHost,
        factory: &Rc<dyn PropertyDirectiveFactory>,
        begun: &mut Vec<Rc<FragmentHost>>,
    ) -> Rc<dyn PropertyDirective> {
        let key = Key::new_str("graft.property-directive", factory.name());
        let directive = host
            .leftover_property_directive(&key)
            .unwrap_or_else(|| factory.create());
        host.add_property_directive(key, Rc::clone(&directive));
        let directive_host = FragmentHost::find_or_create(&directive.target());
        directive_host.begin_inflation();
        begun.push(directive_host);
        directive
    }

    /// Resolve `rest` (a `_`-stripped binding target) to a factory and
    /// the directive property the binding fills: full-name lookup first,
    /// then a last-dot split for explicitly formatted directives.
    fn resolve_property_directive<'a>(
        &self,
        rest: &'a str,
        location: &SourceLocation,
    ) -> Option<(Rc<dyn PropertyDirectiveFactory>, Option<&'a str>)> {
        if let Some(factory) = self.property_factories.get(rest) {
            return match factory.property_format() {
                PropertyFormat::None => Some((Rc::clone(factory), None)),
                PropertyFormat::ImplicitValue => Some((Rc::clone(factory), Some("value"))),
                PropertyFormat::Explicit => {
                    warn!(
                        location = %location,
                        directive = rest,
                        "directive requires an explicit property name"
                    );
                    None
                }
            };
        }
        let Some((base, property)) = rest.rsplit_once('.') else {
            warn!(location = %location, directive = rest, "unknown directive");
            return None;
        };
        let Some(factory) = self.property_factories.get(base) else {
            warn!(location = %location, directive = base, "unknown directive");
            return None;
        };
        if factory.property_format() != PropertyFormat::Explicit {
            warn!(
                location = %location,
                directive = base,
                "directive does not take explicitly named properties"
            );
            return None;
        }
        Some((Rc::clone(factory), Some(property)))
    }

    // ------------------------------------------------------------------
    // Children and structural directives
    // ------------------------------------------------------------------

    fn inflate_child_slot(
        &self,
        host: &FragmentHost,
        key: Key,
        child: &Rc<Fragment>,
        flags: InflationFlags,
    ) {
        type Staged<'a> = Vec<(Option<&'a str>, &'a Rc<Binding>)>;
        let mut chosen: Option<(Rc<dyn StructuralDirectiveFactory>, Staged<'_>)> = None;

        for (name, binding) in child.bindings() {
            let BindingTargetKind::StructuralDirective(rest) = classify_binding_target(name)
            else {
                continue;
            };
            let Some((factory, property)) =
                self.resolve_structural_directive(rest, binding.location())
            else {
                continue;
            };
            match &mut chosen {
                None => chosen = Some((factory, vec![(property, binding)])),
                Some((current, staged)) => {
                    if current.name() != factory.name() {
                        error!(
                            location = %child.location(),
                            first = current.name(),
                            second = factory.name(),
                            "conflicting structural directives; skipping child"
                        );
                        return;
                    }
                    staged.push((property, binding));
                }
            }
        }

        let Some((factory, staged)) = chosen else {
            self.inflate_child(host, &key, child, flags);
            return;
        };

        // Keyed by the child fragment's identity: sibling children naming
        // the same directive each get their own durable slot.
        let directive_key =
            Key::new_identity("graft.structural-directive", Rc::clone(child) as Rc<dyn Any>);
        let directive = host
            .leftover_structural_directive(&directive_key)
            .unwrap_or_else(|| factory.create());
        host.add_structural_directive(directive_key, Rc::clone(&directive));

        let directive_host = FragmentHost::find_or_create(&directive.target());
        directive_host.begin_inflation();
        for (property, binding) in staged {
            if let Some(property) = property {
                self.apply_binding(&directive_host, property, binding, flags);
            }
        }
        directive_host.apply_latest_properties();
        directive_host.commit_inflation();

        directive.apply(self, host, &key, child, flags);
    }

    /// Structural counterpart of
    /// [`Inflator::resolve_property_directive`]. An unresolved name means
    /// the child inflates as if the binding were absent.
    fn resolve_structural_directive<'a>(
        &self,
        rest: &'a str,
        location: &SourceLocation,
    ) -> Option<(Rc<dyn StructuralDirectiveFactory>, Option<&'a str>)> {
        if let Some(factory) = self.structural_factories.get(rest) {
            return match factory.property_format() {
                PropertyFormat::None => Some((Rc::clone(factory), None)),
                PropertyFormat::ImplicitValue => Some((Rc::clone(factory), Some("value"))),
                PropertyFormat::Explicit => {
                    warn!(
                        location = %location,
                        directive = rest,
                        "directive requires an explicit property name"
                    );
                    None
                }
            };
        }
        let Some((base, property)) = rest.rsplit_once('.') else {
            warn!(location = %location, directive = rest, "unknown structural directive");
            return None;
        };
        let Some(factory) = self.structural_factories.get(base) else {
            warn!(location = %location, directive = base, "unknown structural directive");
            return None;
        };
        if factory.property_format() != PropertyFormat::Explicit {
            warn!(
                location = %location,
                directive = base,
                "directive does not take explicitly named properties"
            );
            return None;
        }
        Some((Rc::clone(factory), Some(property)))
    }
}
