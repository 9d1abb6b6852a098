#![forbid(unsafe_code)]

//! `__if`: conditional inflation of a child fragment.
//!
//! The directive exposes one `Bool` property, `value`, bound through the
//! implicit-value format: `__if="[expr]"`. When it evaluates true the
//! child inflates normally; when false the child is simply not inflated,
//! which makes the commit pass tear down any instance from before. A
//! later true pass inflates a brand-new instance.

use std::rc::Rc;

use graft_core::{Key, Value};

use crate::directive::{
    DirectiveProps, PropertyFormat, StructuralDirective, StructuralDirectiveFactory,
};
use crate::fragment::Fragment;
use crate::host::FragmentHost;
use crate::inflator::{InflationFlags, Inflator};

struct IfDirective {
    props: Rc<DirectiveProps>,
}

impl IfDirective {
    fn new() -> Self {
        let props = DirectiveProps::new("GraftIfDirective");
        props.add_property("value", Value::Bool(false));
        Self { props }
    }
}

impl StructuralDirective for IfDirective {
    fn target(&self) -> graft_core::ObjectRef {
        Rc::clone(&self.props) as graft_core::ObjectRef
    }

    fn apply(
        &self,
        inflator: &Inflator,
        parent: &FragmentHost,
        key: &Key,
        child: &Rc<Fragment>,
        flags: InflationFlags,
    ) {
        if self.props.bool_value("value") {
            inflator.inflate_child(parent, key, child, flags);
        }
    }
}

/// Factory for the `__if` directive.
#[derive(Debug, Default)]
pub struct IfDirectiveFactory;

impl StructuralDirectiveFactory for IfDirectiveFactory {
    fn name(&self) -> &str {
        "if"
    }

    fn property_format(&self) -> PropertyFormat {
        PropertyFormat::ImplicitValue
    }

    fn create(&self) -> Rc<dyn StructuralDirective> {
        Rc::new(IfDirective::new())
    }
}
