#![forbid(unsafe_code)]

//! Evaluation results that may accept writes back to their source.
//!
//! Evaluating an expression yields a [`ValueHolder`]: the computed value
//! plus, for bidirectional evaluations, a push handler that routes a new
//! value back to wherever the original came from.

use std::fmt;
use std::rc::Rc;

use tracing::error;

use crate::value::Value;

/// A computed value, optionally writable back to its source.
#[derive(Clone)]
pub struct ValueHolder {
    value: Value,
    push: Option<Rc<dyn Fn(Value)>>,
}

impl ValueHolder {
    /// A read-only holder.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, push: None }
    }

    /// A holder whose source accepts pushed values.
    #[must_use]
    pub fn with_push(value: Value, push: impl Fn(Value) + 'static) -> Self {
        Self {
            value,
            push: Some(Rc::new(push)),
        }
    }

    /// The held value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the holder, keeping only the value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The same holder holding `value` instead; the push route survives.
    #[must_use]
    pub fn with_value(self, value: Value) -> Self {
        Self {
            value,
            push: self.push,
        }
    }

    /// Whether [`ValueHolder::push`] will route anywhere.
    #[must_use]
    pub fn can_push(&self) -> bool {
        self.push.is_some()
    }

    /// Drop the push route, turning this holder read-only.
    ///
    /// Any state owned by the handler is released when the last clone
    /// sharing it lets go. Disabling a read-only holder does nothing.
    pub fn disable_push(&mut self) {
        self.push = None;
    }

    /// Send `value` back to the source.
    ///
    /// Pushing to a read-only holder is a caller bug; it logs an error
    /// and does nothing.
    pub fn push(&self, value: Value) {
        match &self.push {
            Some(push) => {
                let push = Rc::clone(push);
                push(value);
            }
            None => {
                error!(value = %value, "attempted to push to a read-only value holder");
            }
        }
    }
}

impl fmt::Debug for ValueHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHolder")
            .field("value", &self.value)
            .field("can_push", &self.can_push())
            .finish()
    }
}
