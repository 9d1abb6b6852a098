#![forbid(unsafe_code)]

//! The expression tree and its evaluator.
//!
//! Expressions are immutable once parsed. Evaluation resolves names
//! through an [`ExpressionContext`] and yields a [`ValueHolder`]; flags
//! opt into dependency tracking and write-back support.
//!
//! # Invariants
//!
//! 1. **Push never crosses a sub-expression boundary**: only the
//!    outermost property access of an evaluation can produce a pushable
//!    holder; object sub-expressions and signal arguments evaluate with
//!    the push flag stripped.
//!
//! 2. **Signal evaluation is invocation**: evaluating a signal expression
//!    emits the signal synchronously and wraps its return value; it never
//!    installs a handler.

use std::rc::Rc;

use bitflags::bitflags;
use graft_core::holder::ValueHolder;
use graft_core::object::{Object, ObjectRef};
use graft_core::value::Value;
use graft_core::SourceLocation;
use tracing::warn;

use crate::context::ExpressionContext;
use crate::error::{EvalError, EvalResult};

bitflags! {
    /// Evaluation behavior switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EvalFlags: u8 {
        /// The result must route pushed values back to its source.
        const ENABLE_PUSH = 1 << 0;
        /// Subscribe to everything read so later mutations fire the
        /// context's `changed` hook.
        const TRACK_DEPENDENCIES = 1 << 1;
    }
}

impl EvalFlags {
    /// The subset of flags handed to sub-expressions.
    #[must_use]
    pub fn propagate(self) -> Self {
        self & Self::TRACK_DEPENDENCIES
    }
}

enum ExprKind {
    Constant(Value),
    Property {
        object: Option<Box<Expression>>,
        name: Rc<str>,
    },
    Signal {
        object: Option<Box<Expression>>,
        signal: Rc<str>,
        detail: Option<Rc<str>>,
        args: Vec<Expression>,
    },
}

/// A parsed expression node.
pub struct Expression {
    location: SourceLocation,
    kind: ExprKind,
}

impl Expression {
    /// A fixed value.
    #[must_use]
    pub fn constant(location: SourceLocation, value: Value) -> Self {
        Self {
            location,
            kind: ExprKind::Constant(value),
        }
    }

    /// A property read: from `object`'s result when present, otherwise
    /// from whichever scope exposes `name`.
    #[must_use]
    pub fn property(location: SourceLocation, object: Option<Expression>, name: &str) -> Self {
        Self {
            location,
            kind: ExprKind::Property {
                object: object.map(Box::new),
                name: Rc::from(name),
            },
        }
    }

    /// A signal invocation on `object`'s result, or on whichever scope
    /// declares `signal`.
    #[must_use]
    pub fn signal(
        location: SourceLocation,
        object: Option<Expression>,
        signal: &str,
        detail: Option<&str>,
        args: Vec<Expression>,
    ) -> Self {
        Self {
            location,
            kind: ExprKind::Signal {
                object: object.map(Box::new),
                signal: Rc::from(signal),
                detail: detail.map(Rc::from),
                args,
            },
        }
    }

    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Whether evaluation can never observe live state.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    /// Evaluate against `context`.
    pub fn evaluate(&self, context: &ExpressionContext, flags: EvalFlags) -> EvalResult<ValueHolder> {
        match &self.kind {
            ExprKind::Constant(value) => Ok(ValueHolder::new(value.clone())),
            ExprKind::Property { object, name } => {
                self.evaluate_property(context, flags, object.as_deref(), name)
            }
            ExprKind::Signal {
                object,
                signal,
                detail,
                args,
            } => self.evaluate_signal(context, flags, object.as_deref(), signal, detail.as_deref(), args),
        }
    }

    fn evaluate_property(
        &self,
        context: &ExpressionContext,
        flags: EvalFlags,
        object: Option<&Expression>,
        name: &Rc<str>,
    ) -> EvalResult<ValueHolder> {
        let target: ObjectRef = match object {
            Some(object_expr) => {
                let holder = object_expr.evaluate(context, flags.propagate())?;
                let Some(target) = holder.value().as_object().cloned() else {
                    return Err(EvalError::InvalidType {
                        message: format!(
                            "cannot get a property on type '{}'",
                            holder.value().value_type().name()
                        ),
                        location: object_expr.location.clone(),
                    });
                };
                if !target.has_property(name) {
                    return Err(EvalError::UndefinedProperty {
                        property: name.to_string(),
                        location: self.location.clone(),
                    });
                }
                target
            }
            None => {
                if let Some(value) = context.lookup_extra(name) {
                    return Ok(ValueHolder::new(value));
                }
                context.find_object_with_property(name).ok_or_else(|| {
                    EvalError::UndefinedName {
                        name: name.to_string(),
                        location: self.location.clone(),
                    }
                })?
            }
        };

        let value = target
            .get_property(name)
            .map_err(|e| EvalError::from_object(e, &self.location))?;

        if flags.contains(EvalFlags::TRACK_DEPENDENCIES) {
            context.track_dependency(&target, name);
        }

        if flags.contains(EvalFlags::ENABLE_PUSH) {
            let property = Rc::clone(name);
            Ok(ValueHolder::with_push(value, move |new_value| {
                if let Err(error) = target.set_property(&property, new_value) {
                    warn!(%error, "pushed value was rejected by its target");
                }
            }))
        } else {
            Ok(ValueHolder::new(value))
        }
    }

    fn evaluate_signal(
        &self,
        context: &ExpressionContext,
        flags: EvalFlags,
        object: Option<&Expression>,
        signal: &Rc<str>,
        detail: Option<&str>,
        args: &[Expression],
    ) -> EvalResult<ValueHolder> {
        let target: ObjectRef = match object {
            Some(object_expr) => {
                let holder = object_expr.evaluate(context, flags.propagate())?;
                let Some(target) = holder.value().as_object().cloned() else {
                    return Err(EvalError::InvalidType {
                        message: format!(
                            "cannot emit a signal on type '{}'",
                            holder.value().value_type().name()
                        ),
                        location: object_expr.location.clone(),
                    });
                };
                target
            }
            // No scope declares the signal: the bare name itself failed
            // to resolve.
            None => context.find_object_with_signal(signal).ok_or_else(|| {
                EvalError::UndefinedName {
                    name: signal.to_string(),
                    location: self.location.clone(),
                }
            })?,
        };

        let spec = target
            .find_signal(signal)
            .ok_or_else(|| EvalError::UndefinedSignal {
                signal: signal.to_string(),
                location: self.location.clone(),
            })?;

        if detail.is_some() && !spec.detailed {
            return Err(EvalError::InvalidDetail {
                signal: signal.to_string(),
                reason: "does not take a detail",
                location: self.location.clone(),
            });
        }
        if detail.is_none() && spec.detailed {
            return Err(EvalError::InvalidDetail {
                signal: signal.to_string(),
                reason: "requires a detail",
                location: self.location.clone(),
            });
        }

        if let Some(params) = &spec.params {
            if args.len() != params.len() {
                return Err(EvalError::InvalidArgumentCount {
                    signal: signal.to_string(),
                    expected: params.len(),
                    found: args.len(),
                    location: self.location.clone(),
                });
            }
        }

        let mut call_args = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let holder = arg.evaluate(context, flags.propagate())?;
            let value = match spec.params.as_ref().and_then(|p| p.get(index)) {
                Some(param_type) => context
                    .parser()
                    .try_transform(holder.value(), param_type)
                    .map_err(|e| EvalError::InvalidType {
                        message: format!(
                            "cannot convert argument {} of '{}': {e}",
                            index + 1,
                            signal
                        ),
                        location: arg.location.clone(),
                    })?,
                None => holder.value().clone(),
            };
            call_args.push(value);
        }

        let result = target.signals().emit(signal, detail, &call_args);
        Ok(ValueHolder::new(result))
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Constant(value) => write!(f, "Constant({value:?})"),
            ExprKind::Property { object, name } => f
                .debug_struct("Property")
                .field("object", object)
                .field("name", name)
                .finish(),
            ExprKind::Signal {
                object,
                signal,
                detail,
                args,
            } => f
                .debug_struct("Signal")
                .field("object", object)
                .field("signal", signal)
                .field("detail", detail)
                .field("args", args)
                .finish(),
        }
    }
}
