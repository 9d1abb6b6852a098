#![forbid(unsafe_code)]

//! Bindings tie a named target slot to a sequence of literal text and
//! embedded expressions.
//!
//! Binding text embeds expressions in brackets: `[expr]` evaluates one
//! way, `{expr}` is bidirectional. Everything outside brackets is
//! literal. There is no escape syntax for a literal bracket; text that
//! needs one can embed it as a string constant (`['[']`).
//!
//! # Invariants
//!
//! 1. **Classification is fixed at build time** and depends only on the
//!    segment shapes, never on evaluation results.
//!
//! 2. **Only a two-way binding can push, and a two-way result always
//!    can.** Evaluating any other kind with [`EvalFlags::ENABLE_PUSH`]
//!    fails with [`EvalError::NonBidirectional`] before touching any
//!    scope, and a two-way evaluation whose result has no write route
//!    fails the same way instead of degrading to one-way.
//!
//! 3. **Compound composition is string concatenation**: every expression
//!    segment must render as text, and a segment value with no text form
//!    fails the whole evaluation.

use std::rc::Rc;

use graft_core::holder::ValueHolder;
use graft_core::value::{Value, ValueType};
use graft_core::SourceLocation;
use memchr::memchr2;
use smallvec::SmallVec;

use crate::context::ExpressionContext;
use crate::error::{EvalError, EvalResult, ParseError};
use crate::expression::{EvalFlags, Expression};
use crate::parser::parse_expression;

/// How a binding relates its target to its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Literals and constant expressions only; the value can never change.
    Constant,
    /// Exactly one live expression, read-only.
    OneWay,
    /// Exactly one live expression that also accepts pushed values.
    TwoWay,
    /// Multiple segments stitched into a string.
    Compound,
}

#[derive(Debug)]
enum Segment {
    Literal(Rc<str>),
    Expr {
        expression: Expression,
        bidirectional: bool,
    },
}

/// Most bindings are a lone expression or literal; two slots cover the
/// common `text [expr]` shape without spilling.
type SegmentList = SmallVec<[Segment; 2]>;

/// An immutable, classified binding.
#[derive(Debug)]
pub struct Binding {
    target: Rc<str>,
    location: SourceLocation,
    segments: SegmentList,
    kind: BindingKind,
}

/// Assembles a [`Binding`] segment by segment.
///
/// Consecutive literal chunks merge into a single segment.
#[derive(Debug)]
pub struct BindingBuilder {
    target: Rc<str>,
    location: SourceLocation,
    pending: String,
    segments: SegmentList,
}

impl BindingBuilder {
    #[must_use]
    pub fn new(target: &str, location: &SourceLocation) -> Self {
        Self {
            target: Rc::from(target),
            location: location.clone(),
            pending: String::new(),
            segments: SegmentList::new(),
        }
    }

    pub fn add_literal(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    pub fn add_expression(&mut self, expression: Expression, bidirectional: bool) {
        self.flush_pending();
        self.segments.push(Segment::Expr {
            expression,
            bidirectional,
        });
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            let text = std::mem::take(&mut self.pending);
            self.segments.push(Segment::Literal(Rc::from(text)));
        }
    }

    #[must_use]
    pub fn build(mut self) -> Binding {
        self.flush_pending();
        let kind = classify(&self.segments);
        Binding {
            target: self.target,
            location: self.location,
            segments: self.segments,
            kind,
        }
    }
}

fn classify(segments: &[Segment]) -> BindingKind {
    let constant = segments.iter().all(|segment| match segment {
        Segment::Literal(_) => true,
        Segment::Expr { expression, .. } => expression.is_constant(),
    });
    if constant {
        return BindingKind::Constant;
    }
    match segments {
        [Segment::Expr {
            bidirectional: true,
            ..
        }] => BindingKind::TwoWay,
        [Segment::Expr { .. }] => BindingKind::OneWay,
        _ => BindingKind::Compound,
    }
}

impl Binding {
    /// Scan `text` into literal and expression segments.
    ///
    /// `location` is where `text` begins in its source; expression
    /// locations and error positions are derived from it.
    pub fn parse(
        target: &str,
        text: &str,
        location: &SourceLocation,
    ) -> Result<Binding, ParseError> {
        let mut builder = BindingBuilder::new(target, location);
        let bytes = text.as_bytes();
        let mut pos = 0;
        let mut line = 0;
        let mut col = 0;
        while pos < bytes.len() {
            let Some(rel) = memchr2(b'{', b'[', &bytes[pos..]) else {
                builder.add_literal(&text[pos..]);
                break;
            };
            let open = pos + rel;
            if open > pos {
                builder.add_literal(&text[pos..open]);
                advance(&text[pos..open], &mut line, &mut col);
            }
            let open_location = location.offset(line, col);
            let bidirectional = bytes[open] == b'{';
            let close = if bidirectional { '}' } else { ']' };
            col += 1;
            let inner_start = open + 1;
            let Some(rel_end) = find_span_end(&text[inner_start..], close) else {
                return Err(ParseError::UnterminatedExpression {
                    location: open_location,
                });
            };
            let inner = &text[inner_start..inner_start + rel_end];
            let expression = parse_expression(inner, &location.offset(line, col))?;
            builder.add_expression(expression, bidirectional);
            advance(inner, &mut line, &mut col);
            col += 1;
            pos = inner_start + rel_end + 1;
        }
        Ok(builder.build())
    }

    /// The name of the slot this binding fills.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    #[must_use]
    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// Whether evaluation can never observe live state.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.kind == BindingKind::Constant
    }

    /// Evaluate against `context`, optionally coercing the result to
    /// `expected_type` through the context's value parsers.
    pub fn evaluate(
        &self,
        context: &ExpressionContext,
        flags: EvalFlags,
        expected_type: Option<&ValueType>,
    ) -> EvalResult<ValueHolder> {
        if flags.contains(EvalFlags::ENABLE_PUSH) && self.kind != BindingKind::TwoWay {
            return Err(EvalError::NonBidirectional {
                location: self.location.clone(),
            });
        }

        let holder = match self.segments.as_slice() {
            [] => ValueHolder::new(Value::str("")),
            [Segment::Literal(text)] => ValueHolder::new(Value::Str(Rc::clone(text))),
            [Segment::Expr { expression, .. }] => expression.evaluate(context, flags)?,
            segments => {
                let mut combined = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => combined.push_str(text),
                        Segment::Expr { expression, .. } => {
                            let holder = expression.evaluate(context, flags.propagate())?;
                            let rendered = context
                                .parser()
                                .try_transform(holder.value(), &ValueType::Str)
                                .map_err(|e| EvalError::InvalidType {
                                    message: e.to_string(),
                                    location: expression.location().clone(),
                                })?;
                            combined.push_str(&rendered.to_string());
                        }
                    }
                }
                ValueHolder::new(Value::from(combined))
            }
        };

        let holder = match expected_type {
            None => holder,
            Some(target) if holder.value().value_type() == *target => holder,
            Some(target) => {
                let coerced = context
                    .parser()
                    .try_transform(holder.value(), target)
                    .map_err(|e| EvalError::InvalidType {
                        message: e.to_string(),
                        location: self.location.clone(),
                    })?;
                holder.with_value(coerced)
            }
        };

        // A two-way evaluation must end pushable; a source with no write
        // route (an overlay name, a lost route in transform) is rejected,
        // never quietly degraded to one-way.
        if flags.contains(EvalFlags::ENABLE_PUSH) && !holder.can_push() {
            return Err(EvalError::NonBidirectional {
                location: self.location.clone(),
            });
        }
        Ok(holder)
    }
}

fn advance(text: &str, line: &mut u32, col: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            *line += 1;
            *col = 0;
        } else {
            *col += 1;
        }
    }
}

/// Index of the first unquoted `close` in `text`, honoring backslash
/// escapes inside quoted strings.
fn find_span_end(text: &str, close: char) -> Option<usize> {
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match in_string {
            Some(quote) => {
                if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    in_string = None;
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    in_string = Some(c);
                } else if c == close {
                    return Some(index);
                }
            }
        }
    }
    None
}
