#![forbid(unsafe_code)]

//! Keeping an inflated tree in sync with its data, automatically.
//!
//! A [`ReactiveInflator`] pairs an [`Inflator`] with one target and one
//! fragment, subscribes to the context's `changed` hook, and re-runs a
//! full dependency-tracked inflation pass whenever anything a binding
//! read has mutated. Because passes are value-diffed all the way down,
//! a re-run only touches what actually changed.
//!
//! # Invariants
//!
//! 1. **Stale watches never fire**: every pass starts by resetting the
//!    context's dependencies, so only the latest pass's subscriptions
//!    are live.
//!
//! 2. **Re-entrant changes coalesce**: a `changed` emission arriving
//!    while a pass runs (a binding writing a property another binding
//!    watches) is deferred into exactly one follow-up pass, not a
//!    recursive one.
//!
//! 3. **Dropping the handle stops the loop**: the `changed` subscription
//!    is owned by the [`ReactiveInflator`]; the inflated tree stays up
//!    but no longer follows its data.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use graft_core::ObjectRef;
use graft_expr::ContextGuard;
use tracing::error;

use crate::fragment::Fragment;
use crate::inflator::{InflationFlags, Inflator};

/// Passes a single external change may fan out into before the loop
/// declares the data unsettled.
const FOLLOW_UP_LIMIT: u32 = 8;

struct ReactiveState {
    inflator: Inflator,
    fragment: RefCell<Rc<Fragment>>,
    target: ObjectRef,
    inflating: Cell<bool>,
    pending: Cell<bool>,
}

impl ReactiveState {
    fn inflate(&self) {
        if self.inflating.get() {
            self.pending.set(true);
            return;
        }
        self.inflating.set(true);
        let mut follow_ups = 0;
        loop {
            self.inflator.context().reset_dependencies();
            let fragment = Rc::clone(&self.fragment.borrow());
            self.inflator.inflate_existing_target(
                &self.target,
                &fragment,
                InflationFlags::TRACK_DEPENDENCIES,
            );
            if !self.pending.replace(false) {
                break;
            }
            follow_ups += 1;
            if follow_ups > FOLLOW_UP_LIMIT {
                error!("reactive inflation did not settle; a binding keeps invalidating itself");
                break;
            }
        }
        self.inflating.set(false);
    }
}

/// An inflator that re-inflates on its own whenever tracked data
/// changes.
pub struct ReactiveInflator {
    state: Rc<ReactiveState>,
    _changed: ContextGuard,
}

impl ReactiveInflator {
    /// A reactive inflator whose context resolves names against `target`
    /// itself.
    #[must_use]
    pub fn new(fragment: Rc<Fragment>, target: ObjectRef) -> Self {
        let inflator = Inflator::with_scope(Rc::clone(&target));
        Self::with_inflator(inflator, fragment, target)
    }

    /// A reactive inflator over a pre-configured [`Inflator`]; use this
    /// to register directives or extra scopes first.
    #[must_use]
    pub fn with_inflator(inflator: Inflator, fragment: Rc<Fragment>, target: ObjectRef) -> Self {
        let state = Rc::new(ReactiveState {
            inflator,
            fragment: RefCell::new(fragment),
            target,
            inflating: Cell::new(false),
            pending: Cell::new(false),
        });
        let weak = Rc::downgrade(&state);
        let changed = state.inflator.context().connect_changed(move || {
            if let Some(state) = weak.upgrade() {
                state.inflate();
            }
        });
        Self {
            state,
            _changed: changed,
        }
    }

    #[must_use]
    pub fn inflator(&self) -> &Inflator {
        &self.state.inflator
    }

    #[must_use]
    pub fn fragment(&self) -> Rc<Fragment> {
        Rc::clone(&self.state.fragment.borrow())
    }

    #[must_use]
    pub fn target(&self) -> &ObjectRef {
        &self.state.target
    }

    /// Run a pass now. Called once after construction to realize the
    /// initial tree; afterwards passes run on their own.
    pub fn inflate(&self) {
        self.state.inflate();
    }

    /// Swap in a new fragment (hot reload) and re-inflate immediately.
    /// Targets whose fragments persist keep their state.
    pub fn change_fragment_and_inflate(&self, fragment: Rc<Fragment>) {
        *self.state.fragment.borrow_mut() = fragment;
        self.inflate();
    }
}
