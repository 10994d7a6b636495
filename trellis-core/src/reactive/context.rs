//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently running, so a
//! read performed during its body can be attributed to it.
//!
//! # Implementation
//!
//! A thread-local stack holds the running subscribers. Running a subscriber
//! pushes it for the duration of its body and pops it afterwards, restoring
//! the previous top. Nested subscribers therefore never leak their reads into
//! the enclosing one.
//!
//! A second thread-local flag can pause tracking altogether. Sequence
//! mutators run with tracking paused so their internal length checks do not
//! create dependencies. Entering a subscriber turns tracking back on for its
//! body, and the guard restores the caller's flag on exit.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::subscriber::{Dispatch, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
    static SHOULD_TRACK: Cell<bool> = Cell::new(true);
}

struct ContextEntry {
    subscriber_id: SubscriberId,
    subscriber: Rc<dyn Dispatch>,
}

/// Guard that pops the context when dropped.
///
/// The stack stays balanced even if the subscriber body panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
    previous_should_track: bool,
}

impl ReactiveContext {
    /// Make `subscriber` the active subscriber until the guard is dropped.
    pub(crate) fn enter(subscriber: Rc<dyn Dispatch>) -> Self {
        let subscriber_id = subscriber.id();
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                subscriber,
            });
        });
        let previous_should_track = SHOULD_TRACK.with(|flag| flag.replace(true));

        Self {
            subscriber_id,
            previous_should_track,
        }
    }

    /// Check if a subscriber is running.
    pub fn is_active() -> bool {
        CONTEXT_STACK
            .try_with(|stack| !stack.borrow().is_empty())
            .unwrap_or(false)
    }

    /// Id of the running subscriber, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
            .ok()
            .flatten()
    }

    pub(crate) fn current() -> Option<Rc<dyn Dispatch>> {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().map(|entry| entry.subscriber.clone()))
            .ok()
            .flatten()
    }

    /// Whether reads are currently being recorded.
    pub fn should_track() -> bool {
        SHOULD_TRACK.try_with(Cell::get).unwrap_or(false)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let _ = SHOULD_TRACK.try_with(|flag| flag.set(self.previous_should_track));
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

/// Guard that pauses tracking until dropped.
pub struct TrackingPause {
    previous: bool,
}

impl TrackingPause {
    pub fn new() -> Self {
        let previous = SHOULD_TRACK.with(|flag| flag.replace(false));
        Self { previous }
    }
}

impl Default for TrackingPause {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        let _ = SHOULD_TRACK.try_with(|flag| flag.set(self.previous));
    }
}

/// Run `f` without recording any reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = TrackingPause::new();
    f()
}
