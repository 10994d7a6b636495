//! Subscriber types for the reactive system.
//!
//! A [`Subscriber`] is a re-runnable body whose reads are tracked. Effects,
//! computed values, watchers and render passes are all subscribers.
//!
//! # Lifecycle
//!
//! Each run first detaches the subscriber from every dependency set it joined
//! last time, then runs the body with the subscriber active so the body's
//! reads re-populate its dependencies. Conditional reads therefore only ever
//! subscribe to the branch that actually ran.
//!
//! When a dependency changes the subscriber is dispatched: its scheduler is
//! called if it has one, otherwise it runs synchronously.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use crate::scheduler::{Job, JobId};

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribers interested in one `(target, key)` pair, in insertion order.
pub(crate) type DepSet = Rc<RefCell<IndexMap<SubscriberId, Rc<dyn Dispatch>>>>;

/// Type-erased view of a subscriber, as stored in dependency sets.
pub(crate) trait Dispatch {
    fn id(&self) -> SubscriberId;

    /// React to a change in one of the dependencies.
    fn dispatch(self: Rc<Self>);

    /// Remember that this subscriber joined `deps`.
    fn record_dependency(&self, deps: &DepSet);
}

/// Called in place of a synchronous re-run when a dependency changes.
pub type SchedulerFn<T> = Rc<dyn Fn(&Subscriber<T>)>;

struct SubscriberInner<T: 'static> {
    id: SubscriberId,
    body: Box<dyn Fn() -> T>,
    scheduler: Option<SchedulerFn<T>>,
    deps: RefCell<SmallVec<[Weak<RefCell<IndexMap<SubscriberId, Rc<dyn Dispatch>>>>; 4]>>,
    active: Cell<bool>,
    run_count: Cell<usize>,
}

impl<T: 'static> SubscriberInner<T> {
    fn cleanup(&self) {
        let deps: SmallVec<[_; 4]> = self.deps.borrow_mut().drain(..).collect();
        for set in deps.iter().filter_map(Weak::upgrade) {
            set.borrow_mut().shift_remove(&self.id);
        }
    }
}

impl<T: 'static> Dispatch for SubscriberInner<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn dispatch(self: Rc<Self>) {
        let subscriber = Subscriber { inner: self };
        match subscriber.inner.scheduler.clone() {
            Some(scheduler) => scheduler(&subscriber),
            None => {
                subscriber.run();
            }
        }
    }

    fn record_dependency(&self, deps: &DepSet) {
        self.deps.borrow_mut().push(Rc::downgrade(deps));
    }
}

/// Handle to a re-runnable tracked computation.
///
/// Cloning the handle does not clone the subscriber. Dependency sets hold the
/// subscriber strongly, so it stays alive while it is subscribed to anything;
/// call [`Subscriber::stop`] to detach it for good.
pub struct Subscriber<T: 'static> {
    inner: Rc<SubscriberInner<T>>,
}

impl<T: 'static> Subscriber<T> {
    pub(crate) fn new(body: Box<dyn Fn() -> T>, scheduler: Option<SchedulerFn<T>>) -> Self {
        Self {
            inner: Rc::new(SubscriberInner {
                id: SubscriberId::new(),
                body,
                scheduler,
                deps: RefCell::new(SmallVec::new()),
                active: Cell::new(true),
                run_count: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the body with fresh dependency tracking and return its result.
    ///
    /// A stopped subscriber still runs its body, but records nothing.
    pub fn run(&self) -> T {
        if !self.inner.active.get() {
            return (self.inner.body)();
        }

        self.inner.cleanup();
        let _ctx = ReactiveContext::enter(self.inner.clone());
        self.inner.run_count.set(self.inner.run_count.get() + 1);
        (self.inner.body)()
    }

    /// Detach from every dependency and never be dispatched again.
    pub fn stop(&self) {
        if self.inner.active.replace(false) {
            self.inner.cleanup();
            tracing::trace!(subscriber = ?self.inner.id, "subscriber stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of dependency sets this subscriber currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter(|set| set.strong_count() > 0)
            .count()
    }

    /// A job that re-runs this subscriber if it is still active.
    ///
    /// Jobs for the same subscriber share a [`JobId`], so queueing it twice
    /// before a flush runs it once.
    pub fn job(&self) -> Job {
        let subscriber = self.clone();
        Job::with_id(JobId::Subscriber(self.id()), move || {
            if subscriber.is_active() {
                subscriber.run();
            }
        })
    }
}

impl<T: 'static> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.inner.id)
            .field("active", &self.inner.active.get())
            .field("run_count", &self.inner.run_count.get())
            .finish()
    }
}
