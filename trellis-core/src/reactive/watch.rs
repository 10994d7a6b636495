//! Watchers
//!
//! A watcher observes a source and calls back with the new and previous
//! value each time the source is triggered.
//!
//! # How Watchers Work
//!
//! 1. The source becomes a getter. A getter source is used as is. A
//!    container source is deep-traversed so every nested field is tracked.
//!    A computed source reads its value.
//!
//! 2. The getter runs inside a lazy subscriber. Its scheduler runs the
//!    watcher job, either synchronously or through the job queue depending
//!    on [`Flush`].
//!
//! 3. The job fires the invalidation callback registered by the previous
//!    callback invocation, re-runs the getter, calls the callback with
//!    `(new, old)` and keeps a [`Snapshot`] of the new value as the next
//!    `old`.
//!
//! 4. Without `immediate`, setup runs the getter once to record the initial
//!    dependencies and `old` value without calling back.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::computed::Computed;
use super::effect::{subscribe, SubscribeOptions};
use super::subscriber::Subscriber;
use crate::container::{traverse, Reactive};
use crate::scheduler::{self, Job, JobId};
use crate::value::{Snapshot, Value};

/// When a triggered watcher runs its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    /// Inline, before the triggering write returns.
    #[default]
    Sync,
    /// In the `pre` lane of the next job flush.
    Pre,
    /// In the `post` lane of the next job flush.
    Post,
}

/// Options accepted by [`watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchOptions {
    /// Call back once during setup, with no previous value.
    pub immediate: bool,
    pub flush: Flush,
}

impl WatchOptions {
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }
}

/// Something a watcher can observe.
pub struct WatchSource<T: 'static> {
    getter: Box<dyn Fn() -> T>,
}

impl<T: 'static> WatchSource<T> {
    /// Watch an arbitrary derived expression.
    pub fn getter(getter: impl Fn() -> T + 'static) -> Self {
        Self {
            getter: Box::new(getter),
        }
    }
}

/// Watch every field reachable from the container.
impl From<Reactive> for WatchSource<Value> {
    fn from(source: Reactive) -> Self {
        Self::getter(move || {
            let value = Value::Reactive(source.clone());
            traverse(&value);
            value
        })
    }
}

impl From<&Reactive> for WatchSource<Value> {
    fn from(source: &Reactive) -> Self {
        source.clone().into()
    }
}

impl<T: Clone + 'static> From<Computed<T>> for WatchSource<T> {
    fn from(source: Computed<T>) -> Self {
        Self::getter(move || source.value())
    }
}

impl<T: Clone + 'static> From<&Computed<T>> for WatchSource<T> {
    fn from(source: &Computed<T>) -> Self {
        source.clone().into()
    }
}

/// Lets a callback register cleanup for work it started.
///
/// The registered function runs before the next callback invocation, or when
/// the watcher is stopped, whichever comes first.
#[derive(Clone, Default)]
pub struct OnInvalidate {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnInvalidate {
    /// Replace any previously registered function.
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }

    fn fire(&self) {
        let pending = self.slot.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("pending", &self.slot.borrow().is_some())
            .finish()
    }
}

type Callback<T> = Box<dyn Fn(&T, Option<&T>, &OnInvalidate)>;

struct WatchState<T: 'static> {
    old: RefCell<Option<T>>,
    invalidate: OnInvalidate,
    callback: Callback<T>,
}

impl<T: Snapshot + 'static> WatchState<T> {
    fn run_job(&self, subscriber: &Subscriber<T>) {
        if !subscriber.is_active() {
            return;
        }

        self.invalidate.fire();
        let new = subscriber.run();
        let old = self.old.borrow_mut().take();
        (self.callback)(&new, old.as_ref(), &self.invalidate);
        *self.old.borrow_mut() = Some(new.snapshot());
    }
}

/// Handle to a running watcher.
///
/// Dropping the handle does not stop the watcher.
pub struct WatchHandle<T: 'static> {
    subscriber: Subscriber<T>,
    state: Rc<WatchState<T>>,
}

impl<T: 'static> WatchHandle<T> {
    /// Stop watching and fire any pending invalidation callback.
    pub fn stop(&self) {
        self.subscriber.stop();
        self.state.invalidate.fire();
    }

    pub fn is_active(&self) -> bool {
        self.subscriber.is_active()
    }
}

impl<T: 'static> fmt::Debug for WatchHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

/// Call `callback(new, old, on_invalidate)` whenever `source` is triggered.
///
/// `old` is `None` only on the `immediate` setup call.
pub fn watch<T, S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle<T>
where
    T: Snapshot + 'static,
    S: Into<WatchSource<T>>,
    C: Fn(&T, Option<&T>, &OnInvalidate) + 'static,
{
    let WatchSource { getter } = source.into();
    let state = Rc::new(WatchState {
        old: RefCell::new(None),
        invalidate: OnInvalidate::default(),
        callback: Box::new(callback),
    });

    let job_state = state.clone();
    let flush = options.flush;
    let scheduler = move |subscriber: &Subscriber<T>| match flush {
        Flush::Sync => job_state.run_job(subscriber),
        Flush::Pre | Flush::Post => {
            let (state, subscriber) = (job_state.clone(), subscriber.clone());
            let job = Job::with_id(JobId::Subscriber(subscriber.id()), move || {
                state.run_job(&subscriber)
            });
            if flush == Flush::Pre {
                scheduler::queue_pre_flush(job);
            } else {
                scheduler::queue_post_flush(job);
            }
        }
    };

    let subscriber = subscribe(
        getter,
        SubscribeOptions::new().lazy(true).scheduler(scheduler),
    );

    if options.immediate {
        state.run_job(&subscriber);
    } else {
        let initial = subscriber.run();
        *state.old.borrow_mut() = Some(initial.snapshot());
    }

    WatchHandle { subscriber, state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Key, Op, Runtime, TargetId, TargetKind};
    use std::cell::Cell;

    fn bump(target: TargetId) {
        Runtime::trigger(target, TargetKind::Computed, Key::Value, Op::Set, None);
    }

    #[test]
    fn sync_watch_sees_old_and_new() {
        let target = TargetId::new();
        let source = Rc::new(Cell::new(1));
        let getter_source = source.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();

        let _handle = watch(
            WatchSource::getter(move || {
                Runtime::track(target, Key::Value);
                getter_source.get()
            }),
            move |new: &i32, old: Option<&i32>, _: &OnInvalidate| {
                log.borrow_mut().push((*new, old.copied()))
            },
            WatchOptions::default(),
        );
        assert!(seen.borrow().is_empty());

        source.set(2);
        bump(target);
        source.set(5);
        bump(target);

        assert_eq!(*seen.borrow(), vec![(2, Some(1)), (5, Some(2))]);
    }

    #[test]
    fn immediate_calls_back_without_old() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let _handle = watch(
            WatchSource::getter(|| 3),
            move |new: &i32, old: Option<&i32>, _: &OnInvalidate| {
                log.borrow_mut().push((*new, old.copied()))
            },
            WatchOptions::default().immediate(true),
        );
        assert_eq!(*seen.borrow(), vec![(3, None)]);
    }

    #[test]
    fn invalidation_runs_before_next_callback() {
        let target = TargetId::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();

        let handle = watch(
            WatchSource::getter(move || Runtime::track(target, Key::Value)),
            move |_: &(), _: Option<&()>, on_invalidate: &OnInvalidate| {
                log.borrow_mut().push("callback");
                let log = log.clone();
                on_invalidate.register(move || log.borrow_mut().push("invalidate"));
            },
            WatchOptions::default(),
        );

        bump(target);
        bump(target);
        assert_eq!(*events.borrow(), vec!["callback", "invalidate", "callback"]);

        handle.stop();
        assert_eq!(
            *events.borrow(),
            vec!["callback", "invalidate", "callback", "invalidate"]
        );

        bump(target);
        assert_eq!(events.borrow().len(), 4);
    }

    #[test]
    fn post_flush_defers_callback() {
        let target = TargetId::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();

        let _handle = watch(
            WatchSource::getter(move || Runtime::track(target, Key::Value)),
            move |_: &(), _: Option<&()>, _: &OnInvalidate| counter.set(counter.get() + 1),
            WatchOptions::default().flush(Flush::Post),
        );

        bump(target);
        bump(target);
        assert_eq!(calls.get(), 0);

        scheduler::flush_jobs().unwrap();
        assert_eq!(calls.get(), 1);
    }
}
