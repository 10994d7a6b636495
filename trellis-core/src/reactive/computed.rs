//! Computed Values
//!
//! A [`Computed`] is a cached derived value that recomputes only when read
//! after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter is wrapped in a lazy subscriber. Nothing runs until the
//!    first read.
//!
//! 2. Reading while dirty runs the subscriber, caches the result and clears
//!    the flag. Reading while clean returns the cache.
//!
//! 3. When a dependency changes, the subscriber's scheduler only marks the
//!    value dirty and triggers the computed's own value key. The getter does
//!    not run.
//!
//! 4. Every read tracks the value key, so subscribers reading the computed
//!    are notified when it goes dirty and pull the fresh value themselves.
//!
//! A computed value that is never read again stays dirty and costs nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::effect::{subscribe, SubscribeOptions};
use super::runtime::{Key, Op, Runtime, TargetId, TargetKind};
use super::subscriber::Subscriber;

/// Cache state of a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed, or the value was never computed.
    Dirty,
}

struct ComputedInner<T: Clone + 'static> {
    id: TargetId,
    subscriber: Subscriber<T>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn invalidate(&self) {
        if !self.dirty.replace(true) {
            Runtime::trigger(self.id, TargetKind::Computed, Key::Value, Op::Set, None);
        }
    }
}

impl<T: Clone + 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.subscriber.stop();
        Runtime::forget_target(self.id);
    }
}

/// A lazily evaluated, cached derivation.
///
/// Clones share the same cache.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let subscriber = subscribe(
                getter,
                SubscribeOptions::new()
                    .lazy(true)
                    .scheduler(move |_: &Subscriber<T>| {
                        if let Some(inner) = weak.upgrade() {
                            inner.invalidate();
                        }
                    }),
            );

            ComputedInner {
                id: TargetId::new(),
                subscriber,
                value: RefCell::new(None),
                dirty: Cell::new(true),
            }
        });

        Self { inner }
    }

    /// The current value, recomputed first if dirty.
    pub fn value(&self) -> T {
        let cached = if self.inner.dirty.get() {
            None
        } else {
            self.inner.value.borrow().clone()
        };

        let value = match cached {
            Some(value) => value,
            None => {
                self.inner.dirty.set(false);
                let fresh = self.inner.subscriber.run();
                *self.inner.value.borrow_mut() = Some(fresh.clone());
                fresh
            }
        };

        Runtime::track(self.inner.id, Key::Value);
        value
    }

    pub fn state(&self) -> ComputedState {
        if self.inner.dirty.get() {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Store identity of this computed value.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.inner.subscriber.run_count()
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("cached", &self.inner.value.borrow())
            .finish()
    }
}

/// Shorthand for [`Computed::new`].
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;

    #[test]
    fn computed_is_lazy() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let c = computed(move || {
            counter.set(counter.get() + 1);
            7
        });

        assert_eq!(runs.get(), 0);
        assert_eq!(c.state(), ComputedState::Dirty);

        assert_eq!(c.value(), 7);
        assert_eq!(c.value(), 7);
        assert_eq!(runs.get(), 1);
        assert_eq!(c.state(), ComputedState::Clean);
    }

    #[test]
    fn invalidation_marks_dirty_without_recomputing() {
        let source = TargetId::new();
        let c = computed(move || {
            Runtime::track(source, Key::Value);
            1
        });
        c.value();
        assert_eq!(c.compute_count(), 1);

        Runtime::trigger(source, TargetKind::Computed, Key::Value, Op::Set, None);
        assert!(c.is_dirty());
        assert_eq!(c.compute_count(), 1);

        c.value();
        assert_eq!(c.compute_count(), 2);
    }

    #[test]
    fn readers_are_notified() {
        let source = TargetId::new();
        let c = computed(move || {
            Runtime::track(source, Key::Value);
            1
        });

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = c.clone();
        let _e = effect(move || {
            reader.value();
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        Runtime::trigger(source, TargetKind::Computed, Key::Value, Op::Set, None);
        assert_eq!(runs.get(), 2);
        assert_eq!(c.compute_count(), 2);
    }

    #[test]
    fn reader_keeps_computed_alive() {
        let c = computed(|| 1);
        let id = c.id();
        let _e = {
            let c = c.clone();
            effect(move || {
                c.value();
            })
        };
        assert!(Runtime::has_target(id));
        drop(c);
        assert!(Runtime::has_target(id));
    }

    #[test]
    fn dropping_detaches_from_sources() {
        let source = TargetId::new();
        let c = computed(move || {
            Runtime::track(source, Key::Value);
            1
        });
        c.value();
        assert_eq!(Runtime::subscriber_count(source, &Key::Value), 1);

        drop(c);
        assert_eq!(Runtime::subscriber_count(source, &Key::Value), 0);
    }
}
