//! Effects
//!
//! [`subscribe`] is the single entry point for creating a subscriber. An
//! effect is a subscriber created with default options: it runs once right
//! away to discover its dependencies, then again synchronously whenever one
//! of them changes.
//!
//! # Options
//!
//! - `lazy`: create the subscriber without running it. Computed values and
//!   watchers start lazy and decide themselves when to run.
//! - `scheduler`: called with the subscriber instead of re-running it. Use
//!   [`crate::scheduler::queue_subscriber`] to batch re-runs until the next
//!   flush.
//!
//! ```rust,ignore
//! let state = reactive(&RawRef::record_from([("count", 0)]));
//!
//! let render = {
//!     let state = state.clone();
//!     subscribe(
//!         move || println!("count is {:?}", state.get("count")),
//!         SubscribeOptions::new().scheduler(queue_subscriber),
//!     )
//! };
//!
//! state.set("count", 1);
//! state.set("count", 2);
//! flush_jobs()?; // prints once: "count is 2"
//! ```

use std::fmt;
use std::rc::Rc;

use super::subscriber::{SchedulerFn, Subscriber};

/// Options accepted by [`subscribe`].
pub struct SubscribeOptions<T: 'static> {
    lazy: bool,
    scheduler: Option<SchedulerFn<T>>,
}

impl<T: 'static> SubscribeOptions<T> {
    pub fn new() -> Self {
        Self {
            lazy: false,
            scheduler: None,
        }
    }

    /// Skip the initial run.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Hand re-runs to `scheduler` instead of running synchronously.
    pub fn scheduler(mut self, scheduler: impl Fn(&Subscriber<T>) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }
}

impl<T: 'static> Default for SubscribeOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for SubscribeOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// Create a subscriber for `body`, running it once unless it is lazy.
pub fn subscribe<T, F>(body: F, options: SubscribeOptions<T>) -> Subscriber<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    let subscriber = Subscriber::new(Box::new(body), options.scheduler);
    if !options.lazy {
        subscriber.run();
    }
    subscriber
}

/// Run `body` now and again whenever anything it read changes.
pub fn effect<F>(body: F) -> Subscriber<()>
where
    F: Fn() + 'static,
{
    subscribe(body, SubscribeOptions::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn effect_runs_immediately() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let sub = effect(move || counter.set(counter.get() + 1));
        assert_eq!(runs.get(), 1);
        assert_eq!(sub.run_count(), 1);
    }

    #[test]
    fn lazy_subscriber_waits() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let sub = subscribe(
            move || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            SubscribeOptions::new().lazy(true),
        );
        assert_eq!(runs.get(), 0);
        assert_eq!(sub.run(), 1);
    }

    #[test]
    fn options_builder() {
        let options = SubscribeOptions::<()>::new().lazy(true).scheduler(|_| {});
        assert!(options.is_lazy());
        assert!(options.has_scheduler());
        assert!(!SubscribeOptions::<()>::default().has_scheduler());
    }
}
