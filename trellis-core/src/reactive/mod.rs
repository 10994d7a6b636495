//! Reactive Primitives
//!
//! This module implements the engine: the subscription store, subscribers,
//! effects, computed values and watchers.
//!
//! # Concepts
//!
//! ## Subscribers
//!
//! A [`Subscriber`] is a re-runnable body. While it runs, every tracked read
//! records the pair `(target, key)` it read, so a later write to that pair
//! can re-run it. Subscribers are created with [`subscribe`] or [`effect`].
//!
//! ## Computed Values
//!
//! A [`Computed`] caches a derivation. It recomputes only when read after a
//! dependency changed, and is itself a trackable source.
//!
//! ## Watchers
//!
//! A watcher ([`watch`]) calls back with the new and previous value of a
//! source whenever the source is triggered, synchronously or through the job
//! queue.
//!
//! # Implementation Notes
//!
//! All state is thread-local and single-threaded. Dependency sets hold their
//! subscribers strongly and subscribers hold their dependency sets weakly, so
//! a subscriber lives while it is subscribed to something and a dependency
//! set lives while its target does.

mod computed;
mod context;
mod effect;
mod runtime;
mod subscriber;
mod watch;

pub use computed::{computed, Computed, ComputedState};
pub use context::{untracked, ReactiveContext, TrackingPause};
pub use effect::{effect, subscribe, SubscribeOptions};
pub use runtime::{Key, Op, Runtime, TargetId, TargetKind};
pub use subscriber::{SchedulerFn, Subscriber, SubscriberId};
pub use watch::{watch, Flush, OnInvalidate, WatchHandle, WatchOptions, WatchSource};
