//! Trellis Core
//!
//! This crate provides the reactive engine behind the Trellis renderer. It
//! implements:
//!
//! - Instrumented containers that record reads and trigger on writes
//! - Subscribers, effects, computed values and watchers
//! - A batching job scheduler
//!
//! The renderer is a consumer: it subscribes one body per render pass, reads
//! reactive state inside it, and is re-run when that state changes.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: raw containers and the values they hold
//! - `container`: instrumented wrappers over raw containers
//! - `reactive`: subscription store, subscribers, computed values, watchers
//! - `scheduler`: deduplicating job queue and flush drivers
//! - `config` and `diagnostics`: per-thread configuration and warnings
//!
//! All engine state is thread-local. Values are `Rc`-based and stay on the
//! thread that created them.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{computed, effect, reactive, RawRef};
//!
//! let state = reactive(&RawRef::record_from([("count", 1)]));
//!
//! let doubled = {
//!     let state = state.clone();
//!     computed(move || state.get("count").as_f64().unwrap_or(0.0) * 2.0)
//! };
//!
//! let _log = {
//!     let doubled = doubled.clone();
//!     effect(move || println!("doubled: {}", doubled.value()))
//! };
//!
//! state.set("count", 5);
//! // Effect re-runs, prints: "doubled: 10"
//! ```

pub mod config;
pub mod container;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use container::{
    reactive, readonly, shallow_reactive, shallow_readonly, to_raw, traverse, Mode, Reactive,
};
pub use error::{ReactiveError, Result};
pub use reactive::{
    computed, effect, subscribe, untracked, watch, Computed, Flush, OnInvalidate,
    SubscribeOptions, Subscriber, WatchHandle, WatchOptions, WatchSource,
};
pub use value::{has_changed, MapKey, RawKind, RawRef, Snapshot, Value};
