//! Reactive Runtime
//!
//! The runtime owns the subscription store: for every tracked target, a map
//! from key to the subscribers that read that key.
//!
//! # How It Works
//!
//! 1. A tracked read calls [`Runtime::track`], which adds the active
//!    subscriber to the dependency set of `(target, key)` and tells the
//!    subscriber about the set so it can leave it on its next run.
//!
//! 2. A write calls [`Runtime::trigger`], which collects the subscribers to
//!    notify:
//!    a. dependants of the key itself
//!    b. dependants of the iteration key, when the key set changed (and on
//!       any map write, since map iteration yields values)
//!    c. dependants of the map-key-iteration key, when a map's key set changed
//!    d. dependants of `length`, when a sequence grew
//!    e. dependants of every index at or past the new length, when a
//!       sequence's length was set
//!
//!    The running subscriber is never notified about its own writes.
//!
//! 3. The collected subscribers are dispatched in insertion order, after the
//!    store borrow has been released.
//!
//! # Lifetime
//!
//! Targets are identified by [`TargetId`]. When a raw container is dropped it
//! calls [`Runtime::forget_target`], so the store never outlives the data it
//! describes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::subscriber::{DepSet, Dispatch, SubscriberId};
use crate::value::{EntryKey, RawKind};

/// Identity of a tracked target: a raw container or a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// A tracked key within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A record field.
    Field(Rc<str>),
    /// A sequence index.
    Index(usize),
    /// A sequence's length.
    Length,
    /// A map entry or set element.
    Entry(EntryKey),
    /// Whole-container enumeration.
    Iterate,
    /// Enumeration of a map's keys only.
    MapKeyIterate,
    /// A computed value's cached result.
    Value,
}

/// The kind of mutation being triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// An existing key changed value.
    Set,
    /// A new key appeared.
    Add,
    /// A key was removed.
    Delete,
    /// Every key was removed.
    Clear,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Set => "set",
            Op::Add => "add",
            Op::Delete => "delete",
            Op::Clear => "clear",
        })
    }
}

/// Shape of a target, which decides the synthetic keys a trigger reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Record,
    Sequence,
    Map,
    Set,
    Computed,
}

impl From<RawKind> for TargetKind {
    fn from(kind: RawKind) -> Self {
        match kind {
            RawKind::Record => TargetKind::Record,
            RawKind::Sequence => TargetKind::Sequence,
            RawKind::Map => TargetKind::Map,
            RawKind::Set => TargetKind::Set,
        }
    }
}

#[derive(Default)]
struct TargetDeps {
    keys: IndexMap<Key, DepSet>,
}

thread_local! {
    static STORE: RefCell<HashMap<TargetId, TargetDeps>> = RefCell::new(HashMap::new());
    static PENDING_FORGET: RefCell<Vec<TargetId>> = RefCell::new(Vec::new());
}

/// Facade over the thread's subscription store.
pub struct Runtime;

impl Runtime {
    /// Record that the active subscriber read `key` on `target`.
    ///
    /// Does nothing outside a subscriber or while tracking is paused.
    pub fn track(target: TargetId, key: Key) {
        if !ReactiveContext::should_track() {
            return;
        }
        let Some(active) = ReactiveContext::current() else {
            return;
        };
        Self::purge_pending();

        let deps = STORE.with(|store| {
            store
                .borrow_mut()
                .entry(target)
                .or_default()
                .keys
                .entry(key.clone())
                .or_default()
                .clone()
        });

        let inserted = deps
            .borrow_mut()
            .insert(active.id(), active.clone())
            .is_none();
        if inserted {
            active.record_dependency(&deps);
            tracing::trace!(?target, ?key, subscriber = ?active.id(), "track");
        }
    }

    /// Notify the dependants of a write to `key` on `target`.
    ///
    /// `new_len` is the new length when a sequence's length is set.
    pub fn trigger(target: TargetId, kind: TargetKind, key: Key, op: Op, new_len: Option<usize>) {
        let active = ReactiveContext::current_subscriber();
        let mut to_run: IndexMap<SubscriberId, Rc<dyn Dispatch>> = IndexMap::new();

        let _ = STORE.try_with(|store| {
            let store = store.borrow();
            let Some(deps) = store.get(&target) else {
                return;
            };

            let mut collect = |set: Option<&DepSet>| {
                let Some(set) = set else {
                    return;
                };
                for (id, subscriber) in set.borrow().iter() {
                    if Some(*id) != active {
                        to_run.entry(*id).or_insert_with(|| subscriber.clone());
                    }
                }
            };

            if op == Op::Clear {
                for set in deps.keys.values() {
                    collect(Some(set));
                }
                return;
            }

            if kind == TargetKind::Sequence && key == Key::Length {
                let new_len = new_len.unwrap_or(0);
                for (tracked, set) in &deps.keys {
                    match tracked {
                        Key::Length => collect(Some(set)),
                        Key::Index(i) if *i >= new_len => collect(Some(set)),
                        _ => {}
                    }
                }
            } else {
                collect(deps.keys.get(&key));
            }

            let key_set_changed = matches!(op, Op::Add | Op::Delete);
            if key_set_changed || (op == Op::Set && kind == TargetKind::Map) {
                collect(deps.keys.get(&Key::Iterate));
            }
            if key_set_changed && kind == TargetKind::Map {
                collect(deps.keys.get(&Key::MapKeyIterate));
            }
            if op == Op::Add && kind == TargetKind::Sequence {
                collect(deps.keys.get(&Key::Length));
            }
        });

        if to_run.is_empty() {
            return;
        }
        tracing::trace!(?target, ?key, %op, subscribers = to_run.len(), "trigger");

        for (_, subscriber) in to_run {
            subscriber.dispatch();
        }
    }

    /// Drop every dependency set recorded for `target`.
    pub fn forget_target(target: TargetId) {
        let removed = STORE.try_with(|store| match store.try_borrow_mut() {
            Ok(mut store) => store.remove(&target),
            Err(_) => {
                let _ = PENDING_FORGET.try_with(|pending| pending.borrow_mut().push(target));
                None
            }
        });
        // Dropping the entry can release subscribers, and with them more
        // targets, so it happens outside the store borrow.
        drop(removed);
    }

    fn purge_pending() {
        let pending: Vec<TargetId> = PENDING_FORGET
            .try_with(|pending| pending.borrow_mut().drain(..).collect())
            .unwrap_or_default();
        for target in pending {
            Self::forget_target(target);
        }
    }

    /// Whether anything has been tracked on `target`.
    pub fn has_target(target: TargetId) -> bool {
        STORE
            .try_with(|store| store.borrow().contains_key(&target))
            .unwrap_or(false)
    }

    /// Number of targets with store entries on this thread.
    pub fn target_count() -> usize {
        Self::purge_pending();
        STORE.try_with(|store| store.borrow().len()).unwrap_or(0)
    }

    /// Number of subscribers currently depending on `(target, key)`.
    pub fn subscriber_count(target: TargetId, key: &Key) -> usize {
        STORE
            .try_with(|store| {
                store
                    .borrow()
                    .get(&target)
                    .and_then(|deps| deps.keys.get(key))
                    .map_or(0, |set| set.borrow().len())
            })
            .unwrap_or(0)
    }

    /// Id of the running subscriber, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads would be tracked right now.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active() && ReactiveContext::should_track()
    }
}
