//! Non-fatal warning channel.
//!
//! Refused mutations are not errors for the caller (the write reports
//! success), but they are still worth surfacing. Each warning is logged with
//! `tracing` and kept in a small per-thread ring so tests and dev tooling can
//! inspect what happened.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::config;
use crate::error::ReactiveError;

thread_local! {
    static WARNINGS: RefCell<VecDeque<ReactiveError>> = RefCell::new(VecDeque::new());
}

/// Record a non-fatal warning.
pub(crate) fn warn(warning: ReactiveError) {
    tracing::warn!(error = %warning, "reactive operation refused");

    let capacity = config().warning_capacity;
    if capacity == 0 {
        return;
    }

    let _ = WARNINGS.try_with(|ring| {
        let mut ring = ring.borrow_mut();
        while ring.len() >= capacity {
            ring.pop_front();
        }
        ring.push_back(warning);
    });
}

/// Drain the warnings recorded on this thread, oldest first.
pub fn take_warnings() -> Vec<ReactiveError> {
    WARNINGS
        .try_with(|ring| ring.borrow_mut().drain(..).collect())
        .unwrap_or_default()
}
