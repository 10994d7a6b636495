//! Identity cache: at most one live wrapper per raw container and mode.
//!
//! Entries hold their wrapper weakly, and are removed when the raw container
//! is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::{Mode, Reactive, WrapperInner};
use crate::reactive::TargetId;
use crate::value::RawRef;

type Slots = SmallVec<[(Mode, Weak<WrapperInner>); 2]>;

thread_local! {
    static CACHE: RefCell<HashMap<TargetId, Slots>> = RefCell::new(HashMap::new());
}

/// The canonical wrapper for `(raw, mode)`, created on first use.
pub(crate) fn wrap_raw(raw: &RawRef, mode: Mode) -> Reactive {
    let existing = CACHE.with(|cache| {
        cache.borrow().get(&raw.id()).and_then(|slots| {
            slots
                .iter()
                .find(|(slot_mode, _)| *slot_mode == mode)
                .and_then(|(_, wrapper)| wrapper.upgrade())
        })
    });
    if let Some(inner) = existing {
        return Reactive { inner };
    }

    let inner = Rc::new(WrapperInner {
        raw: raw.clone(),
        mode,
    });
    CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let slots = cache.entry(raw.id()).or_default();
        let weak = Rc::downgrade(&inner);
        match slots.iter_mut().find(|(slot_mode, _)| *slot_mode == mode) {
            Some(slot) => slot.1 = weak,
            None => slots.push((mode, weak)),
        }
    });
    Reactive { inner }
}

/// Drop the cache entries of a raw container.
pub(crate) fn forget(target: TargetId) {
    let _ = CACHE.try_with(|cache| {
        if let Ok(mut cache) = cache.try_borrow_mut() {
            cache.remove(&target);
        }
    });
}

/// Number of live wrappers on this thread.
pub fn cached_wrapper_count() -> usize {
    CACHE
        .try_with(|cache| {
            cache
                .borrow()
                .values()
                .flat_map(|slots| slots.iter())
                .filter(|(_, wrapper)| wrapper.strong_count() > 0)
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_cached_separately() {
        let raw = RawRef::new_record();
        let deep = wrap_raw(&raw, Mode::DEEP);
        let shallow = wrap_raw(&raw, Mode::SHALLOW);
        assert!(!deep.ptr_eq(&shallow));
        assert!(deep.ptr_eq(&wrap_raw(&raw, Mode::DEEP)));
        assert!(shallow.ptr_eq(&wrap_raw(&raw, Mode::SHALLOW)));
    }

    #[test]
    fn cache_does_not_keep_wrappers_alive() {
        let raw = RawRef::new_record();
        let before = cached_wrapper_count();
        let wrapper = wrap_raw(&raw, Mode::READONLY);
        assert_eq!(cached_wrapper_count(), before + 1);

        drop(wrapper);
        assert_eq!(cached_wrapper_count(), before);
    }

    #[test]
    fn dropping_raw_clears_entry() {
        let raw = RawRef::new_record();
        let id = raw.id();
        drop(wrap_raw(&raw, Mode::DEEP));
        assert!(CACHE.with(|cache| cache.borrow().contains_key(&id)));

        drop(raw);
        assert!(!CACHE.with(|cache| cache.borrow().contains_key(&id)));
    }
}
