//! Map and set traps.
//!
//! Lookups track the entry they asked for. Size and whole-collection
//! iteration track the iteration key. Map key listings track the narrower
//! map-key-iteration key, which value overwrites do not reach.

use super::handler::Handler;
use super::Reactive;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Key, Op};
use crate::value::{has_changed, MapKey, RawKind, Value};

pub(crate) struct MapHandler;

pub(crate) struct SetHandler;

impl Handler for MapHandler {
    fn get(&self, target: &Reactive, key: &MapKey) -> Value {
        target.track(Key::Entry(key.entry_key()));
        let value = target
            .raw()
            .as_map()
            .and_then(|entries| entries.get(key).cloned())
            .unwrap_or_default();
        target.wrap_child(value)
    }

    fn set(&self, target: &Reactive, key: MapKey, value: Value, _receiver: &Reactive) -> bool {
        if target.is_readonly() {
            target.refuse(Op::Set, key.property_name());
            return true;
        }

        let value = value.into_raw();
        let old = match target.raw().as_map_mut() {
            Some(mut entries) => entries.insert(key.clone(), value.clone()),
            None => return false,
        };

        let entry = Key::Entry(key.entry_key());
        match old {
            None => target.trigger(entry, Op::Add, None),
            Some(old) if has_changed(&old, &value) => target.trigger(entry, Op::Set, None),
            Some(_) => {}
        }
        true
    }

    fn has(&self, target: &Reactive, key: &MapKey) -> bool {
        target.track(Key::Entry(key.entry_key()));
        target
            .raw()
            .as_map()
            .is_some_and(|entries| entries.contains_key(key))
    }

    fn own_keys(&self, target: &Reactive) -> Vec<MapKey> {
        target.track(Key::MapKeyIterate);
        target
            .raw()
            .as_map()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn delete(&self, target: &Reactive, key: &MapKey) -> bool {
        if target.is_readonly() {
            target.refuse(Op::Delete, key.property_name());
            return false;
        }

        let removed = target
            .raw()
            .as_map_mut()
            .and_then(|mut entries| entries.shift_remove(key));
        if removed.is_some() {
            target.trigger(Key::Entry(key.entry_key()), Op::Delete, None);
        }
        removed.is_some()
    }

    fn len(&self, target: &Reactive) -> usize {
        target.track(Key::Iterate);
        target.raw().len()
    }
}

impl Handler for SetHandler {
    /// The element itself if present, otherwise null.
    fn get(&self, target: &Reactive, key: &MapKey) -> Value {
        if self.has(target, key) {
            target.wrap_child(key.to_value())
        } else {
            Value::Null
        }
    }

    /// Sets are written with [`Reactive::add`].
    fn set(&self, _target: &Reactive, _key: MapKey, _value: Value, _receiver: &Reactive) -> bool {
        false
    }

    fn has(&self, target: &Reactive, key: &MapKey) -> bool {
        target.track(Key::Entry(key.entry_key()));
        target.raw().as_set().is_some_and(|items| items.contains(key))
    }

    fn own_keys(&self, target: &Reactive) -> Vec<MapKey> {
        target.track(Key::Iterate);
        target
            .raw()
            .as_set()
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn delete(&self, target: &Reactive, key: &MapKey) -> bool {
        if target.is_readonly() {
            target.refuse(Op::Delete, key.property_name());
            return false;
        }

        let removed = target
            .raw()
            .as_set_mut()
            .is_some_and(|mut items| items.shift_remove(key));
        if removed {
            target.trigger(Key::Entry(key.entry_key()), Op::Delete, None);
        }
        removed
    }

    fn len(&self, target: &Reactive) -> usize {
        target.track(Key::Iterate);
        target.raw().len()
    }
}

/// Tracked `(key, value)` pairs of a map or set; a set pairs each element
/// with itself.
pub(super) fn entries(target: &Reactive) -> Vec<(Value, Value)> {
    target.track(Key::Iterate);
    let raw = target.raw();

    let pairs: Vec<(Value, Value)> = match raw.kind() {
        RawKind::Map => raw
            .as_map()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.to_value(), v.clone()))
                    .collect()
            })
            .unwrap_or_default(),
        RawKind::Set => raw
            .as_set()
            .map(|items| {
                items
                    .iter()
                    .map(|k| (k.to_value(), k.to_value()))
                    .collect()
            })
            .unwrap_or_default(),
        RawKind::Record | RawKind::Sequence => Vec::new(),
    };

    pairs
        .into_iter()
        .map(|(k, v)| (target.wrap_child(k), target.wrap_child(v)))
        .collect()
}

impl Reactive {
    /// Add an element to a set. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> Result<bool> {
        self.expect_kind(RawKind::Set)?;
        let key = MapKey::from_value(value.into());
        if self.is_readonly() {
            self.refuse(Op::Add, key.property_name());
            return Ok(false);
        }

        let inserted = self
            .raw()
            .as_set_mut()
            .is_some_and(|mut items| items.insert(key.clone()));
        if inserted {
            self.trigger(Key::Entry(key.entry_key()), Op::Add, None);
        }
        Ok(inserted)
    }

    /// Remove every entry of a map or set, notifying every dependant.
    pub fn clear(&self) -> Result<()> {
        if !matches!(self.kind(), RawKind::Map | RawKind::Set) {
            return Err(ReactiveError::KindMismatch {
                expected: RawKind::Map,
                found: self.kind(),
            });
        }
        if self.is_readonly() {
            self.refuse(Op::Clear, "*");
            return Ok(());
        }

        let raw = self.raw();
        let had_entries = !raw.is_empty();
        if let Some(mut entries) = raw.as_map_mut() {
            entries.clear();
        }
        if let Some(mut items) = raw.as_set_mut() {
            items.clear();
        }

        if had_entries {
            self.trigger(Key::Iterate, Op::Clear, None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::container::{reactive, readonly};
    use crate::diagnostics::take_warnings;
    use crate::reactive::effect;
    use crate::value::{RawRef, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    fn runs() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    #[test]
    fn map_lookup_tracks_single_entry() {
        let map = reactive(&RawRef::new_map([("a", 1), ("b", 2)]));
        let (counter, seen) = runs();
        let reader = map.clone();
        let _e = effect(move || {
            reader.get("a");
            counter.set(counter.get() + 1);
        });

        map.set("b", 3);
        assert_eq!(seen.get(), 1);
        map.set("a", 1);
        assert_eq!(seen.get(), 1);
        map.set("a", 5);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn map_keys_ignore_value_overwrites() {
        let map = reactive(&RawRef::new_map([("a", 1)]));
        let (keys_counter, keys_seen) = runs();
        let (values_counter, values_seen) = runs();
        let (k, v) = (map.clone(), map.clone());
        let _keys = effect(move || {
            k.keys();
            keys_counter.set(keys_counter.get() + 1);
        });
        let _values = effect(move || {
            v.values();
            values_counter.set(values_counter.get() + 1);
        });

        map.set("a", 2);
        assert_eq!((keys_seen.get(), values_seen.get()), (1, 2));

        map.set("b", 1);
        assert_eq!((keys_seen.get(), values_seen.get()), (2, 3));

        assert!(map.delete("a"));
        assert_eq!((keys_seen.get(), values_seen.get()), (3, 4));
    }

    #[test]
    fn set_add_and_delete() {
        let set = reactive(&RawRef::new_set(Vec::<Value>::new()));
        let (counter, seen) = runs();
        let reader = set.clone();
        let _e = effect(move || {
            reader.len();
            counter.set(counter.get() + 1);
        });

        assert!(set.add(1).unwrap());
        assert!(!set.add(1).unwrap());
        assert_eq!(seen.get(), 2);
        assert!(set.has(1));
        assert_eq!(set.get(1), Value::from(1));

        assert!(set.delete(1));
        assert_eq!(seen.get(), 3);
        assert_eq!(set.get(1), Value::Null);
    }

    #[test]
    fn clear_notifies_entry_readers() {
        let map = reactive(&RawRef::new_map([("a", 1)]));
        let (counter, seen) = runs();
        let reader = map.clone();
        let _e = effect(move || {
            reader.has("a");
            counter.set(counter.get() + 1);
        });

        map.clear().unwrap();
        assert_eq!(seen.get(), 2);
        assert!(map.raw().is_empty());

        map.clear().unwrap();
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn entries_wrap_object_keys_and_values() {
        let key = RawRef::new_record();
        let value = RawRef::new_record();
        let map = reactive(&RawRef::new_map([(key.clone(), Value::Raw(value.clone()))]));

        let entries = map.entries();
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0].0, Value::Reactive(r) if r.raw().ptr_eq(&key)));
        assert!(matches!(&entries[0].1, Value::Reactive(r) if r.raw().ptr_eq(&value)));

        // Lookups by a wrapped key find the raw entry.
        let wrapped_key = reactive(&key);
        assert!(map.has(&wrapped_key));
    }

    #[test]
    fn readonly_collections_refuse() {
        take_warnings();
        let set = readonly(&RawRef::new_set([1]));
        assert!(!set.add(2).unwrap());
        assert!(!set.delete(1));
        set.clear().unwrap();
        assert_eq!(set.raw().len(), 1);
        assert_eq!(take_warnings().len(), 3);
    }
}
