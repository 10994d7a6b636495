//! Sequence traps and array-style mutators.
//!
//! Keys are indices, given as numbers or numeric strings, plus `"length"`.
//! Writing past the end pads with nulls and counts as an add, so it reaches
//! `length` dependants. Setting `length` reaches the dependants of every
//! index it cut off.
//!
//! The mutators (`push`, `pop`, `splice` and friends) run with tracking
//! paused. Their internal reads would otherwise make a subscriber that only
//! appends depend on the length it changes, and two such subscribers would
//! re-run each other forever.

use super::handler::Handler;
use super::{to_raw, Reactive};
use crate::diagnostics;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Key, Op, TrackingPause};
use crate::value::{has_changed, MapKey, RawKind, Value};

pub(crate) struct SequenceHandler;

enum SeqKey {
    Index(usize),
    Length,
    Other,
}

/// Indices stop one short of the largest length.
const MAX_INDEX: u64 = u32::MAX as u64 - 1;

fn parse_key(key: &MapKey) -> SeqKey {
    let index = match key {
        MapKey::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
            (*n <= MAX_INDEX as f64).then(|| *n as u64)
        }
        MapKey::Str(s) if &**s == "length" => return SeqKey::Length,
        MapKey::Str(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    index
        .filter(|i| *i <= MAX_INDEX)
        .and_then(|i| usize::try_from(i).ok())
        .map_or(SeqKey::Other, SeqKey::Index)
}

fn parse_length(value: &Value) -> Option<usize> {
    match value.as_f64() {
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => {
            usize::try_from(n as u64).ok()
        }
        _ => None,
    }
}

impl Handler for SequenceHandler {
    fn get(&self, target: &Reactive, key: &MapKey) -> Value {
        match parse_key(key) {
            SeqKey::Index(i) => {
                target.track(Key::Index(i));
                target.wrap_child(target.raw_at(i))
            }
            SeqKey::Length => {
                target.track(Key::Length);
                Value::from(target.raw().len())
            }
            SeqKey::Other => Value::Null,
        }
    }

    fn set(&self, target: &Reactive, key: MapKey, value: Value, _receiver: &Reactive) -> bool {
        if target.is_readonly() {
            target.refuse(Op::Set, key.property_name());
            return true;
        }

        match parse_key(&key) {
            SeqKey::Index(i) => {
                let Some(new_len) = i.checked_add(1) else {
                    return false;
                };
                let value = value.into_raw();
                let raw = target.raw();
                let Some(mut items) = raw.as_sequence_mut() else {
                    return false;
                };
                let old = items.get(i).cloned();
                if new_len > items.len() {
                    items.resize(new_len, Value::Null);
                }
                items[i] = value.clone();
                drop(items);

                match old {
                    None => target.trigger(Key::Index(i), Op::Add, None),
                    Some(old) if has_changed(&old, &value) => {
                        target.trigger(Key::Index(i), Op::Set, None)
                    }
                    Some(_) => {}
                }
                true
            }
            SeqKey::Length => {
                let Some(new_len) = parse_length(&value) else {
                    diagnostics::warn(ReactiveError::InvalidLength(format!("{value:?}")));
                    return false;
                };
                let raw = target.raw();
                let Some(mut items) = raw.as_sequence_mut() else {
                    return false;
                };
                let old_len = items.len();
                items.resize(new_len, Value::Null);
                drop(items);

                if new_len != old_len {
                    target.trigger(Key::Length, Op::Set, Some(new_len));
                }
                true
            }
            SeqKey::Other => false,
        }
    }

    fn has(&self, target: &Reactive, key: &MapKey) -> bool {
        match parse_key(key) {
            SeqKey::Index(i) => {
                target.track(Key::Index(i));
                i < target.raw().len()
            }
            SeqKey::Length => true,
            SeqKey::Other => false,
        }
    }

    fn own_keys(&self, target: &Reactive) -> Vec<MapKey> {
        target.track(Key::Length);
        (0..target.raw().len()).map(MapKey::from).collect()
    }

    fn delete(&self, target: &Reactive, key: &MapKey) -> bool {
        if target.is_readonly() {
            target.refuse(Op::Delete, key.property_name());
            return false;
        }

        let SeqKey::Index(i) = parse_key(key) else {
            return false;
        };
        let raw = target.raw();
        let Some(mut items) = raw.as_sequence_mut() else {
            return false;
        };
        if i >= items.len() {
            return false;
        }
        items[i] = Value::Null;
        drop(items);

        target.trigger(Key::Index(i), Op::Delete, None);
        true
    }

    fn len(&self, target: &Reactive) -> usize {
        target.track(Key::Length);
        target.raw().len()
    }
}

impl Reactive {
    fn raw_at(&self, index: usize) -> Value {
        self.raw()
            .as_sequence()
            .and_then(|items| items.get(index).cloned())
            .unwrap_or_default()
    }

    /// Kind check for mutators. `Ok(false)` means the wrapper is readonly and
    /// the call was refused.
    fn begin_mutation(&self, method: &str) -> Result<bool> {
        self.expect_kind(RawKind::Sequence)?;
        if self.is_readonly() {
            self.refuse(Op::Set, method);
            return Ok(false);
        }
        Ok(true)
    }

    /// Append `value`, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        if !self.begin_mutation("push")? {
            return Ok(self.raw().len());
        }
        let _pause = TrackingPause::new();
        let len = self.raw().len();
        self.set(len, value);
        Ok(len + 1)
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Value>> {
        if !self.begin_mutation("pop")? {
            return Ok(None);
        }
        let _pause = TrackingPause::new();
        let len = self.raw().len();
        if len == 0 {
            return Ok(None);
        }
        let last = self.get(len - 1);
        self.set("length", len - 1);
        Ok(Some(last))
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<Value>> {
        if !self.begin_mutation("shift")? {
            return Ok(None);
        }
        if self.raw().is_empty() {
            return Ok(None);
        }
        Ok(self.splice(0, 1, std::iter::empty::<Value>())?.pop())
    }

    /// Prepend `values` in order, returning the new length.
    pub fn unshift<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<usize> {
        if !self.begin_mutation("unshift")? {
            return Ok(self.raw().len());
        }
        self.splice(0, 0, values)?;
        Ok(self.raw().len())
    }

    /// Insert `value` before `index`.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        if !self.begin_mutation("insert")? {
            return Ok(());
        }
        let value: Value = value.into();
        self.splice(index, 0, [value]).map(|_| ())
    }

    /// Replace `delete_count` elements starting at `start` with `items`,
    /// returning the removed elements. Out-of-range bounds are clamped.
    pub fn splice<V: Into<Value>>(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = V>,
    ) -> Result<Vec<Value>> {
        if !self.begin_mutation("splice")? {
            return Ok(Vec::new());
        }
        let _pause = TrackingPause::new();

        let len = self.raw().len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let items: Vec<Value> = items.into_iter().map(|v| v.into().into_raw()).collect();

        let removed: Vec<Value> = (start..start + delete_count).map(|i| self.get(i)).collect();
        let tail: Vec<Value> = (start + delete_count..len).map(|i| self.raw_at(i)).collect();
        let new_len = start + items.len() + tail.len();

        for (offset, value) in items.into_iter().chain(tail).enumerate() {
            self.set(start + offset, value);
        }
        if new_len < len {
            self.set("length", new_len);
        }
        Ok(removed)
    }

    /// Truncate or pad with nulls.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.expect_kind(RawKind::Sequence)?;
        self.set("length", len);
        Ok(())
    }

    /// Track the length and every index, returning the raw elements.
    fn tracked_items(&self) -> Result<Vec<Value>> {
        self.expect_kind(RawKind::Sequence)?;
        let len = self.len();
        for i in 0..len {
            self.track(Key::Index(i));
        }
        Ok(self
            .raw()
            .as_sequence()
            .map(|items| items.clone())
            .unwrap_or_default())
    }

    /// SameValueZero search. A wrapped needle matches its raw element.
    pub fn includes(&self, needle: &Value) -> Result<bool> {
        let needle = MapKey::from_value(to_raw(needle));
        Ok(self
            .tracked_items()?
            .into_iter()
            .any(|item| MapKey::from_value(item) == needle))
    }

    /// Strict-equality search from the front.
    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        let needle = to_raw(needle);
        Ok(self.tracked_items()?.iter().position(|item| *item == needle))
    }

    /// Strict-equality search from the back.
    pub fn last_index_of(&self, needle: &Value) -> Result<Option<usize>> {
        let needle = to_raw(needle);
        Ok(self.tracked_items()?.iter().rposition(|item| *item == needle))
    }

    /// Every element, read through the wrapper.
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        self.expect_kind(RawKind::Sequence)?;
        Ok((0..self.len()).map(|i| self.get(i)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{reactive, readonly};
    use crate::diagnostics::take_warnings;
    use crate::reactive::effect;
    use crate::value::RawRef;
    use std::cell::Cell;
    use std::rc::Rc;

    fn numbers(view: &Reactive) -> Vec<f64> {
        view.raw()
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_f64)
            .collect()
    }

    #[test]
    fn index_keys_parse() {
        let view = reactive(&RawRef::new_sequence([10, 20]));
        assert_eq!(view.get(1), Value::from(20));
        assert_eq!(view.get("1"), Value::from(20));
        assert_eq!(view.get("length"), Value::from(2));
        assert_eq!(view.get(5), Value::Null);
        assert_eq!(view.get("nope"), Value::Null);
    }

    #[test]
    fn writing_past_the_end_reaches_length() {
        let view = reactive(&RawRef::new_sequence([1]));
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = view.clone();
        let _e = effect(move || {
            reader.len();
            counter.set(counter.get() + 1);
        });

        view.set(0, 5);
        assert_eq!(runs.get(), 1);
        view.set(3, 7);
        assert_eq!(runs.get(), 2);
        assert_eq!(view.raw().len(), 4);
        assert_eq!(view.get(2), Value::Null);
    }

    #[test]
    fn mutators() {
        let view = reactive(&RawRef::new_sequence([1, 2, 3]));

        assert_eq!(view.push(4).unwrap(), 4);
        assert_eq!(view.pop().unwrap(), Some(Value::from(4)));
        assert_eq!(view.shift().unwrap(), Some(Value::from(1)));
        assert_eq!(numbers(&view), vec![2.0, 3.0]);

        assert_eq!(view.unshift([0, 1]).unwrap(), 4);
        assert_eq!(numbers(&view), vec![0.0, 1.0, 2.0, 3.0]);

        let removed = view.splice(1, 2, [9]).unwrap();
        assert_eq!(removed, vec![Value::from(1), Value::from(2)]);
        assert_eq!(numbers(&view), vec![0.0, 9.0, 3.0]);

        view.insert(3, 4).unwrap();
        assert_eq!(numbers(&view), vec![0.0, 9.0, 3.0, 4.0]);

        view.set_len(1).unwrap();
        assert_eq!(numbers(&view), vec![0.0]);
    }

    #[test]
    fn pop_on_empty() {
        let view = reactive(&RawRef::new_sequence(Vec::<Value>::new()));
        assert_eq!(view.pop().unwrap(), None);
        assert_eq!(view.shift().unwrap(), None);
    }

    #[test]
    fn appending_effects_do_not_recurse() {
        let view = reactive(&RawRef::new_sequence(Vec::<Value>::new()));
        let (a, b) = (view.clone(), view.clone());
        let first = effect(move || {
            a.push(1).unwrap();
        });
        let second = effect(move || {
            b.push(2).unwrap();
        });

        assert_eq!(first.run_count(), 1);
        assert_eq!(second.run_count(), 1);
        assert_eq!(numbers(&view), vec![1.0, 2.0]);
    }

    #[test]
    fn search_accepts_wrapped_needles() {
        let child = RawRef::new_record();
        let view = reactive(&RawRef::new_sequence([
            Value::Raw(child.clone()),
            Value::Number(f64::NAN),
        ]));
        let wrapped = view.get(0);
        assert!(matches!(wrapped, Value::Reactive(_)));

        assert!(view.includes(&wrapped).unwrap());
        assert_eq!(view.index_of(&wrapped).unwrap(), Some(0));
        assert_eq!(view.index_of(&Value::Raw(child)).unwrap(), Some(0));
        assert!(view.includes(&Value::Number(f64::NAN)).unwrap());
        assert_eq!(view.index_of(&Value::Number(f64::NAN)).unwrap(), None);
        assert_eq!(view.last_index_of(&wrapped).unwrap(), Some(0));
    }

    #[test]
    fn invalid_length_is_refused() {
        take_warnings();
        let view = reactive(&RawRef::new_sequence([1, 2]));
        assert!(!view.set("length", -1));
        assert!(!view.set("length", 1.5));
        assert_eq!(view.raw().len(), 2);
        assert_eq!(take_warnings().len(), 2);
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let view = reactive(&RawRef::new_sequence([1, 2]));
        assert!(!view.set("18446744073709551615", 9));
        assert!(!view.set(1e19, 9));
        assert!(!view.set(u32::MAX as f64, 9));
        assert_eq!(view.get("18446744073709551615"), Value::Null);
        assert!(!view.has(1e19));
        assert_eq!(view.raw().len(), 2);

        assert!(view.set(3, 9));
        assert_eq!(view.raw().len(), 4);
    }

    #[test]
    fn readonly_mutators_warn_once() {
        take_warnings();
        let view = readonly(&RawRef::new_sequence([1, 2]));
        assert_eq!(view.push(3).unwrap(), 2);
        assert_eq!(view.splice(0, 1, [5]).unwrap(), Vec::<Value>::new());
        assert_eq!(take_warnings().len(), 2);
        assert_eq!(view.raw().len(), 2);
    }

    #[test]
    fn delete_leaves_a_hole() {
        let view = reactive(&RawRef::new_sequence([1, 2]));
        assert!(view.delete(0));
        assert_eq!(view.get(0), Value::Null);
        assert_eq!(view.raw().len(), 2);
        assert!(!view.delete(5));
    }
}
