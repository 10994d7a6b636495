//! Record traps, including prototype fall-through.
//!
//! A read of a field the record does not own continues on its prototype. A
//! wrapped prototype is read through its own wrapper, so the read is tracked
//! there as well. A write of a field the record does not own is offered to a
//! wrapped prototype with the original wrapper as receiver; the value always
//! lands on the receiver, and only the receiver triggers.

use std::rc::Rc;

use super::handler::Handler;
use super::Reactive;
use crate::reactive::{Key, Op};
use crate::value::{has_changed, MapKey, RawRef, Value};

pub(crate) struct RecordHandler;

/// Untracked lookup along a raw prototype chain.
fn peek_chain(raw: &RawRef, name: &str) -> Option<Value> {
    let mut cursor = Some(raw.clone());
    while let Some(node) = cursor {
        let record = node.as_record()?;
        if let Some(value) = record.get(name) {
            return Some(value.clone());
        }
        let next = record.prototype().and_then(Value::container);
        drop(record);
        cursor = next;
    }
    None
}

impl Handler for RecordHandler {
    fn get(&self, target: &Reactive, key: &MapKey) -> Value {
        let name = key.property_name();
        target.track(Key::Field(name.clone()));

        let raw = target.raw();
        let (own, proto) = match raw.as_record() {
            Some(record) => (record.get(&name).cloned(), record.prototype().cloned()),
            None => (None, None),
        };

        let value = match (own, proto) {
            (Some(value), _) => value,
            (None, Some(Value::Reactive(proto))) => proto.get(name).into_raw(),
            (None, Some(proto)) => proto
                .container()
                .and_then(|parent| peek_chain(&parent, &name))
                .unwrap_or_default(),
            (None, None) => Value::Null,
        };

        target.wrap_child(value)
    }

    fn set(&self, target: &Reactive, key: MapKey, value: Value, receiver: &Reactive) -> bool {
        let name = key.property_name();
        if target.is_readonly() {
            target.refuse(Op::Set, &name);
            return true;
        }

        let value = value.into_raw();
        let raw = target.raw();
        let (old, proto) = match raw.as_record() {
            Some(record) => (record.get(&name).cloned(), record.prototype().cloned()),
            None => return false,
        };
        let inherited = match (&old, &proto) {
            (None, Some(proto)) => proto
                .container()
                .and_then(|parent| peek_chain(&parent, &name)),
            _ => None,
        };

        match (&old, proto) {
            (None, Some(Value::Reactive(proto))) => {
                proto.set_with_receiver(MapKey::Str(name.clone()), value.clone(), receiver);
            }
            _ => {
                if let Some(mut record) = receiver.raw().as_record_mut() {
                    record.insert(Rc::clone(&name), value.clone());
                }
            }
        }

        // Writes that reached this wrapper through a prototype delegation
        // are triggered by the receiver.
        if !target.raw().ptr_eq(&receiver.raw()) {
            return true;
        }

        // Shadowing an inherited field with an equal value changes no read.
        match old {
            None if inherited.as_ref().is_some_and(|v| !has_changed(v, &value)) => {}
            None => target.trigger(Key::Field(name), Op::Add, None),
            Some(old) if has_changed(&old, &value) => target.trigger(Key::Field(name), Op::Set, None),
            Some(_) => {}
        }
        true
    }

    fn has(&self, target: &Reactive, key: &MapKey) -> bool {
        let name = key.property_name();
        target.track(Key::Field(name.clone()));

        let raw = target.raw();
        let (own, proto) = match raw.as_record() {
            Some(record) => (record.contains(&name), record.prototype().cloned()),
            None => (false, None),
        };

        own || match proto {
            Some(Value::Reactive(proto)) => proto.has(name),
            Some(proto) => proto
                .container()
                .is_some_and(|parent| peek_chain(&parent, &name).is_some()),
            None => false,
        }
    }

    fn own_keys(&self, target: &Reactive) -> Vec<MapKey> {
        target.track(Key::Iterate);
        target
            .raw()
            .as_record()
            .map(|record| record.keys().cloned().map(MapKey::Str).collect())
            .unwrap_or_default()
    }

    fn delete(&self, target: &Reactive, key: &MapKey) -> bool {
        let name = key.property_name();
        if target.is_readonly() {
            target.refuse(Op::Delete, &name);
            return false;
        }

        let removed = target
            .raw()
            .as_record_mut()
            .and_then(|mut record| record.remove(&name));
        if removed.is_some() {
            target.trigger(Key::Field(name), Op::Delete, None);
        }
        removed.is_some()
    }

    fn len(&self, target: &Reactive) -> usize {
        target.track(Key::Iterate);
        target.raw().as_record().map_or(0, |record| record.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::container::{reactive, readonly};
    use crate::reactive::effect;
    use crate::value::{RawRef, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn missing_fields_read_through_prototype() {
        let parent = RawRef::record_from([("shared", 1)]);
        let child = RawRef::new_record();
        child.set_prototype(Some(Value::Raw(parent))).unwrap();

        let view = reactive(&child);
        assert_eq!(view.get("shared"), Value::from(1));
        assert!(view.has("shared"));
        assert!(view.keys().is_empty());
    }

    #[test]
    fn prototype_write_triggers_once() {
        let parent = RawRef::record_from([("bar", 1)]);
        let child = RawRef::new_record();
        child
            .set_prototype(Some(Value::Reactive(reactive(&parent))))
            .unwrap();
        let view = reactive(&child);

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = view.clone();
        let _e = effect(move || {
            reader.get("bar");
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        view.set("bar", 2);
        assert_eq!(runs.get(), 2);

        // The value landed on the child; the parent is untouched.
        assert_eq!(
            child.as_record().unwrap().get("bar").cloned(),
            Some(Value::from(2))
        );
        assert_eq!(
            parent.as_record().unwrap().get("bar").cloned(),
            Some(Value::from(1))
        );
    }

    #[test]
    fn shadowing_with_equal_value_does_not_trigger() {
        let parent = RawRef::record_from([("bar", 1)]);
        let child = RawRef::new_record();
        child.set_prototype(Some(Value::Raw(parent))).unwrap();
        let view = reactive(&child);

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = view.clone();
        let _e = effect(move || {
            reader.get("bar");
            counter.set(counter.get() + 1);
        });

        assert!(view.set("bar", 1));
        assert_eq!(runs.get(), 1);
        assert!(child.as_record().unwrap().contains("bar"));

        view.set("bar", 3);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn add_and_delete_reach_enumeration() {
        let view = reactive(&RawRef::new_record());
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = view.clone();
        let _e = effect(move || {
            reader.keys();
            counter.set(counter.get() + 1);
        });

        view.set("a", 1);
        assert_eq!(runs.get(), 2);
        view.set("a", 2);
        assert_eq!(runs.get(), 2);
        assert!(view.delete("a"));
        assert_eq!(runs.get(), 3);
        assert!(!view.delete("a"));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn readonly_prototype_is_still_readable() {
        let parent = RawRef::record_from([("x", 5)]);
        let child = RawRef::new_record();
        child
            .set_prototype(Some(Value::Reactive(readonly(&parent))))
            .unwrap();
        assert_eq!(reactive(&child).get("x"), Value::from(5));
    }
}
