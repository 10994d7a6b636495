//! Deep traversal for watching whole structures.

use std::collections::HashSet;

use crate::reactive::TargetId;
use crate::value::{RawKind, Value};

/// Read every field reachable from `value` so the running subscriber depends
/// on all of them.
///
/// Only wrapped containers are descended into, since raw reads are not
/// tracked. Each container is visited once, so cycles terminate.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<TargetId>) {
    let Value::Reactive(container) = value else {
        return;
    };
    if !seen.insert(container.id()) {
        return;
    }

    match container.kind() {
        RawKind::Record | RawKind::Sequence => {
            for key in container.keys() {
                visit(&container.get(key), seen);
            }
        }
        RawKind::Map | RawKind::Set => {
            for (_, child) in container.entries() {
                visit(&child, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::reactive;
    use crate::reactive::effect;
    use crate::value::RawRef;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn traversal_tracks_nested_fields() {
        let raw = RawRef::from_json(json!({ "a": { "b": [1, { "c": 2 }] } })).unwrap();
        let state = reactive(&raw);

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let source = Value::Reactive(state.clone());
        let _e = effect(move || {
            traverse(&source);
            counter.set(counter.get() + 1);
        });

        let deep = state.get("a").as_reactive().unwrap().get("b");
        let leaf = deep.as_reactive().unwrap().get(1);
        leaf.as_reactive().unwrap().set("c", 3);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn cycles_terminate() {
        let raw = RawRef::new_record();
        raw.as_record_mut()
            .unwrap()
            .insert("me", Value::Raw(raw.clone()));
        traverse(&Value::Reactive(reactive(&raw)));

        raw.as_record_mut().unwrap().remove("me");
    }
}
