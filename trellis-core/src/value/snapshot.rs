//! Detached copies of values, and JSON output.
//!
//! A watcher compares each new result against the previous one. For deep
//! sources the previous result is the same container as the new one, so the
//! watcher keeps a [`Snapshot`] instead: a structural copy that later
//! mutations cannot reach.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::{MapKey, RawKind, RawRef, Value};
use crate::reactive::TargetId;

/// Produce a copy that shares no mutable state with the original.
pub trait Snapshot {
    fn snapshot(&self) -> Self;
}

/// Deep copy. Containers are copied raw (unwrapped) and shared references
/// are preserved inside the copy. A reference back to a container that is
/// still being copied keeps pointing at the live container, so a copy never
/// owns a cycle of its own. Map keys and set elements keep their identity,
/// since a copied object key would no longer find its entry.
impl Snapshot for Value {
    fn snapshot(&self) -> Self {
        let mut copier = Copier::default();
        copier.copy(self)
    }
}

#[derive(Default)]
struct Copier {
    done: HashMap<TargetId, RawRef>,
    path: HashSet<TargetId>,
}

impl Copier {
    fn copy(&mut self, value: &Value) -> Value {
        let Some(raw) = value.container() else {
            return value.clone();
        };
        if let Some(copy) = self.done.get(&raw.id()) {
            return Value::Raw(copy.clone());
        }
        if !self.path.insert(raw.id()) {
            return Value::Raw(raw);
        }

        let copy = self.copy_container(&raw);
        self.path.remove(&raw.id());
        self.done.insert(raw.id(), copy.clone());
        Value::Raw(copy)
    }

    fn copy_container(&mut self, raw: &RawRef) -> RawRef {
        let copy = RawRef::empty(raw.kind());

        match raw.kind() {
            RawKind::Record => {
                let (fields, proto): (Vec<(Rc<str>, Value)>, Option<Value>) = raw
                    .as_record()
                    .map(|r| {
                        let fields = r.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                        (fields, r.prototype().cloned())
                    })
                    .unwrap_or_default();
                let proto = proto.map(|p| self.copy(&p));
                for (name, v) in fields {
                    let v = self.copy(&v);
                    if let Some(mut record) = copy.as_record_mut() {
                        record.insert(name, v);
                    }
                }
                if let Some(mut record) = copy.as_record_mut() {
                    record.proto = proto;
                }
            }
            RawKind::Sequence => {
                let items: Vec<Value> = raw.as_sequence().map(|s| s.clone()).unwrap_or_default();
                let items: Vec<Value> = items.iter().map(|v| self.copy(v)).collect();
                if let Some(mut seq) = copy.as_sequence_mut() {
                    *seq = items;
                }
            }
            RawKind::Map => {
                let entries: Vec<(MapKey, Value)> = raw
                    .as_map()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                for (k, v) in entries {
                    let v = self.copy(&v);
                    if let Some(mut map) = copy.as_map_mut() {
                        map.insert(k, v);
                    }
                }
            }
            RawKind::Set => {
                let items: Vec<MapKey> = raw
                    .as_set()
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                if let Some(mut set) = copy.as_set_mut() {
                    set.extend(items);
                }
            }
        }

        copy
    }
}

macro_rules! impl_snapshot_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Snapshot for $ty {
                fn snapshot(&self) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

impl_snapshot_by_clone!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    Rc<str>,
    MapKey,
);

impl<T: Snapshot> Snapshot for Option<T> {
    fn snapshot(&self) -> Self {
        self.as_ref().map(Snapshot::snapshot)
    }
}

impl<T: Snapshot> Snapshot for Vec<T> {
    fn snapshot(&self) -> Self {
        self.iter().map(Snapshot::snapshot).collect()
    }
}

impl<A: Snapshot, B: Snapshot> Snapshot for (A, B) {
    fn snapshot(&self) -> Self {
        (self.0.snapshot(), self.1.snapshot())
    }
}

impl<A: Snapshot, B: Snapshot, C: Snapshot> Snapshot for (A, B, C) {
    fn snapshot(&self) -> Self {
        (self.0.snapshot(), self.1.snapshot(), self.2.snapshot())
    }
}

// ---- Serialization ----

/// Serializes as plain data: records and maps as objects (map keys by their
/// field name), sequences and sets as arrays. Wrappers are transparent.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let path = RefCell::new(Vec::new());
        Serializing { value: self, path: &path }.serialize(serializer)
    }
}

struct Serializing<'a> {
    value: &'a Value,
    /// Containers currently being written, for cycle detection.
    path: &'a RefCell<Vec<TargetId>>,
}

impl Serialize for Serializing<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Raw(_) | Value::Reactive(_) => {
                let Some(raw) = self.value.container() else {
                    return serializer.serialize_unit();
                };
                if self.path.borrow().contains(&raw.id()) {
                    return Err(S::Error::custom("cannot serialize a cyclic structure"));
                }

                self.path.borrow_mut().push(raw.id());
                let result = serialize_container(&raw, serializer, self.path);
                self.path.borrow_mut().pop();
                result
            }
        }
    }
}

fn serialize_container<S: Serializer>(
    raw: &RawRef,
    serializer: S,
    path: &RefCell<Vec<TargetId>>,
) -> Result<S::Ok, S::Error> {
    match raw.kind() {
        RawKind::Record => {
            let fields: Vec<(Rc<str>, Value)> = raw
                .as_record()
                .map(|r| r.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            let mut map = serializer.serialize_map(Some(fields.len()))?;
            for (name, value) in &fields {
                map.serialize_entry(name.as_ref(), &Serializing { value, path })?;
            }
            map.end()
        }
        RawKind::Sequence => {
            let items: Vec<Value> = raw.as_sequence().map(|s| s.clone()).unwrap_or_default();
            let mut seq = serializer.serialize_seq(Some(items.len()))?;
            for value in &items {
                seq.serialize_element(&Serializing { value, path })?;
            }
            seq.end()
        }
        RawKind::Map => {
            let entries: Vec<(MapKey, Value)> = raw
                .as_map()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            let mut map = serializer.serialize_map(Some(entries.len()))?;
            for (key, value) in &entries {
                map.serialize_entry(key.property_name().as_ref(), &Serializing { value, path })?;
            }
            map.end()
        }
        RawKind::Set => {
            let items: Vec<Value> = raw
                .as_set()
                .map(|s| s.iter().map(MapKey::to_value).collect())
                .unwrap_or_default();
            let mut seq = serializer.serialize_seq(Some(items.len()))?;
            for value in &items {
                seq.serialize_element(&Serializing { value, path })?;
            }
            seq.end()
        }
    }
}
