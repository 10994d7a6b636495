//! Raw Values
//!
//! Application data lives in raw containers owned by application code. The
//! engine never copies a raw container; it only wraps it (see
//! [`crate::container`]) so reads and writes can be intercepted.
//!
//! # Containers
//!
//! A [`RawRef`] is an identity handle to one raw container. Four kinds exist:
//!
//! - `Record`: insertion-ordered string-keyed fields, with an optional
//!   prototype record that missing fields are looked up on
//! - `Sequence`: an ordered list of values
//! - `Map`: insertion-ordered associative collection keyed by [`MapKey`]
//! - `Set`: insertion-ordered collection of [`MapKey`]s
//!
//! Each container gets a [`TargetId`] when it is created. The subscription
//! store and the wrapper cache are keyed by that id; when the last handle to a
//! container is dropped both forget it.
//!
//! # Equality
//!
//! [`Value`]'s `PartialEq` is strict equality: primitives compare by value
//! (so `NaN != NaN`), strings by content and containers by identity. Write
//! suppression uses [`has_changed`], which additionally treats two NaNs as
//! unchanged.

mod key;
mod snapshot;

pub use key::{EntryKey, MapKey};
pub use snapshot::Snapshot;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::container::{self, Reactive};
use crate::error::{ReactiveError, Result};
use crate::reactive::{Runtime, TargetId};

/// The kind of a raw container. Fixed when the container is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    Record,
    Sequence,
    Map,
    Set,
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RawKind::Record => "record",
            RawKind::Sequence => "sequence",
            RawKind::Map => "map",
            RawKind::Set => "set",
        })
    }
}

/// String-keyed fields plus an optional prototype.
#[derive(Default)]
pub struct Record {
    fields: IndexMap<Rc<str>, Value>,
    proto: Option<Value>,
}

impl Record {
    /// Get an own field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Insert an own field, returning the previous value.
    ///
    /// Wrapped containers are stored as their raw container.
    pub fn insert(&mut self, name: impl Into<Rc<str>>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into().into_raw())
    }

    /// Remove an own field, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Rc<str>> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.fields.iter()
    }

    /// The prototype this record falls back to for missing fields.
    pub fn prototype(&self) -> Option<&Value> {
        self.proto.as_ref()
    }
}

pub(crate) enum RawData {
    Record(Record),
    Sequence(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
    Set(IndexSet<MapKey>),
}

impl RawData {
    fn empty(kind: RawKind) -> Self {
        match kind {
            RawKind::Record => RawData::Record(Record::default()),
            RawKind::Sequence => RawData::Sequence(Vec::new()),
            RawKind::Map => RawData::Map(IndexMap::new()),
            RawKind::Set => RawData::Set(IndexSet::new()),
        }
    }

    fn kind(&self) -> RawKind {
        match self {
            RawData::Record(_) => RawKind::Record,
            RawData::Sequence(_) => RawKind::Sequence,
            RawData::Map(_) => RawKind::Map,
            RawData::Set(_) => RawKind::Set,
        }
    }
}

struct RawCell {
    id: TargetId,
    kind: RawKind,
    data: RefCell<RawData>,
}

impl Drop for RawCell {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
        container::cache::forget(self.id);
    }
}

/// Identity handle to a raw container.
///
/// Cloning the handle does not copy the container. Direct access through the
/// `as_*` accessors is untracked: reads are not recorded and writes trigger
/// nothing. Do not hold a borrow across calls into a wrapper of the same
/// container.
#[derive(Clone)]
pub struct RawRef(Rc<RawCell>);

impl RawRef {
    fn from_data(data: RawData) -> Self {
        Self(Rc::new(RawCell {
            id: TargetId::new(),
            kind: data.kind(),
            data: RefCell::new(data),
        }))
    }

    pub(crate) fn empty(kind: RawKind) -> Self {
        Self::from_data(RawData::empty(kind))
    }

    /// Create an empty record.
    pub fn new_record() -> Self {
        Self::empty(RawKind::Record)
    }

    /// Create a record from `(name, value)` pairs.
    pub fn record_from<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let mut record = Record::default();
        for (name, value) in fields {
            record.insert(name, value);
        }
        Self::from_data(RawData::Record(record))
    }

    /// Create a sequence.
    pub fn new_sequence<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(RawData::Sequence(
            items.into_iter().map(|v| v.into().into_raw()).collect(),
        ))
    }

    /// Create a map from `(key, value)` pairs.
    pub fn new_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<MapKey>,
        V: Into<Value>,
    {
        Self::from_data(RawData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into().into_raw()))
                .collect(),
        ))
    }

    /// Create a set.
    pub fn new_set<K: Into<MapKey>>(items: impl IntoIterator<Item = K>) -> Self {
        Self::from_data(RawData::Set(items.into_iter().map(Into::into).collect()))
    }

    /// Build a raw tree from JSON. Objects become records, arrays sequences.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from(json) {
            Value::Raw(raw) => Ok(raw),
            _ => Err(ReactiveError::NotAContainer),
        }
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn kind(&self) -> RawKind {
        self.0.kind
    }

    /// Whether both handles refer to the same container.
    pub fn ptr_eq(&self, other: &RawRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of elements, fields or entries. Untracked.
    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            RawData::Record(record) => record.len(),
            RawData::Sequence(items) => items.len(),
            RawData::Map(entries) => entries.len(),
            RawData::Set(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_record(&self) -> Option<Ref<'_, Record>> {
        Ref::filter_map(self.0.data.borrow(), |data| match data {
            RawData::Record(record) => Some(record),
            _ => None,
        })
        .ok()
    }

    pub fn as_record_mut(&self) -> Option<RefMut<'_, Record>> {
        RefMut::filter_map(self.0.data.borrow_mut(), |data| match data {
            RawData::Record(record) => Some(record),
            _ => None,
        })
        .ok()
    }

    pub fn as_sequence(&self) -> Option<Ref<'_, Vec<Value>>> {
        Ref::filter_map(self.0.data.borrow(), |data| match data {
            RawData::Sequence(items) => Some(items),
            _ => None,
        })
        .ok()
    }

    pub fn as_sequence_mut(&self) -> Option<RefMut<'_, Vec<Value>>> {
        RefMut::filter_map(self.0.data.borrow_mut(), |data| match data {
            RawData::Sequence(items) => Some(items),
            _ => None,
        })
        .ok()
    }

    pub fn as_map(&self) -> Option<Ref<'_, IndexMap<MapKey, Value>>> {
        Ref::filter_map(self.0.data.borrow(), |data| match data {
            RawData::Map(entries) => Some(entries),
            _ => None,
        })
        .ok()
    }

    pub fn as_map_mut(&self) -> Option<RefMut<'_, IndexMap<MapKey, Value>>> {
        RefMut::filter_map(self.0.data.borrow_mut(), |data| match data {
            RawData::Map(entries) => Some(entries),
            _ => None,
        })
        .ok()
    }

    pub fn as_set(&self) -> Option<Ref<'_, IndexSet<MapKey>>> {
        Ref::filter_map(self.0.data.borrow(), |data| match data {
            RawData::Set(items) => Some(items),
            _ => None,
        })
        .ok()
    }

    pub fn as_set_mut(&self) -> Option<RefMut<'_, IndexSet<MapKey>>> {
        RefMut::filter_map(self.0.data.borrow_mut(), |data| match data {
            RawData::Set(items) => Some(items),
            _ => None,
        })
        .ok()
    }

    /// Link this record to a prototype record (raw or wrapped), or unlink it.
    ///
    /// Reads of fields the record does not own fall through to the
    /// prototype; writes always land on the record itself.
    pub fn set_prototype(&self, proto: Option<Value>) -> Result<()> {
        if self.kind() != RawKind::Record {
            return Err(ReactiveError::KindMismatch {
                expected: RawKind::Record,
                found: self.kind(),
            });
        }

        if let Some(proto) = &proto {
            let parent = proto.container().ok_or(ReactiveError::NotAContainer)?;
            if parent.kind() != RawKind::Record {
                return Err(ReactiveError::KindMismatch {
                    expected: RawKind::Record,
                    found: parent.kind(),
                });
            }

            let mut cursor = Some(parent);
            while let Some(node) = cursor {
                if node.ptr_eq(self) {
                    return Err(ReactiveError::PrototypeCycle);
                }
                let next = node
                    .as_record()
                    .and_then(|record| record.prototype().and_then(Value::container));
                cursor = next;
            }
        }

        if let Some(mut record) = self.as_record_mut() {
            record.proto = proto;
        }
        Ok(())
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.id().raw())
    }
}

/// A value stored in, or read from, a container.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// An unwrapped container.
    Raw(RawRef),
    /// A container read through a deep wrapper.
    Reactive(Reactive),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    /// The raw container behind this value, whether wrapped or not.
    pub fn container(&self) -> Option<RawRef> {
        match self {
            Value::Raw(raw) => Some(raw.clone()),
            Value::Reactive(r) => Some(r.raw()),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Raw(_) | Value::Reactive(_))
    }

    /// Strip any wrapper, leaving the raw container.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Reactive(r) => Value::Raw(r.raw()),
            other => other,
        }
    }

    /// `false` only for NaN.
    pub fn is_self_equal(&self) -> bool {
        !matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Render as JSON. Fails on cyclic structures.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Whether a write of `new` over `old` is a genuine change.
///
/// Strictly unequal values count as changed unless both are NaN.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    old != new && (old.is_self_equal() || new.is_self_equal())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&key::format_number(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Raw(raw) => write!(f, "{raw:?}"),
            Value::Reactive(r) => write!(f, "{r:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<RawRef> for Value {
    fn from(raw: RawRef) -> Self {
        Value::Raw(raw)
    }
}

impl From<&RawRef> for Value {
    fn from(raw: &RawRef) -> Self {
        Value::Raw(raw.clone())
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Reactive(r)
    }
}

impl From<&Reactive> for Value {
    fn from(r: &Reactive) -> Self {
        Value::Reactive(r.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(s.into()),
            Json::Array(items) => {
                Value::Raw(RawRef::new_sequence(items.into_iter().map(Value::from)))
            }
            Json::Object(fields) => Value::Raw(RawRef::record_from(
                fields.into_iter().map(|(name, v)| (name, Value::from(v))),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_writes_are_not_changes() {
        let nan = Value::Number(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(!has_changed(&nan, &Value::Number(f64::NAN)));
        assert!(has_changed(&nan, &Value::Number(1.0)));
        assert!(has_changed(&Value::Number(1.0), &nan));
        assert!(!has_changed(&Value::Number(1.0), &Value::Number(1.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = RawRef::new_record();
        let b = RawRef::new_record();
        assert_eq!(Value::Raw(a.clone()), Value::Raw(a.clone()));
        assert_ne!(Value::Raw(a), Value::Raw(b));
    }

    #[test]
    fn from_json_builds_tree() {
        let raw = RawRef::from_json(json!({ "a": 1, "list": [1, 2], "nested": { "b": "x" } }))
            .unwrap();
        assert_eq!(raw.kind(), RawKind::Record);

        let record = raw.as_record().unwrap();
        assert_eq!(record.get("a").and_then(Value::as_f64), Some(1.0));
        let list = record.get("list").and_then(Value::container).unwrap();
        assert_eq!(list.kind(), RawKind::Sequence);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn from_json_rejects_scalars() {
        assert!(matches!(
            RawRef::from_json(json!(3)),
            Err(ReactiveError::NotAContainer)
        ));
    }

    #[test]
    fn ids_are_unique() {
        let a = RawRef::new_record();
        let b = RawRef::new_sequence(Vec::<Value>::new());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn prototype_cycles_are_refused() {
        let parent = RawRef::new_record();
        let child = RawRef::new_record();
        child.set_prototype(Some(Value::Raw(parent.clone()))).unwrap();

        assert!(matches!(
            parent.set_prototype(Some(Value::Raw(child.clone()))),
            Err(ReactiveError::PrototypeCycle)
        ));
        assert!(matches!(
            child.set_prototype(Some(Value::Raw(child.clone()))),
            Err(ReactiveError::PrototypeCycle)
        ));
    }

    #[test]
    fn prototype_must_be_a_record() {
        let child = RawRef::new_record();
        let list = RawRef::new_sequence([1]);
        assert!(matches!(
            child.set_prototype(Some(Value::Raw(list))),
            Err(ReactiveError::KindMismatch { .. })
        ));
        assert!(matches!(
            child.set_prototype(Some(Value::Number(1.0))),
            Err(ReactiveError::NotAContainer)
        ));
    }

    #[test]
    fn to_json_round_trips_shape() {
        let raw = RawRef::from_json(json!({ "a": [1, true, null], "b": "s" })).unwrap();
        let out = Value::Raw(raw).to_json().unwrap();
        assert_eq!(out, json!({ "a": [1.0, true, null], "b": "s" }));
    }

    #[test]
    fn to_json_fails_on_cycles() {
        let raw = RawRef::new_record();
        raw.as_record_mut()
            .unwrap()
            .insert("me", Value::Raw(raw.clone()));
        assert!(Value::Raw(raw.clone()).to_json().is_err());

        // Break the cycle so the container can be dropped.
        raw.as_record_mut().unwrap().remove("me");
    }
}
