//! Keys for associative containers and the subscription store.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::{RawRef, Value};
use crate::container::Reactive;
use crate::reactive::TargetId;

/// Key of a map entry or set element.
///
/// Equality is SameValueZero: NaN equals NaN, `+0` equals `-0`, and object
/// keys compare by identity.
#[derive(Clone)]
pub enum MapKey {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(RawRef),
}

impl MapKey {
    /// Convert a value into a key, unwrapping wrapped containers.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => MapKey::Null,
            Value::Bool(b) => MapKey::Bool(b),
            Value::Number(n) => MapKey::Number(n),
            Value::Str(s) => MapKey::Str(s),
            Value::Raw(raw) => MapKey::Object(raw),
            Value::Reactive(r) => MapKey::Object(r.raw()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Null => Value::Null,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Number(n) => Value::Number(*n),
            MapKey::Str(s) => Value::Str(s.clone()),
            MapKey::Object(raw) => Value::Raw(raw.clone()),
        }
    }

    /// The key as a record field name.
    pub fn property_name(&self) -> Rc<str> {
        match self {
            MapKey::Str(s) => s.clone(),
            MapKey::Null => "null".into(),
            MapKey::Bool(b) => b.to_string().into(),
            MapKey::Number(n) => format_number(*n).into(),
            MapKey::Object(_) => "[object]".into(),
        }
    }

    /// Identity of this key inside the subscription store. Holds no strong
    /// reference to object keys.
    pub fn entry_key(&self) -> EntryKey {
        match self {
            MapKey::Null => EntryKey::Null,
            MapKey::Bool(b) => EntryKey::Bool(*b),
            MapKey::Number(n) => EntryKey::Number(canonical_bits(*n)),
            MapKey::Str(s) => EntryKey::Str(s.clone()),
            MapKey::Object(raw) => EntryKey::Object(raw.id()),
        }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MapKey::Null, MapKey::Null) => true,
            (MapKey::Bool(a), MapKey::Bool(b)) => a == b,
            (MapKey::Number(a), MapKey::Number(b)) => canonical_bits(*a) == canonical_bits(*b),
            (MapKey::Str(a), MapKey::Str(b)) => a == b,
            (MapKey::Object(a), MapKey::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry_key().hash(state);
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_value())
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(s.into())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Str(s.into())
    }
}

impl From<Rc<str>> for MapKey {
    fn from(s: Rc<str>) -> Self {
        MapKey::Str(s)
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

impl From<f64> for MapKey {
    fn from(n: f64) -> Self {
        MapKey::Number(n)
    }
}

impl From<i32> for MapKey {
    fn from(n: i32) -> Self {
        MapKey::Number(n.into())
    }
}

impl From<i64> for MapKey {
    fn from(n: i64) -> Self {
        MapKey::Number(n as f64)
    }
}

impl From<usize> for MapKey {
    fn from(n: usize) -> Self {
        MapKey::Number(n as f64)
    }
}

impl From<RawRef> for MapKey {
    fn from(raw: RawRef) -> Self {
        MapKey::Object(raw)
    }
}

impl From<&RawRef> for MapKey {
    fn from(raw: &RawRef) -> Self {
        MapKey::Object(raw.clone())
    }
}

impl From<&Reactive> for MapKey {
    fn from(r: &Reactive) -> Self {
        MapKey::Object(r.raw())
    }
}

impl From<Value> for MapKey {
    fn from(value: Value) -> Self {
        MapKey::from_value(value)
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        key.to_value()
    }
}

/// Hashable, non-owning form of a [`MapKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Null,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Object(TargetId),
}

/// Bit pattern with all NaNs and both zeroes collapsed.
fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

/// Render a number the way field names spell it: integers without a
/// fractional part.
pub(crate) fn format_number(n: f64) -> String {
    if n == 0.0 {
        "0".to_string()
    } else if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_value_zero() {
        assert_eq!(MapKey::Number(f64::NAN), MapKey::Number(f64::NAN));
        assert_eq!(MapKey::Number(0.0), MapKey::Number(-0.0));
        assert_ne!(MapKey::Number(1.0), MapKey::Str("1".into()));

        let mut set = HashSet::new();
        set.insert(MapKey::Number(f64::NAN));
        assert!(set.contains(&MapKey::Number(f64::NAN)));
    }

    #[test]
    fn object_keys_by_identity() {
        let a = RawRef::new_record();
        let b = RawRef::new_record();
        assert_eq!(MapKey::from(&a), MapKey::Object(a.clone()));
        assert_ne!(MapKey::from(&a), MapKey::from(&b));
        assert_eq!(MapKey::from(&a).entry_key(), EntryKey::Object(a.id()));
    }

    #[test]
    fn property_names() {
        assert_eq!(&*MapKey::from(3).property_name(), "3");
        assert_eq!(&*MapKey::from(1.5).property_name(), "1.5");
        assert_eq!(&*MapKey::from("x").property_name(), "x");
        assert_eq!(&*MapKey::from(true).property_name(), "true");
    }

    #[test]
    fn large_integers_keep_their_digits() {
        assert_eq!(format_number(1e19), "10000000000000000000");
        assert_eq!(format_number(-1e20), "-100000000000000000000");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(
            &*MapKey::from(18446744073709551616.0).property_name(),
            "18446744073709551616"
        );
    }
}
