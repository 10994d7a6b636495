//! Instrumented Containers
//!
//! A [`Reactive`] wraps one raw container and routes every read and write
//! through the subscription store. Reads track the key they touched; writes
//! trigger the dependants of the key they changed.
//!
//! # Variants
//!
//! Two independent flags make up a [`Mode`]:
//!
//! - `shallow`: nested containers are returned raw instead of wrapped
//! - `readonly`: writes are refused with a warning, and reads are not
//!   tracked since nothing can change through the wrapper
//!
//! Deep wrappers wrap nested containers on the way out with the same
//! readonly flag, so `readonly(x).get("child")` is readonly too.
//!
//! # Identity
//!
//! Wrapping is cached per raw container and mode: two calls to [`reactive`]
//! on the same container return the same wrapper for as long as it is alive.
//! Either way dependencies are keyed by the raw container, so they always
//! accumulate in one place.
//!
//! # Kinds
//!
//! Each container kind has a [`handler::Handler`] implementing the basic
//! traps (get, set, has, own keys, delete, len). Sequences, maps and sets
//! add kind-specific operations on top; calling one on the wrong kind
//! returns [`ReactiveError::KindMismatch`].
//!
//! ```rust,ignore
//! let state = reactive(&RawRef::record_from([("count", 0)]));
//! let _e = effect({
//!     let state = state.clone();
//!     move || println!("{:?}", state.get("count"))
//! });
//! state.set("count", 1); // prints 1
//! ```

pub(crate) mod cache;
mod collection;
mod handler;
mod record;
mod sequence;
mod traverse;

pub use cache::cached_wrapper_count;
pub use traverse::traverse;

use std::fmt;
use std::rc::Rc;

use crate::diagnostics;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Key, Op, Runtime, TargetId};
use crate::value::{MapKey, RawKind, RawRef, Value};

use handler::handler_for;

/// Wrapper flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mode {
    pub shallow: bool,
    pub readonly: bool,
}

impl Mode {
    pub const DEEP: Mode = Mode {
        shallow: false,
        readonly: false,
    };
    pub const SHALLOW: Mode = Mode {
        shallow: true,
        readonly: false,
    };
    pub const READONLY: Mode = Mode {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_READONLY: Mode = Mode {
        shallow: true,
        readonly: true,
    };
}

pub(crate) struct WrapperInner {
    raw: RawRef,
    mode: Mode,
}

/// An instrumented view of a raw container.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<WrapperInner>,
}

/// Deep, mutable wrapper.
pub fn reactive(raw: &RawRef) -> Reactive {
    cache::wrap_raw(raw, Mode::DEEP)
}

/// Mutable wrapper that returns nested containers raw.
pub fn shallow_reactive(raw: &RawRef) -> Reactive {
    cache::wrap_raw(raw, Mode::SHALLOW)
}

/// Deep wrapper that refuses writes.
pub fn readonly(raw: &RawRef) -> Reactive {
    cache::wrap_raw(raw, Mode::READONLY)
}

/// Readonly wrapper that returns nested containers raw.
pub fn shallow_readonly(raw: &RawRef) -> Reactive {
    cache::wrap_raw(raw, Mode::SHALLOW_READONLY)
}

/// Strip any wrapper from `value`.
pub fn to_raw(value: &Value) -> Value {
    value.clone().into_raw()
}

impl Reactive {
    /// The wrapped raw container.
    pub fn raw(&self) -> RawRef {
        self.inner.raw.clone()
    }

    pub fn id(&self) -> TargetId {
        self.inner.raw.id()
    }

    pub fn kind(&self) -> RawKind {
        self.inner.raw.kind()
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.shallow
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.readonly
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read `key`. Nested containers come back wrapped unless shallow.
    pub fn get(&self, key: impl Into<MapKey>) -> Value {
        handler_for(self.kind()).get(self, &key.into())
    }

    /// Write `key`. Always reports success; a readonly wrapper records a
    /// warning instead of writing.
    pub fn set(&self, key: impl Into<MapKey>, value: impl Into<Value>) -> bool {
        self.set_with_receiver(key.into(), value.into(), self)
    }

    pub(crate) fn set_with_receiver(&self, key: MapKey, value: Value, receiver: &Reactive) -> bool {
        handler_for(self.kind()).set(self, key, value, receiver)
    }

    pub fn has(&self, key: impl Into<MapKey>) -> bool {
        handler_for(self.kind()).has(self, &key.into())
    }

    /// Own keys, field names or indices. Tracks enumeration.
    pub fn keys(&self) -> Vec<MapKey> {
        handler_for(self.kind()).own_keys(self)
    }

    /// Remove `key`. Returns whether something was removed.
    pub fn delete(&self, key: impl Into<MapKey>) -> bool {
        handler_for(self.kind()).delete(self, &key.into())
    }

    /// Number of fields, elements or entries. Tracks enumeration.
    pub fn len(&self) -> usize {
        handler_for(self.kind()).len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(key, value)` pairs in order, wrapped like [`Reactive::get`].
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match self.kind() {
            RawKind::Record => self
                .keys()
                .into_iter()
                .map(|key| (key.to_value(), self.get(key)))
                .collect(),
            RawKind::Sequence => (0..self.len())
                .map(|i| (Value::from(i), self.get(i)))
                .collect(),
            RawKind::Map | RawKind::Set => collection::entries(self),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Call `f(value, key)` for every entry.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }

    pub(crate) fn track(&self, key: Key) {
        if !self.is_readonly() {
            Runtime::track(self.id(), key);
        }
    }

    pub(crate) fn trigger(&self, key: Key, op: Op, new_len: Option<usize>) {
        Runtime::trigger(self.id(), self.kind().into(), key, op, new_len);
    }

    /// Wrap a value read out of this container according to its mode.
    pub(crate) fn wrap_child(&self, value: Value) -> Value {
        if self.is_shallow() {
            return value;
        }
        match value.container() {
            Some(raw) => {
                let mode = Mode {
                    shallow: false,
                    readonly: self.is_readonly(),
                };
                Value::Reactive(cache::wrap_raw(&raw, mode))
            }
            None => value,
        }
    }

    /// Record a refused mutation.
    pub(crate) fn refuse(&self, op: Op, key: impl fmt::Display) {
        diagnostics::warn(ReactiveError::ReadonlyMutation {
            op,
            key: key.to_string(),
        });
    }

    pub(crate) fn expect_kind(&self, expected: RawKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(ReactiveError::KindMismatch {
                expected,
                found: self.kind(),
            })
        }
    }
}

impl TryFrom<Value> for Reactive {
    type Error = ReactiveError;

    /// Wrapped values pass through; raw containers get a deep wrapper.
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Reactive(r) => Ok(r),
            Value::Raw(raw) => Ok(reactive(&raw)),
            _ => Err(ReactiveError::NotAContainer),
        }
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flavour = match (self.is_shallow(), self.is_readonly()) {
            (false, false) => "reactive",
            (true, false) => "shallow_reactive",
            (false, true) => "readonly",
            (true, true) => "shallow_readonly",
        };
        write!(f, "{flavour}({:?})", self.inner.raw)
    }
}
