//! The trap interface every container kind implements.

use super::collection::{MapHandler, SetHandler};
use super::record::RecordHandler;
use super::sequence::SequenceHandler;
use super::Reactive;
use crate::value::{MapKey, RawKind, Value};

/// Intercepted operations on one container kind.
///
/// `target` is the wrapper the operation was called on. For `set`,
/// `receiver` is the wrapper the write was originally addressed to; it
/// differs from `target` when a record delegates a write to its prototype.
pub(crate) trait Handler {
    fn get(&self, target: &Reactive, key: &MapKey) -> Value;

    fn set(&self, target: &Reactive, key: MapKey, value: Value, receiver: &Reactive) -> bool;

    fn has(&self, target: &Reactive, key: &MapKey) -> bool;

    fn own_keys(&self, target: &Reactive) -> Vec<MapKey>;

    fn delete(&self, target: &Reactive, key: &MapKey) -> bool;

    fn len(&self, target: &Reactive) -> usize;
}

pub(crate) fn handler_for(kind: RawKind) -> &'static dyn Handler {
    match kind {
        RawKind::Record => &RecordHandler,
        RawKind::Sequence => &SequenceHandler,
        RawKind::Map => &MapHandler,
        RawKind::Set => &SetHandler,
    }
}
