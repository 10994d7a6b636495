//! Error types for the reactive engine.
//!
//! Most conditions in the engine are not errors at all: an untracked read or
//! a trigger with no dependants simply does nothing. The variants below cover
//! the cases that are worth reporting, either as a returned error (wrong
//! container kind, bad configuration) or through the non-fatal warning
//! channel in [`crate::diagnostics`] (refused mutations).

use thiserror::Error;

use crate::reactive::Op;
use crate::value::RawKind;

/// Errors and warnings produced by the reactive engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write or delete was attempted through a readonly wrapper.
    #[error("cannot {op} `{key}`: target is readonly")]
    ReadonlyMutation {
        /// The refused operation.
        op: Op,
        /// The key the operation addressed.
        key: String,
    },

    /// A kind-specific operation was called on the wrong container kind.
    #[error("expected a {expected} container, found {found}")]
    KindMismatch {
        /// The kind the operation works on.
        expected: RawKind,
        /// The kind of the container it was called on.
        found: RawKind,
    },

    /// A value that is not a container was used where one is required.
    #[error("value is not a container")]
    NotAContainer,

    /// A sequence length was set to something that is not a valid length.
    #[error("invalid sequence length: {0}")]
    InvalidLength(String),

    /// Linking a prototype would make the chain cyclic.
    #[error("prototype chain would form a cycle")]
    PrototypeCycle,

    /// A job kept re-queueing itself during a single flush.
    #[error("job {job} exceeded the recursion limit of {limit} runs in one flush")]
    RecursionLimit {
        /// Debug rendering of the offending job id.
        job: String,
        /// The configured limit.
        limit: usize,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_message_names_key_and_op() {
        let err = ReactiveError::ReadonlyMutation {
            op: Op::Set,
            key: "count".to_string(),
        };
        assert_eq!(err.to_string(), "cannot set `count`: target is readonly");
    }

    #[test]
    fn kind_mismatch_message() {
        let err = ReactiveError::KindMismatch {
            expected: RawKind::Sequence,
            found: RawKind::Record,
        };
        assert_eq!(err.to_string(), "expected a sequence container, found record");
    }

    #[test]
    fn json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ReactiveError = parse.into();
        assert!(matches!(err, ReactiveError::Serialize(_)));
    }
}
