//! Error types.
//!
//! The runtime keeps its failure policies deliberately distinct:
//!
//! - a subscriber panic during a cell write is fail-fast and surfaces to the
//!   writer (no error type; the original panic is resumed);
//! - a panic during scope disposal is fail-soft, logged, and teardown
//!   continues;
//! - a reaction exceeding its retry cap is fatal and panics with
//!   [`RuntimeError::RunawayReaction`];
//! - a failed hydration claim is not an error at all, only a signaled
//!   outcome.
//!
//! The `Result`-shaped errors below cover the recoverable surface: the
//! serialized state registry.

use thiserror::Error;

/// Fatal runtime conditions.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A reaction kept re-triggering itself past the retry cap.
    #[error("reaction {id} exceeded the maximum of {max} update iterations")]
    RunawayReaction { id: u64, max: usize },
}

/// Failures in the serialized state registry.
#[derive(Debug, Error)]
pub enum StateError {
    /// A value could not be serialized for storage under `key`.
    #[error("failed to serialize state for key {key:?}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be decoded as the requested type.
    #[error("failed to deserialize state for key {key:?}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// An imported payload parsed as JSON but was not an object.
    #[error("state payload is not a JSON object")]
    InvalidPayload,

    /// An imported payload was not valid JSON.
    #[error("failed to parse state payload")]
    Parse(#[from] serde_json::Error),
}
