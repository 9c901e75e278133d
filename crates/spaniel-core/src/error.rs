//! Error types surfaced by the spaniel core.
//!
//! Every public operation returns [`Result`]. The variants mirror the failure
//! kinds a test script needs to tell apart: an exhausted search, an
//! insensitive widget, a missing capability, a dead object, or bad input.

use thiserror::Error;

use crate::accessible::Capability;

/// Errors that can occur while searching, reading or acting on nodes.
#[derive(Error, Debug)]
pub enum SpanielError {
    /// A search exhausted all retries without a match.
    #[error("search exhausted: no {description} found under {origin}")]
    Search {
        /// Description of the predicate that was searched for.
        description: String,
        /// Log string of the node the search started from.
        origin: String,
    },

    /// An action was attempted on an insensitive widget.
    #[error("cannot {action} {node}: it is not sensitive")]
    NotSensitive { action: String, node: String },

    /// The node lacks the capability interface an attribute needs.
    #[error("{node} does not implement the {capability} interface")]
    CapabilityAbsent { capability: Capability, node: String },

    /// The underlying accessible has been destroyed.
    #[error("accessible object is dead: {0}")]
    DeadReference(String),

    /// The node does not advertise the requested action.
    #[error("action '{action}' not supported by {node}")]
    ActionNotSupported { action: String, node: String },

    /// Bad argument: negative coordinate, unknown key, read-only attribute, ...
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required external collaborator is missing.
    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    /// Any other accessibility bus failure.
    #[error("bus error: {0}")]
    Bus(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpanielError {
    /// Returns true for [`SpanielError::DeadReference`].
    pub fn is_dead(&self) -> bool {
        matches!(self, SpanielError::DeadReference(_))
    }

    /// Returns true for [`SpanielError::Search`].
    pub fn is_search(&self) -> bool {
        matches!(self, SpanielError::Search { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SpanielError> = std::result::Result<T, E>;
