// ── Core error types ──
//
// Recoverable failures surfaced to callers of the data layer. Programming
// errors (an unregistered entity type, two types sharing a type name) are
// not represented here: they panic at the call site.

use thiserror::Error;

/// A well-formed resource object could not populate the target entity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// `relationships.<key>.data.id` is absent.
    #[error("{type_name}: missing relationship '{key}'")]
    MissingRelationship { type_name: String, key: String },

    /// The resource's `type` is not the entity's type name.
    #[error("expected resource of type '{expected}', got '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// An attribute exists but cannot be converted to the field's type.
    #[error("{type_name}: invalid attribute '{field}': {reason}")]
    InvalidAttribute {
        type_name: String,
        field: String,
        reason: String,
    },

    /// The element is not a resource object at all.
    #[error("malformed resource object: {0}")]
    Malformed(String),
}

/// Failures of the persistent store or the byte codec.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("persisted partition for '{key}' is not an object")]
    Corrupt { key: String },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Wire errors ──────────────────────────────────────────────────
    #[error("Wire format error: {message}")]
    WireFormat { message: String },

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    // ── Transport errors (passed through unchanged) ──────────────────
    #[error(transparent)]
    Transport(#[from] cachet_api::Error),

    // ── Request errors ───────────────────────────────────────────────
    #[error("Cannot {operation} {type_name}: entity has no id")]
    MissingId {
        type_name: &'static str,
        operation: &'static str,
    },

    #[error("Request processor is not running")]
    NotRunning,

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl CoreError {
    pub(crate) fn wire(message: impl Into<String>) -> Self {
        Self::WireFormat {
            message: message.into(),
        }
    }

    /// Returns `true` if the failure came from the transport collaborator.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The underlying mapping failure, if any.
    pub fn as_mapping(&self) -> Option<&MappingError> {
        match self {
            Self::Mapping(e) => Some(e),
            _ => None,
        }
    }
}
