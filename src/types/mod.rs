//! Identifiers, cache keys, and the crate-wide error type.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, externally supplied session identifier.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an identifier handed out by the session layer.
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        SessionId(value)
    }
}

/// Stable storage identity of one named attribute.
///
/// Allocated the first time a name is bound within a session and kept until the
/// name is removed, so attribute keys have a fixed shape regardless of the name.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct AttributeId(Uuid);

impl AttributeId {
    /// Allocates a fresh identifier.
    pub fn random() -> Self {
        AttributeId(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for AttributeId {
    fn from(value: Uuid) -> Self {
        AttributeId(value)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute name to attribute id mapping stored in the names index.
pub type NamesMap = BTreeMap<String, AttributeId>;

/// Key of the session metadata entry owned by the surrounding session layer.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MetaDataKey(pub SessionId);

/// Key of a session's names index entry.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NamesKey(pub SessionId);

/// Key of one attribute entry.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct AttributeKey {
    /// Owning session.
    pub session: SessionId,
    /// Attribute identity within the session.
    pub attribute: AttributeId,
}

impl AttributeKey {
    /// Builds the key for `attribute` of `session`.
    pub fn new(session: SessionId, attribute: AttributeId) -> Self {
        Self { session, attribute }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session, self.attribute)
    }
}

/// Session-level metadata kept next to the attribute entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionMetaData {
    /// When the session was created.
    pub created: SystemTime,
    /// Last time the session was accessed.
    pub last_accessed: SystemTime,
    /// Inactivity interval after which the session expires.
    pub max_inactive: Duration,
}

impl SessionMetaData {
    /// Metadata for a session created now.
    pub fn new(max_inactive: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            created: now,
            last_accessed: now,
            max_inactive,
        }
    }

    /// Whether the session has been idle longer than its inactivity interval.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        if self.max_inactive.is_zero() {
            return false;
        }
        now.duration_since(self.last_accessed)
            .map(|idle| idle >= self.max_inactive)
            .unwrap_or(false)
    }
}

/// Errors surfaced by the session attribute layer.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The backing store failed.
    #[error("store: {0}")]
    Store(String),
    /// A store, executor, or factory was used after shutdown.
    #[error("{0} is closed")]
    Closed(&'static str),
    /// A value could not be marshalled.
    #[error("encode: {0}")]
    Encode(String),
    /// Stored bytes could not be turned back into a value.
    #[error("decode: {0}")]
    Decode(String),
    /// The names index references an attribute entry that does not exist.
    #[error("missing attribute entry {0}")]
    MissingEntry(AttributeKey),
    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),
    /// I/O failure while reading configuration.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;
