//! Strong type definitions for extstore.
//!
//! Identifiers are newtypes to prevent misuse at compile time: an
//! [`ExtensionId`] (the logical key) can never be passed where a
//! [`RecordGuid`] (the server's key) is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The payload is an opaque blob.
///
/// The engine never looks inside it; equality is byte equality. `None` in the
/// record types means "deleted" (a tombstone locally, a deletion marker on
/// the server).
pub type Payload = bytes::Bytes;

/// The logical key: the id of the extension the data belongs to.
///
/// Immutable once a record is created. At most one local record and one
/// mirror record exist per `ExtensionId`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(pub String);

impl ExtensionId {
    /// Create a new ExtensionId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionId({})", self.0)
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExtensionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ExtensionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque server-assigned record identifier.
///
/// The server keys records by guid, not by extension id; the mirror carries
/// both so the two keyspaces can be joined. A record that has never been on
/// the server gets a freshly generated guid at upload time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordGuid(pub String);

impl RecordGuid {
    /// Create a guid from an existing string (e.g. one the server sent us).
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    /// Generate a fresh random guid for a record the server has never seen.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Get the guid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RecordGuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordGuid({})", self.0)
    }
}

impl fmt::Display for RecordGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordGuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordGuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A server-assigned modification timestamp, in milliseconds.
///
/// Only the server mints these; the engine uses them for conflict ordering
/// and never compares them against local clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTimestamp(pub i64);

impl ServerTimestamp {
    /// Get the milliseconds for the timestamp.
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ServerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ServerTimestamp {
    fn from(ms: i64) -> Self {
        Self(ms)
    }
}
