//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a memory-backed storage plus
//! a tiny in-process stand-in for the server side of a sync pass.

use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use extstore_core::{Payload, RecordGuid, ServerTimestamp, StagedRecord};
use extstore_store::MemoryStore;
use extstore_sync::MergeReport;
use extstore::{ExtensionStorage, Result};

/// A test fixture wrapping memory-backed storage and a pass clock.
///
/// The clock is atomic so the fixture stays usable from multi-threaded
/// test runtimes.
pub struct TestFixture {
    pub storage: ExtensionStorage<MemoryStore>,
    /// Timestamp handed out for the next confirmed upload.
    clock: AtomicI64,
}

impl TestFixture {
    /// Create a new fixture with empty storage.
    pub fn new() -> Self {
        Self {
            storage: ExtensionStorage::open_memory(),
            clock: AtomicI64::new(1000),
        }
    }

    /// Build a payload from a string literal.
    pub fn payload(data: &str) -> Payload {
        Bytes::copy_from_slice(data.as_bytes())
    }

    /// Build a server record carrying data for `ext_id`.
    ///
    /// The guid is derived from the extension id so repeated calls in one
    /// test agree with each other, the way a real server would.
    pub fn server_record(&self, ext_id: &str, data: &str) -> StagedRecord {
        StagedRecord {
            guid: RecordGuid::from(format!("guid-{ext_id}")),
            ext_id: ext_id.into(),
            server_modified: ServerTimestamp(self.clock.load(Ordering::Relaxed)),
            payload: Some(Self::payload(data)),
        }
    }

    /// Build a server tombstone for `ext_id`.
    pub fn server_tombstone(&self, ext_id: &str) -> StagedRecord {
        StagedRecord {
            guid: RecordGuid::from(format!("guid-{ext_id}")),
            ext_id: ext_id.into(),
            server_modified: ServerTimestamp(self.clock.load(Ordering::Relaxed)),
            payload: None,
        }
    }

    /// Advance the pass clock and return the new timestamp.
    pub fn tick(&self) -> ServerTimestamp {
        ServerTimestamp(self.clock.fetch_add(1000, Ordering::Relaxed) + 1000)
    }

    /// Run a complete sync pass: apply `records` from the server, then
    /// upload and confirm every pending local change.
    pub async fn do_sync(&self, records: Vec<StagedRecord>) -> Result<MergeReport> {
        let report = self.storage.apply_incoming(records).await?;
        let outgoing = self.storage.fetch_outgoing().await?;
        if !outgoing.is_empty() {
            self.storage.record_uploaded(&outgoing, self.tick()).await?;
        }
        Ok(report)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
