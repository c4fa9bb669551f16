//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use extstore_core::{
    ExtensionId, LocalRecord, Payload, RecordGuid, ServerTimestamp, StagedRecord, SyncStatus,
};

/// Generate an extension id.
pub fn ext_id() -> impl Strategy<Value = ExtensionId> {
    "[a-z][a-z0-9@.-]{0,31}".prop_map(ExtensionId::from)
}

/// Generate a record guid.
pub fn guid() -> impl Strategy<Value = RecordGuid> {
    "[0-9a-f]{24}".prop_map(RecordGuid::from)
}

/// Generate payload bytes of up to `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Payload> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

/// Generate an optional payload; `None` stands for a tombstone.
pub fn maybe_payload(max_len: usize) -> impl Strategy<Value = Option<Payload>> {
    prop::option::of(payload(max_len))
}

/// Generate a sync status.
pub fn sync_status() -> impl Strategy<Value = SyncStatus> {
    prop_oneof![
        Just(SyncStatus::New),
        Just(SyncStatus::Tracking),
        Just(SyncStatus::Normal),
    ]
}

/// Generate a server timestamp.
pub fn server_timestamp() -> impl Strategy<Value = ServerTimestamp> {
    (0i64..=i64::MAX / 2).prop_map(ServerTimestamp)
}

/// Generate a staged server record.
pub fn staged_record() -> impl Strategy<Value = StagedRecord> {
    (guid(), ext_id(), server_timestamp(), maybe_payload(64)).prop_map(
        |(guid, ext_id, server_modified, payload)| StagedRecord {
            guid,
            ext_id,
            server_modified,
            payload,
        },
    )
}

/// Generate a local record that honors the tombstone invariant.
pub fn local_record() -> impl Strategy<Value = LocalRecord> {
    (ext_id(), maybe_payload(64), sync_status(), 0u32..8).prop_filter_map(
        "tombstones cannot be Normal",
        |(ext_id, payload, status, change_counter)| {
            if payload.is_none() && status == SyncStatus::Normal {
                return None;
            }
            Some(LocalRecord {
                ext_id,
                payload,
                status,
                change_counter,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_local_records_validate(record in local_record()) {
            prop_assert!(record.validate().is_ok());
        }

        #[test]
        fn generated_guids_are_nonempty(g in guid()) {
            prop_assert!(!g.as_ref().is_empty());
        }
    }
}
