//! Bucketlog entry types.

use crate::{StoreError, StoreResult, Timestamp};
use std::cmp::Ordering;
use std::sync::Arc;

/// An entry in the changelog.
///
/// This is the basic unit of data in the bucketlog system. Entries are
/// immutable once written.
#[derive(Debug, Clone, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    /// The id of the entry. Unique within its bucket.
    pub id: String,

    /// The creation timestamp of the entry.
    ///
    /// This must be the same for every replica that sees this entry,
    /// otherwise the entry will land in different buckets on different
    /// replicas and the change trees will never converge.
    pub timestamp: Timestamp,

    /// The visibility label carried through to the stored record. An empty
    /// label means the entry is visible to any authorization set.
    pub visibility: String,

    /// The opaque-serializable field payload of the entry.
    pub fields: serde_json::Value,
}

impl Entry {
    /// Construct a new entry.
    pub fn new(
        id: impl Into<String>,
        timestamp: Timestamp,
        visibility: impl Into<String>,
        fields: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            visibility: visibility.into(),
            fields,
        }
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.timestamp, &self.id).cmp(&(&other.timestamp, &other.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Encodes entries to and from stored bytes.
///
/// A serializer instance is passed into each store at construction, so
/// there is no process-wide shared serializer state and tests can isolate
/// their encodings.
pub trait EntrySerializer: 'static + Send + Sync + std::fmt::Debug {
    /// Serialize an entry to bytes for storage.
    fn serialize(&self, entry: &Entry) -> StoreResult<bytes::Bytes>;

    /// Deserialize an entry from stored bytes.
    fn deserialize(&self, data: &[u8]) -> StoreResult<Entry>;
}

/// Trait-object version of the entry serializer.
pub type DynEntrySerializer = Arc<dyn EntrySerializer>;

/// The default [EntrySerializer], encoding entries as JSON.
#[derive(Debug, Default)]
pub struct JsonEntrySerializer;

impl EntrySerializer for JsonEntrySerializer {
    fn serialize(&self, entry: &Entry) -> StoreResult<bytes::Bytes> {
        serde_json::to_vec(entry).map(bytes::Bytes::from).map_err(|e| {
            StoreError::write_failure_src("failed to serialize entry", e)
        })
    }

    fn deserialize(&self, data: &[u8]) -> StoreResult<Entry> {
        serde_json::from_slice(data).map_err(|e| {
            StoreError::other_src("failed to deserialize entry", e)
        })
    }
}
