//! Server-side bucket digests.
//!
//! Anti-entropy needs one compact digest per bucket, computed where the
//! data lives so that raw entries never cross the network. The digest is
//! an XOR fold of the Sha256 of every cell value in the bucket row:
//! XOR is order-independent, so replicas holding the same multiset of
//! entries produce the same digest regardless of insertion or scan order.

use bucketlog_api::{Cell, ScanTransform, StoreResult};
use sha2::{Digest, Sha256};

/// The name the bucket hash transform is registered under.
pub const BUCKET_HASH_TRANSFORM: &str = "bucket-hash";

/// The priority of the bucket hash transform.
pub const BUCKET_HASH_PRIORITY: u32 = 2;

/// The column family digest cells are emitted under.
pub const HASH_FAMILY: &str = "hash";

/// Compute the digest of a multiset of values.
///
/// An empty multiset digests to the empty string, which is also the
/// padding sentinel for buckets that hold no entries at all.
pub fn bucket_digest<'a, I: IntoIterator<Item = &'a [u8]>>(
    values: I,
) -> String {
    let mut combined = [0u8; 32];
    let mut any = false;
    for value in values {
        any = true;
        let hash = Sha256::digest(value);
        for (c, h) in combined.iter_mut().zip(hash.iter()) {
            *c ^= *h;
        }
    }
    if !any {
        return String::new();
    }
    if combined.iter().all(|b| *b == 0) {
        // XOR cancels duplicate values pairwise. A zero digest over a
        // non-empty bucket almost always means duplicated entries.
        tracing::warn!("non-empty bucket digested to zero");
    }
    hex::encode(combined)
}

/// The pushdown aggregator that collapses each bucket row into one digest
/// cell.
#[derive(Debug, Default)]
pub struct BucketHashAggregator;

impl ScanTransform for BucketHashAggregator {
    fn apply(&self, row: &str, cells: Vec<Cell>) -> StoreResult<Vec<Cell>> {
        let digest =
            bucket_digest(cells.iter().map(|c| c.value.as_ref()));
        let timestamp = cells
            .iter()
            .map(|c| c.timestamp)
            .max()
            .unwrap_or(bucketlog_api::UNIX_TIMESTAMP);
        Ok(vec![Cell {
            row: row.into(),
            family: HASH_FAMILY.into(),
            qualifier: String::new(),
            visibility: String::new(),
            timestamp,
            value: bytes::Bytes::from(digest),
        }])
    }
}
