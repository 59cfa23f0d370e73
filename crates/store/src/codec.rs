//! The bucket key codec.
//!
//! The backing store only scans forward efficiently, so chronological keys
//! are stored reversed: ascending key order equals descending timestamp
//! order, and "most recent first" reads become cheap forward scans.
//!
//! Row keys are the reversed, bucket-truncated timestamp. Column keys are
//! the reversed exact timestamp. Both are encoded as fixed-width
//! zero-padded decimal strings, so lexicographic order over the encoded
//! keys equals numeric order over the reversed values.

use crate::BucketSize;
use bucketlog_api::{StoreError, StoreResult, Timestamp};

/// The base every timestamp is subtracted from to reverse its ordering.
pub const REVERSE_BASE: i64 = i64::MAX;

/// The fixed width of an encoded key.
///
/// `REVERSE_BASE - ts` spans the full u64 range once pre-epoch (negative)
/// timestamps are permitted, and u64::MAX is 20 decimal digits.
pub const KEY_WIDTH: usize = 20;

/// Encoder/decoder between wall-clock timestamps and sortable keys.
///
/// Negative (pre-epoch) timestamps are rejected with
/// [StoreError::InvalidTimestamp] unless the codec is explicitly
/// constructed to allow them.
#[derive(Debug, Clone, Copy)]
pub struct BucketKeyCodec {
    allow_negative: bool,
}

impl BucketKeyCodec {
    /// Construct a codec.
    pub fn new(allow_negative: bool) -> Self {
        Self { allow_negative }
    }

    fn check(&self, ts: Timestamp) -> StoreResult<()> {
        if ts.as_millis() < 0 && !self.allow_negative {
            return Err(StoreError::invalid_timestamp(format!(
                "negative timestamp {} rejected",
                ts.as_millis()
            )));
        }
        Ok(())
    }

    /// Encode the row key for the bucket containing `ts`.
    pub fn bucket_row(
        &self,
        ts: Timestamp,
        size: BucketSize,
    ) -> StoreResult<String> {
        self.check(ts)?;
        Ok(encode(size.truncate(ts)))
    }

    /// Encode the column key for an entry at `ts`.
    pub fn entry_column(&self, ts: Timestamp) -> StoreResult<String> {
        self.check(ts)?;
        Ok(encode(ts))
    }

    /// Decode a row key back to its bucket timestamp.
    pub fn decode_bucket_row(&self, row: &str) -> StoreResult<Timestamp> {
        decode(row)
    }

    /// Decode a column key back to its exact entry timestamp.
    pub fn decode_entry_column(&self, col: &str) -> StoreResult<Timestamp> {
        decode(col)
    }
}

fn encode(ts: Timestamp) -> String {
    // i64::MAX - i64::MIN is exactly u64::MAX, so the reversed value of
    // any timestamp fits a u64.
    let reversed = (REVERSE_BASE as i128 - ts.as_millis() as i128) as u64;
    format!("{reversed:020}")
}

fn decode(key: &str) -> StoreResult<Timestamp> {
    if key.len() != KEY_WIDTH {
        return Err(StoreError::invalid_bucket_boundary(format!(
            "encoded key '{key}' is not {KEY_WIDTH} digits"
        )));
    }
    let reversed: u64 = key.parse().map_err(|e| {
        StoreError::invalid_bucket_boundary(format!(
            "encoded key '{key}' is not numeric ({e})"
        ))
    })?;
    let ts = REVERSE_BASE as i128 - reversed as i128;
    i64::try_from(ts)
        .map(Timestamp::from_millis)
        .map_err(|_| {
            StoreError::invalid_bucket_boundary(format!(
                "encoded key '{key}' is out of timestamp range"
            ))
        })
}
