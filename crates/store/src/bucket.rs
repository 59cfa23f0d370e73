//! Bucket granularities.
//!
//! A bucket is a fixed-width time interval used as the unit of storage-row
//! granularity and aggregation. Every bucket boundary is a multiple of the
//! width from the unix epoch, so two replicas that agree on a
//! [BucketSize] always agree on bucket boundaries.

use bucketlog_api::{StoreError, StoreResult, Timestamp};

/// An enumerated bucket granularity.
///
/// The widths live in a single static table rather than on the variants,
/// so adding a granularity is a one-line change.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BucketSize {
    /// Five minute buckets.
    FiveMinute,
    /// Fifteen minute buckets.
    FifteenMinute,
    /// Half hour buckets.
    HalfHour,
    /// One hour buckets.
    Hour,
    /// One day buckets.
    Day,
}

/// The granularity table. Every accessor reads from here.
const WIDTHS: &[(BucketSize, &str, i64)] = &[
    (BucketSize::FiveMinute, "five_minute", 5 * 60 * 1000),
    (BucketSize::FifteenMinute, "fifteen_minute", 15 * 60 * 1000),
    (BucketSize::HalfHour, "half_hour", 30 * 60 * 1000),
    (BucketSize::Hour, "hour", 60 * 60 * 1000),
    (BucketSize::Day, "day", 24 * 60 * 60 * 1000),
];

impl BucketSize {
    /// All granularities, smallest first.
    pub const ALL: [BucketSize; 5] = [
        BucketSize::FiveMinute,
        BucketSize::FifteenMinute,
        BucketSize::HalfHour,
        BucketSize::Hour,
        BucketSize::Day,
    ];

    fn entry(&self) -> &'static (BucketSize, &'static str, i64) {
        WIDTHS
            .iter()
            .find(|(size, _, _)| size == self)
            .expect("every variant is in the width table")
    }

    /// The bucket width in milliseconds.
    pub fn width_ms(&self) -> i64 {
        self.entry().2
    }

    /// The stable name of this granularity, used in column families.
    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Look a granularity up by its stable name.
    pub fn parse(name: &str) -> StoreResult<BucketSize> {
        WIDTHS
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(size, _, _)| *size)
            .ok_or_else(|| {
                StoreError::invalid_bucket_boundary(format!(
                    "unknown bucket size '{name}'"
                ))
            })
    }

    /// Truncate a timestamp down to the start of its bucket.
    pub fn truncate(&self, ts: Timestamp) -> Timestamp {
        let width = self.width_ms();
        // rem_euclid keeps the floor semantics for pre-epoch timestamps.
        Timestamp::from_millis(
            ts.as_millis() - ts.as_millis().rem_euclid(width),
        )
    }

    /// The start of the last bucket of a half-open window ending at
    /// `stop`. A `stop` on a bucket boundary excludes its own bucket.
    pub fn truncate_end(&self, stop: Timestamp) -> Timestamp {
        self.truncate(Timestamp::from_millis(stop.as_millis() - 1))
    }
}
