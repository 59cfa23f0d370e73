//! Store configuration.

use crate::BucketSize;
use bucketlog_api::{Authorizations, WriterConfig};

/// Configuration for a changelog store instance.
///
/// Two replicas must agree on [StoreConfig::bucket_size] for their change
/// trees to be comparable. Everything else is local tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The bucket granularity entries are grouped under.
    ///
    /// Default: half_hour.
    pub bucket_size: BucketSize,

    /// The backing table name.
    ///
    /// Default: "changelog".
    pub table_name: String,

    /// The writer flushes once this many bytes of mutations are pending.
    ///
    /// Default: 100_000.
    pub max_buffer_bytes: usize,

    /// The writer flushes once the oldest pending mutation has waited this
    /// long.
    ///
    /// Default: 10s.
    pub max_latency: std::time::Duration,

    /// Concurrency bound for batch scans and background flushing.
    ///
    /// Default: 3.
    pub num_workers: usize,

    /// Whether pre-epoch (negative) timestamps are accepted.
    ///
    /// Default: false.
    pub allow_negative_timestamps: bool,

    /// The visibility labels scans run under.
    ///
    /// Default: empty, only unlabelled cells are visible.
    pub authorizations: Authorizations,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket_size: BucketSize::HalfHour,
            table_name: "changelog".into(),
            max_buffer_bytes: 100_000,
            max_latency: std::time::Duration::from_secs(10),
            num_workers: 3,
            allow_negative_timestamps: false,
            authorizations: Authorizations::none(),
        }
    }
}

impl StoreConfig {
    /// The writer thresholds this configuration implies.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_buffer_bytes: self.max_buffer_bytes,
            max_latency: self.max_latency,
            num_workers: self.num_workers,
        }
    }
}
