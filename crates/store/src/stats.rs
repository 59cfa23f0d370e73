//! The pushdown statistics combiner.
//!
//! Metric aggregates are stored one cell per `(dimension key, bucket)` and
//! merged by the storage tier itself: at compaction time when a new
//! observation lands on an existing cell, and at scan time when several
//! partial aggregates for the same key are visible. Merging is delegated
//! to [Metric::merge], which is associative and commutative, so the split
//! points never affect the result.

use crate::BucketSize;
use bucketlog_api::{CellCombiner, Metric, StoreResult};

/// The name the statistics combiner is registered under.
pub const STATS_COMBINER: &str = "stats";

/// The priority of the statistics combiner.
pub const STATS_PRIORITY: u32 = 14;

/// The column family metric cells for one time unit are stored under.
pub fn metric_family(name: &str, unit: BucketSize) -> String {
    format!("{name}_{}", unit.name())
}

/// The metric families across every time unit, the set the combiner is
/// registered for.
pub fn metric_families(name: &str) -> Vec<String> {
    BucketSize::ALL
        .iter()
        .map(|unit| metric_family(name, *unit))
        .collect()
}

/// Combiner that folds co-keyed metric cells into one aggregate.
#[derive(Debug, Default)]
pub struct StatsCombiner;

impl CellCombiner for StatsCombiner {
    fn combine(
        &self,
        values: Vec<bytes::Bytes>,
    ) -> StoreResult<bytes::Bytes> {
        let mut merged: Option<Metric> = None;
        for value in &values {
            let metric = Metric::decode(value)?;
            merged = Some(match merged {
                Some(acc) => acc.merge(&metric)?,
                None => metric,
            });
        }
        Ok(merged.map(|m| m.encode()).unwrap_or_default())
    }
}
