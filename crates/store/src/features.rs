//! Continuous metric aggregation.
//!
//! The feature store keeps one [Metric] cell per dimension key per bucket,
//! at every granularity at once, and leans on the registered
//! [crate::StatsCombiner] to fold new observations into existing cells
//! inside the storage tier. Writes therefore stay cheap no matter how many
//! observations land in a bucket, and queries read back fully reduced
//! aggregates.

use crate::{
    metric_families, metric_family, BucketKeyCodec, BucketSize,
    StatsCombiner, STATS_COMBINER, STATS_PRIORITY,
};
use bucketlog_api::{
    Authorizations, DynBufferedWriter, DynTabletEngine, Metric,
    MetricFeature, Mutation, RowRange, StoreError, StoreResult, Timestamp,
    WriterConfig,
};
use std::sync::Arc;

/// The base name of the metric column families.
pub const METRIC_NAME: &str = "metric";

/// Separator between dimension components inside row and column keys.
/// NUL cannot appear in a dimension value.
const DIM_SEP: char = '\0';

/// Configuration for a feature store instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// The backing table name.
    ///
    /// Default: "features".
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

    /// Concurrency bound the engine may use for background flushing.
    ///
    /// Default: 3.
    pub num_workers: usize,

    /// Whether pre-epoch (negative) timestamps are accepted.
    ///
    /// Default: false.
    pub allow_negative_timestamps: bool,

    /// The visibility labels queries run under.
    pub authorizations: Authorizations,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            table_name: "features".into(),
            max_buffer_bytes: 100_000,
            max_latency: std::time::Duration::from_secs(10),
            num_workers: 3,
            allow_negative_timestamps: false,
            authorizations: Authorizations::none(),
        }
    }
}

impl FeatureConfig {
    fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_buffer_bytes: self.max_buffer_bytes,
            max_latency: self.max_latency,
            num_workers: self.num_workers,
        }
    }
}

/// A continuously aggregating statistics store over a
/// [bucketlog_api::TabletEngine].
#[derive(Debug)]
pub struct FeatureStore {
    engine: DynTabletEngine,
    config: FeatureConfig,
    codec: BucketKeyCodec,
    writer: DynBufferedWriter,
}

impl FeatureStore {
    /// Construct a feature store over the given engine.
    ///
    /// Registers the statistics combiner for every metric column family,
    /// so aggregation happens engine-side from the first write on.
    pub async fn create(
        engine: DynTabletEngine,
        config: FeatureConfig,
    ) -> StoreResult<FeatureStore> {
        let table = config.table_name.clone();
        engine
            .create_table_if_absent(table.clone())
            .await
            .map_err(|e| {
                StoreError::configuration_src(
                    format!("failed to create table '{table}'"),
                    e,
                )
            })?;
        engine
            .register_combiner(
                table.clone(),
                STATS_COMBINER.into(),
                STATS_PRIORITY,
                metric_families(METRIC_NAME),
                Arc::new(StatsCombiner),
            )
            .await?;

        let writer = engine
            .buffered_writer(table, config.writer_config())
            .await?;

        Ok(FeatureStore {
            engine,
            codec: BucketKeyCodec::new(config.allow_negative_timestamps),
            config,
            writer,
        })
    }

    fn feature_row(
        &self,
        group: &str,
        ts: Timestamp,
        unit: BucketSize,
    ) -> StoreResult<String> {
        check_dimension("group", group)?;
        Ok(format!(
            "{group}{DIM_SEP}{}",
            self.codec.bucket_row(ts, unit)?
        ))
    }

    /// Write a batch of observations durably.
    ///
    /// Each feature lands in every granularity at once, one cell per time
    /// unit; the combiner folds it into whatever aggregate the cell
    /// already holds.
    pub async fn put(
        &self,
        features: Vec<MetricFeature>,
    ) -> StoreResult<()> {
        let mut mutations = Vec::with_capacity(features.len());
        for feature in &features {
            check_dimension("kind", &feature.kind)?;
            check_dimension("name", &feature.name)?;
            for unit in BucketSize::ALL {
                let mut mutation = Mutation::new(self.feature_row(
                    &feature.group,
                    feature.timestamp,
                    unit,
                )?);
                mutation.put(
                    metric_family(METRIC_NAME, unit),
                    format!(
                        "{}{DIM_SEP}{}",
                        feature.kind, feature.name
                    ),
                    feature.visibility.clone(),
                    feature.timestamp,
                    feature.vector.encode(),
                );
                mutations.push(mutation);
            }
        }

        self.writer.submit(mutations).await?;
        self.writer.flush().await
    }

    /// Read the aggregates of one dimension key at one granularity over
    /// the window `[start, stop]`, newest bucket first.
    pub async fn query(
        &self,
        group: &str,
        kind: &str,
        name: &str,
        unit: BucketSize,
        start: Timestamp,
        stop: Timestamp,
    ) -> StoreResult<Vec<MetricFeature>> {
        if start.as_millis() > stop.as_millis() {
            return Err(StoreError::invalid_timestamp(format!(
                "window start {} is after stop {}",
                start.as_millis(),
                stop.as_millis()
            )));
        }
        check_dimension("kind", kind)?;
        check_dimension("name", name)?;

        // Keys are reversed, so stop is the smaller row key.
        let range = RowRange::new(
            self.feature_row(group, stop, unit)?,
            self.feature_row(group, start, unit)?,
        );
        let cells = self
            .engine
            .scan(
                self.config.table_name.clone(),
                range,
                self.config.authorizations.clone(),
                None,
            )
            .await?;

        let family = metric_family(METRIC_NAME, unit);
        let qualifier = format!("{kind}{DIM_SEP}{name}");
        let mut out = Vec::new();
        for cell in cells {
            if cell.family != family || cell.qualifier != qualifier {
                continue;
            }
            let encoded = cell
                .row
                .split(DIM_SEP)
                .nth(1)
                .ok_or_else(|| {
                    StoreError::other("malformed feature row key")
                })?;
            out.push(MetricFeature {
                timestamp: self.codec.decode_bucket_row(encoded)?,
                group: group.into(),
                kind: kind.into(),
                name: name.into(),
                visibility: cell.visibility.clone(),
                vector: Metric::decode(&cell.value)?,
            });
        }
        Ok(out)
    }
}

fn check_dimension(which: &str, value: &str) -> StoreResult<()> {
    if value.contains(DIM_SEP) {
        return Err(StoreError::configuration(format!(
            "dimension {which} contains a NUL separator"
        )));
    }
    Ok(())
}
