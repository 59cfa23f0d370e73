//! The changelog store itself.

use crate::{
    assemble_leaves, reader, writer::TimeBucketedWriter, BucketHashAggregator,
    BucketKeyCodec, MerkleTree, StoreConfig, BUCKET_HASH_PRIORITY,
    BUCKET_HASH_TRANSFORM, DEFAULT_BRANCHING,
};
use bucketlog_api::{
    DynEntrySerializer, DynTabletEngine, Entry, RowRange, StoreError,
    StoreResult, Timestamp,
};
use futures::stream::BoxStream;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A lazy stream of entries read back out of the store.
pub type EntryStream = BoxStream<'static, StoreResult<Entry>>;

/// A time-bucketed append log over a [bucketlog_api::TabletEngine].
///
/// Construction registers the bucket hash aggregator with the engine and
/// opens a buffered writer, so a store is ready to serve all three
/// operations as soon as [ChangelogStore::create] resolves. Creating two
/// stores against the same table is benign.
#[derive(Debug)]
pub struct ChangelogStore {
    engine: DynTabletEngine,
    serializer: DynEntrySerializer,
    config: StoreConfig,
    codec: BucketKeyCodec,
    writer: TimeBucketedWriter,
}

impl ChangelogStore {
    /// Construct a store over the given engine.
    pub async fn create(
        engine: DynTabletEngine,
        serializer: DynEntrySerializer,
        config: StoreConfig,
    ) -> StoreResult<ChangelogStore> {
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
            .register_scan_transform(
                table.clone(),
                BUCKET_HASH_TRANSFORM.into(),
                BUCKET_HASH_PRIORITY,
                Arc::new(BucketHashAggregator),
            )
            .await?;

        let codec = BucketKeyCodec::new(config.allow_negative_timestamps);
        let buffered = engine
            .buffered_writer(table, config.writer_config())
            .await?;
        let writer = TimeBucketedWriter::new(
            buffered,
            serializer.clone(),
            codec,
            config.bucket_size,
        );

        Ok(ChangelogStore {
            engine,
            serializer,
            config,
            codec,
            writer,
        })
    }

    /// The configuration this store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Write a batch of entries durably.
    ///
    /// The batch is atomic in the failure sense: any invalid entry or
    /// engine failure aborts the whole batch before anything is applied,
    /// and the error is a [StoreError::WriteFailure] unless the entry
    /// itself was invalid.
    pub async fn put(&self, entries: Vec<Entry>) -> StoreResult<()> {
        self.writer.put(entries).await
    }

    /// Build the change tree over the half-open window `[start, stop)`.
    ///
    /// The bucket digests are computed engine-side by the registered
    /// aggregator, so only one digest per populated bucket crosses the
    /// wire. The resulting tree covers every bucket in the window (a
    /// `stop` on a bucket boundary excludes its own bucket), with
    /// empty-digest leaves for unpopulated buckets, so its shape depends
    /// only on the window and the configured bucket size.
    pub async fn get_change_tree(
        &self,
        start: Timestamp,
        stop: Timestamp,
    ) -> StoreResult<MerkleTree> {
        if start.as_millis() >= stop.as_millis() {
            return Err(StoreError::invalid_timestamp(format!(
                "window start {} is not before stop {}",
                start.as_millis(),
                stop.as_millis()
            )));
        }

        let size = self.config.bucket_size;
        // Keys are reversed, so the last included bucket is the smaller
        // row key.
        let range = RowRange::new(
            self.codec.bucket_row(size.truncate_end(stop), size)?,
            self.codec.bucket_row(start, size)?,
        );
        let cells = self
            .engine
            .scan(
                self.config.table_name.clone(),
                range,
                self.config.authorizations.clone(),
                Some(BUCKET_HASH_TRANSFORM.into()),
            )
            .await?;

        let mut rows = Vec::with_capacity(cells.len());
        for cell in cells {
            let ts = self.codec.decode_bucket_row(&cell.row)?;
            let digest =
                String::from_utf8(cell.value.to_vec()).map_err(|e| {
                    StoreError::other_src("bucket digest is not utf8", e)
                })?;
            rows.push((ts, digest));
        }

        let leaves = assemble_leaves(rows, start, stop, size)?;
        MerkleTree::build(leaves, DEFAULT_BRANCHING)
    }

    /// Stream the full entries of the given buckets.
    ///
    /// This is the repair half of anti-entropy: once tree comparison has
    /// localized divergent buckets, their contents are fetched here. The
    /// buckets are scanned concurrently up to the configured worker count,
    /// so no ordering across buckets is guaranteed; within one bucket
    /// entries arrive newest first. A failed bucket surfaces as an `Err`
    /// item without ending the stream.
    pub async fn get_changes(
        &self,
        buckets: Vec<Timestamp>,
    ) -> StoreResult<EntryStream> {
        let size = self.config.bucket_size;
        // Distinct rows only: two timestamps in the same bucket must not
        // fetch that bucket twice.
        let rows = buckets
            .into_iter()
            .map(|ts| self.codec.bucket_row(ts, size))
            .collect::<StoreResult<BTreeSet<String>>>()?;
        let ranges =
            rows.into_iter().map(RowRange::single_row).collect();

        let cells = self
            .engine
            .batch_scan(
                self.config.table_name.clone(),
                ranges,
                self.config.authorizations.clone(),
                self.config.num_workers,
            )
            .await?;
        Ok(reader::entry_stream(cells, self.serializer.clone()))
    }
}
