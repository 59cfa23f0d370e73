use crate::{BucketKeyCodec, BucketSize};
use bucketlog_api::{
    DynBufferedWriter, DynEntrySerializer, Entry, Mutation, StoreError,
    StoreResult,
};

/// Writes entries into their bucket rows through the engine's buffered
/// writer.
///
/// Each entry becomes one mutation: row is the reversed bucket key, the
/// column family is the reversed exact timestamp, the qualifier is the
/// entry id, and the value is the serialized entry.
#[derive(Debug)]
pub(crate) struct TimeBucketedWriter {
    writer: DynBufferedWriter,
    serializer: DynEntrySerializer,
    codec: BucketKeyCodec,
    bucket_size: BucketSize,
}

impl TimeBucketedWriter {
    pub(crate) fn new(
        writer: DynBufferedWriter,
        serializer: DynEntrySerializer,
        codec: BucketKeyCodec,
        bucket_size: BucketSize,
    ) -> Self {
        Self {
            writer,
            serializer,
            codec,
            bucket_size,
        }
    }

    /// Write a batch of entries and flush.
    ///
    /// The whole batch is keyed and serialized before anything is
    /// submitted, so one bad entry anywhere aborts the batch with nothing
    /// applied.
    pub(crate) async fn put(&self, entries: Vec<Entry>) -> StoreResult<()> {
        let mut mutations = Vec::with_capacity(entries.len());
        for entry in &entries {
            let row =
                self.codec.bucket_row(entry.timestamp, self.bucket_size)?;
            let column = self.codec.entry_column(entry.timestamp)?;
            let value = self
                .serializer
                .serialize(entry)
                .map_err(as_write_failure)?;
            let mut mutation = Mutation::new(row);
            mutation.put(
                column,
                entry.id.clone(),
                entry.visibility.clone(),
                entry.timestamp,
                value,
            );
            mutations.push(mutation);
        }

        self.writer
            .submit(mutations)
            .await
            .map_err(as_write_failure)?;
        self.writer.flush().await.map_err(as_write_failure)
    }
}

fn as_write_failure(err: StoreError) -> StoreError {
    match err {
        err @ StoreError::WriteFailure { .. } => err,
        other => StoreError::write_failure_src("entry write failed", other),
    }
}
