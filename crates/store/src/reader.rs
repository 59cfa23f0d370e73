use bucketlog_api::{CellStream, DynEntrySerializer, Entry, StoreResult};
use futures::stream::BoxStream;
use futures::StreamExt;

/// Map a lazy cell stream into a lazy entry stream.
///
/// Errors pass through in place: a failed range surfaces as an `Err` item
/// without terminating the rest of the stream.
pub(crate) fn entry_stream(
    cells: CellStream,
    serializer: DynEntrySerializer,
) -> BoxStream<'static, StoreResult<Entry>> {
    cells
        .map(move |cell| {
            let cell = cell?;
            serializer.deserialize(&cell.value)
        })
        .boxed()
}
