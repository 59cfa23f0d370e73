/// Bucketlog timestamp.
///
/// Internally i64 milliseconds from unix epoch, which is the resolution the
/// bucket key codec and the statistics time units operate at. The store
/// only ever constructs, compares, and buckets timestamps, so the surface
/// is the millisecond accessor pair; callers do their own clock reads.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

/// The unix epoch as a [Timestamp].
pub const UNIX_TIMESTAMP: Timestamp = Timestamp(0);

impl Timestamp {
    /// Construct a timestamp from i64 milliseconds since unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get the i64 milliseconds since unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }
}
