//! Bucketlog metric aggregate types.

use crate::{StoreError, StoreResult, Timestamp};

/// A compact statistical aggregate over a multiset of i64 observations.
///
/// The merge operation is associative and commutative, so partial
/// aggregates can be merged at arbitrary points (scan time, compaction
/// time, across partitions) and always produce the same result as
/// aggregating the whole multiset directly.
///
/// Sums are widened to i128 so that merging cannot silently wrap the i64
/// observation domain. An overflow of the widened accumulators is surfaced
/// as [StoreError::MetricOverflow] rather than clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    /// The smallest observation seen.
    pub min: i64,

    /// The largest observation seen.
    pub max: i64,

    /// The sum of all observations.
    pub sum: i128,

    /// The number of observations.
    pub count: u64,

    /// The sum of the squares of all observations. Grows quadratically,
    /// which is why this field in particular needs the widened type.
    pub sum_square: i128,
}

impl Metric {
    /// Construct the aggregate of a single observation.
    pub fn from_observation(value: i64) -> Self {
        let v = value as i128;
        Self {
            min: value,
            max: value,
            sum: v,
            count: 1,
            sum_square: v * v,
        }
    }

    /// Merge two aggregates.
    ///
    /// Merging with a single-observation aggregate is how observations are
    /// folded in; merging an aggregate with nothing is the identity.
    pub fn merge(&self, other: &Metric) -> StoreResult<Metric> {
        Ok(Metric {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum.checked_add(other.sum).ok_or_else(|| {
                StoreError::metric_overflow("sum overflowed i128")
            })?,
            count: self.count.checked_add(other.count).ok_or_else(|| {
                StoreError::metric_overflow("count overflowed u64")
            })?,
            sum_square: self
                .sum_square
                .checked_add(other.sum_square)
                .ok_or_else(|| {
                    StoreError::metric_overflow("sum_square overflowed i128")
                })?,
        })
    }

    /// Encode as the stored value form: plain delimited numeric fields
    /// `min,max,sum,count,sum_square`.
    pub fn encode(&self) -> bytes::Bytes {
        bytes::Bytes::from(format!(
            "{},{},{},{},{}",
            self.min, self.max, self.sum, self.count, self.sum_square
        ))
    }

    /// Decode from the stored value form.
    pub fn decode(data: &[u8]) -> StoreResult<Metric> {
        let text = std::str::from_utf8(data).map_err(|e| {
            StoreError::other_src("metric value is not utf8", e)
        })?;
        let mut fields = text.split(',');
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| StoreError::other("short metric value"))
        };
        let metric = Metric {
            min: parse_field(next()?)?,
            max: parse_field(next()?)?,
            sum: parse_field(next()?)?,
            count: parse_field(next()?)?,
            sum_square: parse_field(next()?)?,
        };
        if fields.next().is_some() {
            return Err(StoreError::other("trailing metric fields"));
        }
        Ok(metric)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str) -> StoreResult<T>
where
    T::Err: std::error::Error + 'static + Send + Sync,
{
    field
        .parse()
        .map_err(|e| StoreError::other_src("bad metric field", e))
}

/// One metric aggregate under its full dimension key.
///
/// Only cells sharing the exact dimension key (group, kind, name,
/// visibility, time unit) are ever merged by the statistics combiner; the
/// time unit is carried by the column the feature is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFeature {
    /// The observation timestamp. Truncated to the time-unit bucket when
    /// stored.
    pub timestamp: Timestamp,

    /// The dimension group.
    pub group: String,

    /// The dimension type.
    pub kind: String,

    /// The dimension name.
    pub name: String,

    /// The visibility label of the aggregate.
    pub visibility: String,

    /// The aggregate vector.
    pub vector: Metric,
}

impl MetricFeature {
    /// Construct a feature from a single observation under the given
    /// dimension key.
    pub fn from_observation(
        timestamp: Timestamp,
        group: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        visibility: impl Into<String>,
        value: i64,
    ) -> Self {
        Self {
            timestamp,
            group: group.into(),
            kind: kind.into(),
            name: name.into(),
            visibility: visibility.into(),
            vector: Metric::from_observation(value),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn aggregate(observations: &[i64]) -> Metric {
        let mut out = Metric::from_observation(observations[0]);
        for o in &observations[1..] {
            out = out.merge(&Metric::from_observation(*o)).unwrap();
        }
        out
    }

    #[test]
    fn aggregate_example() {
        // [3, 7, 5] -> {min: 3, max: 7, sum: 15, count: 3, sumSquare: 83}
        let m = aggregate(&[3, 7, 5]);
        assert_eq!(3, m.min);
        assert_eq!(7, m.max);
        assert_eq!(15, m.sum);
        assert_eq!(3, m.count);
        assert_eq!(83, m.sum_square);
    }

    #[test]
    fn merge_is_partition_independent() {
        // splitting [3, 7, 5] into [3] and [7, 5] then merging must yield
        // the same tuple as aggregating the whole multiset directly
        let whole = aggregate(&[3, 7, 5]);
        let split = aggregate(&[3]).merge(&aggregate(&[7, 5])).unwrap();
        assert_eq!(whole, split);
    }

    #[test]
    fn merge_is_commutative() {
        let a = aggregate(&[-4, 12]);
        let b = aggregate(&[9]);
        assert_eq!(a.merge(&b).unwrap(), b.merge(&a).unwrap());
    }

    #[test]
    fn merge_with_extremes_does_not_wrap() {
        let a = Metric::from_observation(i64::MAX);
        let b = Metric::from_observation(i64::MAX);
        let m = a.merge(&b).unwrap();
        assert_eq!(i64::MAX as i128 * 2, m.sum);
        assert_eq!(2, m.count);
    }

    #[test]
    fn overflow_is_an_error_not_a_clamp() {
        let a = Metric {
            min: 0,
            max: 0,
            sum: 0,
            count: 0,
            sum_square: i128::MAX,
        };
        let e = a.merge(&Metric::from_observation(2)).unwrap_err();
        assert!(matches!(e, StoreError::MetricOverflow { .. }));
    }

    #[test]
    fn value_codec() {
        let m = aggregate(&[3, 7, 5]);
        assert_eq!(&b"3,7,15,3,83"[..], &Metric::decode(&m.encode()).unwrap().encode()[..]);

        assert!(Metric::decode(b"1,2,3").is_err());
        assert!(Metric::decode(b"1,2,3,4,5,6").is_err());
        assert!(Metric::decode(b"a,b,c,d,e").is_err());
    }
}
