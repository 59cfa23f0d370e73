//! Bucketlog error types.

use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core bucketlog error type. Used by all external bucketlog apis as
/// well as internally in the engine implementations.
///
/// Callers are expected to branch on the variant rather than matching on
/// message strings. The variants follow the failure taxonomy of the store:
/// configuration problems are fatal and never retried automatically, write
/// failures abort the whole in-flight batch, and codec rejections are local
/// to the offending timestamp.
///
/// This type is required to implement `Clone` to ease the use of
/// shared futures, which require the entire `Result` to be `Clone`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store was constructed or used with an unusable configuration,
    /// for example a table that could not be created. Fatal; surfaced
    /// immediately and never retried automatically.
    #[error("configuration error: {ctx} (src: {src})")]
    Configuration {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// A record could not be serialized or submitted. The in-flight batch
    /// is aborted; nothing from the batch is partially applied, and the
    /// caller must retry the whole batch.
    #[error("write failure: {ctx} (src: {src})")]
    WriteFailure {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// A timestamp was rejected at the codec boundary.
    #[error("invalid timestamp: {ctx}")]
    InvalidTimestamp {
        /// Any context associated with this error.
        ctx: Arc<str>,
    },

    /// A bucket boundary or encoded bucket key could not be interpreted.
    #[error("invalid bucket boundary: {ctx}")]
    InvalidBucketBoundary {
        /// Any context associated with this error.
        ctx: Arc<str>,
    },

    /// The backing table is missing or unreachable at read time.
    #[error("store unavailable: table '{table}'")]
    StoreUnavailable {
        /// The table that could not be reached.
        table: Arc<str>,
    },

    /// A statistics merge overflowed its widened accumulator. Surfaced to
    /// the caller as part of the scan result, never silently clamped.
    #[error("metric overflow: {ctx}")]
    MetricOverflow {
        /// Any context associated with this error.
        ctx: Arc<str>,
    },

    /// Generic bucketlog internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl StoreError {
    /// Construct a configuration error.
    pub fn configuration<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Configuration {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a configuration error with an inner source error.
    pub fn configuration_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Configuration {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct a write failure.
    pub fn write_failure<C: std::fmt::Display>(ctx: C) -> Self {
        Self::WriteFailure {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a write failure with an inner source error.
    pub fn write_failure_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::WriteFailure {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an invalid timestamp error.
    pub fn invalid_timestamp<C: std::fmt::Display>(ctx: C) -> Self {
        Self::InvalidTimestamp {
            ctx: ctx.to_string().into_boxed_str().into(),
        }
    }

    /// Construct an invalid bucket boundary error.
    pub fn invalid_bucket_boundary<C: std::fmt::Display>(ctx: C) -> Self {
        Self::InvalidBucketBoundary {
            ctx: ctx.to_string().into_boxed_str().into(),
        }
    }

    /// Construct a store unavailable error for the given table.
    pub fn store_unavailable<T: std::fmt::Display>(table: T) -> Self {
        Self::StoreUnavailable {
            table: table.to_string().into_boxed_str().into(),
        }
    }

    /// Construct a metric overflow error.
    pub fn metric_overflow<C: std::fmt::Display>(ctx: C) -> Self {
        Self::MetricOverflow {
            ctx: ctx.to_string().into_boxed_str().into(),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }
}

/// The core bucketlog result type.
pub type StoreResult<T> = Result<T, StoreError>;
