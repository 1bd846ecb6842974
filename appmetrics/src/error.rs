//! The pipeline's error taxonomy.
//!
//! Construction-time errors ([`Error::StrategyMisconfigured`],
//! [`Error::DuplicateFilterMembership`]) and mode misuse
//! ([`Error::ModeOverloadMisuse`]) are returned synchronously to the caller
//! that triggered them. Interval-validation errors and sink errors are
//! raised on the worker thread and only reach a caller thread wrapped in
//! [`Error::WorkerThread`], via the next `notify_*_buffered` call — see
//! [`crate::strategy`].

use chrono::{DateTime, Utc};

/// All errors the pipeline can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wraps whatever error the worker thread's drain action raised. The
    /// message deliberately matches the literal phrase downstream log
    /// scrapers key on.
    #[error("Exception occurred on buffer processing worker thread at {timestamp}: {cause}")]
    WorkerThread {
        /// When the worker observed the failure.
        timestamp: DateTime<Utc>,
        /// The error the drain action raised.
        #[source]
        cause: Box<Error>,
    },

    /// A non-interleaved `begin` was called for a metric type that already
    /// has an open interval, and interval checking is enabled.
    #[error("duplicate begin for interval metric `{metric_name}` (interval checking is enabled)")]
    DuplicateBegin {
        /// The interval metric's display name.
        metric_name: String,
    },

    /// An `end` was called with no matching open interval.
    #[error("end without matching begin for interval metric `{metric_name}`{}", begin_id_suffix(*begin_id))]
    EndWithoutBegin {
        /// The interval metric's display name.
        metric_name: String,
        /// The begin id, if this occurred in interleaved mode.
        begin_id: Option<u128>,
    },

    /// A `cancel_begin` was called with no matching open interval.
    #[error("cancel without matching begin for interval metric `{metric_name}`{}", begin_id_suffix(*begin_id))]
    CancelWithoutBegin {
        /// The interval metric's display name.
        metric_name: String,
        /// The begin id, if this occurred in interleaved mode.
        begin_id: Option<u128>,
    },

    /// In interleaved mode, `end(begin_id, metric)` was called with a
    /// `metric` different from the one the `begin_id` was started with.
    #[error(
        "interval `{begin_id}` was started as `{started_type}` but ended as `{supplied_type}`"
    )]
    IntervalTypeMismatch {
        /// The begin id whose type didn't match.
        begin_id: u128,
        /// The metric name the begin was recorded under.
        started_type: String,
        /// The metric name the end call supplied.
        supplied_type: String,
    },

    /// The interleaved and non-interleaved `end`/`cancel_begin` overloads
    /// are mutually exclusive once the buffer's mode has latched; this is
    /// the wrong one for the mode already in effect.
    #[error("cannot call the {overload} overload: this buffer has latched to {current_mode} mode")]
    ModeOverloadMisuse {
        /// Which overload was (incorrectly) called.
        overload: &'static str,
        /// The mode the buffer is actually latched to.
        current_mode: &'static str,
    },

    /// A filter constructor was given a set containing the same metric
    /// type twice.
    #[error("duplicate metric type in `{param_name}`: `{metric_name}`")]
    DuplicateFilterMembership {
        /// The name of the constructor parameter (the set) that had a
        /// duplicate.
        param_name: &'static str,
        /// The metric name that appeared twice.
        metric_name: String,
    },

    /// A buffer-processing strategy was constructed or started with an
    /// invalid parameter.
    #[error("strategy misconfigured: {reason}")]
    StrategyMisconfigured {
        /// A human-readable description of what was wrong.
        reason: String,
    },

    /// A sink's `process_*` call returned an error.
    #[error("sink error: {0}")]
    Sink(String),
}

fn begin_id_suffix(begin_id: Option<u128>) -> String {
    match begin_id {
        Some(id) => format!(" (begin id {id})"),
        None => String::new(),
    }
}

impl Error {
    /// Wraps `self` as a [`Error::WorkerThread`] observed at `timestamp`.
    pub fn into_worker_thread_error(self, timestamp: DateTime<Utc>) -> Error {
        Error::WorkerThread {
            timestamp,
            cause: Box::new(self),
        }
    }
}
