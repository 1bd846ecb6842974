//! Raw records (producer-thread payloads) and finalised events (what the
//! sink sees) for all four metric kinds.

use crate::metric::{AmountMetric, CountMetric, IntervalMetric, StatusMetric};
use chrono::{DateTime, Utc};

/// The unit duration values are rendered in, chosen once at
/// [`MetricLoggerBuffer`](crate::buffer::MetricLoggerBuffer) construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalTimeUnit {
    /// Durations are rendered as whole milliseconds.
    Milliseconds,
    /// Durations are rendered as whole nanoseconds.
    Nanoseconds,
}

/// Which edge of an interval a [`UniqueIntervalRecord`] marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePoint {
    /// The start of an interval.
    Start,
    /// The (successful) end of an interval.
    End,
    /// A begin that is being abandoned; no interval is emitted.
    Cancel,
}

// === Raw, producer-thread records (internal to the buffer) ===

#[derive(Debug, Clone)]
pub(crate) struct CountRecord {
    pub metric: CountMetric,
    pub event_time_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct AmountRecord {
    pub metric: AmountMetric,
    pub event_time_utc: DateTime<Utc>,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct StatusRecord {
    pub metric: StatusMetric,
    pub event_time_utc: DateTime<Utc>,
    pub value: i64,
}

/// An in-flight interval observation: a begin, end, or cancel, not yet
/// matched against its counterpart by the validator.
#[derive(Debug, Clone)]
pub(crate) struct UniqueIntervalRecord {
    /// Set for interleaved-mode calls; `None` for non-interleaved calls.
    pub begin_id: Option<u128>,
    pub metric: IntervalMetric,
    pub time_point: TimePoint,
    pub event_time_utc: DateTime<Utc>,
}

// === Finalised events (what the sink sees) ===

/// A count event, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct CountEvent {
    pub metric: CountMetric,
    pub event_time_utc: DateTime<Utc>,
}

/// An amount event, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct AmountEvent {
    pub metric: AmountMetric,
    pub event_time_utc: DateTime<Utc>,
    pub amount: i64,
}

/// A status event, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub metric: StatusMetric,
    pub event_time_utc: DateTime<Utc>,
    pub value: i64,
}

/// A finalised interval event, with the matched duration already computed.
#[derive(Debug, Clone)]
pub struct IntervalEvent {
    pub metric: IntervalMetric,
    pub event_time_utc: DateTime<Utc>,
    /// Duration in the buffer's configured [`IntervalTimeUnit`]. Clamped to
    /// zero if the end preceded the begin (the clock went backwards).
    pub duration: i64,
}
