//! Interval begin/end/cancel matching.
//!
//! A buffer may be driven in one of two mutually exclusive styles:
//!
//! * **non-interleaved** — `begin(metric)` / `end(metric)` /
//!   `cancel_begin(metric)`, matched by metric identity. At most one
//!   interval may be open per metric at a time.
//! * **interleaved** — `begin(metric) -> id` / `end(id, metric)` /
//!   `cancel_begin(id)`, matched by the generated id. Any number of
//!   intervals may be open concurrently for the same metric.
//!
//! `begin` always allocates and records an id — which overload the caller
//! later uses to end or cancel it is what decides the mode. The *first*
//! `end`/`cancel_begin` the validator processes latches the mode for the
//! buffer's lifetime; mixing styles afterward is a caller bug
//! ([`Error::ModeOverloadMisuse`]).
//!
//! `interval_checking` is only consulted in non-interleaved mode: a
//! `cancel_begin`/`end` with no matching open interval, when checking is
//! disabled, is a silent no-op there rather than fabricating a zero-length
//! interval. In interleaved mode, matching is unconditional — an orphan
//! `end`/`cancel_begin` or a type-mismatched `end` is always a fatal-to-drain
//! error regardless of `interval_checking`, since a `begin_id` that isn't in
//! the in-flight map (or doesn't match the type it was started with) is a
//! caller bug no flag should paper over.

use crate::event::{IntervalEvent, IntervalTimeUnit};
use crate::metric::IntervalMetric;
use crate::Error;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Undetermined,
    Interleaved,
    NonInterleaved,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Mode::Undetermined => "undetermined",
            Mode::Interleaved => "interleaved",
            Mode::NonInterleaved => "non-interleaved",
        }
    }
}

struct Open {
    metric: IntervalMetric,
    at: DateTime<Utc>,
}

/// Tracks in-flight interval begins and matches them against their ends or
/// cancellations.
///
/// One validator instance per [`MetricLoggerBuffer`](crate::buffer::MetricLoggerBuffer);
/// it is drained alongside the buffer's other queues and its state persists
/// across drains (an interval may begin in one drain cycle and end in the
/// next).
pub(crate) struct Validator {
    checking_enabled: bool,
    time_unit: IntervalTimeUnit,
    mode: Mutex<Mode>,
    /// Every open begin, keyed by its generated id — populated regardless
    /// of which mode the buffer eventually latches to.
    by_id: Mutex<AHashMap<u128, Open>>,
    /// The most recently opened begin id per metric, consulted only once
    /// the buffer has latched to non-interleaved mode.
    by_metric: Mutex<AHashMap<u64, u128>>,
}

impl Validator {
    pub(crate) fn new(checking_enabled: bool, time_unit: IntervalTimeUnit) -> Self {
        Self {
            checking_enabled,
            time_unit,
            mode: Mutex::new(Mode::Undetermined),
            by_id: Mutex::new(AHashMap::new()),
            by_metric: Mutex::new(AHashMap::new()),
        }
    }

    fn duration(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        let delta = end - begin;
        let raw = match self.time_unit {
            IntervalTimeUnit::Milliseconds => delta.num_milliseconds(),
            IntervalTimeUnit::Nanoseconds => delta.num_nanoseconds().unwrap_or(i64::MAX),
        };
        raw.max(0)
    }

    /// Records a begin. Always tracked by its generated id; also indexed by
    /// metric so a later non-interleaved `end`/`cancel_begin` can find it.
    /// The duplicate-begin check only fires once the buffer has latched to
    /// non-interleaved mode — a concurrent begin of the same metric type
    /// while the mode is still undetermined or already interleaved is not
    /// a duplicate.
    pub(crate) fn begin(
        &self,
        begin_id: u128,
        metric: &IntervalMetric,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        if *self.mode.lock() == Mode::NonInterleaved
            && self.checking_enabled
            && self.by_metric.lock().contains_key(&metric.def().id())
        {
            return Err(Error::DuplicateBegin {
                metric_name: metric.def().name().to_string(),
            });
        }

        self.by_id.lock().insert(
            begin_id,
            Open {
                metric: metric.clone(),
                at,
            },
        );
        self.by_metric.lock().insert(metric.def().id(), begin_id);
        Ok(())
    }

    fn latch(&self, wanted: Mode, overload: &'static str) -> Result<(), Error> {
        let mut mode = self.mode.lock();
        match *mode {
            Mode::Undetermined => {
                *mode = wanted;
                Ok(())
            }
            current if current == wanted => Ok(()),
            current => Err(Error::ModeOverloadMisuse {
                overload,
                current_mode: current.name(),
            }),
        }
    }

    /// Checked by the buffer *before* an `end`/`cancel_begin` call is even
    /// enqueued, so that once a mode has latched (by a prior drain), the
    /// wrong overload fails synchronously on the caller thread rather than
    /// being queued, drained, and only then rethrown.
    ///
    /// Before the first drain latches a mode, every overload is allowed
    /// through; a same-batch mismatch is still caught when the drain
    /// processes it, surfacing via the usual worker-thread rethrow path.
    pub(crate) fn check_overload(
        &self,
        interleaved: bool,
        overload: &'static str,
    ) -> Result<(), Error> {
        let wanted = if interleaved {
            Mode::Interleaved
        } else {
            Mode::NonInterleaved
        };
        match *self.mode.lock() {
            Mode::Undetermined => Ok(()),
            current if current == wanted => Ok(()),
            current => Err(Error::ModeOverloadMisuse {
                overload,
                current_mode: current.name(),
            }),
        }
    }

    /// Matches an end. `begin_id` is `None` for the non-interleaved
    /// overload, `Some` for the interleaved one.
    ///
    /// Returns `Ok(None)` when there was no matching begin and interval
    /// checking is disabled — the end is dropped silently.
    pub(crate) fn end(
        &self,
        begin_id: Option<u128>,
        metric: &IntervalMetric,
        at: DateTime<Utc>,
    ) -> Result<Option<IntervalEvent>, Error> {
        match begin_id {
            None => {
                self.latch(Mode::NonInterleaved, "end(metric)")?;

                let id = self.by_metric.lock().remove(&metric.def().id());
                let begun = id.and_then(|id| self.by_id.lock().remove(&id));
                let Some(begun) = begun else {
                    return if self.checking_enabled {
                        Err(Error::EndWithoutBegin {
                            metric_name: metric.def().name().to_string(),
                            begin_id: None,
                        })
                    } else {
                        Ok(None)
                    };
                };

                Ok(Some(IntervalEvent {
                    metric: metric.clone(),
                    event_time_utc: at,
                    duration: self.duration(begun.at, at),
                }))
            }
            Some(id) => {
                self.latch(Mode::Interleaved, "end(id, metric)")?;

                let begun = self.by_id.lock().remove(&id);
                let Some(begun) = begun else {
                    return Err(Error::EndWithoutBegin {
                        metric_name: metric.def().name().to_string(),
                        begin_id: Some(id),
                    });
                };

                // Only drop the by-metric index entry if it still points at
                // this begin — a newer begin of the same metric may have
                // already superseded it.
                let mut by_metric = self.by_metric.lock();
                if by_metric.get(&metric.def().id()) == Some(&id) {
                    by_metric.remove(&metric.def().id());
                }
                drop(by_metric);

                if begun.metric.def().id() != metric.def().id() {
                    return Err(Error::IntervalTypeMismatch {
                        begin_id: id,
                        started_type: begun.metric.def().name().to_string(),
                        supplied_type: metric.def().name().to_string(),
                    });
                }

                Ok(Some(IntervalEvent {
                    metric: metric.clone(),
                    event_time_utc: at,
                    duration: self.duration(begun.at, at),
                }))
            }
        }
    }

    /// Cancels a begin with no event emitted. `begin_id` is `None` for the
    /// non-interleaved overload, `Some` for the interleaved one.
    pub(crate) fn cancel(
        &self,
        begin_id: Option<u128>,
        metric: &IntervalMetric,
    ) -> Result<(), Error> {
        match begin_id {
            None => {
                self.latch(Mode::NonInterleaved, "cancel_begin(metric)")?;

                let id = self.by_metric.lock().remove(&metric.def().id());
                let removed = id.and_then(|id| self.by_id.lock().remove(&id));
                if removed.is_none() && self.checking_enabled {
                    return Err(Error::CancelWithoutBegin {
                        metric_name: metric.def().name().to_string(),
                        begin_id: None,
                    });
                }
                Ok(())
            }
            Some(id) => {
                self.latch(Mode::Interleaved, "cancel_begin(id)")?;

                let removed = self.by_id.lock().remove(&id);
                let mut by_metric = self.by_metric.lock();
                if by_metric.get(&metric.def().id()) == Some(&id) {
                    by_metric.remove(&metric.def().id());
                }
                drop(by_metric);

                if removed.is_none() {
                    return Err(Error::CancelWithoutBegin {
                        metric_name: metric.def().name().to_string(),
                        begin_id: Some(id),
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::IntervalMetric;

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn non_interleaved_round_trip() {
        let v = Validator::new(true, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        v.begin(1, &m, ts(0)).unwrap();
        let ev = v.end(None, &m, ts(150)).unwrap().unwrap();
        assert_eq!(ev.duration, 150);
    }

    #[test]
    fn duplicate_begin_is_rejected_once_non_interleaved_latches() {
        let v = Validator::new(true, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        v.begin(1, &m, ts(0)).unwrap();
        v.end(None, &m, ts(10)).unwrap();
        v.begin(2, &m, ts(20)).unwrap();
        assert!(matches!(
            v.begin(3, &m, ts(30)),
            Err(Error::DuplicateBegin { .. })
        ));
    }

    #[test]
    fn end_without_begin_is_silent_when_checking_disabled() {
        let v = Validator::new(false, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        assert!(v.end(None, &m, ts(10)).unwrap().is_none());
    }

    #[test]
    fn cancel_without_begin_is_silent_when_checking_disabled() {
        let v = Validator::new(false, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        assert!(v.cancel(None, &m).is_ok());
    }

    #[test]
    fn cancel_without_begin_errors_when_checking_enabled() {
        let v = Validator::new(true, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        assert!(matches!(
            v.cancel(None, &m),
            Err(Error::CancelWithoutBegin { .. })
        ));
    }

    #[test]
    fn interleaved_nesting_matches_s3_scenario() {
        let v = Validator::new(true, IntervalTimeUnit::Milliseconds);
        let processing = IntervalMetric::new("MessageProcessingTime", "processing");
        let disk = IntervalMetric::new("DiskReadTime", "disk read");

        v.begin(1, &processing, ts(11)).unwrap();
        v.begin(2, &processing, ts(23)).unwrap();
        v.begin(3, &disk, ts(36)).unwrap();
        let e1 = v.end(Some(1), &processing, ts(50)).unwrap().unwrap();
        v.begin(4, &disk, ts(55)).unwrap();
        let e2 = v.end(Some(2), &processing, ts(71)).unwrap().unwrap();

        assert_eq!(e1.duration, 39);
        assert_eq!(e2.duration, 48);
    }

    #[test]
    fn interleaved_type_mismatch_is_rejected_when_checking_enabled() {
        let v = Validator::new(true, IntervalTimeUnit::Milliseconds);
        let a = IntervalMetric::new("a", "a");
        let b = IntervalMetric::new("b", "b");
        v.begin(1, &a, ts(0)).unwrap();
        assert!(matches!(
            v.end(Some(1), &b, ts(10)),
            Err(Error::IntervalTypeMismatch { .. })
        ));
    }

    #[test]
    fn interleaved_end_without_begin_errors_even_when_checking_disabled() {
        let v = Validator::new(false, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        assert!(matches!(
            v.end(Some(1), &m, ts(10)),
            Err(Error::EndWithoutBegin { .. })
        ));
    }

    #[test]
    fn interleaved_cancel_without_begin_errors_even_when_checking_disabled() {
        let v = Validator::new(false, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        assert!(matches!(
            v.cancel(Some(1), &m),
            Err(Error::CancelWithoutBegin { .. })
        ));
    }

    #[test]
    fn interleaved_type_mismatch_is_rejected_even_when_checking_disabled() {
        let v = Validator::new(false, IntervalTimeUnit::Milliseconds);
        let a = IntervalMetric::new("a", "a");
        let b = IntervalMetric::new("b", "b");
        v.begin(1, &a, ts(0)).unwrap();
        assert!(matches!(
            v.end(Some(1), &b, ts(10)),
            Err(Error::IntervalTypeMismatch { .. })
        ));
    }

    #[test]
    fn mixing_styles_is_rejected() {
        let v = Validator::new(true, IntervalTimeUnit::Milliseconds);
        let m = IntervalMetric::new("request", "request latency");
        v.begin(1, &m, ts(0)).unwrap();
        v.end(None, &m, ts(10)).unwrap();
        v.begin(2, &m, ts(20)).unwrap();
        assert!(matches!(
            v.end(Some(2), &m, ts(30)),
            Err(Error::ModeOverloadMisuse { .. })
        ));
    }
}
