//! The metric-logger buffer: four independently-locked queues, the worker
//! drain procedure, and the public recording API callers use from any
//! thread.

use crate::aggregate::{AggregateDef, AggregateEngine, AggregateHandle};
use crate::clock::{adjusted_100ns_ticks, IdGenerator, MonotonicClock, SystemMonotonicClock, SystemWallClock, UuidGenerator, WallClock};
use crate::event::{
    AmountEvent, AmountRecord, CountEvent, CountRecord, IntervalTimeUnit, StatusEvent,
    StatusRecord, TimePoint, UniqueIntervalRecord,
};
use crate::metric::{AmountMetric, CountMetric, IntervalMetric, StatusMetric};
use crate::sink::Sink;
use crate::strategy::BufferProcessingStrategy;
use crate::validator::Validator;
use crate::Error;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Construction-time parameters for [`MetricLoggerBuffer`].
pub struct BufferConfig {
    /// The unit `IntervalEvent::duration` is rendered in.
    pub interval_base_time_unit: IntervalTimeUnit,
    /// Whether the interval validator raises on duplicate/orphan
    /// begin-end-cancel sequences (non-interleaved mode only).
    pub interval_checking: bool,
}

/// The default `on_processing_error` callback bound by [`MetricLoggerBuffer::new`]:
/// logs the failure and nothing else. Errors still reach callers via the
/// strategy's rethrow mechanism regardless of what this callback does.
fn default_on_processing_error(err: &Error) {
    #[cfg(feature = "log")]
    tracing::error!(error = %err, "buffer processing worker thread failed");
    #[cfg(not(feature = "log"))]
    {
        let _ = err;
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            interval_base_time_unit: IntervalTimeUnit::Milliseconds,
            interval_checking: true,
        }
    }
}

/// The buffered metric pipeline's core: four per-kind queues, a bound
/// buffer-processing strategy, a sink, and the aggregate engine, all driven
/// from the worker thread the strategy owns.
///
/// Always held behind an `Arc` — the bound strategy's drain action closes
/// over a [`Weak`] reference back into the buffer, since the strategy
/// outlives any single call and must not keep the buffer alive by itself.
pub struct MetricLoggerBuffer {
    config: BufferConfig,
    strategy: Arc<dyn BufferProcessingStrategy>,
    sink: Arc<dyn Sink>,
    monotonic: Arc<dyn MonotonicClock>,
    wall: Arc<dyn WallClock>,
    ids: Arc<dyn IdGenerator>,
    validator: Validator,
    aggregates: AggregateEngine,
    counts: Mutex<Vec<CountRecord>>,
    amounts: Mutex<Vec<AmountRecord>>,
    statuses: Mutex<Vec<StatusRecord>>,
    intervals: Mutex<Vec<UniqueIntervalRecord>>,
    started: AtomicBool,
    start_utc: Mutex<Option<DateTime<Utc>>>,
}

impl MetricLoggerBuffer {
    /// Full constructor, with injected clocks and id generator — what
    /// tests use to drive time deterministically.
    pub fn new(
        config: BufferConfig,
        strategy: Arc<dyn BufferProcessingStrategy>,
        sink: Arc<dyn Sink>,
        monotonic: Arc<dyn MonotonicClock>,
        wall: Arc<dyn WallClock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Arc<Self> {
        let validator = Validator::new(config.interval_checking, config.interval_base_time_unit);
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak_for_action = weak.clone();
            strategy.bind_action(
                Box::new(move || {
                    let Some(this) = weak_for_action.upgrade() else {
                        return Ok(());
                    };
                    this.dequeue_and_process_metric_events()
                }),
                Box::new(default_on_processing_error),
            );

            Self {
                config,
                strategy,
                sink,
                monotonic,
                wall,
                ids,
                validator,
                aggregates: AggregateEngine::new(),
                counts: Mutex::new(Vec::new()),
                amounts: Mutex::new(Vec::new()),
                statuses: Mutex::new(Vec::new()),
                intervals: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                start_utc: Mutex::new(None),
            }
        })
    }

    /// Convenience constructor using the system monotonic clock, system
    /// wall clock, and random-UUID id generator.
    pub fn with_system_clocks(
        config: BufferConfig,
        strategy: Arc<dyn BufferProcessingStrategy>,
        sink: Arc<dyn Sink>,
    ) -> Arc<Self> {
        Self::new(
            config,
            strategy,
            sink,
            Arc::new(SystemMonotonicClock::default()),
            Arc::new(SystemWallClock),
            Arc::new(UuidGenerator),
        )
    }

    /// Resets the monotonic clock, records `start_utc`, and starts the
    /// bound strategy. Invalid to call twice without an intervening
    /// [`stop`](Self::stop).
    pub fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::StrategyMisconfigured {
                reason: "start() called twice without an intervening stop()".to_string(),
            });
        }
        self.monotonic.reset();
        *self.start_utc.lock() = Some(self.wall.utc_now());
        self.strategy.start()
    }

    /// Stops the bound strategy (draining whatever remains buffered).
    pub fn stop(&self) {
        self.strategy.stop(true);
        self.started.store(false, Ordering::Release);
    }

    fn event_time(&self) -> DateTime<Utc> {
        let start = match *self.start_utc.lock() {
            Some(start) => start,
            None => self.wall.utc_now(),
        };
        crate::clock::event_time(start, self.monotonic.elapsed_ticks(), self.monotonic.frequency())
    }

    /// Records a count event.
    pub fn increment(&self, metric: &CountMetric) -> Result<(), Error> {
        let event_time_utc = self.event_time();
        self.counts.lock().push(CountRecord {
            metric: metric.clone(),
            event_time_utc,
        });
        self.strategy.notify_count_buffered()
    }

    /// Records an amount event. `amount` is stored as-is; negative values
    /// are accepted but not meaningful.
    pub fn add(&self, metric: &AmountMetric, amount: i64) -> Result<(), Error> {
        let event_time_utc = self.event_time();
        self.amounts.lock().push(AmountRecord {
            metric: metric.clone(),
            event_time_utc,
            amount,
        });
        self.strategy.notify_amount_buffered()
    }

    /// Records a status sample.
    pub fn set(&self, metric: &StatusMetric, value: i64) -> Result<(), Error> {
        let event_time_utc = self.event_time();
        self.statuses.lock().push(StatusRecord {
            metric: metric.clone(),
            event_time_utc,
            value,
        });
        self.strategy.notify_status_buffered()
    }

    /// Begins an interval. The returned id is required by the interleaved
    /// `end_interleaved`/`cancel_begin_interleaved` overloads; the
    /// non-interleaved overloads ignore it.
    pub fn begin(&self, metric: &IntervalMetric) -> Result<u128, Error> {
        let id = self.ids.new_id();
        let event_time_utc = self.event_time();
        self.intervals.lock().push(UniqueIntervalRecord {
            begin_id: Some(id),
            metric: metric.clone(),
            time_point: TimePoint::Start,
            event_time_utc,
        });
        self.strategy.notify_interval_buffered()?;
        Ok(id)
    }

    /// Ends a non-interleaved interval, matched by metric identity.
    pub fn end(&self, metric: &IntervalMetric) -> Result<(), Error> {
        self.push_interval(None, metric, TimePoint::End, "end(metric)")
    }

    /// Ends an interleaved interval, matched by the id `begin` returned.
    pub fn end_interleaved(&self, begin_id: u128, metric: &IntervalMetric) -> Result<(), Error> {
        self.push_interval(Some(begin_id), metric, TimePoint::End, "end(id, metric)")
    }

    /// Cancels a non-interleaved interval with no event emitted.
    pub fn cancel_begin(&self, metric: &IntervalMetric) -> Result<(), Error> {
        self.push_interval(None, metric, TimePoint::Cancel, "cancel_begin(metric)")
    }

    /// Cancels an interleaved interval with no event emitted.
    pub fn cancel_begin_interleaved(
        &self,
        begin_id: u128,
        metric: &IntervalMetric,
    ) -> Result<(), Error> {
        self.push_interval(Some(begin_id), metric, TimePoint::Cancel, "cancel_begin(id)")
    }

    /// Pushes an `End`/`Cancel` record, first rejecting synchronously if
    /// the buffer has already latched to the other mode — mismatches are
    /// the caller's bug, not something that should round-trip through a
    /// drain before surfacing.
    fn push_interval(
        &self,
        begin_id: Option<u128>,
        metric: &IntervalMetric,
        time_point: TimePoint,
        overload: &'static str,
    ) -> Result<(), Error> {
        self.validator.check_overload(begin_id.is_some(), overload)?;
        let event_time_utc = self.event_time();
        self.intervals.lock().push(UniqueIntervalRecord {
            begin_id,
            metric: metric.clone(),
            time_point,
            event_time_utc,
        });
        self.strategy.notify_interval_buffered()
    }

    /// Registers an aggregate, emitted starting from the next drain.
    pub fn define_metric_aggregate(&self, def: AggregateDef) -> AggregateHandle {
        self.aggregates.define_metric_aggregate(def)
    }

    /// Stops emitting a previously-registered aggregate.
    pub fn dispose(&self, handle: AggregateHandle) {
        self.aggregates.dispose(handle)
    }

    /// The worker-thread drain: swaps each queue out under its own lock (in
    /// the fixed order counts, amounts, statuses, intervals), delivers each
    /// batch to the sink, updates the aggregate engine's running totals,
    /// and emits this drain's aggregate values.
    ///
    /// Bound as the strategy's action in [`new`](Self::new); not meant to
    /// be called directly outside that binding.
    pub(crate) fn dequeue_and_process_metric_events(&self) -> Result<(), Error> {
        let counts = std::mem::take(&mut *self.counts.lock());
        let amounts = std::mem::take(&mut *self.amounts.lock());
        let statuses = std::mem::take(&mut *self.statuses.lock());
        let intervals = std::mem::take(&mut *self.intervals.lock());

        if !counts.is_empty() {
            let events: Vec<CountEvent> = counts
                .into_iter()
                .map(|r| CountEvent {
                    metric: r.metric,
                    event_time_utc: r.event_time_utc,
                })
                .collect();
            self.aggregates.record_counts(&events);
            self.sink
                .process_counts(&events)
                .map_err(|e| Error::Sink(e.to_string()))?;
            self.strategy.notify_count_cleared();
        }

        if !amounts.is_empty() {
            let events: Vec<AmountEvent> = amounts
                .into_iter()
                .map(|r| AmountEvent {
                    metric: r.metric,
                    event_time_utc: r.event_time_utc,
                    amount: r.amount,
                })
                .collect();
            self.aggregates.record_amounts(&events);
            self.sink
                .process_amounts(&events)
                .map_err(|e| Error::Sink(e.to_string()))?;
            self.strategy.notify_amount_cleared();
        }

        if !statuses.is_empty() {
            let events: Vec<StatusEvent> = statuses
                .into_iter()
                .map(|r| StatusEvent {
                    metric: r.metric,
                    event_time_utc: r.event_time_utc,
                    value: r.value,
                })
                .collect();
            self.sink
                .process_statuses(&events)
                .map_err(|e| Error::Sink(e.to_string()))?;
            self.strategy.notify_status_cleared();
        }

        if !intervals.is_empty() {
            let mut events = Vec::new();
            for record in intervals {
                match record.time_point {
                    TimePoint::Start => {
                        let id = record
                            .begin_id
                            .expect("begin records always carry a generated id");
                        self.validator.begin(id, &record.metric, record.event_time_utc)?;
                    }
                    TimePoint::End => {
                        if let Some(event) =
                            self.validator
                                .end(record.begin_id, &record.metric, record.event_time_utc)?
                        {
                            events.push(event);
                        }
                    }
                    TimePoint::Cancel => {
                        self.validator.cancel(record.begin_id, &record.metric)?;
                    }
                }
            }
            if !events.is_empty() {
                self.aggregates.record_intervals(&events);
                self.sink
                    .process_intervals(&events)
                    .map_err(|e| Error::Sink(e.to_string()))?;
            }
            self.strategy.notify_interval_cleared();
        }

        let elapsed_ticks = self.monotonic.elapsed_ticks();
        let frequency = self.monotonic.frequency();
        let hundred_ns = adjusted_100ns_ticks(elapsed_ticks, frequency);
        let elapsed_ms = hundred_ns / 10_000;
        let total_runtime_in_base_unit = match self.config.interval_base_time_unit {
            IntervalTimeUnit::Milliseconds => elapsed_ms,
            IntervalTimeUnit::Nanoseconds => hundred_ns.checked_mul(100).unwrap_or(i64::MAX),
        };

        self.aggregates
            .emit(self.sink.as_ref(), elapsed_ms, total_runtime_in_base_unit)
    }
}
