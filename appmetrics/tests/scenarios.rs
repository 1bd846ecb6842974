#![deny(warnings, rust_2018_idioms)]

//! End-to-end scenarios driving the public [`MetricLoggerBuffer`] API with
//! deterministic clocks, mirroring the buffered-pipeline contract: event
//! timestamps derived from monotonic ticks, fixed drain ordering, aggregate
//! formulas, and cross-thread error surfacing.

use appmetrics::aggregate::{
    AggregateDef, CountOverTime, IntervalOverTotalRuntime, TimeUnit,
};
use appmetrics::buffer::{BufferConfig, MetricLoggerBuffer};
use appmetrics::clock::testing::{FixedWallClock, ManualMonotonicClock, SequentialIds};
use appmetrics::event::{AmountEvent, CountEvent, IntervalEvent, StatusEvent};
use appmetrics::metric::{CountMetric, IntervalMetric, StatusMetric};
use appmetrics::sink::Sink;
use appmetrics::strategy::SizeLimited;
use appmetrics::Error;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::sync::{Arc, Condvar, Mutex};

/// A sink that records every batch it's handed, for assertion, and can be
/// told to fail once a count batch reaches a given size (for the
/// cross-thread error scenario).
#[derive(Default)]
struct RecordingSink {
    counts: Mutex<Vec<CountEvent>>,
    amounts: Mutex<Vec<AmountEvent>>,
    statuses: Mutex<Vec<StatusEvent>>,
    intervals: Mutex<Vec<IntervalEvent>>,
    aggregates: Mutex<Vec<(String, String, f64)>>,
    fail_count_batch_at_least: Mutex<Option<usize>>,
    processed: Mutex<bool>,
    processed_cvar: Condvar,
}

impl RecordingSink {
    /// Blocks until at least one `process_*` call has completed
    /// (successfully or not) on the worker thread.
    fn wait_for_processing(&self) {
        let mut done = self.processed.lock().unwrap();
        while !*done {
            done = self.processed_cvar.wait(done).unwrap();
        }
        *done = false;
    }

    fn mark_processed(&self) {
        *self.processed.lock().unwrap() = true;
        self.processed_cvar.notify_all();
    }
}

impl Sink for RecordingSink {
    fn process_counts(&self, batch: &[CountEvent]) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let result = match *self.fail_count_batch_at_least.lock().unwrap() {
            Some(n) if batch.len() >= n => Err("synthetic sink failure".into()),
            _ => {
                self.counts.lock().unwrap().extend_from_slice(batch);
                Ok(())
            }
        };
        self.mark_processed();
        result
    }

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.amounts.lock().unwrap().extend_from_slice(batch);
        self.mark_processed();
        Ok(())
    }

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.statuses.lock().unwrap().extend_from_slice(batch);
        self.mark_processed();
        Ok(())
    }

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.intervals.lock().unwrap().extend_from_slice(batch);
        self.mark_processed();
        Ok(())
    }

    fn process_aggregate(
        &self,
        name: &str,
        description: &str,
        value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.aggregates
            .lock()
            .unwrap()
            .push((name.to_string(), description.to_string(), value));
        Ok(())
    }
}

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// A [`SizeLimited`] strategy large enough that it never auto-triggers
/// during a test; the test instead forces the final drain via
/// [`MetricLoggerBuffer::stop`].
fn never_auto_draining_strategy() -> Arc<SizeLimited> {
    Arc::new(SizeLimited::new(1_000_000).unwrap())
}

// S1 — count drain: three increments land in the sink in call order, each
// timestamped from the monotonic tick sequence.
#[test]
fn s1_count_drain_orders_and_timestamps_events() {
    let start_utc = utc("2022-09-03T10:41:52.000Z");
    let monotonic = Arc::new(ManualMonotonicClock::new(
        10_000_000,
        vec![2_500_000, 5_100_000, 7_800_000],
    ));
    let wall = Arc::new(FixedWallClock(start_utc));
    let ids = Arc::new(SequentialIds::default());
    let sink = Arc::new(RecordingSink::default());

    let buffer = MetricLoggerBuffer::new(
        BufferConfig::default(),
        never_auto_draining_strategy(),
        sink.clone(),
        monotonic,
        wall,
        ids,
    );
    buffer.start().unwrap();

    let message_received = CountMetric::new("MessageReceived", "inbound messages");
    let disk_read = CountMetric::new("DiskReadOperation", "disk reads completed");

    buffer.increment(&message_received).unwrap();
    buffer.increment(&disk_read).unwrap();
    buffer.increment(&message_received).unwrap();

    buffer.stop();

    let counts = sink.counts.lock().unwrap();
    assert_eq!(counts.len(), 3);
    assert_eq!(counts[0].metric.def().name(), "MessageReceived");
    assert_eq!(counts[0].event_time_utc, start_utc + chrono::Duration::milliseconds(250));
    assert_eq!(counts[1].metric.def().name(), "DiskReadOperation");
    assert_eq!(counts[1].event_time_utc, start_utc + chrono::Duration::milliseconds(510));
    assert_eq!(counts[2].metric.def().name(), "MessageReceived");
    assert_eq!(counts[2].event_time_utc, start_utc + chrono::Duration::milliseconds(780));
}

// S2 — three status samples land in order with "latest wins" values intact
// (the buffer doesn't collapse them; that's a sink/aggregate concern).
#[test]
fn s2_status_samples_preserve_every_value_in_order() {
    let start_utc = utc("2022-09-03T11:26:19.000Z");
    let monotonic = Arc::new(ManualMonotonicClock::new(
        10_000_000,
        vec![2_500_000, 5_100_000, 7_800_000],
    ));
    let wall = Arc::new(FixedWallClock(start_utc));
    let ids = Arc::new(SequentialIds::default());
    let sink = Arc::new(RecordingSink::default());

    let buffer = MetricLoggerBuffer::new(
        BufferConfig::default(),
        never_auto_draining_strategy(),
        sink.clone(),
        monotonic,
        wall,
        ids,
    );
    buffer.start().unwrap();

    let available_memory = StatusMetric::new("AvailableMemory", "bytes free");
    let free_threads = StatusMetric::new("FreeWorkerThreads", "idle worker threads");

    buffer.set(&available_memory, 301_156_000).unwrap();
    buffer.set(&free_threads, 12).unwrap();
    buffer.set(&available_memory, 301_155_987).unwrap();

    buffer.stop();

    let statuses = sink.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses[0].value, 301_156_000);
    assert_eq!(statuses[0].event_time_utc, start_utc + chrono::Duration::milliseconds(250));
    assert_eq!(statuses[1].metric.def().name(), "FreeWorkerThreads");
    assert_eq!(statuses[1].value, 12);
    assert_eq!(statuses[1].event_time_utc, start_utc + chrono::Duration::milliseconds(510));
    assert_eq!(statuses[2].value, 301_155_987);
    assert_eq!(statuses[2].event_time_utc, start_utc + chrono::Duration::milliseconds(780));
}

// S3 — interleaved nesting: two overlapping MessageProcessingTime spans and
// two sequential DiskReadTime spans, matched by begin id rather than type.
#[test]
fn s3_interleaved_nesting_matches_by_begin_id() {
    let monotonic = Arc::new(ManualMonotonicClock::new(
        1_000,
        vec![11, 23, 36, 50, 55, 71, 80, 95],
    ));
    let wall = Arc::new(FixedWallClock(utc("2022-09-03T00:00:00Z")));
    let ids = Arc::new(SequentialIds::default());
    let sink = Arc::new(RecordingSink::default());

    let buffer = MetricLoggerBuffer::new(
        BufferConfig::default(),
        never_auto_draining_strategy(),
        sink.clone(),
        monotonic,
        wall,
        ids,
    );
    buffer.start().unwrap();

    let processing = IntervalMetric::new("MessageProcessingTime", "end to end processing");
    let disk = IntervalMetric::new("DiskReadTime", "disk read");

    let id1 = buffer.begin(&processing).unwrap(); // @11
    let id2 = buffer.begin(&processing).unwrap(); // @23
    let id3 = buffer.begin(&disk).unwrap(); // @36
    buffer.end_interleaved(id1, &processing).unwrap(); // @50
    let id4 = buffer.begin(&disk).unwrap(); // @55
    buffer.end_interleaved(id2, &processing).unwrap(); // @71
    buffer.end_interleaved(id3, &disk).unwrap(); // @80
    buffer.end_interleaved(id4, &disk).unwrap(); // @95

    buffer.stop();

    let intervals = sink.intervals.lock().unwrap();
    assert_eq!(intervals.len(), 4);
    assert_eq!(intervals[0].metric.def().name(), "MessageProcessingTime");
    assert_eq!(intervals[0].duration, 39); // 50 - 11
    assert_eq!(intervals[1].metric.def().name(), "MessageProcessingTime");
    assert_eq!(intervals[1].duration, 48); // 71 - 23
    assert_eq!(intervals[2].metric.def().name(), "DiskReadTime");
    assert_eq!(intervals[2].duration, 44); // 80 - 36
    assert_eq!(intervals[3].metric.def().name(), "DiskReadTime");
    assert_eq!(intervals[3].duration, 40); // 95 - 55
}

// S4 — CountOverTime aggregate: five increments, drain 2000ms after start,
// emits exactly 2.5 messages/second.
#[test]
fn s4_count_over_time_aggregate_matches_elapsed_wall_time() {
    let monotonic = Arc::new(ManualMonotonicClock::new(
        1_000, // 1 tick == 1ms at this frequency (see adjusted_100ns_ticks)
        vec![0, 0, 0, 0, 0, 2_000],
    ));
    let wall = Arc::new(FixedWallClock(utc("2022-09-03T00:00:00Z")));
    let ids = Arc::new(SequentialIds::default());
    let sink = Arc::new(RecordingSink::default());

    let buffer = MetricLoggerBuffer::new(
        BufferConfig::default(),
        never_auto_draining_strategy(),
        sink.clone(),
        monotonic,
        wall,
        ids,
    );
    buffer.start().unwrap();

    let received = CountMetric::new("MessageReceived", "inbound messages");
    buffer.define_metric_aggregate(AggregateDef::CountOverTime(CountOverTime {
        numerator: received.clone(),
        unit: TimeUnit::Second,
        name: "MessagesReceivedPerSecond".into(),
        description: "inbound message rate".into(),
    }));

    for _ in 0..5 {
        buffer.increment(&received).unwrap();
    }

    buffer.stop();

    let aggregates = sink.aggregates.lock().unwrap();
    let (name, _, value) = aggregates
        .iter()
        .find(|(name, _, _)| name == "MessagesReceivedPerSecond")
        .expect("aggregate was emitted");
    assert_eq!(name, "MessagesReceivedPerSecond");
    assert_eq!(*value, 2.5);
}

// S5 — interval events still drain even when elapsed_ms_at_drain is 0, but
// an IntervalOverTotalRuntime aggregate over a zero runtime is skipped, not
// emitted as a nonsensical ratio.
#[test]
fn s5_interval_over_total_runtime_skips_on_zero_elapsed() {
    let monotonic = Arc::new(ManualMonotonicClock::new(
        1_000,
        vec![0, 1_763, 2_000, 5_000, 0],
    ));
    let wall = Arc::new(FixedWallClock(utc("2022-09-03T00:00:00Z")));
    let ids = Arc::new(SequentialIds::default());
    let sink = Arc::new(RecordingSink::default());

    let buffer = MetricLoggerBuffer::new(
        BufferConfig::default(),
        never_auto_draining_strategy(),
        sink.clone(),
        monotonic,
        wall,
        ids,
    );
    buffer.start().unwrap();

    let processing = IntervalMetric::new("MessageProcessingTime", "processing");
    buffer.define_metric_aggregate(AggregateDef::IntervalOverTotalRuntime(
        IntervalOverTotalRuntime {
            interval: processing.clone(),
            name: "MessageProcessingTimePercentage".into(),
            description: "fraction of runtime spent processing".into(),
        },
    ));

    buffer.begin(&processing).unwrap(); // @0
    buffer.end(&processing).unwrap(); // @1763 -> duration 1763
    buffer.begin(&processing).unwrap(); // @2000
    buffer.end(&processing).unwrap(); // @5000 -> duration 3000

    buffer.stop();

    let intervals = sink.intervals.lock().unwrap();
    assert_eq!(intervals.len(), 2);
    assert_eq!(intervals[0].duration, 1_763);
    assert_eq!(intervals[1].duration, 3_000);
    assert_eq!(intervals[0].duration + intervals[1].duration, 4_763);

    let aggregates = sink.aggregates.lock().unwrap();
    assert!(
        !aggregates
            .iter()
            .any(|(name, _, _)| name == "MessageProcessingTimePercentage"),
        "aggregate must not be emitted when total runtime is zero"
    );
}

// S6 — a sink failure on the worker thread is captured there; the very
// next producer-thread call surfaces it wrapped with the literal phrase
// downstream log scrapers key on.
#[test]
fn s6_sink_error_surfaces_on_next_producer_call() {
    let sink = Arc::new(RecordingSink::default());
    *sink.fail_count_batch_at_least.lock().unwrap() = Some(2);

    // A real size-triggered strategy: the second increment crosses the
    // threshold and the worker thread processes (and fails) the batch
    // concurrently with the test thread.
    let strategy = Arc::new(SizeLimited::new(2).unwrap());
    let buffer =
        MetricLoggerBuffer::with_system_clocks(BufferConfig::default(), strategy, sink.clone());
    buffer.start().unwrap();

    let metric = CountMetric::new("MessageReceived", "inbound messages");
    buffer.increment(&metric).unwrap();
    buffer.increment(&metric).unwrap();

    sink.wait_for_processing();

    let err = buffer.increment(&metric).unwrap_err();
    let message = err.to_string();
    assert!(
        message.starts_with("Exception occurred on buffer processing worker thread at "),
        "message was: {message}"
    );
    assert!(message.contains("synthetic sink failure"), "message was: {message}");
    assert!(matches!(err, Error::WorkerThread { .. }));

    buffer.stop();
}

// Once a prior drain has latched the buffer's mode, a mismatched overload
// is rejected synchronously on the calling thread, without ever being
// enqueued.
#[test]
fn mode_overload_misuse_is_synchronous_once_latched() {
    let sink = Arc::new(RecordingSink::default());
    // Threshold 2: begin + end together trigger a real drain, letting the
    // validator latch non-interleaved mode before the assertion below.
    let strategy = Arc::new(SizeLimited::new(2).unwrap());
    let buffer =
        MetricLoggerBuffer::with_system_clocks(BufferConfig::default(), strategy, sink.clone());
    buffer.start().unwrap();

    let metric = IntervalMetric::new("request", "request latency");

    buffer.begin(&metric).unwrap();
    buffer.end(&metric).unwrap();
    sink.wait_for_processing();

    // The interleaved overload is now rejected immediately — no queueing,
    // no worker round trip required.
    let id = buffer.begin(&metric).unwrap();
    let err = buffer.end_interleaved(id, &metric).unwrap_err();
    assert!(matches!(err, Error::ModeOverloadMisuse { .. }));

    buffer.stop();
}
