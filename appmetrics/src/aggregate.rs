//! Derived ratio metrics, computed once per drain from the running totals
//! the buffer feeds as it processes each batch.

use crate::event::{AmountEvent, CountEvent, IntervalEvent};
use crate::metric::{AmountMetric, CountMetric, IntervalMetric};
use crate::sink::Sink;
use crate::Error;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// The unit a `*OverTime` aggregate's denominator is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    fn seconds(self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3_600,
            TimeUnit::Day => 86_400,
        }
    }
}

/// Count events per unit of elapsed wall time since `start()`.
pub struct CountOverTime {
    pub numerator: CountMetric,
    pub unit: TimeUnit,
    pub name: String,
    pub description: String,
}

/// Total amount per count event.
pub struct AmountOverCount {
    pub amount: AmountMetric,
    pub count: CountMetric,
    pub name: String,
    pub description: String,
}

/// Total amount per unit of elapsed wall time.
pub struct AmountOverTime {
    pub amount: AmountMetric,
    pub unit: TimeUnit,
    pub name: String,
    pub description: String,
}

/// One amount total divided by another.
pub struct AmountOverAmount {
    pub numerator: AmountMetric,
    pub denominator: AmountMetric,
    pub name: String,
    pub description: String,
}

/// Total interval duration per count event.
pub struct IntervalOverCount {
    pub interval: IntervalMetric,
    pub count: CountMetric,
    pub name: String,
    pub description: String,
}

/// The fraction of total elapsed runtime spent inside matched intervals.
pub struct IntervalOverTotalRuntime {
    pub interval: IntervalMetric,
    pub name: String,
    pub description: String,
}

/// One of the six aggregate shapes the engine can compute.
pub enum AggregateDef {
    CountOverTime(CountOverTime),
    AmountOverCount(AmountOverCount),
    AmountOverTime(AmountOverTime),
    AmountOverAmount(AmountOverAmount),
    IntervalOverCount(IntervalOverCount),
    IntervalOverTotalRuntime(IntervalOverTotalRuntime),
}

/// Identifies a previously-registered aggregate, for [`AggregateEngine::dispose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateHandle(u64);

/// Maintains running totals per metric and the set of registered aggregate
/// definitions, and emits their values once per drain.
///
/// Lives on the same worker as the buffer; there's no separate locking
/// discipline here beyond what's needed to let `define_metric_aggregate`
/// and `dispose` be called from any thread while the worker is mid-drain.
pub(crate) struct AggregateEngine {
    count_totals: Mutex<AHashMap<u64, i64>>,
    amount_totals: Mutex<AHashMap<u64, i64>>,
    interval_totals: Mutex<AHashMap<u64, i64>>,
    defs: Mutex<AHashMap<u64, AggregateDef>>,
    next_handle: AtomicU64,
}

impl AggregateEngine {
    pub(crate) fn new() -> Self {
        Self {
            count_totals: Mutex::new(AHashMap::new()),
            amount_totals: Mutex::new(AHashMap::new()),
            interval_totals: Mutex::new(AHashMap::new()),
            defs: Mutex::new(AHashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Registers an aggregate. Emitted from the next drain onward.
    pub(crate) fn define_metric_aggregate(&self, def: AggregateDef) -> AggregateHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.defs.lock().insert(id, def);
        AggregateHandle(id)
    }

    /// Stops emitting a previously-registered aggregate.
    pub(crate) fn dispose(&self, handle: AggregateHandle) {
        self.defs.lock().remove(&handle.0);
    }

    pub(crate) fn record_counts(&self, batch: &[CountEvent]) {
        let mut totals = self.count_totals.lock();
        for event in batch {
            *totals.entry(event.metric.def().id()).or_insert(0) += 1;
        }
    }

    pub(crate) fn record_amounts(&self, batch: &[AmountEvent]) {
        let mut totals = self.amount_totals.lock();
        for event in batch {
            *totals.entry(event.metric.def().id()).or_insert(0) += event.amount;
        }
    }

    pub(crate) fn record_intervals(&self, batch: &[IntervalEvent]) {
        let mut totals = self.interval_totals.lock();
        for event in batch {
            *totals.entry(event.metric.def().id()).or_insert(0) += event.duration;
        }
    }

    fn count_total(&self, metric: &CountMetric) -> i64 {
        *self.count_totals.lock().get(&metric.def().id()).unwrap_or(&0)
    }

    fn amount_total(&self, metric: &AmountMetric) -> i64 {
        *self
            .amount_totals
            .lock()
            .get(&metric.def().id())
            .unwrap_or(&0)
    }

    fn interval_total(&self, metric: &IntervalMetric) -> i64 {
        *self
            .interval_totals
            .lock()
            .get(&metric.def().id())
            .unwrap_or(&0)
    }

    /// Computes and emits every registered aggregate's value for this
    /// drain.
    ///
    /// `elapsed_ms_at_drain` is the wall-clock time elapsed since `start()`,
    /// and `total_runtime_in_base_unit` is that same elapsed time expressed
    /// in the buffer's configured interval time unit (so it's directly
    /// comparable to interval totals, which are in that unit too).
    pub(crate) fn emit(
        &self,
        sink: &dyn Sink,
        elapsed_ms_at_drain: i64,
        total_runtime_in_base_unit: i64,
    ) -> Result<(), Error> {
        // Snapshot definitions so the sink call isn't made while holding
        // the defs lock (a sink could, in principle, register a new
        // aggregate from within its own callback).
        let snapshot: Vec<(String, String, Option<f64>)> = {
            let defs = self.defs.lock();
            defs.values()
                .map(|def| self.evaluate(def, elapsed_ms_at_drain, total_runtime_in_base_unit))
                .collect()
        };

        for (name, description, value) in snapshot {
            if let Some(value) = value {
                sink.process_aggregate(&name, &description, value)
                    .map_err(|e| Error::Sink(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn evaluate(
        &self,
        def: &AggregateDef,
        elapsed_ms_at_drain: i64,
        total_runtime_in_base_unit: i64,
    ) -> (String, String, Option<f64>) {
        match def {
            AggregateDef::CountOverTime(d) => {
                let value = if elapsed_ms_at_drain == 0 {
                    None
                } else {
                    let denom = elapsed_ms_at_drain as f64 * d.unit.seconds() as f64 / 1000.0;
                    Some(self.count_total(&d.numerator) as f64 / denom)
                };
                (d.name.clone(), d.description.clone(), value)
            }
            AggregateDef::AmountOverCount(d) => {
                let count_total = self.count_total(&d.count);
                let value = if count_total == 0 {
                    0.0
                } else {
                    self.amount_total(&d.amount) as f64 / count_total as f64
                };
                (d.name.clone(), d.description.clone(), Some(value))
            }
            AggregateDef::AmountOverTime(d) => {
                let value = if elapsed_ms_at_drain == 0 {
                    None
                } else {
                    let denom = elapsed_ms_at_drain as f64 * d.unit.seconds() as f64 / 1000.0;
                    Some(self.amount_total(&d.amount) as f64 / denom)
                };
                (d.name.clone(), d.description.clone(), value)
            }
            AggregateDef::AmountOverAmount(d) => {
                let denom_total = self.amount_total(&d.denominator);
                let value = if denom_total == 0 {
                    0.0
                } else {
                    self.amount_total(&d.numerator) as f64 / denom_total as f64
                };
                (d.name.clone(), d.description.clone(), Some(value))
            }
            AggregateDef::IntervalOverCount(d) => {
                let count_total = self.count_total(&d.count);
                let value = if count_total == 0 {
                    None
                } else {
                    Some(self.interval_total(&d.interval) as f64 / count_total as f64)
                };
                (d.name.clone(), d.description.clone(), value)
            }
            AggregateDef::IntervalOverTotalRuntime(d) => {
                let value = if total_runtime_in_base_unit == 0 {
                    None
                } else {
                    Some(
                        self.interval_total(&d.interval) as f64
                            / total_runtime_in_base_unit as f64,
                    )
                };
                (d.name.clone(), d.description.clone(), value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_over_count_emits_zero_on_empty_denominator() {
        let engine = AggregateEngine::new();
        let amount = AmountMetric::new("bytes", "bytes");
        let count = CountMetric::new("requests", "requests");
        let def = AggregateDef::AmountOverCount(AmountOverCount {
            amount: amount.clone(),
            count: count.clone(),
            name: "BytesPerRequest".into(),
            description: "d".into(),
        });
        let (_, _, value) = engine.evaluate(&def, 1000, 1000);
        assert_eq!(value, Some(0.0));
    }

    #[test]
    fn interval_over_count_skips_on_empty_denominator() {
        let engine = AggregateEngine::new();
        let interval = IntervalMetric::new("processing", "processing");
        let count = CountMetric::new("requests", "requests");
        let def = AggregateDef::IntervalOverCount(IntervalOverCount {
            interval,
            count,
            name: "AvgProcessing".into(),
            description: "d".into(),
        });
        let (_, _, value) = engine.evaluate(&def, 1000, 1000);
        assert!(value.is_none());
    }

    #[test]
    fn count_over_time_matches_s4_scenario() {
        let engine = AggregateEngine::new();
        let received = CountMetric::new("MessageReceived", "received");
        for _ in 0..5 {
            engine.record_counts(&[CountEvent {
                metric: received.clone(),
                event_time_utc: chrono::Utc::now(),
            }]);
        }
        let def = AggregateDef::CountOverTime(CountOverTime {
            numerator: received,
            unit: TimeUnit::Second,
            name: "MessagesReceivedPerSecond".into(),
            description: "d".into(),
        });
        let (_, _, value) = engine.evaluate(&def, 2000, 2000);
        assert_eq!(value, Some(2.5));
    }
}
