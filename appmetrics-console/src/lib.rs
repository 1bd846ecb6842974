//! A console sink for [`appmetrics`].
//!
//! Each time a batch or an aggregate reaches [`ConsoleSink`], it redraws a
//! banner to stdout showing every metric and aggregate it has seen so far:
//!
//! ```text
//! ---------------------------------------------------
//! -- Application metrics as of 2022-09-03 10:41:52 --
//! ---------------------------------------------------
//! MessageReceived: 3
//! MessagesReceivedPerSecond: 2.5
//! ```
//!
//! Counts, amounts, and interval durations accumulate across drains
//! (matching how the aggregate engine treats the same metrics); statuses
//! show the latest sampled value, since summing a point-in-time level isn't
//! meaningful. This is a trivial formatting layer — all the real work
//! happens in the core buffered pipeline this sink is handed events from.

#![deny(rust_2018_idioms, unsafe_code, missing_docs)]

use appmetrics::event::{AmountEvent, CountEvent, IntervalEvent, StatusEvent};
use appmetrics::sink::Sink;
use chrono::Local;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::error::Error as StdError;

const BANNER_RULE: &str = "---------------------------------------------------";

#[derive(Default)]
struct Board {
    /// Running totals for counts, amounts, and interval durations; the
    /// latest sample for statuses. Keyed by metric display name.
    running: BTreeMap<String, i64>,
    aggregates: BTreeMap<String, f64>,
}

/// Redraws a running banner of every metric and aggregate observed so far
/// to stdout, each time a batch or aggregate value is processed.
///
/// Two metrics (or an aggregate and a metric) that happen to share a
/// display name share a line on the banner; the core's metric identity is
/// nominal, not by name, so this is a cosmetic collision only, the same
/// collapsing a human reading the banner would expect.
pub struct ConsoleSink {
    board: Mutex<Board>,
}

impl ConsoleSink {
    /// Creates a new, empty console sink.
    pub fn new() -> Self {
        Self {
            board: Mutex::new(Board::default()),
        }
    }

    fn redraw(&self, board: &Board) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        println!("{BANNER_RULE}");
        println!("-- Application metrics as of {now} --");
        println!("{BANNER_RULE}");
        for (name, value) in &board.running {
            println!("{name}: {value}");
        }
        for (name, value) in &board.aggregates {
            println!("{name}: {value}");
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn process_counts(&self, batch: &[CountEvent]) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut board = self.board.lock();
        for event in batch {
            *board
                .running
                .entry(event.metric.def().name().to_string())
                .or_insert(0) += 1;
        }
        self.redraw(&board);
        Ok(())
    }

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut board = self.board.lock();
        for event in batch {
            *board
                .running
                .entry(event.metric.def().name().to_string())
                .or_insert(0) += event.amount;
        }
        self.redraw(&board);
        Ok(())
    }

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut board = self.board.lock();
        for event in batch {
            board
                .running
                .insert(event.metric.def().name().to_string(), event.value);
        }
        self.redraw(&board);
        Ok(())
    }

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut board = self.board.lock();
        for event in batch {
            *board
                .running
                .entry(event.metric.def().name().to_string())
                .or_insert(0) += event.duration;
        }
        self.redraw(&board);
        Ok(())
    }

    fn process_aggregate(
        &self,
        name: &str,
        _description: &str,
        value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut board = self.board.lock();
        board.aggregates.insert(name.to_string(), value);
        self.redraw(&board);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmetrics::metric::CountMetric;
    use chrono::Utc;

    #[test]
    fn counts_accumulate_across_batches() {
        let sink = ConsoleSink::new();
        let metric = CountMetric::new("MessageReceived", "inbound messages");
        let batch = vec![
            CountEvent {
                metric: metric.clone(),
                event_time_utc: Utc::now(),
            },
            CountEvent {
                metric: metric.clone(),
                event_time_utc: Utc::now(),
            },
        ];
        sink.process_counts(&batch).unwrap();
        sink.process_counts(&batch[..1]).unwrap();
        assert_eq!(sink.board.lock().running["MessageReceived"], 3);
    }

    #[test]
    fn statuses_overwrite_rather_than_accumulate() {
        use appmetrics::metric::StatusMetric;

        let sink = ConsoleSink::new();
        let metric = StatusMetric::new("AvailableMemory", "bytes free");
        sink.process_statuses(&[StatusEvent {
            metric: metric.clone(),
            event_time_utc: Utc::now(),
            value: 100,
        }])
        .unwrap();
        sink.process_statuses(&[StatusEvent {
            metric,
            event_time_utc: Utc::now(),
            value: 42,
        }])
        .unwrap();
        assert_eq!(sink.board.lock().running["AvailableMemory"], 42);
    }
}
