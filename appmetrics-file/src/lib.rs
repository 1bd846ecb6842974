//! A delimited-file sink for [`appmetrics`], compatible with existing
//! line-oriented readers.
//!
//! One record per line, fields separated by a constructor-chosen delimiter
//! character surrounded by single spaces (`" | "` for the common `|`
//! delimiter):
//!
//! ```text
//! 2022-09-03 10:41:52.250 | MessageReceived
//! 2022-09-03 10:41:52.250 | BytesReceived | 1024
//! 2022-09-03 10:41:52.250 | AvailableMemory | 301156000
//! 2022-09-03 10:41:52.250 | MessageProcessingTime | 39
//! ```
//!
//! Timestamps are local time with millisecond precision. The writer flushes
//! after every record, so a reader tailing the file never sees a partial
//! line. Aggregates aren't written here — the format predates them and
//! existing readers don't expect a fifth record shape; route aggregates to
//! a sink that understands them, e.g. `appmetrics-console`.

#![deny(rust_2018_idioms, unsafe_code, missing_docs)]

use appmetrics::event::{AmountEvent, CountEvent, IntervalEvent, StatusEvent};
use appmetrics::sink::Sink;
use chrono::Local;
use parking_lot::Mutex;
use std::error::Error as StdError;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes finalised metric events to a delimited text file, one record per
/// line.
pub struct DelimitedFileSink {
    delimiter: char,
    writer: Mutex<BufWriter<File>>,
}

impl DelimitedFileSink {
    /// Opens (creating if necessary, appending if it already exists) the
    /// file at `path` and returns a sink that writes records to it,
    /// separating fields with `delimiter`.
    pub fn create(path: impl AsRef<Path>, delimiter: char) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            delimiter,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn sep(&self) -> String {
        format!(" {} ", self.delimiter)
    }

    fn timestamp(&self, event_time_utc: chrono::DateTime<chrono::Utc>) -> String {
        event_time_utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string()
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

impl Sink for DelimitedFileSink {
    fn process_counts(&self, batch: &[CountEvent]) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let sep = self.sep();
        for event in batch {
            let line = format!(
                "{}{sep}{}",
                self.timestamp(event.event_time_utc),
                event.metric.def().name()
            );
            self.write_line(&line)?;
        }
        Ok(())
    }

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let sep = self.sep();
        for event in batch {
            let line = format!(
                "{}{sep}{}{sep}{}",
                self.timestamp(event.event_time_utc),
                event.metric.def().name(),
                event.amount
            );
            self.write_line(&line)?;
        }
        Ok(())
    }

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let sep = self.sep();
        for event in batch {
            let line = format!(
                "{}{sep}{}{sep}{}",
                self.timestamp(event.event_time_utc),
                event.metric.def().name(),
                event.value
            );
            self.write_line(&line)?;
        }
        Ok(())
    }

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let sep = self.sep();
        for event in batch {
            let line = format!(
                "{}{sep}{}{sep}{}",
                self.timestamp(event.event_time_utc),
                event.metric.def().name(),
                event.duration
            );
            self.write_line(&line)?;
        }
        Ok(())
    }

    fn process_aggregate(
        &self,
        _name: &str,
        _description: &str,
        _value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        Ok(())
    }
}
