#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! An in-process, buffered application metrics pipeline.
//!
//! Caller threads record counts, amounts, statuses, and intervals; a
//! background worker — driven by a pluggable [`strategy`] — periodically
//! drains the buffered records, validates interval begin/end/cancel
//! pairing, computes [`aggregate`] ratios, and hands finalised batches to a
//! [`sink::Sink`].
//!
//! ```no_run
//! use appmetrics::aggregate::{AggregateDef, CountOverTime, TimeUnit};
//! use appmetrics::buffer::{BufferConfig, MetricLoggerBuffer};
//! use appmetrics::filter::NullSink;
//! use appmetrics::metric::CountMetric;
//! use appmetrics::strategy::Looping;
//! use std::sync::Arc;
//!
//! let strategy = Arc::new(Looping::new(250).unwrap());
//! let buffer = MetricLoggerBuffer::with_system_clocks(
//!     BufferConfig::default(),
//!     strategy,
//!     Arc::new(NullSink),
//! );
//! buffer.start().unwrap();
//!
//! let messages_received = CountMetric::new("MessageReceived", "inbound messages");
//! buffer.define_metric_aggregate(AggregateDef::CountOverTime(CountOverTime {
//!     numerator: messages_received.clone(),
//!     unit: TimeUnit::Second,
//!     name: "MessagesReceivedPerSecond".into(),
//!     description: "inbound message rate".into(),
//! }));
//! buffer.increment(&messages_received).unwrap();
//! buffer.stop();
//! ```

pub mod aggregate;
pub mod buffer;
pub mod clock;
pub mod event;
mod error;
pub mod filter;
#[cfg(feature = "log")]
pub mod log;
pub mod metric;
pub mod sink;
pub mod strategy;
mod validator;

pub use error::Error;
