//! The interface the buffer delivers finalised events to.
//!
//! A sink is invoked exclusively from the worker thread, in the fixed
//! per-drain order: counts, amounts, statuses, intervals, then aggregates.
//! An error from any call propagates through the bound strategy's rethrow
//! mechanism to the next producer-thread call — see [`crate::strategy`].

use crate::event::{AmountEvent, CountEvent, IntervalEvent, StatusEvent};
use std::error::Error as StdError;

/// Implemented by anything the buffer can hand finalised metric batches to:
/// a console formatter, a delimited-file writer, a user-supplied exporter,
/// or one of the [`crate::filter`] decorators wrapping another sink.
pub trait Sink: Send + Sync {
    fn process_counts(&self, batch: &[CountEvent]) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;

    fn process_aggregate(
        &self,
        name: &str,
        description: &str,
        value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}
