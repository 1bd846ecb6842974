//! Sink decorators: filters that forward to an inner sink based on which
//! specific metrics (inclusion/exclusion) or which metric kinds (by-type)
//! are enabled, plus a null sink that discards everything.
//!
//! These are sink-shaped collaborators, not part of the core pipeline, but
//! small enough, and needed often enough, to ship alongside the core rather
//! than punt entirely.

use crate::event::{AmountEvent, CountEvent, IntervalEvent, StatusEvent};
use crate::metric::{AmountMetric, CountMetric, IntervalMetric, MetricIdentity, StatusMetric};
use crate::sink::Sink;
use crate::Error;
use ahash::AHashSet;
use std::error::Error as StdError;
use std::sync::Arc;

/// A sink that discards every event. Useful as a default, or as the base of
/// a filter chain in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn process_counts(&self, _: &[CountEvent]) -> Result<(), Box<dyn StdError + Send + Sync>> {
        Ok(())
    }

    fn process_amounts(&self, _: &[AmountEvent]) -> Result<(), Box<dyn StdError + Send + Sync>> {
        Ok(())
    }

    fn process_statuses(&self, _: &[StatusEvent]) -> Result<(), Box<dyn StdError + Send + Sync>> {
        Ok(())
    }

    fn process_intervals(
        &self,
        _: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        Ok(())
    }

    fn process_aggregate(
        &self,
        _: &str,
        _: &str,
        _: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        Ok(())
    }
}

fn build_set<M: MetricIdentity>(items: &[M], param_name: &'static str) -> Result<AHashSet<u64>, Error> {
    let mut set = AHashSet::with_capacity(items.len());
    for item in items {
        let def = item.def();
        if !set.insert(def.id()) {
            return Err(Error::DuplicateFilterMembership {
                param_name,
                metric_name: def.name().to_string(),
            });
        }
    }
    Ok(set)
}

/// The four per-kind membership sets shared by [`InclusionFilter`] and
/// [`ExclusionFilter`].
struct MetricSets {
    counts: AHashSet<u64>,
    amounts: AHashSet<u64>,
    statuses: AHashSet<u64>,
    intervals: AHashSet<u64>,
}

impl MetricSets {
    fn new(
        counts: &[CountMetric],
        amounts: &[AmountMetric],
        statuses: &[StatusMetric],
        intervals: &[IntervalMetric],
    ) -> Result<Self, Error> {
        Ok(Self {
            counts: build_set(counts, "counts")?,
            amounts: build_set(amounts, "amounts")?,
            statuses: build_set(statuses, "statuses")?,
            intervals: build_set(intervals, "intervals")?,
        })
    }
}

/// Forwards an event to the inner sink iff its metric is a member of the
/// corresponding set.
pub struct InclusionFilter {
    inner: Arc<dyn Sink>,
    sets: MetricSets,
}

impl InclusionFilter {
    pub fn new(
        inner: Arc<dyn Sink>,
        counts: &[CountMetric],
        amounts: &[AmountMetric],
        statuses: &[StatusMetric],
        intervals: &[IntervalMetric],
    ) -> Result<Self, Error> {
        Ok(Self {
            inner,
            sets: MetricSets::new(counts, amounts, statuses, intervals)?,
        })
    }
}

impl Sink for InclusionFilter {
    fn process_counts(
        &self,
        batch: &[CountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| self.sets.counts.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_counts(&filtered)
    }

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| self.sets.amounts.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_amounts(&filtered)
    }

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| self.sets.statuses.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_statuses(&filtered)
    }

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| self.sets.intervals.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_intervals(&filtered)
    }

    fn process_aggregate(
        &self,
        name: &str,
        description: &str,
        value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.inner.process_aggregate(name, description, value)
    }
}

/// Forwards an event to the inner sink iff its metric is *not* a member of
/// the corresponding set.
pub struct ExclusionFilter {
    inner: Arc<dyn Sink>,
    sets: MetricSets,
}

impl ExclusionFilter {
    pub fn new(
        inner: Arc<dyn Sink>,
        counts: &[CountMetric],
        amounts: &[AmountMetric],
        statuses: &[StatusMetric],
        intervals: &[IntervalMetric],
    ) -> Result<Self, Error> {
        Ok(Self {
            inner,
            sets: MetricSets::new(counts, amounts, statuses, intervals)?,
        })
    }
}

impl Sink for ExclusionFilter {
    fn process_counts(
        &self,
        batch: &[CountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| !self.sets.counts.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_counts(&filtered)
    }

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| !self.sets.amounts.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_amounts(&filtered)
    }

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| !self.sets.statuses.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_statuses(&filtered)
    }

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let filtered: Vec<_> = batch
            .iter()
            .filter(|e| !self.sets.intervals.contains(&e.metric.def().id()))
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Ok(());
        }
        self.inner.process_intervals(&filtered)
    }

    fn process_aggregate(
        &self,
        name: &str,
        description: &str,
        value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.inner.process_aggregate(name, description, value)
    }
}

/// Forwards an entire batch to the inner sink iff that batch's kind is
/// enabled, leaving individual metric identity out of consideration.
pub struct ByTypeFilter {
    inner: Arc<dyn Sink>,
    counts_enabled: bool,
    amounts_enabled: bool,
    statuses_enabled: bool,
    intervals_enabled: bool,
}

impl ByTypeFilter {
    pub fn new(
        inner: Arc<dyn Sink>,
        counts_enabled: bool,
        amounts_enabled: bool,
        statuses_enabled: bool,
        intervals_enabled: bool,
    ) -> Self {
        Self {
            inner,
            counts_enabled,
            amounts_enabled,
            statuses_enabled,
            intervals_enabled,
        }
    }
}

impl Sink for ByTypeFilter {
    fn process_counts(
        &self,
        batch: &[CountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.counts_enabled {
            self.inner.process_counts(batch)
        } else {
            Ok(())
        }
    }

    fn process_amounts(
        &self,
        batch: &[AmountEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.amounts_enabled {
            self.inner.process_amounts(batch)
        } else {
            Ok(())
        }
    }

    fn process_statuses(
        &self,
        batch: &[StatusEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.statuses_enabled {
            self.inner.process_statuses(batch)
        } else {
            Ok(())
        }
    }

    fn process_intervals(
        &self,
        batch: &[IntervalEvent],
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        if self.intervals_enabled {
            self.inner.process_intervals(batch)
        } else {
            Ok(())
        }
    }

    fn process_aggregate(
        &self,
        name: &str,
        description: &str,
        value: f64,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.inner.process_aggregate(name, description, value)
    }
}
