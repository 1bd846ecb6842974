//! Metric definitions.
//!
//! Metric identity is nominal, not by name: two [`CountMetric`] (or
//! [`AmountMetric`]/[`StatusMetric`]/[`IntervalMetric`]) values are the
//! *same* metric iff they were produced by the same constructor call —
//! typically because the caller cloned a value stashed in a `static` or a
//! struct field, not because their `name`s happen to match. Rather than a
//! class hierarchy (Count/Amount/Status/Interval), identity and payload
//! kind are carried by one tagged definition (`MetricDef`) so the buffer
//! and validator never need runtime type lookups.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_METRIC_ID: AtomicU64 = AtomicU64::new(1);

/// The four measurement kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// An event happened once; no payload.
    Count,
    /// An event of a given non-negative size.
    Amount,
    /// The current level at a sample point; summing is not meaningful.
    Status,
    /// A span between a matched begin and end.
    Interval,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Count => "count",
            MetricKind::Amount => "amount",
            MetricKind::Status => "status",
            MetricKind::Interval => "interval",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct MetricDefInner {
    id: u64,
    kind: MetricKind,
    name: String,
    description: String,
}

/// A single, uniquely-identified metric definition.
///
/// Cloning a `MetricDef` (or any of the typed wrappers below) is cheap and
/// preserves identity: the clone and the original are the same metric.
#[derive(Debug, Clone)]
pub struct MetricDef(Arc<MetricDefInner>);

impl MetricDef {
    fn new(kind: MetricKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        let id = NEXT_METRIC_ID.fetch_add(1, Ordering::Relaxed);
        Self(Arc::new(MetricDefInner {
            id,
            kind,
            name: name.into(),
            description: description.into(),
        }))
    }

    /// A process-unique id identifying this metric, distinct from its name.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// The metric's display name. Used only by sinks; never used for
    /// identity comparisons.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// A human-readable description of what the metric measures.
    pub fn description(&self) -> &str {
        &self.0.description
    }

    /// The measurement kind this metric carries.
    pub fn kind(&self) -> MetricKind {
        self.0.kind
    }
}

impl PartialEq for MetricDef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for MetricDef {}

impl std::hash::Hash for MetricDef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

/// Common accessor for the four typed metric wrappers, so generic code
/// (the [`crate::filter`] decorators) can work over any of them without
/// matching on [`MetricKind`].
pub trait MetricIdentity {
    fn def(&self) -> &MetricDef;
}

macro_rules! metric_wrapper {
    ($name:ident, $kind:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(MetricDef);

        impl $name {
            /// Defines a new metric with the given display name and
            /// description. Each call produces a distinct metric identity,
            /// even if the name matches an existing metric's.
            pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
                Self(MetricDef::new($kind, name, description))
            }

            /// Returns the underlying type-erased definition, as consumed
            /// by the buffer and sinks.
            pub fn def(&self) -> &MetricDef {
                &self.0
            }
        }

        impl MetricIdentity for $name {
            fn def(&self) -> &MetricDef {
                &self.0
            }
        }

        impl From<$name> for MetricDef {
            fn from(m: $name) -> MetricDef {
                m.0
            }
        }
    };
}

metric_wrapper!(CountMetric, MetricKind::Count, "A metric tallied by one per occurrence.");
metric_wrapper!(
    AmountMetric,
    MetricKind::Amount,
    "A metric with an additive, non-negative integer size per event."
);
metric_wrapper!(
    StatusMetric,
    MetricKind::Status,
    "A metric sampling a signed level at a point in time; latest wins."
);
metric_wrapper!(
    IntervalMetric,
    MetricKind::Interval,
    "A metric measuring the duration between a matched begin and end."
);
