//! Value encoding, write-back policy, metrics, and configuration.
//!
//! These are the pluggable capabilities the session layer composes: how a value
//! becomes bytes, whether it can change behind the view's back, and how the
//! factory is tuned and observed.

mod immutability;
mod marshal;
mod metrics;
mod options;

/// Write-back policy for attribute values.
pub use immutability::{Immutability, ImmutableScalars, NeverImmutable};

/// Attribute value marshalling.
pub use marshal::{JsonMarshaller, Marshaller};

/// Metrics and counters.
pub use metrics::{default_metrics, AttributeMetrics, CounterMetrics, MetricsSnapshot, NoopMetrics};

/// Factory and store configuration.
pub use options::{
    Config, FactoryOptions, FactorySection, StoreSections, DEFAULT_CASCADE_THREAD_NAME,
    DEFAULT_CASCADE_WORKERS,
};
