//! tsn-ingest-core: Shared runtime pieces for the tsn-ingest pipeline.
//!
//! Everything here is independent of the ingestion domain:
//!
//! - `config/` - Environment variable interpolation and run-wide settings
//! - `metrics/` - Internal event trait and the optional Prometheus endpoint
//! - `topology/` - Keyed task runner with bounded concurrency and a final join
//! - `signal` - Signal handling for graceful cancellation
//! - `tracing` - Subscriber setup for the CLI
//! - `error` - Error types shared across crates

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod topology;
pub mod tracing;

pub use config::{GlobalConfig, InterpolationResult, LogFormat, MetricsConfig, interpolate};
pub use error::{ConfigError, MetricsError, SetupError};
pub use metrics::{InternalEvent, MetricsEndpoint, start as start_metrics};
pub use signal::shutdown_signal;
pub use topology::{CallInterrupt, KeyedRunner, TaskError, TaskResult, bounded_call};
pub use tracing::init_tracing;
