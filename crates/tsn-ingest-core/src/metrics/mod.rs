//! Metrics infrastructure.
//!
//! Domain crates define event structs and implement [`InternalEvent`] for
//! them; emitting an event records the matching `metrics` counter and a
//! trace line. Without an installed recorder the counters are no-ops, so
//! events can be emitted unconditionally.

mod server;

use std::net::SocketAddr;

use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::MetricsConfig;
use crate::error::{AddressParseSnafu, MetricsSnafu, SetupError};

pub use server::{MetricsEndpoint, install_recorder};

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Start the metrics endpoint if `config` names an address.
///
/// Returns the bound address, or `None` when metrics are disabled. The
/// endpoint stops when `shutdown` fires.
pub async fn start(config: &MetricsConfig, shutdown: CancellationToken) -> Result<Option<SocketAddr>, SetupError> {
    let Some(address) = config.address.as_deref() else {
        debug!("No metrics address configured");
        return Ok(None);
    };
    let addr: SocketAddr = address.parse().context(AddressParseSnafu { address })?;
    let endpoint = MetricsEndpoint::bind(addr).await.context(MetricsSnafu)?;
    let bound = endpoint.local_addr();
    endpoint.spawn(shutdown);
    Ok(bound.or(Some(addr)))
}
