//! Prometheus scrape endpoint.
//!
//! The recorder is process-wide: the first [`install_recorder`] call wins and
//! later calls reuse its handle. The HTTP endpoint is bound eagerly so a busy
//! port fails the run at startup instead of being logged from a background
//! task.

use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{BindSnafu, MetricsError, PrometheusInitSnafu};

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder, or return the one already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = RECORDER.get() {
        return Ok(handle.clone());
    }
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if RECORDER.set(handle.clone()).is_err() {
        // Lost the race: keep the winner's handle, drop our recorder.
        return RECORDER.get().cloned().context(PrometheusInitSnafu);
    }
    metrics::set_global_recorder(recorder)
        .ok()
        .context(PrometheusInitSnafu)?;
    Ok(handle)
}

/// A bound `/metrics` + `/health` listener.
pub struct MetricsEndpoint {
    listener: TcpListener,
    handle: PrometheusHandle,
}

impl MetricsEndpoint {
    /// Install the recorder and bind `addr`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, MetricsError> {
        let handle = install_recorder()?;
        let listener = TcpListener::bind(addr).await.context(BindSnafu { addr })?;
        Ok(Self { listener, handle })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serve in the background until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) {
        let addr = self.local_addr();
        let app = Router::new()
            .route("/metrics", get(render))
            .route("/health", get(|| async { "ok\n" }))
            .with_state(self.handle);

        tokio::spawn(async move {
            let served = axum::serve(self.listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "Metrics endpoint stopped");
            }
        });
        info!(addr = ?addr, "Metrics endpoint listening");
    }
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_install_recorder_is_idempotent() {
        let first = install_recorder().unwrap();
        let second = install_recorder().unwrap();
        counter!("tsn_ingest_core_test_counter").increment(3);
        assert!(first.render().contains("tsn_ingest_core_test_counter"));
        assert_eq!(first.render(), second.render());
    }

    #[tokio::test]
    async fn test_endpoint_serves_until_shutdown() {
        let endpoint = MetricsEndpoint::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = endpoint.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        endpoint.spawn(shutdown.clone());

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("ok\n"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        assert!(matches!(
            MetricsEndpoint::bind(addr).await,
            Err(MetricsError::Bind { .. })
        ));
    }
}
