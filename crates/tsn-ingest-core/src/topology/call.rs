//! Per-call timeout and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a bounded call did not return its own result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallInterrupt {
    /// The call did not finish within the timeout.
    TimedOut(Duration),
    /// The run was cancelled while the call was in flight.
    Cancelled,
}

/// Await `future` for at most `timeout`, giving up early if `shutdown` fires.
///
/// The future is dropped on timeout or cancellation, which aborts the
/// underlying I/O for every client used in this workspace.
pub async fn bounded_call<F>(
    timeout: Duration,
    shutdown: &CancellationToken,
    future: F,
) -> Result<F::Output, CallInterrupt>
where
    F: Future,
{
    match shutdown
        .run_until_cancelled(tokio::time::timeout(timeout, future))
        .await
    {
        Some(Ok(output)) => Ok(output),
        Some(Err(_elapsed)) => Err(CallInterrupt::TimedOut(timeout)),
        None => Err(CallInterrupt::Cancelled),
    }
}
