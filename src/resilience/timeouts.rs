//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap dependency calls with a deadline
//! - Signal cancellation to the in-flight attempt on expiry
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Cancellation is cooperative: the operation receives a token and must
//!   watch it; the wrapper only stops waiting
//! - This is the only place the subsystem suspends

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::resilience::error::TimeoutError;

/// Run `operation` on a bounded time budget.
///
/// On expiry the token handed to the operation is cancelled and
/// `TimeoutError` is returned. The operation's own result is passed through
/// untouched otherwise.
pub async fn with_timeout<F, Fut, T>(duration: Duration, operation: F) -> Result<T, TimeoutError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let token = CancellationToken::new();
    // Cancels spawned work still holding a child token even if the caller
    // drops this future early.
    let _guard = token.clone().drop_guard();

    match tokio::time::timeout(duration, operation(token.child_token())).await {
        Ok(output) => Ok(output),
        Err(_) => {
            token.cancel();
            tracing::debug!(budget = ?duration, "Operation exceeded time budget, cancelled");
            Err(TimeoutError(duration))
        }
    }
}
