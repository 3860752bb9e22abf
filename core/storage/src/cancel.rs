//! Cancellation helpers.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use filestore_common::{Error, Result};

/// Fail with [`Error::Cancelled`] if `cancel` has fired.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Run `future` until it completes or `cancel` fires.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ensure_active(cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}
