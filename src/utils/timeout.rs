//! Async timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Default timeout for channel operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single outbound frame
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a fallible future, mapping expiry to [`BridgeError::Timeout`]
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Timeout),
    }
}
