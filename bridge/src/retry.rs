//! Bounded exponential backoff for remote calls

use std::future::Future;

use lichess_client::ClientResult;

use crate::cancel::CancelSignal;
use crate::config::RetryPolicy;
use crate::error::BridgeError;

/// Run `call` until it succeeds, fails permanently, or transient failures
/// exhaust `policy`. When `cancel` is given, both the call and the backoff
/// sleep give way to it.
pub(crate) async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    cancel: Option<&CancelSignal>,
    operation: &'static str,
    mut call: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(BridgeError::Cancelled),
            result = call() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(operation, attempt, ?delay, "Transient failure, retrying: {}", e);
                tokio::select! {
                    biased;
                    _ = cancelled(cancel) => return Err(BridgeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(BridgeError::remote(operation, e)),
        }
    }
}

async fn cancelled(cancel: Option<&CancelSignal>) {
    match cancel {
        Some(cancel) => cancel.cancelled().await,
        None => std::future::pending().await,
    }
}
