use std::future::Future;
use std::time::Duration;

use mychat_core::{ChatError, StoreError};

/// Run a store read with a deadline. Expiry is reported as a retryable
/// `StoreError::Timeout`.
///
/// Only for reads: dropping a write here would not stop it from landing.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ChatError::from),
        Err(_) => Err(StoreError::Timeout(limit).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(1)
        };
        let err = bounded(Duration::from_millis(50), slow).await.unwrap_err();
        assert!(matches!(err, ChatError::Storage(StoreError::Timeout(_))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let value = bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn store_error_is_wrapped() {
        let err = bounded(Duration::from_secs(1), async {
            Err::<(), _>(StoreError::Unavailable("down".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.error_kind(), "storage_error");
    }
}
