use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `token` is cancelled first.
///
/// Returns `true` if the full delay elapsed, `false` if it was cut short.
pub async fn cancellable_sleep(duration: Duration, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let token = CancellationToken::new();
        assert!(cancellable_sleep(Duration::from_secs(30), &token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert!(!cancellable_sleep(Duration::from_secs(3600), &token).await);
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!cancellable_sleep(Duration::ZERO, &token).await);
    }
}
