//! Suspension points that observe cancellation.

use core::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `delay` unless the token fires first.
///
/// Returns `false` if cancelled.
pub async fn pause(token: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !token.is_cancelled();
    }

    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Drive `fut` to completion unless the token fires first.
pub async fn or_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        out = fut => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pause_completes() {
        let token = CancellationToken::new();
        assert!(pause(&token, Duration::from_millis(5)).await);
        assert!(pause(&token, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_pause_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!pause(&token, Duration::from_secs(3600)).await);
        assert!(!pause(&token, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_or_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(or_cancelled(&token, async { 7 }).await, Some(7));

        token.cancel();
        assert_eq!(or_cancelled(&token, core::future::pending::<u32>()).await, None);
    }
}
