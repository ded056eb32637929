//! Poll-until-terminal loop shared by file batch indexing and generation runs.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::error::{AduChatError, Result};

/// How often to poll and how long to wait before giving up.
/// `timeout: None` waits for as long as the remote side takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Call `check` until it yields `Some`, sleeping `opts.interval` between calls.
///
/// Errors from `check` propagate immediately. The token and the optional
/// deadline are observed both during the sleep and during each check.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    opts: PollOptions,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = opts.timeout.map(|t| Instant::now() + t);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AduChatError::Cancelled { what: what.to_string() });
            }
            _ = sleep_until_deadline(deadline) => {
                return Err(timeout_error(what, opts));
            }
            res = check() => res?,
        };

        if let Some(value) = outcome {
            tracing::debug!(what, attempts, "Poll reached terminal state");
            return Ok(value);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AduChatError::Cancelled { what: what.to_string() });
            }
            _ = sleep_until_deadline(deadline) => {
                return Err(timeout_error(what, opts));
            }
            _ = sleep(opts.interval) => {}
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn timeout_error(what: &str, opts: PollOptions) -> AduChatError {
    AduChatError::Timeout {
        what: what.to_string(),
        after: opts.timeout.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(timeout: Option<Duration>) -> PollOptions {
        PollOptions::new(Duration::from_millis(5), timeout)
    }

    #[tokio::test]
    async fn test_returns_once_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        let counter = calls.clone();
        let value = poll_until("run", fast(None), &token, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n >= 3).then_some(n))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_check_errors_propagate() {
        let token = CancellationToken::new();
        let result: Result<()> = poll_until("run", fast(None), &token, || async {
            Err(AduChatError::Internal("boom".to_string()))
        })
        .await;
        assert!(matches!(result, Err(AduChatError::Internal(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_times_out_when_never_terminal() {
        let token = CancellationToken::new();
        let result: Result<()> = poll_until(
            "file batch",
            fast(Some(Duration::from_millis(30))),
            &token,
            || async { Ok(None) },
        )
        .await;
        match result {
            Err(AduChatError::Timeout { what, after }) => {
                assert_eq!(what, "file batch");
                assert_eq!(after, Duration::from_millis(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<()> = poll_until("run", fast(None), &token, || async { Ok(None) }).await;
        assert!(matches!(result, Err(AduChatError::Cancelled { .. })));
    }
}
