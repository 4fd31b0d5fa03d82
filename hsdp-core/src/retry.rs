//! Retry - Call orchestration with bounded exponential backoff
//!
//! Two surface forms:
//!
//! - [`try_http_call`] drives an [`Attemptable`] and classifies each attempt by
//!   its HTTP status: transient statuses are retried with backoff, 401 and 403
//!   refresh the access token first, everything else is conclusive.
//! - [`retry_with_backoff`] drives an operation whose errors are already marked
//!   [`RetryError::Permanent`] or [`RetryError::Transient`], typically by
//!   [`check_for_permission_errors`].
//!
//! Every attempt, token refresh and backoff sleep is raced against the
//! caller's cancellation token.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// Default number of attempts per call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Default first backoff delay in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Something holding an access token that can be renewed in place
pub trait TokenRefresh: Send + Sync {
    fn refresh_token(&self) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Response metadata of one HTTP round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
}

impl ResponseMeta {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of a single HTTP round-trip
#[derive(Debug)]
pub struct CallAttempt<T> {
    /// Absent when no response was received
    pub response: Option<ResponseMeta>,
    pub result: ProviderResult<T>,
}

impl<T> CallAttempt<T> {
    pub fn new(response: Option<ResponseMeta>, result: ProviderResult<T>) -> Self {
        Self { response, result }
    }

    pub fn ok(status: u16, value: T) -> Self {
        Self::new(Some(ResponseMeta::new(status)), Ok(value))
    }

    /// A failed round-trip that still produced a response
    pub fn failed(status: u16, err: ProviderError) -> Self {
        Self::new(Some(ResponseMeta::new(status)), Err(err))
    }

    /// A round-trip that produced no response at all
    pub fn no_response(err: ProviderError) -> Self {
        Self::new(None, Err(err))
    }

    pub fn status(&self) -> Option<u16> {
        self.response.map(|r| r.status)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallAttempt<U> {
        CallAttempt {
            response: self.response,
            result: self.result.map(f),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> ProviderResult<U>) -> CallAttempt<U> {
        CallAttempt {
            response: self.response,
            result: self.result.and_then(f),
        }
    }

    pub fn into_result(self) -> ProviderResult<T> {
        self.result
    }
}

/// One retryable unit of work. Must be safe to invoke repeatedly.
pub trait Attemptable<T> {
    fn attempt(&mut self) -> impl Future<Output = CallAttempt<T>> + Send;
}

impl<T, F, Fut> Attemptable<T> for F
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CallAttempt<T>> + Send,
{
    fn attempt(&mut self) -> impl Future<Output = CallAttempt<T>> + Send {
        self()
    }
}

/// Backoff and classification settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
    /// Statuses treated as transient; `None` means any 5xx, 429 and 403
    pub retryable: Option<Vec<u16>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            retryable: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_retryable(mut self, statuses: &[u16]) -> Self {
        self.retryable = Some(statuses.to_vec());
        self
    }

    /// Policy that never sleeps; used where latency matters more than
    /// spreading load, and in tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        match &self.retryable {
            Some(statuses) => statuses.contains(&status),
            None => (500..600).contains(&status) || status == 429 || status == 403,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = self.base_delay.as_millis() as f64 * exp;
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay_ms = if self.jitter {
            let range = capped * 0.25;
            (capped + rand::random::<f64>() * range * 2.0 - range).max(0.0)
        } else {
            capped
        };
        Duration::from_millis(delay_ms as u64)
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Conclusive; hand the result back
    Permanent,
    /// Try again after backoff
    Transient,
    /// Refresh the token, then try again after backoff
    RefreshAndRetry,
}

/// Classify an attempt by its response metadata
pub fn classify(policy: &RetryPolicy, response: Option<ResponseMeta>) -> Verdict {
    let Some(response) = response else {
        return Verdict::Permanent;
    };
    match response.status {
        s if s > 500 => Verdict::Transient,
        401 | 403 => Verdict::RefreshAndRetry,
        s if policy.is_retryable(s) => Verdict::Transient,
        _ => Verdict::Permanent,
    }
}

/// Run `call` until it is conclusive or the attempt budget is spent.
///
/// The closure runs exactly once when the first attempt is conclusive and at
/// most `policy.max_attempts` times overall. A 401 or 403 always refreshes the
/// token on `refresher` before the next attempt.
pub async fn try_http_call<T, A>(
    policy: &RetryPolicy,
    refresher: &dyn TokenRefresh,
    cancel: &CancellationToken,
    mut call: A,
) -> ProviderResult<T>
where
    A: Attemptable<T> + Send,
    T: Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = ProviderError::NoResponse;

    for attempt in 1..=max_attempts {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            outcome = call.attempt() => outcome,
        };

        let verdict = classify(policy, outcome.response);
        debug!(
            "attempt {}/{}: status {:?} -> {:?}",
            attempt,
            max_attempts,
            outcome.status(),
            verdict
        );

        match verdict {
            Verdict::Permanent => {
                return match (outcome.response, outcome.result) {
                    (None, Ok(_)) => Err(ProviderError::NoResponse),
                    (_, result) => result,
                };
            }
            Verdict::RefreshAndRetry => {
                debug!("HTTP {:?}, refreshing access token", outcome.status());
                refresh(refresher, cancel).await?;
            }
            Verdict::Transient => {}
        }

        last_error = match outcome.result {
            Err(e) => e,
            Ok(_) => ProviderError::http(
                outcome.status().unwrap_or_default(),
                "transient failure",
            ),
        };

        if attempt < max_attempts {
            sleep(policy.delay_for(attempt), cancel).await?;
        }
    }

    warn!(
        "giving up after {} attempts: {}",
        max_attempts, last_error
    );
    Err(last_error)
}

/// An error marked for the permanent-marker retry form
#[derive(Debug)]
pub enum RetryError {
    /// Stop immediately
    Permanent(ProviderError),
    /// Back off and try again
    Transient(ProviderError),
}

impl RetryError {
    pub fn into_inner(self) -> ProviderError {
        match self {
            RetryError::Permanent(e) | RetryError::Transient(e) => e,
        }
    }
}

/// Mark an error as permanent or transient. A 401 or 403 refreshes the token
/// and is transient, statuses above 500 are transient, everything else is
/// permanent.
pub async fn check_for_permission_errors(
    refresher: &dyn TokenRefresh,
    cancel: &CancellationToken,
    response: Option<ResponseMeta>,
    err: ProviderError,
) -> RetryError {
    match response.map(|r| r.status) {
        Some(401 | 403) => match refresh(refresher, cancel).await {
            Ok(()) => RetryError::Transient(err),
            Err(cancelled) => RetryError::Permanent(cancelled),
        },
        Some(s) if s > 500 => RetryError::Transient(err),
        _ => RetryError::Permanent(err),
    }
}

/// Run `op` under the policy's backoff until it succeeds, returns a permanent
/// error, or exhausts the attempt budget
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, RetryError>> + Send,
    T: Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = op() => result,
        };
        match result {
            Ok(value) => return Ok(value),
            Err(RetryError::Permanent(e)) => return Err(e),
            Err(RetryError::Transient(e)) => {
                if attempt >= max_attempts {
                    warn!("giving up after {} attempts: {}", attempt, e);
                    return Err(e);
                }
                debug!("attempt {}/{} transient: {}", attempt, max_attempts, e);
                sleep(policy.delay_for(attempt), cancel).await?;
                attempt += 1;
            }
        }
    }
}

/// Renew the token unless cancelled first. A failed refresh is logged and the
/// next attempt goes out with the old token.
async fn refresh(refresher: &dyn TokenRefresh, cancel: &CancellationToken) -> ProviderResult<()> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        result = refresher.refresh_token() => result,
    };
    if let Err(e) = result {
        warn!("token refresh failed: {}", e);
    }
    Ok(())
}

async fn sleep(delay: Duration, cancel: &CancellationToken) -> ProviderResult<()> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingRefresher {
        refreshes: AtomicUsize,
    }

    impl TokenRefresh for CountingRefresher {
        fn refresh_token(&self) -> BoxFuture<'_, ProviderResult<()>> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    /// Replays a fixed sequence of statuses, one per attempt
    fn scripted(statuses: &[u16]) -> Mutex<Vec<u16>> {
        let mut v = statuses.to_vec();
        v.reverse();
        Mutex::new(v)
    }

    fn next_attempt(script: &Mutex<Vec<u16>>, calls: &AtomicUsize) -> CallAttempt<&'static str> {
        calls.fetch_add(1, Ordering::SeqCst);
        let status = script.lock().unwrap().pop().unwrap_or(200);
        if (200..300).contains(&status) {
            CallAttempt::ok(status, "done")
        } else {
            CallAttempt::failed(status, ProviderError::http(status, "scripted"))
        }
    }

    #[tokio::test]
    async fn first_success_calls_once() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let script = scripted(&[200]);
        let result = try_http_call(
            &RetryPolicy::immediate(8),
            &refresher,
            &CancellationToken::new(),
            || std::future::ready(next_attempt(&script, &calls)),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forbidden_refreshes_token_between_attempts() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let script = scripted(&[403, 200]);
        let result = try_http_call(
            &RetryPolicy::immediate(8),
            &refresher,
            &CancellationToken::new(),
            || std::future::ready(next_attempt(&script, &calls)),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthorized_refreshes_token_between_attempts() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let script = scripted(&[401, 200]);
        let result = try_http_call(
            &RetryPolicy::immediate(8),
            &refresher,
            &CancellationToken::new(),
            || std::future::ready(next_attempt(&script, &calls)),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 1);
    }

    /// Refresher whose token exchange never completes
    struct StuckRefresher;

    impl TokenRefresh for StuckRefresher {
        fn refresh_token(&self) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_token_refresh() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let calls = AtomicUsize::new(0);
        let script = scripted(&[403, 200]);
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            try_http_call(&RetryPolicy::immediate(8), &StuckRefresher, &cancel, || {
                std::future::ready(next_attempt(&script, &calls))
            }),
        )
        .await
        .expect("refresh was not interrupted");
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_marked_refresh() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let marked = tokio::time::timeout(
            Duration::from_secs(2),
            check_for_permission_errors(
                &StuckRefresher,
                &cancel,
                Some(ResponseMeta::new(401)),
                ProviderError::http(401, "expired"),
            ),
        )
        .await
        .expect("refresh was not interrupted");
        assert!(matches!(marked, RetryError::Permanent(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn attempts_never_exceed_budget() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let script = scripted(&[503; 20]);
        let result = try_http_call(
            &RetryPolicy::immediate(5),
            &refresher,
            &CancellationToken::new(),
            || std::future::ready(next_attempt(&script, &calls)),
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let script = scripted(&[409, 200]);
        let err = try_http_call(
            &RetryPolicy::immediate(8),
            &refresher,
            &CancellationToken::new(),
            || std::future::ready(next_attempt(&script, &calls)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_retryable_set_excludes_500() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let script = scripted(&[500, 200]);
        let policy = RetryPolicy::immediate(8).with_retryable(&[429]);
        let err = try_http_call(&policy, &refresher, &CancellationToken::new(), || {
            std::future::ready(next_attempt(&script, &calls))
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 502 is above 500 and stays transient regardless of the set
        let calls = AtomicUsize::new(0);
        let script = scripted(&[502, 200]);
        assert!(
            try_http_call(&policy, &refresher, &CancellationToken::new(), || {
                std::future::ready(next_attempt(&script, &calls))
            })
            .await
            .is_ok()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_response_without_error_is_nil_response() {
        let refresher = CountingRefresher::default();
        let err = try_http_call(
            &RetryPolicy::immediate(3),
            &refresher,
            &CancellationToken::new(),
            || std::future::ready(CallAttempt::new(None, Ok(()))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "response is nil");
    }

    #[tokio::test]
    async fn transport_errors_are_permanent() {
        let refresher = CountingRefresher::default();
        let calls = AtomicUsize::new(0);
        let err = try_http_call(
            &RetryPolicy::immediate(3),
            &refresher,
            &CancellationToken::new(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(CallAttempt::<()>::no_response(ProviderError::Transport(
                    "connection reset".into(),
                )))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let refresher = CountingRefresher::default();
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_secs(3600))
            .with_max_attempts(3);
        let calls = AtomicUsize::new(0);
        let script = scripted(&[503, 503, 503]);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = try_http_call(&policy, &refresher, &cancel, || {
            std::future::ready(next_attempt(&script, &calls))
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_marker_stops_immediately() {
        let refresher = CountingRefresher::default();
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let result: ProviderResult<()> = retry_with_backoff(
            &RetryPolicy::immediate(5),
            &cancel,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let refresher = &refresher;
                let cancel = &cancel;
                async move {
                    let status = match n {
                        0 => 403,
                        1 => 401,
                        _ => 400,
                    };
                    Err(check_for_permission_errors(
                        refresher,
                        cancel,
                        Some(ResponseMeta::new(status)),
                        ProviderError::http(status, "nope"),
                    )
                    .await)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(refresher.refreshes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn default_retryable_set() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(500));
        assert!(policy.is_retryable(429));
        assert!(policy.is_retryable(403));
        assert!(!policy.is_retryable(404));
        assert_eq!(classify(&policy, None), Verdict::Permanent);
        assert_eq!(
            classify(&policy, Some(ResponseMeta::new(403))),
            Verdict::RefreshAndRetry
        );
        assert_eq!(
            classify(&policy, Some(ResponseMeta::new(401))),
            Verdict::RefreshAndRetry
        );
    }
}
