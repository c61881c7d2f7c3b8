//! Retry with exponential backoff and a circuit breaker for inference calls.
//!
//! ```text
//!   Closed --(failure_threshold consecutive transient failures)--> Open
//!   Open   --(cooldown elapsed, one probe admitted)-------------> HalfOpen
//!   HalfOpen --(probe succeeds)--> Closed
//!   HalfOpen --(probe fails)-----> Open
//!   HalfOpen --(probe cancelled)-> HalfOpen, next caller probes
//! ```
//!
//! While a probe runs, other calls wait for its outcome instead of failing.
//!
//! Only transient failures (transport errors, HTTP 429 and 5xx) are retried
//! and counted against the breaker. A malformed reply proves the provider is
//! reachable, so it resets the failure count and is returned immediately.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use parley_core::config::RetryConfig;
use parley_core::types::ExtractedEntities;

use crate::client::InferenceClient;
use crate::error::InferenceError;

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter:
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// [`delay_for`](Self::delay_for) with jitter: uniform in `[d/2, d]`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let millis = delay.as_millis() as u64;
        if millis < 2 {
            return delay;
        }
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(millis / 2..=millis))
    }
}

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls fail fast until the cooldown expires.
    Open,
    /// One probe call is deciding whether to close again.
    HalfOpen,
}

/// Why [`CircuitBreaker::try_acquire`] refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Open; the cooldown has this long left.
    Open(Duration),
    /// Half-open with the probe still running.
    ProbeInFlight,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
    probe_settled: Notify,
}

/// Permission for one call, returned by [`CircuitBreaker::try_acquire`].
///
/// A probe permit dropped without reporting an outcome hands the probe slot
/// to the next caller.
#[must_use]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
}

impl Permit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.probe = false;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.probe = false;
        self.breaker.record_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe {
            self.breaker.abandon_probe();
        }
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            probe_settled: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask permission for one call.
    ///
    /// Once the cooldown has elapsed the breaker half-opens and admits exactly
    /// one probe. Other callers get [`Rejection::ProbeInFlight`] until that
    /// probe reports back or its permit is dropped.
    pub fn try_acquire(&self) -> Result<Permit<'_>, Rejection> {
        let mut inner = self.lock();
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(self.cooldown);
                if elapsed < self.cooldown {
                    return Err(Rejection::Open(self.cooldown - elapsed));
                }
                inner.state = CircuitState::HalfOpen;
                info!("Inference circuit half-open, admitting probe");
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(Rejection::ProbeInFlight);
                }
                true
            }
        };
        if probe {
            inner.probe_in_flight = true;
        }
        Ok(Permit {
            breaker: self,
            probe,
        })
    }

    /// Wait for a permit, queueing behind a running probe.
    ///
    /// Fails only while the breaker is open.
    pub async fn acquire(&self) -> Result<Permit<'_>, Duration> {
        loop {
            let settled = self.probe_settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            match self.try_acquire() {
                Ok(permit) => return Ok(permit),
                Err(Rejection::Open(remaining)) => return Err(remaining),
                Err(Rejection::ProbeInFlight) => settled.await,
            }
        }
    }

    pub fn record_success(&self) {
        {
            let mut inner = self.lock();
            if inner.state != CircuitState::Closed {
                info!("Inference circuit closed");
            }
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.probe_in_flight = false;
        }
        self.probe_settled.notify_waiters();
    }

    pub fn record_failure(&self) {
        {
            let mut inner = self.lock();
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            inner.probe_in_flight = false;

            let trip = match inner.state {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
                CircuitState::Open => false,
            };
            if trip {
                warn!(
                    failures = inner.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Inference circuit opened"
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
        }
        self.probe_settled.notify_waiters();
    }

    fn abandon_probe(&self) {
        {
            let mut inner = self.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.probe_in_flight = false;
                debug!("Inference probe cancelled, releasing slot");
            }
        }
        self.probe_settled.notify_waiters();
    }
}

/// Wraps any [`InferenceClient`] with retries and a circuit breaker.
pub struct ResilientInference<C> {
    inner: C,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<C: InferenceClient> ResilientInference<C> {
    pub fn new(inner: C, config: &RetryConfig) -> Self {
        Self::with_parts(
            inner,
            RetryPolicy::from_config(config),
            CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.cooldown_secs),
            ),
        )
    }

    pub fn with_parts(inner: C, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, InferenceError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let permit = match self.breaker.acquire().await {
                Ok(permit) => permit,
                Err(remaining) => {
                    warn!(operation, "Inference circuit open, failing fast");
                    return Err(InferenceError::CircuitOpen {
                        retry_after_secs: remaining.as_secs(),
                    });
                }
            };

            match f().await {
                Ok(value) => {
                    permit.success();
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    permit.failure();
                    if attempt >= self.policy.max_attempts {
                        warn!(operation, attempts = attempt, error = %e, "Inference call gave up");
                        return Err(e);
                    }
                    let delay = self.policy.jittered_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient inference failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    permit.success();
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl<C: InferenceClient> InferenceClient for ResilientInference<C> {
    async fn extract_entities(
        &self,
        transcript: &str,
    ) -> Result<ExtractedEntities, InferenceError> {
        let inner = &self.inner;
        self.call("extract_entities", move || inner.extract_entities(transcript)).await
    }

    async fn summarize(&self, transcript: &str) -> Result<String, InferenceError> {
        let inner = &self.inner;
        self.call("summarize", move || inner.summarize(transcript)).await
    }

    async fn derive_insights(
        &self,
        transcript: &str,
        entities: &ExtractedEntities,
    ) -> Result<Vec<String>, InferenceError> {
        let inner = &self.inner;
        self.call("derive_insights", move || inner.derive_insights(transcript, entities)).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let inner = &self.inner;
        self.call("embed", move || inner.embed(text)).await
    }

    fn embedding_dim(&self) -> usize {
        self.inner.embedding_dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::Sentiment;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` embed calls with `status`, then succeeds.
    struct FlakyClient {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    impl FlakyClient {
        fn new(failures: u32, status: u16) -> Self {
            Self {
                failures,
                status,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceClient for FlakyClient {
        async fn extract_entities(&self, _: &str) -> Result<ExtractedEntities, InferenceError> {
            Err(InferenceError::Malformed("not used".to_string()))
        }

        async fn summarize(&self, _: &str) -> Result<String, InferenceError> {
            Err(InferenceError::Malformed("not used".to_string()))
        }

        async fn derive_insights(
            &self,
            _: &str,
            _: &ExtractedEntities,
        ) -> Result<Vec<String>, InferenceError> {
            Err(InferenceError::Malformed("not used".to_string()))
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>, InferenceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(InferenceError::Api {
                    status: self.status,
                    body: "flaky".to_string(),
                })
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        fn embedding_dim(&self) -> usize {
            2
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn resilient(
        client: FlakyClient,
        attempts: u32,
        threshold: u32,
    ) -> ResilientInference<FlakyClient> {
        ResilientInference::with_parts(
            client,
            fast_policy(attempts),
            CircuitBreaker::new(threshold, Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3_000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(3_000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        for _ in 0..50 {
            let d = policy.jittered_delay(2);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_from_config_never_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let client = resilient(FlakyClient::new(2, 503), 3, 10);
        let vector = client.embed("text").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(client.inner().calls(), 3);
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let client = resilient(FlakyClient::new(10, 429), 3, 10);
        let err = client.embed("text").await.unwrap_err();
        assert!(matches!(err, InferenceError::Api { status: 429, .. }));
        assert_eq!(client.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let client = resilient(FlakyClient::new(10, 400), 5, 10);
        let err = client.embed("text").await.unwrap_err();
        assert!(matches!(err, InferenceError::Api { status: 400, .. }));
        assert_eq!(client.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_circuit_opens_and_fails_fast() {
        let client = resilient(FlakyClient::new(100, 503), 1, 2);

        assert!(client.embed("a").await.is_err());
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert!(client.embed("b").await.is_err());
        assert_eq!(client.circuit_state(), CircuitState::Open);

        let err = client.embed("c").await.unwrap_err();
        assert!(matches!(err, InferenceError::CircuitOpen { .. }));
        // The provider was not contacted while open.
        assert_eq!(client.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_half_open_probe_closes_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        let client =
            ResilientInference::with_parts(FlakyClient::new(1, 503), fast_policy(1), breaker);

        assert!(client.embed("a").await.is_err());
        assert_eq!(client.circuit_state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(client.embed("b").await.is_ok());
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(breaker.try_acquire(), Err(Rejection::Open(_))));

        std::thread::sleep(Duration::from_millis(20));
        let probe = breaker.try_acquire().unwrap();
        assert!(probe.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(matches!(breaker.try_acquire(), Err(Rejection::ProbeInFlight)));

        probe.failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_dropped_half_open_permit_frees_slot() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        let probe = breaker.try_acquire().unwrap();
        drop(probe);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let next = breaker.try_acquire().unwrap();
        assert!(next.is_probe());
        next.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Every call sleeps for `delay` and then succeeds.
    struct SlowClient {
        delay: Duration,
        calls: AtomicU32,
    }

    impl SlowClient {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicU32::new(0),
            }
        }

        async fn pause(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
        }
    }

    #[async_trait]
    impl InferenceClient for SlowClient {
        async fn extract_entities(&self, _: &str) -> Result<ExtractedEntities, InferenceError> {
            self.pause().await;
            Ok(ExtractedEntities {
                topics: Vec::new(),
                action_items: Vec::new(),
                decisions: Vec::new(),
                sentiment: Sentiment::Neutral,
            })
        }

        async fn summarize(&self, _: &str) -> Result<String, InferenceError> {
            self.pause().await;
            Ok("summary".to_string())
        }

        async fn derive_insights(
            &self,
            _: &str,
            _: &ExtractedEntities,
        ) -> Result<Vec<String>, InferenceError> {
            self.pause().await;
            Ok(Vec::new())
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>, InferenceError> {
            self.pause().await;
            Ok(vec![1.0, 0.0])
        }

        fn embedding_dim(&self) -> usize {
            2
        }
    }

    /// A slow client behind a breaker that tripped and has cooled down.
    async fn cooled_down_slow_client() -> ResilientInference<SlowClient> {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        tokio::time::sleep(Duration::from_millis(20)).await;
        ResilientInference::with_parts(
            SlowClient::new(Duration::from_millis(20)),
            fast_policy(1),
            breaker,
        )
    }

    #[tokio::test]
    async fn test_concurrent_calls_wait_for_half_open_trial() {
        let client = cooled_down_slow_client().await;

        let (entities, summary, embedding) = tokio::try_join!(
            client.extract_entities("t"),
            client.summarize("t"),
            client.embed("t")
        )
        .unwrap();
        assert!(entities.topics.is_empty());
        assert_eq!(summary, "summary");
        assert_eq!(embedding, vec![1.0, 0.0]);
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_half_open_call_does_not_wedge_circuit() {
        let client = cooled_down_slow_client().await;

        let cancelled = tokio::time::timeout(Duration::from_millis(5), client.embed("t")).await;
        assert!(cancelled.is_err());
        assert_eq!(client.circuit_state(), CircuitState::HalfOpen);

        assert!(client.embed("t").await.is_ok());
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_waiters_fail_fast_when_circuit_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let probe = breaker.try_acquire().unwrap();
        let waiter = breaker.acquire();
        tokio::pin!(waiter);
        let still_waiting = tokio::time::timeout(Duration::from_millis(5), waiter.as_mut()).await;
        assert!(still_waiting.is_err());

        probe.failure();
        assert!(waiter.await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
