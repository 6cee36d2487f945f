//! Resilient fetch engine shared by every network-calling capability.
//!
//! One [`FetchEngine::fetch`] call owns a bounded retry loop:
//!
//! | Outcome | Action |
//! |---------|--------|
//! | 2xx | return the body |
//! | 429 | pause for the advisory delay (default one unit) times the multiplier, retry |
//! | 5xx | exponential backoff, retry |
//! | transport failure | exponential backoff, retry |
//! | any other status | fail immediately with `HttpStatus` |
//!
//! Running out of attempts yields `FetchExhausted`. No pause follows the
//! final attempt.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{parse_records_str, Record};
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::{advisory_delay, RetryPolicy};
use crate::throttling::RequestPacer;
use crate::ProviderError;

pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source of every pause the engine takes.
pub trait Sleeper: Send + Sync {
    fn sleep<'a>(&'a self, duration: Duration) -> SleepFuture<'a>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> SleepFuture<'a> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Sleeper that returns at once and remembers what it was asked to wait.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|delays| delays.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.delays().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> SleepFuture<'a> {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
        Box::pin(std::future::ready(()))
    }
}

/// Cooperative cancellation flag checked between attempts and pages.
#[derive(Debug, Default, Clone)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Executes outbound calls under a [`RetryPolicy`].
#[derive(Clone)]
pub struct FetchEngine {
    http: Arc<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    pacer: Option<RequestPacer>,
    cancellation: Cancellation,
}

impl FetchEngine {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            sleeper: Arc::new(TokioSleeper),
            policy: RetryPolicy::default(),
            pacer: None,
            cancellation: Cancellation::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Flat pause outside the retry loop, e.g. between pages.
    pub async fn pause(&self, call: &str, duration: Duration) -> Result<(), ProviderError> {
        self.ensure_active(call)?;
        self.sleeper.sleep(duration).await;
        self.ensure_active(call)
    }

    pub fn ensure_active(&self, call: &str) -> Result<(), ProviderError> {
        if self.cancellation.is_cancelled() {
            return Err(ProviderError::cancelled(call));
        }
        Ok(())
    }

    /// Runs `request` until it succeeds or the attempt budget is spent,
    /// returning the successful response body.
    pub async fn fetch(&self, call: &str, request: HttpRequest) -> Result<String, ProviderError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.ensure_active(call)?;
            if let Some(pacer) = &self.pacer {
                pacer.ready().await;
            }

            let retry = attempt - 1;
            let (error, delay) = match self.http.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    debug!(call, attempt, status = response.status, "fetch succeeded");
                    return Ok(response.body);
                }
                Ok(response) if response.status == 429 => (
                    ProviderError::rate_limited(call, response.status),
                    self.policy
                        .rate_limit_pause(advisory_delay(&response.body)),
                ),
                Ok(response) if self.policy.should_retry_status(response.status) => (
                    ProviderError::server_error(call, response.status),
                    self.policy.delay_for_retry(retry),
                ),
                Ok(response) => {
                    return Err(ProviderError::http_status(
                        call,
                        response.status,
                        &response.body,
                    ));
                }
                Err(error) if !error.retryable() => {
                    return Err(ProviderError::transport_failure(call, &error, false));
                }
                Err(error) => (
                    ProviderError::transport_failure(call, &error, true),
                    self.policy.delay_for_retry(retry),
                ),
            };

            if attempt < max_attempts {
                warn!(
                    call,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "retrying after failed attempt"
                );
                self.sleeper.sleep(delay).await;
            }
            last_error = Some(error);
        }

        let last_error = last_error
            .unwrap_or_else(|| ProviderError::transport_failure(call, "no attempt was made", false));
        warn!(call, max_attempts, error = %last_error, "retries exhausted");
        Err(ProviderError::fetch_exhausted(call, max_attempts, &last_error))
    }

    /// Fetches and decodes a JSON body; decoding failures are schema errors.
    pub async fn fetch_json(&self, call: &str, request: HttpRequest) -> Result<Value, ProviderError> {
        let body = self.fetch(call, request).await?;
        serde_json::from_str(&body).map_err(|error| ProviderError::schema(call, error))
    }

    /// Fetches and parses canonical records.
    pub async fn fetch_records<T: Record>(
        &self,
        call: &str,
        request: HttpRequest,
    ) -> Result<Vec<T>, ProviderError> {
        let body = self.fetch(call, request).await?;
        parse_records_str(&body).map_err(|error| ProviderError::schema(call, error))
    }
}

impl std::fmt::Debug for FetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEngine")
            .field("policy", &self.policy)
            .field("pacer", &self.pacer)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
