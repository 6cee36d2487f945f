//! Retry policy: attempt budget, exponential backoff and rate-limit pauses.

use std::time::Duration;

/// Backoff strategy between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed { delay: Duration },
    /// `base * factor^retry`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Spread each delay by up to +/- 50%.
        jitter: bool,
    },
}

impl Default for Backoff {
    /// Doubling delays of 2s, 4s, 8s, ... without jitter.
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(64),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = seconds.min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped);

                if jitter {
                    apply_jitter(delay)
                } else {
                    delay
                }
            }
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let spread = millis / 2;
    let offset = fastrand::u64(0..=spread.saturating_mul(2));
    Duration::from_millis(millis.saturating_sub(spread).saturating_add(offset))
}

/// Bounds and pacing for one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Backoff applied after server errors and transport failures.
    pub backoff: Backoff,
    /// Delay assumed when a 429 carries no advisory delay.
    pub rate_limit_delay: Duration,
    /// Factor applied to the advisory (or assumed) 429 delay.
    pub rate_limit_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::default(),
            rate_limit_delay: Duration::from_secs(1),
            rate_limit_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    /// Statuses worth another attempt.
    pub const fn should_retry_status(&self, status: u16) -> bool {
        status == 429 || (status >= 500 && status < 600)
    }

    /// Pause after a 429, given the service's advisory delay if it sent one.
    pub fn rate_limit_pause(&self, advisory: Option<Duration>) -> Duration {
        advisory
            .unwrap_or(self.rate_limit_delay)
            .saturating_mul(self.rate_limit_multiplier)
    }

    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }
}

/// Extracts `N` from messages such as "Expected available in 3 seconds".
pub fn advisory_delay(body: &str) -> Option<Duration> {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.to_owned());

    let words = detail.split_whitespace().collect::<Vec<_>>();
    words.windows(2).find_map(|pair| {
        if !pair[1].to_ascii_lowercase().starts_with("second") {
            return None;
        }
        pair[0].parse::<u64>().ok().map(Duration::from_secs)
    })
}
