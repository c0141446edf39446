use rand::Rng;

use crate::queue::error_codes::ErrorCode;

/// Backoff between delivery attempts: `base * 2^(attempt-1)`, capped.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_seconds: i64,
    pub max_seconds: i64,
    /// Fraction of the delay added or removed at random. Zero keeps the schedule exact.
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_seconds: 2,
            max_seconds: 15 * 60,
            jitter_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

pub fn classify_error(code: ErrorCode) -> ErrorClass {
    match code {
        ErrorCode::BadPayload | ErrorCode::UnknownTaskType | ErrorCode::CalendarNotConnected => {
            ErrorClass::NonRetryable
        }
        ErrorCode::Timeout
        | ErrorCode::DependencyDown
        | ErrorCode::RateLimit
        | ErrorCode::DbError
        | ErrorCode::Panic
        | ErrorCode::LeaseExpired
        | ErrorCode::Unknown => ErrorClass::Retryable,
    }
}

pub fn next_delay_seconds(attempt_no: i32, cfg: &RetryConfig, rng: &mut impl Rng) -> i64 {
    let attempt_no = attempt_no.max(1) as u32;

    // exponent = attempt_no - 1
    let exp = attempt_no.saturating_sub(1);

    // 2^exp; an oversized exponent saturates and the cap takes over
    let pow2 = 1_i64.checked_shl(exp).unwrap_or(i64::MAX);

    let delay = cfg.base_seconds.saturating_mul(pow2).min(cfg.max_seconds);

    if cfg.jitter_pct <= 0.0 {
        return delay.max(0);
    }

    // jitter in range [-jitter_pct, +jitter_pct]
    let jitter_range = (delay as f64) * cfg.jitter_pct;
    let jitter = rng.gen_range(-jitter_range..=jitter_range);

    let jittered = (delay as f64 + jitter).round() as i64;
    jittered.clamp(0, cfg.max_seconds)
}
