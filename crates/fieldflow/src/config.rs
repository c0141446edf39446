use std::time::Duration;

use chrono::FixedOffset;

use crate::jobs::transitions::TransitionPolicy;
use crate::logging::{LogConfig, LogFormat};
use crate::queue::maintenance::RetentionConfig;
use crate::queue::retry::RetryConfig;

// Config is the one place runtime settings are read.
// Values come from FIELDFLOW_* variables, with the short names as fallback.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub concurrency: usize,
    pub lease_seconds: i64,
    pub poll_interval_ms: u64,
    pub reap_interval_ms: u64,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub max_payload_bytes: usize,
    pub default_max_attempts: i32,
    pub retry: RetryConfig,
    pub calendar: CalendarSettings,
    pub business_offset: FixedOffset,
    pub transition_policy: TransitionPolicy,
    pub notify: NotifySettings,
    pub retention: RetentionConfig,
    pub maintenance_interval_secs: u64,
    pub log: LogConfig,
}

#[derive(Clone, Debug)]
pub struct CalendarSettings {
    pub client_id: String,
    pub client_secret: String,
    pub calendar_id: String,
    pub time_zone: String,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Default)]
pub struct NotifySettings {
    pub customer_webhook_url: Option<String>,
    pub office_webhook_url: Option<String>,
    pub accounting_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = env_or_fallback("FIELDFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let concurrency = env_parse("FIELDFLOW_CONCURRENCY", "CONCURRENCY")
            .unwrap_or(4usize)
            .clamp(1, 64);

        let lease_seconds = env_parse("FIELDFLOW_LEASE_SECONDS", "LEASE_SECONDS").unwrap_or(30i64);

        let poll_interval_ms = env_parse("FIELDFLOW_POLL_INTERVAL_MS", "POLL_INTERVAL_MS")
            .unwrap_or(250u64);

        let reap_interval_ms = env_parse("FIELDFLOW_REAP_INTERVAL_MS", "REAP_INTERVAL_MS")
            .unwrap_or(5_000u64);

        let admin_addr = env_or_fallback("FIELDFLOW_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("FIELDFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let max_payload_bytes = env_parse("FIELDFLOW_MAX_PAYLOAD_BYTES", "MAX_PAYLOAD_BYTES")
            .unwrap_or(64 * 1024usize);

        let default_max_attempts = env_parse("FIELDFLOW_MAX_ATTEMPTS", "MAX_ATTEMPTS")
            .unwrap_or(3i32)
            .max(1);

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            base_seconds: env_parse("FIELDFLOW_BACKOFF_BASE_SECONDS", "BACKOFF_BASE_SECONDS")
                .unwrap_or(retry_defaults.base_seconds),
            max_seconds: env_parse("FIELDFLOW_BACKOFF_MAX_SECONDS", "BACKOFF_MAX_SECONDS")
                .unwrap_or(retry_defaults.max_seconds),
            jitter_pct: env_parse("FIELDFLOW_BACKOFF_JITTER_PCT", "BACKOFF_JITTER_PCT")
                .unwrap_or(retry_defaults.jitter_pct),
        };

        let calendar = CalendarSettings {
            client_id: env_or_fallback("FIELDFLOW_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID")
                .unwrap_or_default(),
            client_secret: env_or_fallback("FIELDFLOW_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET")
                .unwrap_or_default(),
            calendar_id: env_or_fallback("FIELDFLOW_CALENDAR_ID", "CALENDAR_ID")
                .unwrap_or_else(|| "primary".to_string()),
            time_zone: env_or_fallback("FIELDFLOW_CALENDAR_TIME_ZONE", "CALENDAR_TIME_ZONE")
                .unwrap_or_else(|| "Australia/Perth".to_string()),
            timeout_ms: env_parse("FIELDFLOW_CALENDAR_TIMEOUT_MS", "CALENDAR_TIMEOUT_MS")
                .unwrap_or(10_000u64),
        };

        // job-number years and calendar day windows follow the business's local clock
        let offset_minutes =
            env_parse("FIELDFLOW_UTC_OFFSET_MINUTES", "UTC_OFFSET_MINUTES").unwrap_or(480i32);
        let business_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow::anyhow!("FIELDFLOW_UTC_OFFSET_MINUTES out of range: {offset_minutes}")
            })?;

        let transition_policy = if env_bool("FIELDFLOW_PERMISSIVE_TRANSITIONS").unwrap_or(false) {
            TransitionPolicy::Permissive
        } else {
            TransitionPolicy::Strict
        };

        let notify = NotifySettings {
            customer_webhook_url: env_or_fallback(
                "FIELDFLOW_CUSTOMER_WEBHOOK_URL",
                "CUSTOMER_WEBHOOK_URL",
            ),
            office_webhook_url: env_or_fallback("FIELDFLOW_OFFICE_WEBHOOK_URL", "OFFICE_WEBHOOK_URL"),
            accounting_webhook_url: env_or_fallback(
                "FIELDFLOW_ACCOUNTING_WEBHOOK_URL",
                "ACCOUNTING_WEBHOOK_URL",
            ),
        };

        let retention_defaults = RetentionConfig::default();
        let retention = RetentionConfig {
            succeeded_max_age_hours: env_parse(
                "FIELDFLOW_RETAIN_SUCCEEDED_HOURS",
                "RETAIN_SUCCEEDED_HOURS",
            )
            .unwrap_or(retention_defaults.succeeded_max_age_hours),
            succeeded_keep_latest: env_parse(
                "FIELDFLOW_RETAIN_SUCCEEDED_COUNT",
                "RETAIN_SUCCEEDED_COUNT",
            )
            .unwrap_or(retention_defaults.succeeded_keep_latest),
            failed_max_age_days: env_parse("FIELDFLOW_RETAIN_FAILED_DAYS", "RETAIN_FAILED_DAYS")
                .unwrap_or(retention_defaults.failed_max_age_days),
            batch: retention_defaults.batch,
        };

        let maintenance_interval_secs =
            env_parse("FIELDFLOW_MAINTENANCE_INTERVAL_SECS", "MAINTENANCE_INTERVAL_SECS")
                .unwrap_or(60u64);

        let log = LogConfig {
            level: env_or_fallback("FIELDFLOW_LOG", "RUST_LOG").unwrap_or_else(|| "info".to_string()),
            format: match env_or_fallback("FIELDFLOW_LOG_FORMAT", "LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Self {
            database_url,
            worker_id,
            concurrency,
            lease_seconds,
            poll_interval_ms,
            reap_interval_ms,
            admin_addr,
            migrate_on_startup,
            max_payload_bytes,
            default_max_attempts,
            retry,
            calendar,
            business_offset,
            transition_policy,
            notify,
            retention,
            maintenance_interval_secs,
            log,
        })
    }

    pub fn calendar_timeout(&self) -> Duration {
        Duration::from_millis(self.calendar.timeout_ms)
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_parse<T: std::str::FromStr>(primary: &str, fallback: &str) -> Option<T> {
    env_or_fallback(primary, fallback).and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
