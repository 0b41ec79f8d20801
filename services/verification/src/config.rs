use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::worker::dispatcher::DispatcherSettings;
use crate::worker::matcher::MatcherSettings;

/// Verification service configuration loaded from environment variables.
///
/// Scheduling figures (intervals, attempt caps, TTL, backoff) are tunables
/// with defaults, not contracts.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port for the health/stats surface (default 5100). Env var: `VERIFICATION_PORT`.
    pub verification_port: u16,
    /// Transactional-mail API endpoint (Brevo-compatible).
    pub mail_api_url: String,
    /// Transactional-mail API key.
    pub mail_api_key: String,
    /// From-address for notification mail.
    pub mail_sender: String,
    /// GitHub REST API base URL (override for tests/proxies).
    pub github_api_url: String,
    /// V2EX API base URL (override for tests/proxies).
    pub v2ex_api_url: String,
    pub sweep_interval_secs: u64,
    pub dispatch_interval_secs: u64,
    /// Hard timeout for one profile read or mail send.
    pub fetch_timeout_secs: u64,
    /// Non-transient checks before a registration fails.
    pub max_attempts: i32,
    /// How long the matcher keeps polling before a registration expires.
    pub registration_ttl_hours: i64,
    /// Delay between checks after a completed fetch without the code.
    pub recheck_interval_secs: i64,
    pub backoff_base_secs: i64,
    pub backoff_max_secs: i64,
    /// Polling lease duration; a crashed worker's claim frees after this.
    pub lease_secs: i64,
    pub max_concurrent_checks: usize,
    pub max_concurrent_checks_per_site: usize,
    pub max_concurrent_sends: usize,
    /// Send attempts before a notification is marked permanently undelivered.
    pub notify_max_attempts: i32,
    pub notify_backoff_base_secs: i64,
    pub notify_backoff_max_secs: i64,
}

impl VerificationConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            verification_port: env_or("VERIFICATION_PORT", 5100),
            mail_api_url: std::env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "https://api.brevo.com/v3/smtp/email".to_owned()),
            mail_api_key: std::env::var("MAIL_API_KEY").expect("MAIL_API_KEY"),
            mail_sender: std::env::var("MAIL_SENDER").expect("MAIL_SENDER"),
            github_api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_owned()),
            v2ex_api_url: std::env::var("V2EX_API_URL")
                .unwrap_or_else(|_| "https://www.v2ex.com".to_owned()),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 30),
            dispatch_interval_secs: env_or("DISPATCH_INTERVAL_SECS", 60),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", 10),
            max_attempts: env_or("MAX_ATTEMPTS", 10),
            registration_ttl_hours: env_or("REGISTRATION_TTL_HOURS", 24),
            recheck_interval_secs: env_or("RECHECK_INTERVAL_SECS", 300),
            backoff_base_secs: env_or("BACKOFF_BASE_SECS", 60),
            backoff_max_secs: env_or("BACKOFF_MAX_SECS", 900),
            lease_secs: env_or("LEASE_SECS", 60),
            max_concurrent_checks: env_or("MAX_CONCURRENT_CHECKS", 8),
            max_concurrent_checks_per_site: env_or("MAX_CONCURRENT_CHECKS_PER_SITE", 4),
            max_concurrent_sends: env_or("MAX_CONCURRENT_SENDS", 4),
            notify_max_attempts: env_or("NOTIFY_MAX_ATTEMPTS", 5),
            notify_backoff_base_secs: env_or("NOTIFY_BACKOFF_BASE_SECS", 120),
            notify_backoff_max_secs: env_or("NOTIFY_BACKOFF_MAX_SECS", 3600),
        }
    }

    pub fn registration_ttl(&self) -> Duration {
        Duration::hours(self.registration_ttl_hours)
    }

    pub fn fetch_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.fetch_timeout_secs)
    }

    pub fn matcher_settings(&self) -> MatcherSettings {
        MatcherSettings {
            sweep_interval: StdDuration::from_secs(self.sweep_interval_secs),
            lease: Duration::seconds(self.lease_secs),
            max_attempts: self.max_attempts,
            recheck_interval: Duration::seconds(self.recheck_interval_secs),
            backoff_base: Duration::seconds(self.backoff_base_secs),
            backoff_max: Duration::seconds(self.backoff_max_secs),
            max_concurrent_checks: self.max_concurrent_checks,
            max_concurrent_checks_per_site: self.max_concurrent_checks_per_site,
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            sweep_interval: StdDuration::from_secs(self.dispatch_interval_secs),
            max_concurrent_sends: self.max_concurrent_sends,
            notify_max_attempts: self.notify_max_attempts,
            notify_backoff_base: Duration::seconds(self.notify_backoff_base_secs),
            notify_backoff_max: Duration::seconds(self.notify_backoff_max_secs),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
