use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;

/// One ownership-verification attempt — the system-of-record row.
///
/// Mutated only by the matcher (state, attempts, check timestamps) and the
/// dispatcher (notification fields); never deleted.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Uuid,
    pub site: Site,
    pub handle: String,
    pub email: String,
    pub code: String,
    pub state: RegistrationState,
    pub attempts: i32,
    /// Consecutive transient fetch failures; resets on any completed fetch.
    pub transient_failures: i32,
    /// Optimistic-concurrency counter; every conditional write bumps it.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub lease_until: Option<DateTime<Utc>>,
    pub notified: bool,
    pub notify_attempts: i32,
    pub notify_last_error: Option<String>,
    pub notify_next_attempt_at: DateTime<Utc>,
    pub notify_failed_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// New `Pending` record, immediately eligible for its first check.
    pub fn new(
        site: Site,
        handle: String,
        email: String,
        code: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            site,
            handle,
            email,
            code,
            state: RegistrationState::Pending,
            attempts: 0,
            transient_failures: 0,
            version: 0,
            created_at: now,
            last_checked_at: None,
            next_check_at: now,
            expires_at: now + ttl,
            lease_until: None,
            notified: false,
            notify_attempts: 0,
            notify_last_error: None,
            notify_next_attempt_at: now,
            notify_failed_at: None,
        }
    }
}

/// Field updates produced by one completed check, written through a
/// compare-and-set on the registration's version. The lease is always
/// cleared by the write.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckUpdate {
    pub state: RegistrationState,
    pub attempts: i32,
    pub transient_failures: i32,
    pub last_checked_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

/// Outbound notification mail.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Per-state registration counts for the stats surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StateCounts {
    pub pending: u64,
    pub verifying: u64,
    pub verified: u64,
    pub failed: u64,
    pub expired: u64,
}

/// Maximum accepted handle length at intake. GitHub caps logins at 39
/// characters; V2EX usernames are shorter still.
pub const MAX_HANDLE_LEN: usize = 64;
