use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;
use parley_verification::domain::repository::{
    CodeGenerator, Mailer, ProfileFetcher, RegistrationStore,
};
use parley_verification::domain::types::{CheckUpdate, EmailMessage, Registration, StateCounts};
use parley_verification::error::{CodeError, FetchError, MailError, VerificationError};
use parley_verification::worker::dispatcher::DispatcherSettings;
use parley_verification::worker::matcher::MatcherSettings;

// ── MockRegistrationStore ────────────────────────────────────────────────────

/// In-memory `RegistrationStore` with the same conditional-write semantics
/// as the database implementation (version CAS, lease guard, notified guard).
#[derive(Clone, Default)]
pub struct MockRegistrationStore {
    rows: Arc<Mutex<Vec<Registration>>>,
}

impl MockRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, registration: Registration) {
        self.rows.lock().unwrap().push(registration);
    }

    pub fn get(&self, id: Uuid) -> Option<Registration> {
        self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }
}

impl RegistrationStore for MockRegistrationStore {
    async fn create(&self, registration: &Registration) -> Result<(), VerificationError> {
        self.rows.lock().unwrap().push(registration.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Registration>, VerificationError> {
        Ok(self.get(id))
    }

    async fn due_for_check(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Registration>, VerificationError> {
        let rows = self.rows.lock().unwrap();
        let mut due: Vec<Registration> = rows
            .iter()
            .filter(|r| {
                !r.state.is_terminal()
                    && r.next_check_at <= now
                    && r.lease_until.is_none_or(|lease| lease < now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.next_check_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(
        &self,
        registration: &Registration,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Registration>, VerificationError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == registration.id) else {
            return Ok(None);
        };
        if row.version != registration.version
            || row.state.is_terminal()
            || row.lease_until.is_some_and(|l| l >= now)
        {
            return Ok(None);
        }
        row.state = RegistrationState::Verifying;
        row.lease_until = Some(now + lease);
        row.version += 1;
        Ok(Some(row.clone()))
    }

    async fn apply_check(
        &self,
        registration: &Registration,
        update: &CheckUpdate,
    ) -> Result<bool, VerificationError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == registration.id) else {
            return Ok(false);
        };
        if row.version != registration.version || row.state.is_terminal() {
            return Ok(false);
        }
        row.state = update.state;
        row.attempts = update.attempts;
        row.transient_failures = update.transient_failures;
        row.last_checked_at = Some(update.last_checked_at);
        row.next_check_at = update.next_check_at;
        row.lease_until = None;
        row.version += 1;
        Ok(true)
    }

    async fn due_for_notify(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Registration>, VerificationError> {
        let rows = self.rows.lock().unwrap();
        let mut due: Vec<Registration> = rows
            .iter()
            .filter(|r| {
                r.state.is_terminal()
                    && !r.notified
                    && r.notify_failed_at.is_none()
                    && r.notify_next_attempt_at <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.notify_next_attempt_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_notified(&self, id: Uuid) -> Result<bool, VerificationError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if row.notified {
            return Ok(false);
        }
        row.notified = true;
        Ok(true)
    }

    async fn record_notify_failure(
        &self,
        id: Uuid,
        error: &str,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        failed_at: Option<DateTime<Utc>>,
    ) -> Result<(), VerificationError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.notify_attempts = attempts;
            row.notify_last_error = Some(error.to_owned());
            row.notify_next_attempt_at = next_attempt_at;
            row.notify_failed_at = failed_at;
        }
        Ok(())
    }

    async fn count_by_state(&self) -> Result<StateCounts, VerificationError> {
        let rows = self.rows.lock().unwrap();
        let mut counts = StateCounts::default();
        for row in rows.iter() {
            match row.state {
                RegistrationState::Pending => counts.pending += 1,
                RegistrationState::Verifying => counts.verifying += 1,
                RegistrationState::Verified => counts.verified += 1,
                RegistrationState::Failed => counts.failed += 1,
                RegistrationState::Expired => counts.expired += 1,
            }
        }
        Ok(counts)
    }
}

// ── MockFetcher ──────────────────────────────────────────────────────────────

/// Profile fetcher replaying a scripted response per call, recording calls.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<VecDeque<Result<String, FetchError>>>>,
    calls: Arc<Mutex<Vec<(Site, String)>>>,
}

impl MockFetcher {
    pub fn scripted(responses: Vec<Result<String, FetchError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ProfileFetcher for MockFetcher {
    async fn fetch(&self, site: Site, handle: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push((site, handle.to_owned()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Unreachable("no scripted response".to_owned())))
    }
}

// ── MockMailer ───────────────────────────────────────────────────────────────

/// Mailer recording sent messages; optionally fails the first n sends.
#[derive(Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failures_left: Arc<Mutex<u32>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failures_left: Arc::new(Mutex::new(failures)),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for MockMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(MailError::Unreachable("scripted failure".to_owned()));
            }
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ── FailingCodeGenerator ─────────────────────────────────────────────────────

pub struct FailingCodeGenerator;

impl CodeGenerator for FailingCodeGenerator {
    fn generate(&self) -> Result<String, CodeError> {
        Err(CodeError::EntropySourceUnavailable)
    }
}

// ── Test fixtures ────────────────────────────────────────────────────────────

pub fn test_registration(site: Site, code: &str) -> Registration {
    Registration::new(
        site,
        "alice".to_owned(),
        "alice@example.com".to_owned(),
        code.to_owned(),
        Utc::now(),
        Duration::hours(24),
    )
}

/// Matcher tunables with no recheck/backoff delay, so every sweep in a test
/// finds the registration due again.
pub fn matcher_settings() -> MatcherSettings {
    MatcherSettings {
        sweep_interval: StdDuration::from_millis(10),
        lease: Duration::seconds(60),
        max_attempts: 3,
        recheck_interval: Duration::zero(),
        backoff_base: Duration::zero(),
        backoff_max: Duration::zero(),
        max_concurrent_checks: 4,
        max_concurrent_checks_per_site: 2,
    }
}

/// Dispatcher tunables with no retry delay.
pub fn dispatcher_settings() -> DispatcherSettings {
    DispatcherSettings {
        sweep_interval: StdDuration::from_millis(10),
        max_concurrent_sends: 2,
        notify_max_attempts: 3,
        notify_backoff_base: Duration::zero(),
        notify_backoff_max: Duration::zero(),
    }
}
