//! Ports of the verification service.
//!
//! Async methods are declared as named `Send` futures (rather than bare
//! `async fn`) so worker tasks built on these ports can be spawned onto the
//! runtime.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use parley_domain::site::Site;

use crate::domain::types::{CheckUpdate, EmailMessage, Registration, StateCounts};
use crate::error::{CodeError, FetchError, MailError, VerificationError};

/// Port producing unguessable verification codes.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> Result<String, CodeError>;
}

/// Port reading the current public profile text for an external identity.
///
/// One attempt per call, with a hard timeout; retry policy belongs to the
/// matcher so that backoff state lives in one place.
pub trait ProfileFetcher: Send + Sync {
    fn fetch(
        &self,
        site: Site,
        handle: &str,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Port delivering notification mail. One attempt per call; retry policy
/// belongs to the dispatcher.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// System of record for registrations.
///
/// Every mutation that can race (claim, check transition, notified flag) is
/// a conditional write whose filters encode the precondition; implementations
/// report a lost race instead of overwriting.
pub trait RegistrationStore: Send + Sync {
    /// Persist a new `Pending` registration.
    fn create(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<(), VerificationError>> + Send;

    /// Read one registration by id.
    fn find(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Registration>, VerificationError>> + Send;

    /// Open registrations due for a check at `now` (lease free,
    /// `next_check_at` reached), ordered oldest-eligible-first.
    fn due_for_check(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Registration>, VerificationError>> + Send;

    /// Take the polling lease on a registration: compare-and-set on the
    /// version, guarded on a non-terminal state and a free lease. Moves
    /// `Pending` rows to `Verifying`. `None` means another worker won.
    fn claim(
        &self,
        registration: &Registration,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> impl Future<Output = Result<Option<Registration>, VerificationError>> + Send;

    /// Write the outcome of one check: compare-and-set on the version,
    /// clearing the lease. `false` means the lease was lost and nothing was
    /// written.
    fn apply_check(
        &self,
        registration: &Registration,
        update: &CheckUpdate,
    ) -> impl Future<Output = Result<bool, VerificationError>> + Send;

    /// Terminal, un-notified registrations whose notification retry is due,
    /// excluding permanently-undelivered ones.
    fn due_for_notify(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Registration>, VerificationError>> + Send;

    /// Set `notified`, conditional on it being unset. `false` means it was
    /// already set.
    fn mark_notified(&self, id: Uuid) -> impl Future<Output = Result<bool, VerificationError>> + Send;

    /// Record a failed send: retry counter, last error, next retry instant,
    /// and — when the budget is exhausted — the permanently-undelivered mark.
    fn record_notify_failure(
        &self,
        id: Uuid,
        error: &str,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        failed_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), VerificationError>> + Send;

    /// Per-state counts for the stats surface.
    fn count_by_state(&self) -> impl Future<Output = Result<StateCounts, VerificationError>> + Send;
}
