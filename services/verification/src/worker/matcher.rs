//! The verification poller: drives every open registration toward a
//! terminal state by checking whether its code has appeared in the claimed
//! profile.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;

use crate::domain::repository::{ProfileFetcher, RegistrationStore};
use crate::domain::types::{CheckUpdate, Registration};
use crate::error::FetchError;
use crate::worker::{SweepStats, WorkerHandle, backoff};

/// Upper bound on registrations pulled per sweep; the rest are picked up by
/// the next sweep, oldest-eligible-first.
const SWEEP_BATCH_LIMIT: u64 = 100;

const SITES: [Site; 2] = [Site::Github, Site::V2ex];

/// Matcher tunables, derived from `VerificationConfig`.
#[derive(Debug, Clone)]
pub struct MatcherSettings {
    pub sweep_interval: StdDuration,
    pub lease: Duration,
    pub max_attempts: i32,
    pub recheck_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_concurrent_checks: usize,
    pub max_concurrent_checks_per_site: usize,
}

pub struct Matcher<S, F> {
    store: S,
    fetcher: F,
    settings: MatcherSettings,
    stats: SweepStats,
    global_limit: Arc<Semaphore>,
    site_limits: HashMap<Site, Arc<Semaphore>>,
}

impl<S, F> Matcher<S, F>
where
    S: RegistrationStore + Clone + 'static,
    F: ProfileFetcher + Clone + 'static,
{
    pub fn new(store: S, fetcher: F, settings: MatcherSettings) -> Self {
        let global_limit = Arc::new(Semaphore::new(settings.max_concurrent_checks));
        let site_limits = SITES
            .into_iter()
            .map(|site| {
                (
                    site,
                    Arc::new(Semaphore::new(settings.max_concurrent_checks_per_site)),
                )
            })
            .collect();
        Self {
            store,
            fetcher,
            settings,
            stats: SweepStats::default(),
            global_limit,
            site_limits,
        }
    }

    pub fn stats(&self) -> SweepStats {
        self.stats.clone()
    }

    /// Spawn the sweep loop. The returned handle stops it cleanly, draining
    /// in-flight checks (and thereby releasing their leases) first.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(&mut shutdown_rx).await });
        WorkerHandle::new("matcher", shutdown_tx, task)
    }

    async fn run(self, shutdown: &mut watch::Receiver<bool>) {
        let mut checks = JoinSet::new();
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "matcher started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep(&mut checks).await,
                _ = shutdown.changed() => break,
            }
        }
        while checks.join_next().await.is_some() {}
    }

    /// Run a single sweep and wait for every check it dispatched. The
    /// daemon loop instead keeps checks running across sweeps; this is the
    /// entry point for embedding and tests.
    pub async fn sweep_once(&self) {
        let mut checks = JoinSet::new();
        self.sweep(&mut checks).await;
        while checks.join_next().await.is_some() {}
    }

    async fn sweep(&self, checks: &mut JoinSet<()>) {
        let started = std::time::Instant::now();
        // Reap checks finished since the previous sweep.
        while checks.try_join_next().is_some() {}

        let now = Utc::now();
        let due = match self.store.due_for_check(now, SWEEP_BATCH_LIMIT).await {
            Ok(due) => due,
            Err(error) => {
                tracing::error!(%error, "matcher sweep query failed");
                self.stats.record_sweep(0, 0, started.elapsed());
                return;
            }
        };

        let backlog = due.len();
        let mut dispatched = 0usize;
        for registration in due {
            // Waits only for pool capacity, never for an individual check.
            let Ok(permit) = Arc::clone(&self.global_limit).acquire_owned().await else {
                break;
            };
            let site_limit = self.site_limits.get(&registration.site).cloned();
            let store = self.store.clone();
            let fetcher = self.fetcher.clone();
            let settings = self.settings.clone();
            checks.spawn(async move {
                let _permit = permit;
                let _site_permit = match site_limit {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(site_permit) => Some(site_permit),
                        Err(_) => return,
                    },
                    None => None,
                };
                check_one(&store, &fetcher, &settings, registration).await;
            });
            dispatched += 1;
        }
        self.stats.record_sweep(backlog, dispatched, started.elapsed());
    }
}

/// One full check: claim the lease, read the profile (unless already past
/// its TTL), and write the transition back. Per-item failures are logged
/// and never escape to the sweep.
async fn check_one<S, F>(store: &S, fetcher: &F, settings: &MatcherSettings, registration: Registration)
where
    S: RegistrationStore,
    F: ProfileFetcher,
{
    let now = Utc::now();
    let claimed = match store.claim(&registration, now, settings.lease).await {
        Ok(Some(claimed)) => claimed,
        Ok(None) => {
            tracing::debug!(id = %registration.id, "lost claim race, skipping");
            return;
        }
        Err(error) => {
            tracing::error!(id = %registration.id, %error, "claim failed");
            return;
        }
    };

    let update = if now >= claimed.expires_at {
        expire(&claimed, now)
    } else {
        let fetched = fetcher.fetch(claimed.site, &claimed.handle).await;
        evaluate(&claimed, &fetched, now, settings)
    };

    match store.apply_check(&claimed, &update).await {
        Ok(true) => {
            if update.state.is_terminal() {
                tracing::info!(
                    id = %claimed.id,
                    site = %claimed.site,
                    handle = %claimed.handle,
                    state = %update.state,
                    attempts = update.attempts,
                    "registration reached terminal state"
                );
            } else {
                tracing::debug!(
                    id = %claimed.id,
                    attempts = update.attempts,
                    next_check_at = %update.next_check_at,
                    "recheck scheduled"
                );
            }
        }
        Ok(false) => {
            tracing::debug!(id = %claimed.id, "lost lease before transition, dropping result");
        }
        Err(error) => {
            tracing::error!(id = %claimed.id, %error, "failed to persist check result");
        }
    }
}

fn expire(registration: &Registration, now: DateTime<Utc>) -> CheckUpdate {
    CheckUpdate {
        state: RegistrationState::Expired,
        attempts: registration.attempts,
        transient_failures: registration.transient_failures,
        last_checked_at: now,
        next_check_at: now,
    }
}

/// Decide the transition for one completed profile read.
///
/// Transient failures keep the attempt budget intact and push the next
/// check out by exponential backoff; a rate-limit hint from the site wins
/// over the computed delay when it is longer.
fn evaluate(
    registration: &Registration,
    fetched: &Result<String, FetchError>,
    now: DateTime<Utc>,
    settings: &MatcherSettings,
) -> CheckUpdate {
    match fetched {
        Ok(text) if text.contains(&registration.code) => CheckUpdate {
            state: RegistrationState::Verified,
            attempts: registration.attempts,
            transient_failures: 0,
            last_checked_at: now,
            next_check_at: now,
        },
        Ok(_) => {
            let attempts = registration.attempts + 1;
            if attempts >= settings.max_attempts {
                CheckUpdate {
                    state: RegistrationState::Failed,
                    attempts,
                    transient_failures: 0,
                    last_checked_at: now,
                    next_check_at: now,
                }
            } else {
                CheckUpdate {
                    state: RegistrationState::Verifying,
                    attempts,
                    transient_failures: 0,
                    last_checked_at: now,
                    next_check_at: now + settings.recheck_interval,
                }
            }
        }
        Err(FetchError::NotFound) => CheckUpdate {
            state: RegistrationState::Failed,
            attempts: registration.attempts,
            transient_failures: 0,
            last_checked_at: now,
            next_check_at: now,
        },
        Err(error) => {
            let streak = registration.transient_failures + 1;
            let mut delay = backoff(settings.backoff_base, settings.backoff_max, streak);
            if let FetchError::RateLimited {
                retry_after: Some(hint),
            } = error
            {
                let hint = Duration::from_std(*hint).unwrap_or(delay);
                if hint > delay {
                    delay = hint;
                }
            }
            CheckUpdate {
                state: RegistrationState::Verifying,
                attempts: registration.attempts,
                transient_failures: streak,
                last_checked_at: now,
                next_check_at: now + delay,
            }
        }
    }
}
