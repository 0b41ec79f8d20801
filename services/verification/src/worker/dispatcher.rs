//! The notification dispatcher: observes registrations that reached a
//! terminal state and delivers exactly one outcome mail per registration,
//! with its own bounded retry policy.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use parley_domain::registration::RegistrationState;

use crate::domain::repository::{Mailer, RegistrationStore};
use crate::domain::types::{EmailMessage, Registration};
use crate::worker::{SweepStats, WorkerHandle, backoff};

/// Upper bound on notifications pulled per sweep.
const SWEEP_BATCH_LIMIT: u64 = 100;

/// Dispatcher tunables, derived from `VerificationConfig`.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub sweep_interval: StdDuration,
    pub max_concurrent_sends: usize,
    pub notify_max_attempts: i32,
    pub notify_backoff_base: Duration,
    pub notify_backoff_max: Duration,
}

pub struct Dispatcher<S, M> {
    store: S,
    mailer: M,
    settings: DispatcherSettings,
    stats: SweepStats,
    send_limit: Arc<Semaphore>,
}

impl<S, M> Dispatcher<S, M>
where
    S: RegistrationStore + Clone + 'static,
    M: Mailer + Clone + 'static,
{
    pub fn new(store: S, mailer: M, settings: DispatcherSettings) -> Self {
        let send_limit = Arc::new(Semaphore::new(settings.max_concurrent_sends));
        Self {
            store,
            mailer,
            settings,
            stats: SweepStats::default(),
            send_limit,
        }
    }

    pub fn stats(&self) -> SweepStats {
        self.stats.clone()
    }

    /// Spawn the sweep loop. The returned handle stops it cleanly, draining
    /// in-flight sends first.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(&mut shutdown_rx).await });
        WorkerHandle::new("dispatcher", shutdown_tx, task)
    }

    async fn run(self, shutdown: &mut watch::Receiver<bool>) {
        let mut sends = JoinSet::new();
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "dispatcher started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep(&mut sends).await,
                _ = shutdown.changed() => break,
            }
        }
        while sends.join_next().await.is_some() {}
    }

    /// Run a single sweep and wait for every send it dispatched. The daemon
    /// loop instead keeps sends running across sweeps; this is the entry
    /// point for embedding and tests.
    pub async fn sweep_once(&self) {
        let mut sends = JoinSet::new();
        self.sweep(&mut sends).await;
        while sends.join_next().await.is_some() {}
    }

    async fn sweep(&self, sends: &mut JoinSet<()>) {
        let started = std::time::Instant::now();
        while sends.try_join_next().is_some() {}

        let now = Utc::now();
        let due = match self.store.due_for_notify(now, SWEEP_BATCH_LIMIT).await {
            Ok(due) => due,
            Err(error) => {
                tracing::error!(%error, "dispatcher sweep query failed");
                self.stats.record_sweep(0, 0, started.elapsed());
                return;
            }
        };

        let backlog = due.len();
        let mut dispatched = 0usize;
        for registration in due {
            let Ok(permit) = Arc::clone(&self.send_limit).acquire_owned().await else {
                break;
            };
            let store = self.store.clone();
            let mailer = self.mailer.clone();
            let settings = self.settings.clone();
            sends.spawn(async move {
                let _permit = permit;
                notify_one(&store, &mailer, &settings, registration).await;
            });
            dispatched += 1;
        }
        self.stats.record_sweep(backlog, dispatched, started.elapsed());
    }
}

/// One delivery attempt. The notified flag is set strictly after transport
/// acknowledgment: a crash right after the ack risks one duplicate mail,
/// never a duplicate-by-default.
async fn notify_one<S, M>(
    store: &S,
    mailer: &M,
    settings: &DispatcherSettings,
    registration: Registration,
) where
    S: RegistrationStore,
    M: Mailer,
{
    let message = notification_email(&registration);
    match mailer.send(&message).await {
        Ok(()) => match store.mark_notified(registration.id).await {
            Ok(true) => {
                tracing::info!(
                    id = %registration.id,
                    state = %registration.state,
                    "notification delivered"
                );
            }
            Ok(false) => {
                tracing::warn!(id = %registration.id, "notification was already marked delivered");
            }
            Err(error) => {
                tracing::error!(id = %registration.id, %error, "failed to mark notification delivered");
            }
        },
        Err(error) => {
            let attempts = registration.notify_attempts + 1;
            let now = Utc::now();
            let gave_up = attempts >= settings.notify_max_attempts;
            let next_attempt_at = now
                + backoff(
                    settings.notify_backoff_base,
                    settings.notify_backoff_max,
                    attempts,
                );
            if gave_up {
                tracing::error!(
                    id = %registration.id,
                    %error,
                    attempts,
                    "notification permanently undelivered"
                );
            } else {
                tracing::warn!(
                    id = %registration.id,
                    %error,
                    attempts,
                    next_attempt_at = %next_attempt_at,
                    "notification send failed, will retry"
                );
            }
            if let Err(store_error) = store
                .record_notify_failure(
                    registration.id,
                    &error.to_string(),
                    attempts,
                    next_attempt_at,
                    gave_up.then_some(now),
                )
                .await
            {
                tracing::error!(id = %registration.id, %store_error, "failed to record notification failure");
            }
        }
    }
}

/// Compose the terminal-outcome mail for a registration.
fn notification_email(registration: &Registration) -> EmailMessage {
    let site = registration.site.display_name();
    let handle = &registration.handle;
    match registration.state {
        RegistrationState::Verified => EmailMessage {
            to: registration.email.clone(),
            subject: format!("Your {site} account is verified"),
            body: format!(
                "Hi,\n\n\
                 Ownership of the {site} account \"{handle}\" is confirmed. You can \
                 remove the verification code from your profile now and start \
                 commenting right away.\n\n\
                 — Parley"
            ),
        },
        _ => {
            let reason = registration
                .state
                .failure_reason()
                .unwrap_or("verification did not complete");
            EmailMessage {
                to: registration.email.clone(),
                subject: format!("Verifying your {site} account failed"),
                body: format!(
                    "Hi,\n\n\
                     We could not verify ownership of the {site} account \
                     \"{handle}\": {reason}. You can start over with a fresh \
                     code at any time.\n\n\
                     — Parley"
                ),
            }
        }
    }
}
