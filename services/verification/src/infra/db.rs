use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use parley_domain::registration::RegistrationState;
use parley_domain::site::Site;
use parley_verification_schema::registrations;

use crate::domain::repository::RegistrationStore;
use crate::domain::types::{CheckUpdate, Registration, StateCounts};
use crate::error::VerificationError;

const OPEN_STATES: [&str; 2] = ["pending", "verifying"];
const TERMINAL_STATES: [&str; 3] = ["verified", "failed", "expired"];

/// `RegistrationStore` on PostgreSQL. Races (claim, transition, notified
/// flag) are resolved by conditional `UPDATE`s filtered on the version
/// column; `rows_affected == 0` means the precondition no longer held.
#[derive(Clone)]
pub struct DbRegistrationStore {
    pub db: DatabaseConnection,
}

impl RegistrationStore for DbRegistrationStore {
    async fn create(&self, registration: &Registration) -> Result<(), VerificationError> {
        registrations::ActiveModel {
            id: Set(registration.id),
            site: Set(registration.site.as_str().to_owned()),
            handle: Set(registration.handle.clone()),
            email: Set(registration.email.clone()),
            code: Set(registration.code.clone()),
            state: Set(registration.state.as_str().to_owned()),
            attempts: Set(registration.attempts),
            transient_failures: Set(registration.transient_failures),
            version: Set(registration.version),
            created_at: Set(registration.created_at),
            last_checked_at: Set(registration.last_checked_at),
            next_check_at: Set(registration.next_check_at),
            expires_at: Set(registration.expires_at),
            lease_until: Set(registration.lease_until),
            notified: Set(registration.notified),
            notify_attempts: Set(registration.notify_attempts),
            notify_last_error: Set(registration.notify_last_error.clone()),
            notify_next_attempt_at: Set(registration.notify_next_attempt_at),
            notify_failed_at: Set(registration.notify_failed_at),
        }
        .insert(&self.db)
        .await
        .context("create registration")?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Registration>, VerificationError> {
        let model = registrations::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find registration")?;
        model.map(registration_from_model).transpose()
    }

    async fn due_for_check(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Registration>, VerificationError> {
        let models = registrations::Entity::find()
            .filter(registrations::Column::State.is_in(OPEN_STATES))
            .filter(registrations::Column::NextCheckAt.lte(now))
            .filter(
                Condition::any()
                    .add(registrations::Column::LeaseUntil.is_null())
                    .add(registrations::Column::LeaseUntil.lt(now)),
            )
            .order_by_asc(registrations::Column::NextCheckAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("select due registrations")?;
        models
            .into_iter()
            .map(registration_from_model)
            .collect()
    }

    async fn claim(
        &self,
        registration: &Registration,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Registration>, VerificationError> {
        let lease_until = now + lease;
        let result = registrations::Entity::update_many()
            .col_expr(
                registrations::Column::State,
                Expr::value(RegistrationState::Verifying.as_str()),
            )
            .col_expr(
                registrations::Column::LeaseUntil,
                Expr::value(Some(lease_until)),
            )
            .col_expr(
                registrations::Column::Version,
                Expr::value(registration.version + 1),
            )
            .filter(registrations::Column::Id.eq(registration.id))
            .filter(registrations::Column::Version.eq(registration.version))
            .filter(registrations::Column::State.is_in(OPEN_STATES))
            .filter(
                Condition::any()
                    .add(registrations::Column::LeaseUntil.is_null())
                    .add(registrations::Column::LeaseUntil.lt(now)),
            )
            .exec(&self.db)
            .await
            .context("claim registration")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        let mut claimed = registration.clone();
        claimed.state = RegistrationState::Verifying;
        claimed.lease_until = Some(lease_until);
        claimed.version += 1;
        Ok(Some(claimed))
    }

    async fn apply_check(
        &self,
        registration: &Registration,
        update: &CheckUpdate,
    ) -> Result<bool, VerificationError> {
        let result = registrations::Entity::update_many()
            .col_expr(
                registrations::Column::State,
                Expr::value(update.state.as_str()),
            )
            .col_expr(registrations::Column::Attempts, Expr::value(update.attempts))
            .col_expr(
                registrations::Column::TransientFailures,
                Expr::value(update.transient_failures),
            )
            .col_expr(
                registrations::Column::LastCheckedAt,
                Expr::value(Some(update.last_checked_at)),
            )
            .col_expr(
                registrations::Column::NextCheckAt,
                Expr::value(update.next_check_at),
            )
            .col_expr(
                registrations::Column::LeaseUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                registrations::Column::Version,
                Expr::value(registration.version + 1),
            )
            .filter(registrations::Column::Id.eq(registration.id))
            .filter(registrations::Column::Version.eq(registration.version))
            .filter(registrations::Column::State.is_in(OPEN_STATES))
            .exec(&self.db)
            .await
            .context("apply check result")?;
        Ok(result.rows_affected > 0)
    }

    async fn due_for_notify(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Registration>, VerificationError> {
        let models = registrations::Entity::find()
            .filter(registrations::Column::State.is_in(TERMINAL_STATES))
            .filter(registrations::Column::Notified.eq(false))
            .filter(registrations::Column::NotifyFailedAt.is_null())
            .filter(registrations::Column::NotifyNextAttemptAt.lte(now))
            .order_by_asc(registrations::Column::NotifyNextAttemptAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("select due notifications")?;
        models
            .into_iter()
            .map(registration_from_model)
            .collect()
    }

    async fn mark_notified(&self, id: Uuid) -> Result<bool, VerificationError> {
        let result = registrations::Entity::update_many()
            .col_expr(registrations::Column::Notified, Expr::value(true))
            .filter(registrations::Column::Id.eq(id))
            .filter(registrations::Column::Notified.eq(false))
            .exec(&self.db)
            .await
            .context("mark registration notified")?;
        Ok(result.rows_affected > 0)
    }

    async fn record_notify_failure(
        &self,
        id: Uuid,
        error: &str,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        failed_at: Option<DateTime<Utc>>,
    ) -> Result<(), VerificationError> {
        registrations::Entity::update_many()
            .col_expr(registrations::Column::NotifyAttempts, Expr::value(attempts))
            .col_expr(
                registrations::Column::NotifyLastError,
                Expr::value(Some(error.to_owned())),
            )
            .col_expr(
                registrations::Column::NotifyNextAttemptAt,
                Expr::value(next_attempt_at),
            )
            .col_expr(
                registrations::Column::NotifyFailedAt,
                Expr::value(failed_at),
            )
            .filter(registrations::Column::Id.eq(id))
            .filter(registrations::Column::Notified.eq(false))
            .exec(&self.db)
            .await
            .context("record notification failure")?;
        Ok(())
    }

    async fn count_by_state(&self) -> Result<StateCounts, VerificationError> {
        Ok(StateCounts {
            pending: self.count_state("pending").await?,
            verifying: self.count_state("verifying").await?,
            verified: self.count_state("verified").await?,
            failed: self.count_state("failed").await?,
            expired: self.count_state("expired").await?,
        })
    }
}

impl DbRegistrationStore {
    async fn count_state(&self, state: &str) -> Result<u64, VerificationError> {
        let count = registrations::Entity::find()
            .filter(registrations::Column::State.eq(state))
            .count(&self.db)
            .await
            .context("count registrations by state")?;
        Ok(count)
    }
}

fn registration_from_model(model: registrations::Model) -> Result<Registration, VerificationError> {
    let site = model.site.parse::<Site>().context("stored site")?;
    let state = model
        .state
        .parse::<RegistrationState>()
        .context("stored state")?;
    Ok(Registration {
        id: model.id,
        site,
        handle: model.handle,
        email: model.email,
        code: model.code,
        state,
        attempts: model.attempts,
        transient_failures: model.transient_failures,
        version: model.version,
        created_at: model.created_at,
        last_checked_at: model.last_checked_at,
        next_check_at: model.next_check_at,
        expires_at: model.expires_at,
        lease_until: model.lease_until,
        notified: model.notified,
        notify_attempts: model.notify_attempts,
        notify_last_error: model.notify_last_error,
        notify_next_attempt_at: model.notify_next_attempt_at,
        notify_failed_at: model.notify_failed_at,
    })
}
