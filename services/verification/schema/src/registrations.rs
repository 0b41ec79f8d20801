use sea_orm::entity::prelude::*;

/// One ownership-verification attempt: a claimed external account, the code
/// the claimant must publish on it, poller bookkeeping, and notification
/// delivery state. Rows are never deleted; expiry is a state.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "registrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub site: String,
    pub handle: String,
    pub email: String,
    #[sea_orm(unique)]
    pub code: String,
    pub state: String,
    pub attempts: i32,
    /// Consecutive transient fetch failures; resets on any completed fetch.
    pub transient_failures: i32,
    /// Optimistic-concurrency counter; every conditional write bumps it.
    pub version: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_checked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub next_check_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Worker lease; the row is claimable when null or in the past.
    pub lease_until: Option<chrono::DateTime<chrono::Utc>>,
    pub notified: bool,
    pub notify_attempts: i32,
    pub notify_last_error: Option<String>,
    pub notify_next_attempt_at: chrono::DateTime<chrono::Utc>,
    /// Set when the notification retry budget is exhausted; never retried.
    pub notify_failed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
