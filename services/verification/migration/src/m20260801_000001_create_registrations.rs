use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Registrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Registrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Registrations::Site).string().not_null())
                    .col(ColumnDef::new(Registrations::Handle).string().not_null())
                    .col(ColumnDef::new(Registrations::Email).string().not_null())
                    .col(
                        ColumnDef::new(Registrations::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Registrations::State).string().not_null())
                    .col(
                        ColumnDef::new(Registrations::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Registrations::TransientFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Registrations::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Registrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Registrations::LastCheckedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Registrations::NextCheckAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Registrations::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Registrations::LeaseUntil).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Registrations::Notified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Registrations::NotifyAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Registrations::NotifyLastError).string())
                    .col(
                        ColumnDef::new(Registrations::NotifyNextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Registrations::NotifyFailedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index for matcher poll queries (open registrations by due instant).
        manager
            .create_index(
                Index::create()
                    .table(Registrations::Table)
                    .col(Registrations::State)
                    .col(Registrations::NextCheckAt)
                    .name("idx_registrations_state_next_check_at")
                    .to_owned(),
            )
            .await?;

        // Index for dispatcher poll queries (terminal, undelivered).
        manager
            .create_index(
                Index::create()
                    .table(Registrations::Table)
                    .col(Registrations::Notified)
                    .col(Registrations::NotifyNextAttemptAt)
                    .name("idx_registrations_notified_notify_next_attempt_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Registrations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Registrations {
    Table,
    Id,
    Site,
    Handle,
    Email,
    Code,
    State,
    Attempts,
    TransientFailures,
    Version,
    CreatedAt,
    LastCheckedAt,
    NextCheckAt,
    ExpiresAt,
    LeaseUntil,
    Notified,
    NotifyAttempts,
    NotifyLastError,
    NotifyNextAttemptAt,
    NotifyFailedAt,
}
