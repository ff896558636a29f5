//! Create `activity_log` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActivityLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActivityLog::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActivityLog::Action).string_len(32).not_null())
                    .col(ColumnDef::new(ActivityLog::RmaNumber).string_len(32))
                    .col(ColumnDef::new(ActivityLog::Actor).string_len(128).not_null())
                    .col(
                        ColumnDef::new(ActivityLog::Details)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ActivityLog::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activity_log_support_ticket")
                            .from(ActivityLog::Table, ActivityLog::RmaNumber)
                            .to(SupportTicket::Table, SupportTicket::RmaNumber)
                            .on_delete(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_activity_log_rma_number")
                    .table(ActivityLog::Table)
                    .col(ActivityLog::RmaNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_activity_log_created_at")
                    .table(ActivityLog::Table)
                    .col(ActivityLog::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActivityLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ActivityLog {
    Table,
    Id,
    Action,
    RmaNumber,
    Actor,
    Details,
    CreatedAt,
}

#[derive(Iden)]
enum SupportTicket {
    Table,
    RmaNumber,
}
