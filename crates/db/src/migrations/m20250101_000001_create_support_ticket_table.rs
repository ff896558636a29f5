//! Create `support_ticket` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SupportTicket::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SupportTicket::RmaNumber)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SupportTicket::StatusDetails).text())
                    .col(ColumnDef::new(SupportTicket::TrackingNumber).string_len(128))
                    .col(
                        ColumnDef::new(SupportTicket::CustomerName)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::CustomerEmail)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SupportTicket::CustomerPhone).string_len(64))
                    .col(ColumnDef::new(SupportTicket::Company).string_len(256))
                    .col(ColumnDef::new(SupportTicket::ShippingAddress).text().not_null())
                    .col(
                        ColumnDef::new(SupportTicket::DisplayModel)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::SerialNumber)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::DefectDescription)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::TroubleshootingSteps)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::ShippingMethod)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SupportTicket::RepairNotes).text())
                    .col(ColumnDef::new(SupportTicket::AssignedTo).string_len(128))
                    .col(
                        ColumnDef::new(SupportTicket::Priority)
                            .string_len(16)
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::IsArchived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(SupportTicket::ArchivedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(SupportTicket::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SupportTicket::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Kanban board filters by status
        manager
            .create_index(
                Index::create()
                    .name("idx_support_ticket_status")
                    .table(SupportTicket::Table)
                    .col(SupportTicket::Status)
                    .to_owned(),
            )
            .await?;

        // Archival sweep predicate
        manager
            .create_index(
                Index::create()
                    .name("idx_support_ticket_archival")
                    .table(SupportTicket::Table)
                    .col(SupportTicket::IsArchived)
                    .col(SupportTicket::Status)
                    .col(SupportTicket::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SupportTicket::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SupportTicket {
    Table,
    RmaNumber,
    Status,
    StatusDetails,
    TrackingNumber,
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    Company,
    ShippingAddress,
    DisplayModel,
    SerialNumber,
    DefectDescription,
    TroubleshootingSteps,
    ShippingMethod,
    RepairNotes,
    AssignedTo,
    Priority,
    IsArchived,
    ArchivedAt,
    CreatedAt,
    UpdatedAt,
}
