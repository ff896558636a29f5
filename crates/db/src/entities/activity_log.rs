//! Activity log entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of activity recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    #[sea_orm(string_value = "ticket_created")]
    TicketCreated,
    #[sea_orm(string_value = "status_changed")]
    StatusChanged,
    #[sea_orm(string_value = "ticket_updated")]
    TicketUpdated,
    #[sea_orm(string_value = "tickets_archived")]
    TicketsArchived,
}

/// Append-only audit entry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub action: ActivityAction,

    /// Ticket this entry is about; `None` for bulk system actions.
    #[sea_orm(indexed, nullable)]
    pub rma_number: Option<String>,

    /// Staff name, `customer` or `system`.
    pub actor: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub details: Json,

    #[sea_orm(indexed)]
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::support_ticket::Entity",
        from = "Column::RmaNumber",
        to = "super::support_ticket::Column::RmaNumber",
        on_delete = "NoAction"
    )]
    SupportTicket,
}

impl Related<super::support_ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupportTicket.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
