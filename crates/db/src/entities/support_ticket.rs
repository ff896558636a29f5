//! Support ticket entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The workflow stages a ticket is expected to move through.
///
/// The `status` column itself is free text; values outside this set are
/// stored verbatim and simply have no known stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Submitted by the customer, not yet received.
    Pending,
    /// Device is in the workshop.
    Workshop,
    /// Repaired or replaced unit has been shipped back.
    Shipped,
}

impl TicketStatus {
    /// All known statuses in workflow order.
    pub const ALL: [Self; 3] = [Self::Pending, Self::Workshop, Self::Shipped];

    /// Column value of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Workshop => "workshop",
            Self::Shipped => "shipped",
        }
    }

    /// Parse a column value. Returns `None` for unknown statuses.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "workshop" => Some(Self::Workshop),
            "shipped" => Some(Self::Shipped),
            _ => None,
        }
    }

    /// Position in the `pending → workshop → shipped` progression.
    #[must_use]
    pub const fn stage(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Workshop => 1,
            Self::Shipped => 2,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer support case, keyed by its RMA number.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "support_ticket")]
pub struct Model {
    /// `RMA-<year>-<6 digits>`, assigned once at creation.
    #[sea_orm(primary_key, auto_increment = false)]
    pub rma_number: String,

    /// Workflow status (`pending`, `workshop`, `shipped`).
    #[sea_orm(indexed)]
    pub status: String,

    /// Free text shown to staff next to the status.
    #[sea_orm(column_type = "Text", nullable)]
    pub status_details: Option<String>,

    /// Carrier tracking number, usually set when shipped.
    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,

    pub customer_name: String,
    pub customer_email: String,
    #[sea_orm(nullable)]
    pub customer_phone: Option<String>,
    #[sea_orm(nullable)]
    pub company: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub shipping_address: String,

    pub display_model: String,
    pub serial_number: String,
    #[sea_orm(column_type = "Text")]
    pub defect_description: String,

    /// Self-service troubleshooting steps the customer already tried.
    #[sea_orm(column_type = "JsonBinary")]
    pub troubleshooting_steps: Json,

    pub shipping_method: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub repair_notes: Option<String>,

    /// Staff member handling the ticket.
    #[sea_orm(nullable)]
    pub assigned_to: Option<String>,

    pub priority: String,

    /// Set once by the archival sweep, never cleared.
    pub is_archived: bool,

    #[sea_orm(nullable)]
    pub archived_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    /// Refreshed on every mutation; input to the archival age check.
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// The known workflow status, if the stored value is one.
    #[must_use]
    pub fn known_status(&self) -> Option<TicketStatus> {
        TicketStatus::parse(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::activity_log::Entity")]
    ActivityLog,
}

impl Related<super::activity_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActivityLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
