//! Ticket service: intake, status transitions and general updates.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, SubsecRound, Utc};
use rmadesk_common::{AppError, AppResult, IdGenerator};
use rmadesk_db::entities::support_ticket::{self, TicketStatus};
use rmadesk_db::repositories::TicketChanges;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{info, warn};
use validator::Validate;

use super::activity::{ActivityEntry, ActivityLogger, record_quietly};
use super::ticket_store::TicketStore;

/// Attempts at drawing an unused RMA number before giving up.
const MAX_RMA_ATTEMPTS: usize = 10;

/// Maximum length of a status value.
pub const MAX_STATUS_LEN: usize = 32;

/// Maximum page size for ticket listings.
pub const MAX_LIST_LIMIT: u64 = 100;

/// Priority assigned to new tickets.
const DEFAULT_PRIORITY: &str = "normal";

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Customer submission from the public intake form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketInput {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email, length(max = 254))]
    pub customer_email: String,
    #[validate(length(max = 50))]
    pub customer_phone: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(min = 1, max = 1000))]
    pub shipping_address: String,
    #[validate(length(min = 1, max = 100))]
    pub display_model: String,
    #[validate(length(min = 1, max = 100))]
    pub serial_number: String,
    #[validate(length(min = 1, max = 5000))]
    pub defect_description: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub troubleshooting_steps: Vec<String>,
    #[validate(length(min = 1, max = 50))]
    pub shipping_method: String,
}

/// Input for a status transition.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusInput {
    #[validate(length(min = 1, max = 32))]
    pub status: String,
    #[validate(length(max = 2000))]
    pub status_details: Option<String>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    /// Reject the write if the ticket changed since this timestamp.
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// Input for a general field update.
///
/// `status` is accepted only so that it can be rejected explicitly, whether
/// it carries a value or `null`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketInput {
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 2000))]
    pub status_details: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 100))]
    pub tracking_number: Option<Option<String>>,
    #[validate(length(min = 1, max = 200))]
    pub customer_name: Option<String>,
    #[validate(email, length(max = 254))]
    pub customer_email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 50))]
    pub customer_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 200))]
    pub company: Option<Option<String>>,
    #[validate(length(min = 1, max = 1000))]
    pub shipping_address: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub shipping_method: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 10000))]
    pub repair_notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 200))]
    pub assigned_to: Option<Option<String>>,
    #[validate(length(min = 1, max = 16))]
    pub priority: Option<String>,
    /// Reject the write if the ticket changed since this timestamp.
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// Ticket counts for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatistics {
    pub pending: u64,
    pub workshop: u64,
    pub shipped: u64,
    pub archived: u64,
    pub total: u64,
}

/// Next `updated_at` value after `previous`.
///
/// Truncated to the microsecond precision of the database column and always
/// strictly later than `previous`, even if the clock stood still or went back.
#[must_use]
pub fn next_updated_at(previous: DateTimeWithTimeZone) -> DateTimeWithTimeZone {
    let now = Utc::now().trunc_subsecs(6);
    let floor = previous.with_timezone(&Utc) + Duration::microseconds(1);
    now.max(floor).into()
}

/// How a status change relates to the `pending → workshop → shipped` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Forward,
    Backward,
    /// At least one side is not a known status.
    Unrecognized,
}

impl Transition {
    #[must_use]
    pub fn classify(old_status: &str, new_status: &str) -> Self {
        if old_status == new_status {
            return Self::Unchanged;
        }
        match (TicketStatus::parse(old_status), TicketStatus::parse(new_status)) {
            (Some(old), Some(new)) if new.stage() > old.stage() => Self::Forward,
            (Some(_), Some(_)) => Self::Backward,
            _ => Self::Unrecognized,
        }
    }
}

/// Service for ticket intake and mutations.
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    activity: Arc<dyn ActivityLogger>,
    id_gen: IdGenerator,
}

impl TicketService {
    /// Create a new ticket service.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, activity: Arc<dyn ActivityLogger>) -> Self {
        Self {
            store,
            activity,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register a new ticket from a customer submission.
    pub async fn create_ticket(&self, input: CreateTicketInput) -> AppResult<support_ticket::Model> {
        input.validate()?;

        let now: DateTimeWithTimeZone = Utc::now().trunc_subsecs(6).into();

        let ticket = support_ticket::Model {
            rma_number: String::new(),
            status: TicketStatus::Pending.as_str().to_string(),
            status_details: None,
            tracking_number: None,
            customer_name: input.customer_name,
            customer_email: input.customer_email,
            customer_phone: input.customer_phone,
            company: input.company,
            shipping_address: input.shipping_address,
            display_model: input.display_model,
            serial_number: input.serial_number,
            defect_description: input.defect_description,
            troubleshooting_steps: json!(input.troubleshooting_steps),
            shipping_method: input.shipping_method,
            repair_notes: None,
            assigned_to: None,
            priority: DEFAULT_PRIORITY.to_string(),
            is_archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };

        let ticket = self.insert_with_fresh_rma_number(ticket).await?;
        info!(rma_number = %ticket.rma_number, "Ticket created");

        record_quietly(
            self.activity.as_ref(),
            ActivityEntry::ticket_created(
                &ticket.rma_number,
                &ticket.display_model,
                &ticket.serial_number,
            ),
        )
        .await;

        Ok(ticket)
    }

    /// Draw RMA numbers until one inserts.
    ///
    /// The existence check only skips obvious collisions; the unique key on
    /// insert is what decides, so a number taken in between is retried too.
    async fn insert_with_fresh_rma_number(
        &self,
        mut ticket: support_ticket::Model,
    ) -> AppResult<support_ticket::Model> {
        let year = Utc::now().year();
        for _ in 0..MAX_RMA_ATTEMPTS {
            let candidate = self.id_gen.generate_rma_number(year).to_string();
            if self.store.rma_number_exists(&candidate).await? {
                warn!(rma_number = %candidate, "RMA number collision, retrying");
                continue;
            }

            ticket.rma_number = candidate;
            match self.store.insert(ticket.clone()).await {
                Err(AppError::Conflict(_)) => warn!(
                    rma_number = %ticket.rma_number,
                    "RMA number taken before insert, retrying"
                ),
                result => return result,
            }
        }
        Err(AppError::Internal(
            "Could not allocate a unique RMA number".to_string(),
        ))
    }

    /// Get a ticket by RMA number.
    pub async fn get_ticket(&self, rma_number: &str) -> AppResult<support_ticket::Model> {
        self.store.get_by_rma_number(rma_number).await
    }

    /// Move a ticket to a new status.
    ///
    /// This is the only path that writes `status`. A `status_changed` entry
    /// is recorded when the value actually changes.
    pub async fn change_status(
        &self,
        rma_number: &str,
        input: ChangeStatusInput,
        actor: &str,
    ) -> AppResult<support_ticket::Model> {
        input.validate()?;
        let new_status = input.status.trim().to_string();
        if new_status.is_empty() {
            return Err(AppError::Validation("status must not be blank".to_string()));
        }

        let current = self.store.get_by_rma_number(rma_number).await?;
        let old_status = current.status.clone();

        match Transition::classify(&old_status, &new_status) {
            Transition::Backward => warn!(
                rma_number = %rma_number,
                old_status = %old_status,
                new_status = %new_status,
                actor = %actor,
                "Backward status transition"
            ),
            Transition::Unrecognized if TicketStatus::parse(&new_status).is_none() => warn!(
                rma_number = %rma_number,
                new_status = %new_status,
                actor = %actor,
                "Unrecognized ticket status"
            ),
            _ => {}
        }

        let mut changes = TicketChanges::new(next_updated_at(current.updated_at));
        changes.status = Some(new_status.clone());
        changes.status_details = input.status_details.map(Some);
        changes.tracking_number = input.tracking_number.map(Some);

        let updated = self
            .store
            .apply_changes(rma_number, changes, input.expected_updated_at)
            .await?;

        if old_status != updated.status {
            info!(
                rma_number = %rma_number,
                old_status = %old_status,
                new_status = %updated.status,
                actor = %actor,
                "Ticket status changed"
            );
            record_quietly(
                self.activity.as_ref(),
                ActivityEntry::status_changed(rma_number, &old_status, &updated.status, actor),
            )
            .await;
        }

        Ok(updated)
    }

    /// Merge supplied fields onto a ticket. Never writes `status`.
    pub async fn update_fields(
        &self,
        rma_number: &str,
        input: UpdateTicketInput,
        actor: &str,
    ) -> AppResult<support_ticket::Model> {
        if input.status.is_some() {
            return Err(AppError::Validation(
                "status cannot be changed by a general update, use the status endpoint"
                    .to_string(),
            ));
        }
        input.validate()?;

        let current = self.store.get_by_rma_number(rma_number).await?;

        let mut changes = TicketChanges::new(next_updated_at(current.updated_at));
        changes.status_details = input.status_details;
        changes.tracking_number = input.tracking_number;
        changes.customer_name = input.customer_name;
        changes.customer_email = input.customer_email;
        changes.customer_phone = input.customer_phone;
        changes.company = input.company;
        changes.shipping_address = input.shipping_address;
        changes.shipping_method = input.shipping_method;
        changes.repair_notes = input.repair_notes;
        changes.assigned_to = input.assigned_to;
        changes.priority = input.priority;

        let fields = changes.changed_fields();
        if fields.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        let updated = self
            .store
            .apply_changes(rma_number, changes, input.expected_updated_at)
            .await?;

        info!(rma_number = %rma_number, actor = %actor, fields = ?fields, "Ticket updated");
        record_quietly(
            self.activity.as_ref(),
            ActivityEntry::ticket_updated(rma_number, &fields, actor),
        )
        .await;

        Ok(updated)
    }

    /// Non-archived tickets, newest first.
    pub async fn list_active(
        &self,
        status: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>> {
        self.store
            .list_active(status, limit.min(MAX_LIST_LIMIT), offset)
            .await
    }

    /// Archived tickets, most recently archived first.
    pub async fn list_archived(
        &self,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>> {
        self.store
            .list_archived(limit.min(MAX_LIST_LIMIT), offset)
            .await
    }

    /// Ticket counts per workflow stage.
    pub async fn statistics(&self) -> AppResult<TicketStatistics> {
        Ok(TicketStatistics {
            pending: self
                .store
                .count_active_by_status(TicketStatus::Pending.as_str())
                .await?,
            workshop: self
                .store
                .count_active_by_status(TicketStatus::Workshop.as_str())
                .await?,
            shipped: self
                .store
                .count_active_by_status(TicketStatus::Shipped.as_str())
                .await?,
            archived: self.store.count_archived().await?,
            total: self.store.count_all().await?,
        })
    }
}
