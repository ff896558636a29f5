//! Support ticket repository.

use std::sync::Arc;

use crate::entities::support_ticket::{self, TicketStatus};
use crate::entities::SupportTicket;
use chrono::{DateTime, Utc};
use rmadesk_common::{AppError, AppResult};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, Condition, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set, SqlErr,
    prelude::DateTimeWithTimeZone,
};

/// A partial update of a ticket row.
///
/// `None` leaves a column untouched. For nullable columns `Some(None)` clears
/// the value. The RMA number and the archival columns are not
/// part of the change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketChanges {
    pub updated_at: DateTimeWithTimeZone,
    pub status: Option<String>,
    pub status_details: Option<Option<String>>,
    pub tracking_number: Option<Option<String>>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<Option<String>>,
    pub company: Option<Option<String>>,
    pub shipping_address: Option<String>,
    pub shipping_method: Option<String>,
    pub repair_notes: Option<Option<String>>,
    pub assigned_to: Option<Option<String>>,
    pub priority: Option<String>,
}

impl TicketChanges {
    /// An empty change set that only refreshes `updated_at`.
    #[must_use]
    pub const fn new(updated_at: DateTimeWithTimeZone) -> Self {
        Self {
            updated_at,
            status: None,
            status_details: None,
            tracking_number: None,
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            company: None,
            shipping_address: None,
            shipping_method: None,
            repair_notes: None,
            assigned_to: None,
            priority: None,
        }
    }

    /// Names of the columns this change set writes, `updated_at` excluded.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let flags = [
            ("status", self.status.is_some()),
            ("statusDetails", self.status_details.is_some()),
            ("trackingNumber", self.tracking_number.is_some()),
            ("customerName", self.customer_name.is_some()),
            ("customerEmail", self.customer_email.is_some()),
            ("customerPhone", self.customer_phone.is_some()),
            ("company", self.company.is_some()),
            ("shippingAddress", self.shipping_address.is_some()),
            ("shippingMethod", self.shipping_method.is_some()),
            ("repairNotes", self.repair_notes.is_some()),
            ("assignedTo", self.assigned_to.is_some()),
            ("priority", self.priority.is_some()),
        ];
        flags
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }

    /// Apply the change set to an in-memory model.
    ///
    /// `updated_at` becomes the later of the proposed value and one
    /// microsecond past the stored one, like [`monotonic_updated_at`].
    pub fn apply_to(&self, model: &mut support_ticket::Model) {
        let floor = model.updated_at + chrono::Duration::microseconds(1);
        model.updated_at = self.updated_at.max(floor);
        if let Some(v) = &self.status {
            model.status.clone_from(v);
        }
        if let Some(v) = &self.status_details {
            model.status_details.clone_from(v);
        }
        if let Some(v) = &self.tracking_number {
            model.tracking_number.clone_from(v);
        }
        if let Some(v) = &self.customer_name {
            model.customer_name.clone_from(v);
        }
        if let Some(v) = &self.customer_email {
            model.customer_email.clone_from(v);
        }
        if let Some(v) = &self.customer_phone {
            model.customer_phone.clone_from(v);
        }
        if let Some(v) = &self.company {
            model.company.clone_from(v);
        }
        if let Some(v) = &self.shipping_address {
            model.shipping_address.clone_from(v);
        }
        if let Some(v) = &self.shipping_method {
            model.shipping_method.clone_from(v);
        }
        if let Some(v) = &self.repair_notes {
            model.repair_notes.clone_from(v);
        }
        if let Some(v) = &self.assigned_to {
            model.assigned_to.clone_from(v);
        }
        if let Some(v) = &self.priority {
            model.priority.clone_from(v);
        }
    }

    /// Build an active model that updates only the supplied columns.
    ///
    /// `updated_at` is left unset; the update statement computes it.
    #[must_use]
    pub fn into_active_model(self, rma_number: &str) -> support_ticket::ActiveModel {
        let mut active = support_ticket::ActiveModel {
            rma_number: Unchanged(rma_number.to_string()),
            ..Default::default()
        };

        if let Some(v) = self.status {
            active.status = Set(v);
        }
        if let Some(v) = self.status_details {
            active.status_details = Set(v);
        }
        if let Some(v) = self.tracking_number {
            active.tracking_number = Set(v);
        }
        if let Some(v) = self.customer_name {
            active.customer_name = Set(v);
        }
        if let Some(v) = self.customer_email {
            active.customer_email = Set(v);
        }
        if let Some(v) = self.customer_phone {
            active.customer_phone = Set(v);
        }
        if let Some(v) = self.company {
            active.company = Set(v);
        }
        if let Some(v) = self.shipping_address {
            active.shipping_address = Set(v);
        }
        if let Some(v) = self.shipping_method {
            active.shipping_method = Set(v);
        }
        if let Some(v) = self.repair_notes {
            active.repair_notes = Set(v);
        }
        if let Some(v) = self.assigned_to {
            active.assigned_to = Set(v);
        }
        if let Some(v) = self.priority {
            active.priority = Set(v);
        }

        active
    }
}

/// `GREATEST(proposed, updated_at + 1µs)`, evaluated against the row being
/// written so that concurrent writers can never move `updated_at` backwards.
fn monotonic_updated_at(proposed: DateTimeWithTimeZone) -> SimpleExpr {
    Expr::cust_with_values(
        r#"GREATEST(?, "updated_at" + INTERVAL '1 microsecond')"#,
        [proposed],
    )
}

/// Rows eligible for archival at `cutoff`.
fn archival_condition(cutoff: DateTimeWithTimeZone) -> Condition {
    Condition::all()
        .add(support_ticket::Column::Status.eq(TicketStatus::Shipped.as_str()))
        .add(support_ticket::Column::IsArchived.eq(false))
        .add(support_ticket::Column::UpdatedAt.lt(cutoff))
}

/// Support ticket repository for database operations.
#[derive(Clone)]
pub struct SupportTicketRepository {
    db: Arc<DatabaseConnection>,
}

impl SupportTicketRepository {
    /// Create a new support ticket repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a ticket by RMA number.
    pub async fn find_by_rma_number(
        &self,
        rma_number: &str,
    ) -> AppResult<Option<support_ticket::Model>> {
        SupportTicket::find_by_id(rma_number)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a ticket by RMA number, returning an error if not found.
    pub async fn get_by_rma_number(&self, rma_number: &str) -> AppResult<support_ticket::Model> {
        self.find_by_rma_number(rma_number)
            .await?
            .ok_or_else(|| AppError::TicketNotFound(rma_number.to_string()))
    }

    /// Check whether an RMA number is already taken.
    pub async fn exists(&self, rma_number: &str) -> AppResult<bool> {
        let count = SupportTicket::find()
            .filter(support_ticket::Column::RmaNumber.eq(rma_number))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Insert a new ticket.
    ///
    /// A taken RMA number surfaces as [`AppError::Conflict`] so callers can
    /// draw a new one.
    pub async fn create(
        &self,
        model: support_ticket::ActiveModel,
    ) -> AppResult<support_ticket::Model> {
        model.insert(self.db.as_ref()).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                AppError::Conflict(format!("RMA number already taken: {detail}"))
            }
            _ => AppError::Database(e.to_string()),
        })
    }

    /// Apply a partial update in a single `UPDATE … RETURNING` statement.
    ///
    /// `changes.updated_at` is only a proposal: the stored value becomes
    /// `GREATEST(proposed, previous + 1µs)` so it strictly increases even when
    /// writers commit out of order.
    ///
    /// With `expected_updated_at` the write only happens if the stored
    /// `updated_at` still matches; otherwise [`AppError::Conflict`] is returned.
    pub async fn apply_changes(
        &self,
        rma_number: &str,
        changes: TicketChanges,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> AppResult<support_ticket::Model> {
        let conditional = expected_updated_at.is_some();
        let proposed = changes.updated_at;

        let mut update = SupportTicket::update_many()
            .set(changes.into_active_model(rma_number))
            .col_expr(
                support_ticket::Column::UpdatedAt,
                monotonic_updated_at(proposed),
            )
            .filter(support_ticket::Column::RmaNumber.eq(rma_number));
        if let Some(expected) = expected_updated_at {
            let expected: DateTimeWithTimeZone = expected.into();
            update = update.filter(support_ticket::Column::UpdatedAt.eq(expected));
        }

        let mut rows = update
            .exec_with_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.pop().ok_or_else(|| {
            if conditional {
                AppError::Conflict(format!("Ticket {rma_number} was modified by someone else"))
            } else {
                AppError::TicketNotFound(rma_number.to_string())
            }
        })
    }

    /// Archive up to `batch_size` shipped tickets idle since before `cutoff`.
    ///
    /// Runs as one statement, `UPDATE … WHERE rma_number IN (SELECT … LIMIT n)`,
    /// with the predicate repeated on the outer update so that rows archived by
    /// a concurrent sweep are not counted twice.
    pub async fn archive_batch(
        &self,
        cutoff: DateTime<Utc>,
        archived_at: DateTime<Utc>,
        batch_size: u64,
    ) -> AppResult<u64> {
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        let archived_at: DateTimeWithTimeZone = archived_at.into();

        let eligible = SupportTicket::find()
            .select_only()
            .column(support_ticket::Column::RmaNumber)
            .filter(archival_condition(cutoff))
            .order_by_asc(support_ticket::Column::UpdatedAt)
            .limit(batch_size)
            .into_query();

        let result = SupportTicket::update_many()
            .col_expr(support_ticket::Column::IsArchived, Expr::value(true))
            .col_expr(support_ticket::Column::ArchivedAt, Expr::value(archived_at))
            .filter(support_ticket::Column::RmaNumber.in_subquery(eligible))
            .filter(archival_condition(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// List non-archived tickets, newest first.
    pub async fn list_active(
        &self,
        status: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>> {
        let mut query = SupportTicket::find()
            .filter(support_ticket::Column::IsArchived.eq(false))
            .order_by_desc(support_ticket::Column::CreatedAt);

        if let Some(status) = status {
            query = query.filter(support_ticket::Column::Status.eq(status));
        }

        query
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List archived tickets, most recently archived first.
    pub async fn list_archived(
        &self,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>> {
        SupportTicket::find()
            .filter(support_ticket::Column::IsArchived.eq(true))
            .order_by_desc(support_ticket::Column::ArchivedAt)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count non-archived tickets with the given status.
    pub async fn count_active_by_status(&self, status: &str) -> AppResult<u64> {
        SupportTicket::find()
            .filter(support_ticket::Column::IsArchived.eq(false))
            .filter(support_ticket::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count archived tickets.
    pub async fn count_archived(&self) -> AppResult<u64> {
        SupportTicket::find()
            .filter(support_ticket::Column::IsArchived.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all tickets.
    pub async fn count_all(&self) -> AppResult<u64> {
        SupportTicket::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};
    use serde_json::json;

    fn create_test_ticket(rma_number: &str, status: &str) -> support_ticket::Model {
        let now = Utc::now();
        support_ticket::Model {
            rma_number: rma_number.to_string(),
            status: status.to_string(),
            status_details: None,
            tracking_number: None,
            customer_name: "Erika Muster".to_string(),
            customer_email: "erika@example.com".to_string(),
            customer_phone: None,
            company: None,
            shipping_address: "Hauptstr. 1, 10115 Berlin".to_string(),
            display_model: "PX-2400".to_string(),
            serial_number: "SN123456".to_string(),
            defect_description: "Backlight flickers".to_string(),
            troubleshooting_steps: json!(["power_cycle"]),
            shipping_method: "pickup".to_string(),
            repair_notes: None,
            assigned_to: None,
            priority: "normal".to_string(),
            is_archived: false,
            archived_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_rma_number() {
        let ticket = create_test_ticket("RMA-2025-000123", "pending");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[ticket.clone()]])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        let result = repo.find_by_rma_number("RMA-2025-000123").await.unwrap();
        assert_eq!(result.unwrap().rma_number, "RMA-2025-000123");
    }

    #[tokio::test]
    async fn test_get_by_rma_number_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<support_ticket::Model>::new()])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        let result = repo.get_by_rma_number("RMA-2025-999999").await;
        assert!(matches!(result, Err(AppError::TicketNotFound(rma)) if rma == "RMA-2025-999999"));
    }

    #[tokio::test]
    async fn test_exists() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(1))
                }]])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        assert!(repo.exists("RMA-2025-000123").await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_changes_writes_only_supplied_columns() {
        let mut updated = create_test_ticket("RMA-2025-000123", "workshop");
        updated.status_details = Some("Panel ordered".to_string());

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[updated.clone()]])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db.clone());
        let mut changes = TicketChanges::new(updated.updated_at);
        changes.status = Some("workshop".to_string());
        changes.status_details = Some(Some("Panel ordered".to_string()));

        let result = repo
            .apply_changes("RMA-2025-000123", changes, None)
            .await
            .unwrap();
        assert_eq!(result.status, "workshop");

        drop(repo);
        let db = Arc::try_unwrap(db).ok().unwrap();
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        let sql = log[0].statements()[0].sql.clone();
        assert!(sql.starts_with(r#"UPDATE "support_ticket" SET"#));
        assert!(sql.contains(r#""status" = $1"#));
        assert!(sql.contains(r#""status_details" = $2"#));
        assert!(sql.contains(r#""updated_at" = GREATEST($3, "updated_at" + INTERVAL '1 microsecond')"#));
        assert!(sql.contains("RETURNING"));
        assert!(!sql.contains(r#""tracking_number" ="#));
        assert!(!sql.contains(r#""is_archived" ="#));
    }

    #[tokio::test]
    async fn test_apply_changes_conflict_on_stale_timestamp() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<support_ticket::Model>::new()])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        let stale = Utc::now() - Duration::minutes(5);
        let result = repo
            .apply_changes(
                "RMA-2025-000123",
                TicketChanges::new(Utc::now().into()),
                Some(stale),
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_apply_changes_missing_row_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<support_ticket::Model>::new()])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        let result = repo
            .apply_changes("RMA-2025-000404", TicketChanges::new(Utc::now().into()), None)
            .await;
        assert!(matches!(result, Err(AppError::TicketNotFound(_))));
    }

    #[tokio::test]
    async fn test_archive_batch_single_statement() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db.clone());
        let now = Utc::now();
        let archived = repo
            .archive_batch(now - Duration::days(30), now, 500)
            .await
            .unwrap();
        assert_eq!(archived, 3);

        drop(repo);
        let db = Arc::try_unwrap(db).ok().unwrap();
        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        let statement = &log[0].statements()[0];
        assert!(statement.sql.starts_with(r#"UPDATE "support_ticket" SET "is_archived" = $1, "archived_at" = $2"#));
        assert!(statement.sql.contains(r#""rma_number" IN (SELECT "support_ticket"."rma_number" FROM "support_ticket""#));
        assert!(statement.sql.contains("LIMIT"));
        assert!(!statement.sql.contains(r#""updated_at" = $"#));
    }

    #[tokio::test]
    async fn test_archive_batch_database_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_errors([DbErr::Custom("connection reset".to_string())])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        let now = Utc::now();
        let result = repo.archive_batch(now - Duration::days(30), now, 500).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_list_active() {
        let tickets = vec![
            create_test_ticket("RMA-2025-000001", "pending"),
            create_test_ticket("RMA-2025-000002", "pending"),
        ];
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([tickets])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        let result = repo.list_active(Some("pending"), 50, 0).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_count_archived() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(7))
                }]])
                .into_connection(),
        );

        let repo = SupportTicketRepository::new(db);
        assert_eq!(repo.count_archived().await.unwrap(), 7);
    }

    #[test]
    fn test_changed_fields() {
        let mut changes = TicketChanges::new(Utc::now().into());
        assert!(changes.changed_fields().is_empty());

        changes.repair_notes = Some(Some("Replaced inverter".to_string()));
        changes.assigned_to = Some(None);
        assert_eq!(changes.changed_fields(), vec!["repairNotes", "assignedTo"]);
    }

    #[test]
    fn test_apply_to_leaves_unsupplied_fields() {
        let mut ticket = create_test_ticket("RMA-2025-000123", "pending");
        ticket.tracking_number = Some("1Z999".to_string());
        let later = ticket.updated_at + Duration::seconds(1);

        let mut changes = TicketChanges::new(later);
        changes.status = Some("shipped".to_string());
        changes.apply_to(&mut ticket);

        assert_eq!(ticket.status, "shipped");
        assert_eq!(ticket.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(ticket.rma_number, "RMA-2025-000123");
        assert_eq!(ticket.updated_at, later);
    }

    #[test]
    fn test_apply_to_never_moves_updated_at_back() {
        let mut ticket = create_test_ticket("RMA-2025-000123", "pending");
        let start = ticket.updated_at;

        // Two writers read the same row; the one with the later proposal
        // commits first.
        let mut early = TicketChanges::new(start + Duration::milliseconds(1));
        early.status = Some("workshop".to_string());
        let mut late = TicketChanges::new(start + Duration::milliseconds(2));
        late.repair_notes = Some(Some("Panel ordered".to_string()));

        late.apply_to(&mut ticket);
        let after_first = ticket.updated_at;
        early.apply_to(&mut ticket);

        assert_eq!(after_first, start + Duration::milliseconds(2));
        assert!(ticket.updated_at > after_first);
        assert_eq!(ticket.updated_at, after_first + Duration::microseconds(1));
        assert_eq!(ticket.status, "workshop");
    }
}
