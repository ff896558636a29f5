//! Persistence seam for tickets.
//!
//! [`TicketStore`] is what the ticket and archival services talk to. The
//! production implementation is [`SupportTicketRepository`]; an in-memory
//! store is available for tests behind the `test-utils` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rmadesk_common::{AppError, AppResult};
use rmadesk_db::entities::support_ticket;
use rmadesk_db::repositories::{SupportTicketRepository, TicketChanges};
use sea_orm::Set;

/// Ticket persistence operations needed by the lifecycle services.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_by_rma_number(&self, rma_number: &str)
    -> AppResult<Option<support_ticket::Model>>;

    async fn get_by_rma_number(&self, rma_number: &str) -> AppResult<support_ticket::Model> {
        self.find_by_rma_number(rma_number)
            .await?
            .ok_or_else(|| AppError::TicketNotFound(rma_number.to_string()))
    }

    async fn rma_number_exists(&self, rma_number: &str) -> AppResult<bool>;

    /// Insert a new ticket. A taken RMA number fails with
    /// [`AppError::Conflict`].
    async fn insert(&self, ticket: support_ticket::Model) -> AppResult<support_ticket::Model>;

    /// Atomic partial update. The stored `updated_at` always ends up strictly
    /// later than before. `expected_updated_at` turns it into a
    /// compare-and-swap that fails with [`AppError::Conflict`].
    async fn apply_changes(
        &self,
        rma_number: &str,
        changes: TicketChanges,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> AppResult<support_ticket::Model>;

    /// Archive at most `batch_size` eligible tickets in one atomic step.
    async fn archive_batch(
        &self,
        cutoff: DateTime<Utc>,
        archived_at: DateTime<Utc>,
        batch_size: u64,
    ) -> AppResult<u64>;

    async fn list_active(
        &self,
        status: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>>;

    async fn list_archived(&self, limit: u64, offset: u64)
    -> AppResult<Vec<support_ticket::Model>>;

    async fn count_active_by_status(&self, status: &str) -> AppResult<u64>;

    async fn count_archived(&self) -> AppResult<u64>;

    async fn count_all(&self) -> AppResult<u64>;
}

fn new_ticket_active_model(ticket: support_ticket::Model) -> support_ticket::ActiveModel {
    support_ticket::ActiveModel {
        rma_number: Set(ticket.rma_number),
        status: Set(ticket.status),
        status_details: Set(ticket.status_details),
        tracking_number: Set(ticket.tracking_number),
        customer_name: Set(ticket.customer_name),
        customer_email: Set(ticket.customer_email),
        customer_phone: Set(ticket.customer_phone),
        company: Set(ticket.company),
        shipping_address: Set(ticket.shipping_address),
        display_model: Set(ticket.display_model),
        serial_number: Set(ticket.serial_number),
        defect_description: Set(ticket.defect_description),
        troubleshooting_steps: Set(ticket.troubleshooting_steps),
        shipping_method: Set(ticket.shipping_method),
        repair_notes: Set(ticket.repair_notes),
        assigned_to: Set(ticket.assigned_to),
        priority: Set(ticket.priority),
        is_archived: Set(ticket.is_archived),
        archived_at: Set(ticket.archived_at),
        created_at: Set(ticket.created_at),
        updated_at: Set(ticket.updated_at),
    }
}

#[async_trait]
impl TicketStore for SupportTicketRepository {
    async fn find_by_rma_number(
        &self,
        rma_number: &str,
    ) -> AppResult<Option<support_ticket::Model>> {
        Self::find_by_rma_number(self, rma_number).await
    }

    async fn rma_number_exists(&self, rma_number: &str) -> AppResult<bool> {
        self.exists(rma_number).await
    }

    async fn insert(&self, ticket: support_ticket::Model) -> AppResult<support_ticket::Model> {
        self.create(new_ticket_active_model(ticket)).await
    }

    async fn apply_changes(
        &self,
        rma_number: &str,
        changes: TicketChanges,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> AppResult<support_ticket::Model> {
        Self::apply_changes(self, rma_number, changes, expected_updated_at).await
    }

    async fn archive_batch(
        &self,
        cutoff: DateTime<Utc>,
        archived_at: DateTime<Utc>,
        batch_size: u64,
    ) -> AppResult<u64> {
        Self::archive_batch(self, cutoff, archived_at, batch_size).await
    }

    async fn list_active(
        &self,
        status: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>> {
        Self::list_active(self, status, limit, offset).await
    }

    async fn list_archived(
        &self,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<support_ticket::Model>> {
        Self::list_archived(self, limit, offset).await
    }

    async fn count_active_by_status(&self, status: &str) -> AppResult<u64> {
        Self::count_active_by_status(self, status).await
    }

    async fn count_archived(&self) -> AppResult<u64> {
        Self::count_archived(self).await
    }

    async fn count_all(&self) -> AppResult<u64> {
        Self::count_all(self).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryTicketStore;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{AppError, AppResult, DateTime, TicketChanges, TicketStore, Utc, support_ticket};
    use async_trait::async_trait;
    use rmadesk_db::entities::support_ticket::TicketStatus;
    use tokio::sync::RwLock;

    /// Map-backed [`TicketStore`] with the same semantics as the database.
    #[derive(Clone, Default)]
    pub struct InMemoryTicketStore {
        tickets: Arc<RwLock<BTreeMap<String, support_ticket::Model>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl InMemoryTicketStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent write fail with a database error.
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Overwrite `updated_at` directly, bypassing the services.
        pub async fn set_updated_at(&self, rma_number: &str, updated_at: DateTime<Utc>) {
            if let Some(ticket) = self.tickets.write().await.get_mut(rma_number) {
                ticket.updated_at = updated_at.into();
            }
        }

        /// Current stored row.
        pub async fn snapshot(&self, rma_number: &str) -> Option<support_ticket::Model> {
            self.tickets.read().await.get(rma_number).cloned()
        }

        fn check_writable(&self) -> AppResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Database("write rejected".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TicketStore for InMemoryTicketStore {
        async fn find_by_rma_number(
            &self,
            rma_number: &str,
        ) -> AppResult<Option<support_ticket::Model>> {
            Ok(self.snapshot(rma_number).await)
        }

        async fn rma_number_exists(&self, rma_number: &str) -> AppResult<bool> {
            Ok(self.tickets.read().await.contains_key(rma_number))
        }

        async fn insert(&self, ticket: support_ticket::Model) -> AppResult<support_ticket::Model> {
            self.check_writable()?;
            let mut tickets = self.tickets.write().await;
            if tickets.contains_key(&ticket.rma_number) {
                return Err(AppError::Conflict(format!(
                    "RMA number already taken: {}",
                    ticket.rma_number
                )));
            }
            tickets.insert(ticket.rma_number.clone(), ticket.clone());
            Ok(ticket)
        }

        async fn apply_changes(
            &self,
            rma_number: &str,
            changes: TicketChanges,
            expected_updated_at: Option<DateTime<Utc>>,
        ) -> AppResult<support_ticket::Model> {
            self.check_writable()?;
            let mut tickets = self.tickets.write().await;
            let ticket = tickets.get_mut(rma_number);
            let Some(ticket) = ticket else {
                return Err(if expected_updated_at.is_some() {
                    AppError::Conflict(format!("Ticket {rma_number} was modified by someone else"))
                } else {
                    AppError::TicketNotFound(rma_number.to_string())
                });
            };

            if let Some(expected) = expected_updated_at {
                if ticket.updated_at.with_timezone(&Utc) != expected {
                    return Err(AppError::Conflict(format!(
                        "Ticket {rma_number} was modified by someone else"
                    )));
                }
            }

            changes.apply_to(ticket);
            Ok(ticket.clone())
        }

        async fn archive_batch(
            &self,
            cutoff: DateTime<Utc>,
            archived_at: DateTime<Utc>,
            batch_size: u64,
        ) -> AppResult<u64> {
            self.check_writable()?;
            let mut tickets = self.tickets.write().await;

            let mut eligible: Vec<_> = tickets
                .values()
                .filter(|t| {
                    t.status == TicketStatus::Shipped.as_str()
                        && !t.is_archived
                        && t.updated_at.with_timezone(&Utc) < cutoff
                })
                .map(|t| (t.updated_at, t.rma_number.clone()))
                .collect();
            eligible.sort();
            eligible.truncate(usize::try_from(batch_size).unwrap_or(usize::MAX));

            for (_, rma_number) in &eligible {
                if let Some(ticket) = tickets.get_mut(rma_number) {
                    ticket.is_archived = true;
                    ticket.archived_at = Some(archived_at.into());
                }
            }

            Ok(eligible.len() as u64)
        }

        async fn list_active(
            &self,
            status: Option<&str>,
            limit: u64,
            offset: u64,
        ) -> AppResult<Vec<support_ticket::Model>> {
            let tickets = self.tickets.read().await;
            let mut active: Vec<_> = tickets
                .values()
                .filter(|t| !t.is_archived && status.is_none_or(|s| t.status == s))
                .cloned()
                .collect();
            active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(page(active, limit, offset))
        }

        async fn list_archived(
            &self,
            limit: u64,
            offset: u64,
        ) -> AppResult<Vec<support_ticket::Model>> {
            let tickets = self.tickets.read().await;
            let mut archived: Vec<_> = tickets.values().filter(|t| t.is_archived).cloned().collect();
            archived.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
            Ok(page(archived, limit, offset))
        }

        async fn count_active_by_status(&self, status: &str) -> AppResult<u64> {
            let tickets = self.tickets.read().await;
            Ok(tickets
                .values()
                .filter(|t| !t.is_archived && t.status == status)
                .count() as u64)
        }

        async fn count_archived(&self) -> AppResult<u64> {
            let tickets = self.tickets.read().await;
            Ok(tickets.values().filter(|t| t.is_archived).count() as u64)
        }

        async fn count_all(&self) -> AppResult<u64> {
            Ok(self.tickets.read().await.len() as u64)
        }
    }

    fn page<T>(items: Vec<T>, limit: u64, offset: u64) -> Vec<T> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;
    use std::sync::Arc;

    fn ticket(rma_number: &str, status: &str) -> support_ticket::Model {
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
            troubleshooting_steps: json!([]),
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
    async fn test_repository_insert_through_trait() {
        let model = ticket("RMA-2025-000123", "pending");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[model.clone()]])
                .into_connection(),
        );

        let store: Arc<dyn TicketStore> = Arc::new(SupportTicketRepository::new(db));
        let inserted = store.insert(model).await.unwrap();
        assert_eq!(inserted.rma_number, "RMA-2025-000123");
    }

    #[tokio::test]
    async fn test_memory_apply_changes_conflict() {
        let store = InMemoryTicketStore::new();
        let model = store.insert(ticket("RMA-2025-000001", "pending")).await.unwrap();
        let stale = model.updated_at.with_timezone(&Utc) - Duration::seconds(1);

        let result = store
            .apply_changes(
                "RMA-2025-000001",
                TicketChanges::new(Utc::now().into()),
                Some(stale),
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_memory_insert_duplicate_conflicts() {
        let store = InMemoryTicketStore::new();
        store.insert(ticket("RMA-2025-000001", "pending")).await.unwrap();

        let result = store.insert(ticket("RMA-2025-000001", "workshop")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(
            store.snapshot("RMA-2025-000001").await.unwrap().status,
            "pending"
        );
    }

    #[tokio::test]
    async fn test_memory_out_of_order_writers_keep_updated_at_increasing() {
        let store = InMemoryTicketStore::new();
        let model = store.insert(ticket("RMA-2025-000001", "pending")).await.unwrap();

        // Both writers computed their timestamp from the same read, the
        // slower one with the earlier clock reading.
        let slow = TicketChanges::new(model.updated_at + Duration::milliseconds(1));
        let fast = TicketChanges::new(model.updated_at + Duration::milliseconds(5));

        let first = store
            .apply_changes("RMA-2025-000001", fast, None)
            .await
            .unwrap();
        let second = store
            .apply_changes("RMA-2025-000001", slow, None)
            .await
            .unwrap();

        assert!(first.updated_at > model.updated_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_memory_archive_batch_oldest_first() {
        let store = InMemoryTicketStore::new();
        let now = Utc::now();
        for (serial, age) in [(1, 40), (2, 90), (3, 60)] {
            let rma = format!("RMA-2025-{serial:06}");
            store.insert(ticket(&rma, "shipped")).await.unwrap();
            store.set_updated_at(&rma, now - Duration::days(age)).await;
        }

        let archived = store
            .archive_batch(now - Duration::days(30), now, 2)
            .await
            .unwrap();
        assert_eq!(archived, 2);
        assert!(store.snapshot("RMA-2025-000002").await.unwrap().is_archived);
        assert!(store.snapshot("RMA-2025-000003").await.unwrap().is_archived);
        assert!(!store.snapshot("RMA-2025-000001").await.unwrap().is_archived);
    }

    #[tokio::test]
    async fn test_memory_write_failure() {
        let store = InMemoryTicketStore::new();
        store.fail_writes(true);
        let result = store.insert(ticket("RMA-2025-000001", "pending")).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
