//! Archival sweep for shipped tickets.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rmadesk_common::{AppResult, ArchivalConfig};
use tracing::{debug, info};

use super::activity::{ActivityEntry, ActivityLogger, record_quietly};
use super::ticket_store::TicketStore;

/// Archives shipped tickets that have been idle longer than the retention window.
#[derive(Clone)]
pub struct ArchivalService {
    store: Arc<dyn TicketStore>,
    activity: Arc<dyn ActivityLogger>,
    retention: Duration,
    batch_size: u64,
}

impl ArchivalService {
    /// Create an archival service from configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        activity: Arc<dyn ActivityLogger>,
        config: &ArchivalConfig,
    ) -> Self {
        Self::with_settings(
            store,
            activity,
            config.retention(),
            u64::from(config.batch_size),
        )
    }

    /// Create an archival service with explicit retention and batch size.
    #[must_use]
    pub fn with_settings(
        store: Arc<dyn TicketStore>,
        activity: Arc<dyn ActivityLogger>,
        retention: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            store,
            activity,
            retention,
            batch_size: batch_size.max(1),
        }
    }

    /// Retention window.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Archive every eligible ticket and return how many were archived.
    pub async fn run_archival_sweep(&self) -> AppResult<u64> {
        self.run_archival_sweep_at(Utc::now()).await
    }

    /// Run the sweep as if the current time were `now`.
    ///
    /// Batches repeat until one archives fewer rows than the batch size.
    /// Batches that completed before a failure stay archived.
    pub async fn run_archival_sweep_at(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let cutoff = now - self.retention;
        let mut total = 0u64;

        loop {
            let archived = self
                .store
                .archive_batch(cutoff, now, self.batch_size)
                .await?;
            total += archived;
            debug!(archived, total, batch_size = self.batch_size, "Archival batch done");

            if archived < self.batch_size {
                break;
            }
        }

        if total > 0 {
            info!(count = total, cutoff = %cutoff, "Archived shipped tickets");
            record_quietly(
                self.activity.as_ref(),
                ActivityEntry::tickets_archived(total, cutoff),
            )
            .await;
        } else {
            debug!(cutoff = %cutoff, "No tickets eligible for archival");
        }

        Ok(total)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::activity::{NoOpActivityLogger, RecordingActivityLogger};
    use crate::services::ticket::{ChangeStatusInput, CreateTicketInput, TicketService, UpdateTicketInput};
    use crate::services::ticket_store::InMemoryTicketStore;
    use rmadesk_common::AppError;
    use rmadesk_db::entities::activity_log::ActivityAction;
    use rmadesk_db::entities::support_ticket;
    use rmadesk_db::repositories::SupportTicketRepository;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;

    struct Harness {
        tickets: TicketService,
        archival: ArchivalService,
        store: InMemoryTicketStore,
        activity: RecordingActivityLogger,
    }

    fn harness(batch_size: u64) -> Harness {
        let store = InMemoryTicketStore::new();
        let activity = RecordingActivityLogger::new();
        let tickets = TicketService::new(Arc::new(store.clone()), Arc::new(activity.clone()));
        let archival = ArchivalService::with_settings(
            Arc::new(store.clone()),
            Arc::new(activity.clone()),
            Duration::days(30),
            batch_size,
        );
        Harness {
            tickets,
            archival,
            store,
            activity,
        }
    }

    /// Seed a ticket with a fixed RMA number directly into the store.
    async fn seed(store: &InMemoryTicketStore, rma_number: &str, status: &str, age_days: i64) {
        let now = Utc::now();
        store
            .insert(support_ticket::Model {
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
            })
            .await
            .unwrap();
        store
            .set_updated_at(rma_number, now - Duration::days(age_days))
            .await;
    }

    fn status(value: &str) -> ChangeStatusInput {
        ChangeStatusInput {
            status: value.to_string(),
            status_details: None,
            tracking_number: None,
            expected_updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let h = harness(500);
        for serial in 1..=3 {
            seed(&h.store, &format!("RMA-2025-{serial:06}"), "shipped", 31 + serial).await;
        }

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 3);
        let archived_at = h.store.snapshot("RMA-2025-000001").await.unwrap().archived_at;

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 0);
        let after = h.store.snapshot("RMA-2025-000001").await.unwrap();
        assert!(after.is_archived);
        assert_eq!(after.archived_at, archived_at);
    }

    #[tokio::test]
    async fn test_sweep_status_gate() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000001", "pending", 400).await;
        seed(&h.store, "RMA-2025-000002", "workshop", 400).await;
        seed(&h.store, "RMA-2025-000003", "waiting_for_parts", 400).await;

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 0);
        for rma in ["RMA-2025-000001", "RMA-2025-000002", "RMA-2025-000003"] {
            assert!(!h.store.snapshot(rma).await.unwrap().is_archived);
        }
        assert!(h.activity.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_respects_retention_window() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000001", "shipped", 29).await;
        seed(&h.store, "RMA-2025-000002", "shipped", 31).await;

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 1);
        assert!(!h.store.snapshot("RMA-2025-000001").await.unwrap().is_archived);
        assert!(h.store.snapshot("RMA-2025-000002").await.unwrap().is_archived);
    }

    #[tokio::test]
    async fn test_sweep_does_not_touch_updated_at() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000001", "shipped", 45).await;
        let before = h.store.snapshot("RMA-2025-000001").await.unwrap();

        h.archival.run_archival_sweep().await.unwrap();
        let after = h.store.snapshot("RMA-2025-000001").await.unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert!(after.archived_at.is_some());
    }

    #[tokio::test]
    async fn test_sweep_loops_over_batches() {
        let h = harness(2);
        for serial in 1..=5 {
            seed(&h.store, &format!("RMA-2025-{serial:06}"), "shipped", 60).await;
        }

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 5);
        assert_eq!(h.store.count_archived().await.unwrap(), 5);

        let archived = h.activity.entries_for(ActivityAction::TicketsArchived).await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].details["count"], 5);
    }

    #[tokio::test]
    async fn test_sweep_exact_multiple_of_batch_size() {
        let h = harness(2);
        for serial in 1..=4 {
            seed(&h.store, &format!("RMA-2025-{serial:06}"), "shipped", 60).await;
        }
        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_sweep_failure_propagates() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000001", "shipped", 60).await;
        h.store.fail_writes(true);

        let result = h.archival.run_archival_sweep().await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(h.activity.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_archival_flag_is_one_way() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000001", "shipped", 60).await;
        h.archival.run_archival_sweep().await.unwrap();

        h.tickets
            .change_status("RMA-2025-000001", status("workshop"), "Anna")
            .await
            .unwrap();
        h.tickets
            .update_fields(
                "RMA-2025-000001",
                UpdateTicketInput {
                    repair_notes: Some(Some("Reopened".to_string())),
                    ..Default::default()
                },
                "Anna",
            )
            .await
            .unwrap();
        h.archival.run_archival_sweep().await.unwrap();

        let ticket = h.store.snapshot("RMA-2025-000001").await.unwrap();
        assert!(ticket.is_archived);
        assert!(ticket.archived_at.is_some());
        assert_eq!(ticket.status, "workshop");
    }

    #[tokio::test]
    async fn test_rma_number_and_timestamps_across_updates() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000123", "pending", 0).await;

        let mut previous = h.store.snapshot("RMA-2025-000123").await.unwrap().updated_at;
        for step in ["workshop", "workshop", "shipped", "pending"] {
            let ticket = h
                .tickets
                .change_status("RMA-2025-000123", status(step), "Anna")
                .await
                .unwrap();
            assert_eq!(ticket.rma_number, "RMA-2025-000123");
            assert!(ticket.updated_at > previous);
            previous = ticket.updated_at;

            let ticket = h
                .tickets
                .update_fields(
                    "RMA-2025-000123",
                    UpdateTicketInput {
                        status_details: Some(Some(format!("now {step}"))),
                        ..Default::default()
                    },
                    "Anna",
                )
                .await
                .unwrap();
            assert_eq!(ticket.rma_number, "RMA-2025-000123");
            assert!(ticket.updated_at > previous);
            previous = ticket.updated_at;
        }

        let changes = h.activity.entries_for(ActivityAction::StatusChanged).await;
        let pairs: Vec<_> = changes
            .iter()
            .map(|e| {
                (
                    e.details["oldStatus"].as_str().unwrap().to_string(),
                    e.details["newStatus"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("pending".to_string(), "workshop".to_string()),
                ("workshop".to_string(), "shipped".to_string()),
                ("shipped".to_string(), "pending".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_end_to_end_workshop_ship_archive() {
        let h = harness(500);
        seed(&h.store, "RMA-2025-000123", "pending", 0).await;

        let ticket = h
            .tickets
            .change_status("RMA-2025-000123", status("workshop"), "Anna")
            .await
            .unwrap();
        assert_eq!(ticket.status, "workshop");
        let changes = h.activity.entries_for(ActivityAction::StatusChanged).await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].details["oldStatus"], "pending");
        assert_eq!(changes[0].details["newStatus"], "workshop");

        h.tickets
            .change_status("RMA-2025-000123", status("shipped"), "Anna")
            .await
            .unwrap();
        h.store
            .set_updated_at("RMA-2025-000123", Utc::now() - Duration::days(35))
            .await;

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 1);
        let ticket = h.tickets.get_ticket("RMA-2025-000123").await.unwrap();
        assert!(ticket.is_archived);
        assert!(ticket.archived_at.is_some());

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_pending_never_archived() {
        let h = harness(500);
        let ticket = h
            .tickets
            .create_ticket(CreateTicketInput {
                customer_name: "Erika Muster".to_string(),
                customer_email: "erika@example.com".to_string(),
                customer_phone: None,
                company: None,
                shipping_address: "Hauptstr. 1, 10115 Berlin".to_string(),
                display_model: "PX-2400".to_string(),
                serial_number: "SN123456".to_string(),
                defect_description: "No picture".to_string(),
                troubleshooting_steps: Vec::new(),
                shipping_method: "parcel".to_string(),
            })
            .await
            .unwrap();
        h.store
            .set_updated_at(&ticket.rma_number, Utc::now() - Duration::days(40))
            .await;

        assert_eq!(h.archival.run_archival_sweep().await.unwrap(), 0);
        let ticket = h.tickets.get_ticket(&ticket.rma_number).await.unwrap();
        assert!(!ticket.is_archived);
        assert!(ticket.archived_at.is_none());
    }

    #[tokio::test]
    async fn test_sweep_against_repository_batches() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 2,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                ])
                .into_connection(),
        );

        let service = ArchivalService::with_settings(
            Arc::new(SupportTicketRepository::new(db.clone())),
            Arc::new(NoOpActivityLogger),
            Duration::days(30),
            2,
        );
        assert_eq!(service.run_archival_sweep().await.unwrap(), 3);

        drop(service);
        let db = Arc::try_unwrap(db).ok().unwrap();
        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[test]
    fn test_from_config() {
        let config = ArchivalConfig::default();
        let service = ArchivalService::new(
            Arc::new(InMemoryTicketStore::new()),
            Arc::new(NoOpActivityLogger),
            &config,
        );
        assert_eq!(service.retention(), Duration::days(30));
    }
}
