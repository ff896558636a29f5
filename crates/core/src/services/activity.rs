//! Audit trail for ticket activity.
//!
//! Services hand an [`ActivityEntry`] to an [`ActivityLogger`]. Recording is
//! fire-and-forget from the caller's point of view: see [`record_quietly`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rmadesk_common::{AppResult, IdGenerator};
use rmadesk_db::entities::activity_log::{self, ActivityAction};
use rmadesk_db::repositories::ActivityLogRepository;
use sea_orm::Set;
use serde_json::json;

/// Actor recorded for customer intake.
pub const CUSTOMER_ACTOR: &str = "customer";

/// Actor recorded for the archival sweep.
pub const SYSTEM_ACTOR: &str = "system";

/// A single audit entry before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub action: ActivityAction,
    pub rma_number: Option<String>,
    pub actor: String,
    pub details: serde_json::Value,
}

impl ActivityEntry {
    #[must_use]
    pub fn ticket_created(rma_number: &str, display_model: &str, serial_number: &str) -> Self {
        Self {
            action: ActivityAction::TicketCreated,
            rma_number: Some(rma_number.to_string()),
            actor: CUSTOMER_ACTOR.to_string(),
            details: json!({
                "rmaNumber": rma_number,
                "displayModel": display_model,
                "serialNumber": serial_number,
            }),
        }
    }

    #[must_use]
    pub fn status_changed(rma_number: &str, old_status: &str, new_status: &str, actor: &str) -> Self {
        Self {
            action: ActivityAction::StatusChanged,
            rma_number: Some(rma_number.to_string()),
            actor: actor.to_string(),
            details: json!({
                "rmaNumber": rma_number,
                "oldStatus": old_status,
                "newStatus": new_status,
                "actingUser": actor,
            }),
        }
    }

    #[must_use]
    pub fn ticket_updated(rma_number: &str, fields: &[&str], actor: &str) -> Self {
        Self {
            action: ActivityAction::TicketUpdated,
            rma_number: Some(rma_number.to_string()),
            actor: actor.to_string(),
            details: json!({
                "rmaNumber": rma_number,
                "fields": fields,
            }),
        }
    }

    #[must_use]
    pub fn tickets_archived(count: u64, cutoff: DateTime<Utc>) -> Self {
        Self {
            action: ActivityAction::TicketsArchived,
            rma_number: None,
            actor: SYSTEM_ACTOR.to_string(),
            details: json!({
                "count": count,
                "cutoff": cutoff.to_rfc3339(),
            }),
        }
    }
}

/// Sink for audit entries.
#[async_trait]
pub trait ActivityLogger: Send + Sync {
    async fn record(&self, entry: ActivityEntry) -> AppResult<()>;
}

/// Record an entry, logging instead of propagating a failure.
pub async fn record_quietly(logger: &dyn ActivityLogger, entry: ActivityEntry) {
    let action = entry.action;
    let rma_number = entry.rma_number.clone();
    if let Err(e) = logger.record(entry).await {
        tracing::warn!(
            error = %e,
            action = ?action,
            rma_number = ?rma_number,
            "Failed to record activity"
        );
    }
}

/// Persists entries into the `activity_log` table.
#[derive(Clone)]
pub struct DbActivityLogger {
    repo: ActivityLogRepository,
    id_gen: IdGenerator,
}

impl DbActivityLogger {
    #[must_use]
    pub const fn new(repo: ActivityLogRepository) -> Self {
        Self {
            repo,
            id_gen: IdGenerator::new(),
        }
    }
}

#[async_trait]
impl ActivityLogger for DbActivityLogger {
    async fn record(&self, entry: ActivityEntry) -> AppResult<()> {
        let model = activity_log::ActiveModel {
            id: Set(self.id_gen.generate()),
            action: Set(entry.action),
            rma_number: Set(entry.rma_number),
            actor: Set(entry.actor),
            details: Set(entry.details),
            created_at: Set(Utc::now().into()),
        };
        self.repo.create(model).await?;
        Ok(())
    }
}

/// Discards every entry.
#[derive(Clone, Default)]
pub struct NoOpActivityLogger;

#[async_trait]
impl ActivityLogger for NoOpActivityLogger {
    async fn record(&self, _entry: ActivityEntry) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingActivityLogger;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::Arc;

    use super::{ActivityEntry, ActivityLogger, AppResult};
    use async_trait::async_trait;
    use rmadesk_db::entities::activity_log::ActivityAction;
    use tokio::sync::Mutex;

    /// Keeps entries in memory so tests can assert on them.
    #[derive(Clone, Default)]
    pub struct RecordingActivityLogger {
        entries: Arc<Mutex<Vec<ActivityEntry>>>,
    }

    impl RecordingActivityLogger {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn entries(&self) -> Vec<ActivityEntry> {
            self.entries.lock().await.clone()
        }

        pub async fn entries_for(&self, action: ActivityAction) -> Vec<ActivityEntry> {
            self.entries
                .lock()
                .await
                .iter()
                .filter(|e| e.action == action)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ActivityLogger for RecordingActivityLogger {
        async fn record(&self, entry: ActivityEntry) -> AppResult<()> {
            self.entries.lock().await.push(entry);
            Ok(())
        }
    }
}

/// Read side of the audit trail for the admin activity view.
#[derive(Clone)]
pub struct ActivityLogService {
    repo: ActivityLogRepository,
}

impl ActivityLogService {
    /// Maximum page size.
    pub const MAX_LIMIT: u64 = 100;

    #[must_use]
    pub const fn new(repo: ActivityLogRepository) -> Self {
        Self { repo }
    }

    /// List entries newest first, optionally for one ticket.
    pub async fn list(
        &self,
        rma_number: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<activity_log::Model>> {
        self.repo
            .list(rma_number, limit.min(Self::MAX_LIMIT), offset)
            .await
    }
}
