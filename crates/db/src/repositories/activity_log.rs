//! Activity log repository.

use std::sync::Arc;

use crate::entities::{ActivityLog, activity_log};
use rmadesk_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

/// Activity log repository for database operations.
#[derive(Clone)]
pub struct ActivityLogRepository {
    db: Arc<DatabaseConnection>,
}

impl ActivityLogRepository {
    /// Create a new activity log repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append an entry.
    pub async fn create(&self, model: activity_log::ActiveModel) -> AppResult<activity_log::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List entries newest first, optionally for a single ticket.
    pub async fn list(
        &self,
        rma_number: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<activity_log::Model>> {
        let mut query = ActivityLog::find().order_by_desc(activity_log::Column::CreatedAt);

        if let Some(rma) = rma_number {
            query = query.filter(activity_log::Column::RmaNumber.eq(rma));
        }

        query
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
