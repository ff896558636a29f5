//! [`JobExecutor`] backed by the core archival service.

use async_trait::async_trait;
use rmadesk_core::ArchivalService;

use crate::scheduler::JobExecutor;

/// Runs scheduled jobs against the core services.
#[derive(Clone)]
pub struct ArchivalJobExecutor {
    archival: ArchivalService,
}

impl ArchivalJobExecutor {
    #[must_use]
    pub const fn new(archival: ArchivalService) -> Self {
        Self { archival }
    }
}

#[async_trait]
impl JobExecutor for ArchivalJobExecutor {
    async fn archive_shipped_tickets(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.archival.run_archival_sweep().await?)
    }
}
