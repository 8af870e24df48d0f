use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{RunStatus, TestReport};
use crate::error::Result;

/// Persistence collaborator for test runs. The engine only writes to it.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Register a new run in the `pending` state.
    async fn create(&self, run_id: Uuid, slug: &str) -> Result<()>;

    /// Move a run to `status`, optionally with a human-readable reason.
    async fn transition(
        &self,
        run_id: Uuid,
        status: RunStatus,
        message: Option<String>,
    ) -> Result<()>;

    /// Store the final report of a finished or skipped run.
    async fn finish(&self, report: TestReport) -> Result<()>;
}
