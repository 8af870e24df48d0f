use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::aggregate::test_verdict;
use crate::core::{RunStatus, ScenarioLog, TestReport, Verdict};
use crate::error::{CertifyError, Result};
use crate::probes::TestCase;
use crate::storage::RunRecorder;

/// Last status a lifecycle reported for a run. It outlives the lifecycle, so
/// a run whose task crashed can be resumed from where it stopped.
#[derive(Debug, Clone)]
pub struct StatusCell(Arc<Mutex<RunStatus>>);

impl StatusCell {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(RunStatus::Pending)))
    }

    pub async fn get(&self) -> RunStatus {
        *self.0.lock().await
    }

    async fn set(&self, status: RunStatus) {
        *self.0.lock().await = status;
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one test run through `pending -> skipped` or
/// `pending -> running -> finished`, reporting each step to the recorder.
pub struct TestLifecycle {
    run_id: Uuid,
    slug: String,
    status: RunStatus,
    cell: StatusCell,
    recorder: Arc<dyn RunRecorder>,
}

impl TestLifecycle {
    pub fn new(run_id: Uuid, slug: impl Into<String>, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            run_id,
            slug: slug.into(),
            status: RunStatus::Pending,
            cell: StatusCell::new(),
            recorder,
        }
    }

    /// Continue a run from the last status published to `cell`.
    pub async fn resume(
        run_id: Uuid,
        slug: impl Into<String>,
        recorder: Arc<dyn RunRecorder>,
        cell: StatusCell,
    ) -> Self {
        Self {
            run_id,
            slug: slug.into(),
            status: cell.get().await,
            cell,
            recorder,
        }
    }

    /// Publish every transition to `cell` as well as to the recorder.
    pub fn tracked(mut self, cell: StatusCell) -> Self {
        self.cell = cell;
        self
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    async fn transition(&mut self, next: RunStatus, message: Option<String>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CertifyError::InvalidTransition {
                run_id: self.run_id,
                from: self.status,
                to: next,
            });
        }
        self.recorder
            .transition(self.run_id, next, message)
            .await?;
        self.status = next;
        self.cell.set(next).await;
        Ok(())
    }

    fn report(&self, message: Option<String>) -> TestReport {
        TestReport {
            status: self.status,
            message,
            finished_at: Some(Utc::now()),
            ..TestReport::pending(self.run_id, self.slug.clone())
        }
    }

    /// Skip check, scenarios and verdict for an instantiated test.
    pub async fn execute(mut self, mut test: Box<dyn TestCase>) -> Result<TestReport> {
        if let Some(reason) = test.should_skip().await {
            tracing::info!(slug = %self.slug, run_id = %self.run_id, %reason, "test skipped");
            self.transition(RunStatus::Skipped, Some(reason.clone()))
                .await?;

            let mut report = self.report(Some(reason));
            report.exchanges = test.base().requester().transcript().await;
            self.recorder.finish(report.clone()).await?;
            return Ok(report);
        }

        self.transition(RunStatus::Running, None).await?;
        let started_at = Utc::now();
        tracing::info!(slug = %self.slug, run_id = %self.run_id, "test started");

        let mut log = ScenarioLog::new();
        test.run(&mut log).await;
        let verdict = test_verdict(log.outcomes());

        self.transition(RunStatus::Finished, None).await?;
        tracing::info!(
            slug = %self.slug,
            run_id = %self.run_id,
            scenarios = log.len(),
            %verdict,
            "test finished"
        );

        let mut report = self.report(None);
        report.verdict = Some(verdict);
        report.started_at = Some(started_at);
        report.scenarios = log.into_results();
        report.exchanges = test.base().requester().transcript().await;
        self.recorder.finish(report.clone()).await?;
        Ok(report)
    }

    /// Finish the run as failed, e.g. when the test could not be resolved or
    /// its task crashed. A run that is already finished only gets its failed
    /// report stored.
    pub async fn abort(mut self, message: impl Into<String>) -> Result<TestReport> {
        let message = message.into();
        tracing::warn!(slug = %self.slug, run_id = %self.run_id, %message, "test aborted");

        if self.status == RunStatus::Pending {
            self.transition(RunStatus::Running, None).await?;
        }
        if self.status != RunStatus::Finished {
            self.transition(RunStatus::Finished, Some(message.clone()))
                .await?;
        }

        let mut report = self.report(Some(message));
        report.verdict = Some(Verdict::Fail);
        self.recorder.finish(report.clone()).await?;
        Ok(report)
    }
}
