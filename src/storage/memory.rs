use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::{RunStatus, TestReport};
use crate::error::{CertifyError, Result};
use crate::storage::RunRecorder;

#[derive(Debug, Clone)]
struct RunRecord {
    report: TestReport,
    history: Vec<RunStatus>,
}

/// Keeps every run in memory, in creation order.
#[derive(Debug)]
pub struct MemoryRecorder {
    runs: Arc<RwLock<IndexMap<Uuid, RunRecord>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    pub async fn report(&self, run_id: Uuid) -> Option<TestReport> {
        self.runs.read().await.get(&run_id).map(|r| r.report.clone())
    }

    pub async fn reports(&self) -> Vec<TestReport> {
        self.runs
            .read()
            .await
            .values()
            .map(|r| r.report.clone())
            .collect()
    }

    /// Every status the run has been in, starting with `pending`.
    pub async fn history(&self, run_id: Uuid) -> Vec<RunStatus> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl RunRecorder for MemoryRecorder {
    async fn create(&self, run_id: Uuid, slug: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(
            run_id,
            RunRecord {
                report: TestReport::pending(run_id, slug),
                history: vec![RunStatus::Pending],
            },
        );
        Ok(())
    }

    async fn transition(
        &self,
        run_id: Uuid,
        status: RunStatus,
        message: Option<String>,
    ) -> Result<()> {
        let mut runs = self.runs.write().await;
        let record = runs
            .get_mut(&run_id)
            .ok_or_else(|| CertifyError::unknown_run(run_id))?;

        if status == RunStatus::Running {
            record.report.started_at = Some(Utc::now());
        }
        record.report.status = status;
        if message.is_some() {
            record.report.message = message;
        }
        record.history.push(status);
        Ok(())
    }

    async fn finish(&self, report: TestReport) -> Result<()> {
        let mut runs = self.runs.write().await;
        let record = runs
            .get_mut(&report.run_id)
            .ok_or_else(|| CertifyError::unknown_run(report.run_id))?;

        if record.history.last() != Some(&report.status) {
            record.history.push(report.status);
        }
        record.report = report;
        Ok(())
    }
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryRecorder {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Verdict;

    #[tokio::test]
    async fn test_records_lifecycle() {
        let recorder = MemoryRecorder::new();
        let run_id = Uuid::new_v4();
        recorder.create(run_id, "s4s").await.unwrap();
        recorder
            .transition(run_id, RunStatus::Running, None)
            .await
            .unwrap();

        let mut report = recorder.report(run_id).await.unwrap();
        assert!(report.started_at.is_some());
        report.status = RunStatus::Finished;
        report.verdict = Some(Verdict::Pass);
        recorder.finish(report).await.unwrap();

        assert_eq!(
            recorder.history(run_id).await,
            vec![RunStatus::Pending, RunStatus::Running, RunStatus::Finished]
        );
        assert_eq!(
            recorder.report(run_id).await.unwrap().verdict,
            Some(Verdict::Pass)
        );
    }

    #[tokio::test]
    async fn test_unknown_run_is_an_error() {
        let recorder = MemoryRecorder::new();
        let err = recorder
            .transition(Uuid::new_v4(), RunStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CertifyError::UnknownRun { .. }));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let recorder = MemoryRecorder::new();
        let clone = recorder.clone();
        clone.create(Uuid::new_v4(), "coverage").await.unwrap();
        assert_eq!(recorder.len().await, 1);
    }
}
