use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::lifecycle::{StatusCell, TestLifecycle};
use super::registry::TestRegistry;
use super::scheduler::{ExecutionPlan, StageMode, schedule};
use crate::core::{RunStatus, TestReport};
use crate::error::{CertifyError, Result};
use crate::probes::{ProbeContext, instantiate};
use crate::storage::RunRecorder;

/// One test of a suite, created before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    pub run_id: Uuid,
    pub slug: String,
    pub group_key: Option<u32>,
}

/// The opaque "run this test" operation handed to a dispatcher.
pub struct TestExecutor {
    registry: Arc<TestRegistry>,
    ctx: ProbeContext,
    recorder: Arc<dyn RunRecorder>,
    slugs: HashMap<Uuid, String>,
    statuses: HashMap<Uuid, StatusCell>,
}

impl TestExecutor {
    pub async fn run_test(&self, run_id: Uuid) -> Result<TestReport> {
        let slug = self
            .slugs
            .get(&run_id)
            .ok_or_else(|| CertifyError::unknown_run(run_id))?;
        let mut lifecycle = TestLifecycle::new(run_id, slug.as_str(), self.recorder.clone());
        if let Some(cell) = self.statuses.get(&run_id) {
            lifecycle = lifecycle.tracked(cell.clone());
        }

        let descriptor = match self.registry.resolve(slug) {
            Ok(descriptor) => descriptor,
            Err(e) => return lifecycle.abort(e.to_string()).await,
        };
        let test = instantiate(&descriptor, &self.ctx).await;
        lifecycle.execute(test).await
    }

    /// Fail a run whose execution broke down, moving it through the
    /// transitions it had not reached yet.
    pub async fn record_failure(&self, run_id: Uuid, message: impl Into<String>) {
        let (Some(slug), Some(cell)) = (self.slugs.get(&run_id), self.statuses.get(&run_id)) else {
            tracing::warn!(%run_id, "cannot record failure of an unknown run");
            return;
        };
        let lifecycle =
            TestLifecycle::resume(run_id, slug.as_str(), self.recorder.clone(), cell.clone()).await;
        if lifecycle.status() == RunStatus::Skipped {
            tracing::warn!(%run_id, "run was already skipped, failure not recorded");
            return;
        }
        if let Err(e) = lifecycle.abort(message).await {
            tracing::warn!(%run_id, error = %e, "could not record failed run");
        }
    }
}

/// All runs of one certification session.
pub struct SuiteRun {
    runs: Vec<PlannedRun>,
    executor: Arc<TestExecutor>,
}

impl SuiteRun {
    /// Create a pending run for every configured slug, or for every
    /// registered test supporting a configured use case when none are
    /// listed.
    pub async fn new(
        registry: Arc<TestRegistry>,
        ctx: ProbeContext,
        recorder: Arc<dyn RunRecorder>,
    ) -> Result<Self> {
        let slugs: Vec<String> = if ctx.config.tests.is_empty() {
            registry
                .iter()
                .filter(|d| !d.use_cases.is_disjoint(&ctx.config.use_cases))
                .map(|d| d.slug.clone())
                .collect()
        } else {
            ctx.config.tests.clone()
        };

        let mut runs = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let run_id = Uuid::new_v4();
            recorder.create(run_id, &slug).await?;
            let group_key = registry.resolve(&slug).ok().and_then(|d| d.group_key);
            runs.push(PlannedRun {
                run_id,
                slug,
                group_key,
            });
        }
        tracing::info!(tests = runs.len(), "suite created");

        let executor = TestExecutor {
            registry,
            ctx,
            recorder,
            slugs: runs
                .iter()
                .map(|r| (r.run_id, r.slug.clone()))
                .collect(),
            statuses: runs
                .iter()
                .map(|r| (r.run_id, StatusCell::new()))
                .collect(),
        };
        Ok(Self {
            runs,
            executor: Arc::new(executor),
        })
    }

    pub fn runs(&self) -> &[PlannedRun] {
        &self.runs
    }

    pub fn plan(&self) -> ExecutionPlan<Uuid> {
        schedule(self.runs.iter().map(|r| (r.run_id, r.group_key)))
    }

    pub fn executor(&self) -> Arc<TestExecutor> {
        self.executor.clone()
    }

    pub async fn dispatch(&self, dispatcher: &dyn Dispatcher) {
        dispatcher.dispatch(self.plan(), self.executor()).await;
    }
}

/// Executes a plan. Results flow back through the recorder only.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, plan: ExecutionPlan<Uuid>, executor: Arc<TestExecutor>);
}

/// Runs concurrent stages as tokio tasks and serial stages one task at a
/// time, waiting for each stage before starting the next one.
#[derive(Debug, Default, Clone)]
pub struct StagedDispatcher;

impl StagedDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Spawn `run_ids` together and wait for all of them. Errors and panics
    /// are recorded as failed runs.
    async fn run_together(executor: &Arc<TestExecutor>, run_ids: Vec<Uuid>) {
        let mut tasks = JoinSet::new();
        let mut task_runs = HashMap::new();
        for run_id in run_ids {
            let executor = executor.clone();
            let handle = tasks.spawn(async move { executor.run_test(run_id).await });
            task_runs.insert(handle.id(), run_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(report))) => {
                    tracing::debug!(slug = %report.slug, status = %report.status, "run complete");
                }
                Ok((task_id, Err(e))) => {
                    if let Some(run_id) = task_runs.get(&task_id) {
                        executor.record_failure(*run_id, e.to_string()).await;
                    }
                }
                Err(join_error) => {
                    tracing::warn!(error = %join_error, "test task panicked");
                    if let Some(run_id) = task_runs.get(&join_error.id()) {
                        executor
                            .record_failure(*run_id, format!("Test crashed: {join_error}"))
                            .await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Dispatcher for StagedDispatcher {
    async fn dispatch(&self, plan: ExecutionPlan<Uuid>, executor: Arc<TestExecutor>) {
        for (stage, (mode, run_ids)) in plan.into_staged().into_iter().enumerate() {
            tracing::info!(stage, tests = run_ids.len(), ?mode, "starting stage");
            match mode {
                StageMode::Concurrent => Self::run_together(&executor, run_ids).await,
                StageMode::Serial => {
                    for run_id in run_ids {
                        Self::run_together(&executor, vec![run_id]).await;
                    }
                }
            }
        }
    }
}
