use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::transport::Exchange;

/// FHIR releases a server under test may implement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FhirVersion {
    #[serde(rename = "DSTU2")]
    Dstu2,
    #[serde(rename = "STU3")]
    Stu3,
}

impl FhirVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            FhirVersion::Dstu2 => "DSTU2",
            FhirVersion::Stu3 => "STU3",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment scenarios a vendor can certify against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UseCase {
    #[serde(rename = "EHR")]
    Ehr,
    Financial,
    Security,
}

impl UseCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Ehr => "EHR",
            UseCase::Financial => "Financial",
            UseCase::Security => "Security",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ehr" => Some(UseCase::Ehr),
            "financial" => Some(UseCase::Financial),
            "security" => Some(UseCase::Security),
            _ => None,
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single scenario.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
    Skip,
}

/// Overall result of a finished test or suite. Ordered from best to worst.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "passed",
            Verdict::Warn => "warning",
            Verdict::Fail => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
    Skipped,
}

impl RunStatus {
    /// `pending -> running -> finished` or `pending -> skipped`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Skipped)
                | (RunStatus::Running, RunStatus::Finished)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Skipped)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Skipped => "skipped",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioResult {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub outcome: Outcome,
    pub sequence: usize,
}

/// Ordered scenario results of one test run, keyed by title.
#[derive(Debug, Clone, Default)]
pub struct ScenarioLog {
    entries: Vec<ScenarioResult>,
}

impl ScenarioLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scenario. Recording an existing title replaces that entry
    /// and keeps its original position.
    pub fn record(&mut self, title: impl Into<String>, message: Option<String>, outcome: Outcome) {
        let title = title.into();
        tracing::debug!(scenario = %title, ?outcome, "scenario recorded");

        if let Some(existing) = self.entries.iter_mut().find(|e| e.title == title) {
            existing.message = message;
            existing.outcome = outcome;
            return;
        }

        let sequence = self.entries.len();
        self.entries.push(ScenarioResult {
            title,
            message,
            outcome,
            sequence,
        });
    }

    pub fn pass(&mut self, title: impl Into<String>) {
        self.record(title, None, Outcome::Pass);
    }

    pub fn fail(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.record(title, Some(message.into()), Outcome::Fail);
    }

    pub fn warn(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.record(title, Some(message.into()), Outcome::Warn);
    }

    pub fn skip(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.record(title, Some(message.into()), Outcome::Skip);
    }

    pub fn get(&self, title: &str) -> Option<&ScenarioResult> {
        self.entries.iter().find(|e| e.title == title)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.entries.iter().map(|e| e.outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.entries.iter()
    }

    pub fn into_results(self) -> Vec<ScenarioResult> {
        self.entries
    }
}

/// Everything handed to the persistence collaborator once a test is done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub run_id: Uuid,
    pub slug: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub scenarios: Vec<ScenarioResult>,
    pub exchanges: Vec<Exchange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TestReport {
    /// Report for a run that has been created but not started.
    pub fn pending(run_id: Uuid, slug: impl Into<String>) -> Self {
        Self {
            run_id,
            slug: slug.into(),
            status: RunStatus::Pending,
            verdict: None,
            message: None,
            scenarios: Vec::new(),
            exchanges: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}
