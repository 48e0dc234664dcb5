use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend-assigned run identifier. The backend currently sends integers, but
/// the console never does arithmetic on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RunId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = serde_json::Value::deserialize(deserializer)?;
        match val {
            serde_json::Value::String(s) if !s.trim().is_empty() => Ok(RunId(s)),
            serde_json::Value::Number(n) => Ok(RunId(n.to_string())),
            _ => Err(serde::de::Error::custom(
                "expected non-empty string or number for task id",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskRunStatus {
    Dispatched,
    Running,
    Completed,
    Failed,
}

impl TaskRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskRunStatus::Dispatched => "dispatched",
            TaskRunStatus::Running => "running",
            TaskRunStatus::Completed => "completed",
            TaskRunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskRunStatus::Completed | TaskRunStatus::Failed)
    }
}

impl fmt::Display for TaskRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipeline stages the orchestrator runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "code")]
    CodeOnly,
    #[serde(rename = "test")]
    TestOnly,
}

impl RunMode {
    pub const ALL: [RunMode; 3] = [RunMode::Full, RunMode::CodeOnly, RunMode::TestOnly];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::CodeOnly => "code",
            RunMode::TestOnly => "test",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Full => "Full Pipeline",
            RunMode::CodeOnly => "Plan + Code",
            RunMode::TestOnly => "Plan + Test",
        }
    }

    pub fn next(self) -> Self {
        match self {
            RunMode::Full => RunMode::CodeOnly,
            RunMode::CodeOnly => RunMode::TestOnly,
            RunMode::TestOnly => RunMode::Full,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "full" => Ok(RunMode::Full),
            "code" | "code-only" | "code_only" => Ok(RunMode::CodeOnly),
            "test" | "test-only" | "test_only" => Ok(RunMode::TestOnly),
            other => Err(format!("Unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub id: RunId,
    pub status: TaskRunStatus,
    pub description: String,
    pub model: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
