//! Active test registry: tracks in-flight and finished suites by test id so
//! callers can poll their status.

use async_trait::async_trait;
use chatprobe_core::types::TestReport;
use chatprobe_core::ProbeResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle state of a suite. Serializes as
/// `{"status": "running" | "completed" | "failed", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestState {
    #[serde(rename_all = "camelCase")]
    Running { started_at: DateTime<Utc> },
    Completed { report: Box<TestReport> },
    Failed { error: String },
}

impl TestState {
    pub fn running() -> Self {
        Self::Running {
            started_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Running { .. } => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Narrow read/write contract so the backing store (memory, Redis, a
/// database) can change without touching orchestration code.
#[async_trait]
pub trait TestRegistry: Send + Sync {
    async fn insert(&self, test_id: Uuid, state: TestState) -> ProbeResult<()>;

    /// Replace the state of an existing entry. Returns `false` when the
    /// entry is gone (for example after a stop request).
    async fn transition(&self, test_id: Uuid, state: TestState) -> ProbeResult<bool>;

    async fn get(&self, test_id: Uuid) -> ProbeResult<Option<TestState>>;

    async fn remove(&self, test_id: Uuid) -> ProbeResult<Option<TestState>>;

    async fn running(&self) -> ProbeResult<Vec<Uuid>>;
}

/// DashMap-backed registry; concurrent readers never block a suite writing
/// its own entry.
#[derive(Default)]
pub struct InMemoryTestRegistry {
    entries: DashMap<Uuid, TestState>,
}

impl InMemoryTestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TestRegistry for InMemoryTestRegistry {
    async fn insert(&self, test_id: Uuid, state: TestState) -> ProbeResult<()> {
        self.entries.insert(test_id, state);
        Ok(())
    }

    async fn transition(&self, test_id: Uuid, state: TestState) -> ProbeResult<bool> {
        match self.entries.get_mut(&test_id) {
            Some(mut entry) => {
                *entry = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, test_id: Uuid) -> ProbeResult<Option<TestState>> {
        Ok(self.entries.get(&test_id).map(|e| e.value().clone()))
    }

    async fn remove(&self, test_id: Uuid) -> ProbeResult<Option<TestState>> {
        Ok(self.entries.remove(&test_id).map(|(_, state)| state))
    }

    async fn running(&self) -> ProbeResult<Vec<Uuid>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.value().is_running())
            .map(|e| *e.key())
            .collect())
    }
}
