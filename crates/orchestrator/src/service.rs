//! Suite service: starts suites in the background and tracks them in the
//! registry until they complete or fail.

use std::sync::Arc;
use std::time::Duration;

use chatprobe_core::types::TestSuiteConfig;
use chatprobe_core::ProbeResult;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::registry::{TestRegistry, TestState};
use crate::suite::{Collaborators, SuiteOrchestrator};

/// Finished suites stay pollable this long unless configured otherwise.
pub const DEFAULT_FINISHED_RETENTION: Duration = Duration::from_secs(3600);

pub struct SuiteService {
    collaborators: Collaborators,
    registry: Arc<dyn TestRegistry>,
    cancellations: Arc<DashMap<Uuid, CancellationToken>>,
    retention: Duration,
}

impl SuiteService {
    pub fn new(collaborators: Collaborators, registry: Arc<dyn TestRegistry>) -> Self {
        Self {
            collaborators,
            registry,
            cancellations: Arc::new(DashMap::new()),
            retention: DEFAULT_FINISHED_RETENTION,
        }
    }

    /// Evict completed and failed entries this long after they finish.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn registry(&self) -> Arc<dyn TestRegistry> {
        self.registry.clone()
    }

    /// Validate, register as running, and spawn the suite. Returns the test
    /// id without waiting for any conversation.
    pub async fn start(&self, config: TestSuiteConfig) -> ProbeResult<Uuid> {
        config.validate()?;

        let test_id = Uuid::new_v4();
        self.registry.insert(test_id, TestState::running()).await?;

        let token = CancellationToken::new();
        self.cancellations.insert(test_id, token.clone());

        let orchestrator =
            SuiteOrchestrator::new(self.collaborators.clone()).with_cancellation(token);
        let suite = tokio::spawn(async move { orchestrator.run_suite(test_id, config).await });

        let registry = self.registry.clone();
        let cancellations = self.cancellations.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            let state = match suite.await {
                Ok(Ok(report)) => TestState::Completed {
                    report: Box::new(report),
                },
                Ok(Err(e)) => TestState::Failed {
                    error: e.to_string(),
                },
                Err(e) => {
                    error!(test_id = %test_id, error = %e, "Suite task panicked");
                    TestState::Failed {
                        error: format!("suite task failed: {e}"),
                    }
                }
            };
            cancellations.remove(&test_id);

            let label = state.label();
            match registry.transition(test_id, state).await {
                Ok(true) => info!(test_id = %test_id, status = label, "Suite state recorded"),
                Ok(false) => {
                    debug!(test_id = %test_id, "Suite no longer tracked, dropping result");
                    return;
                }
                Err(e) => {
                    error!(test_id = %test_id, error = %e, "Failed to record suite state");
                    return;
                }
            }

            tokio::time::sleep(retention).await;
            match registry.remove(test_id).await {
                Ok(Some(_)) => debug!(test_id = %test_id, "Finished suite evicted"),
                Ok(None) => {}
                Err(e) => warn!(test_id = %test_id, error = %e, "Failed to evict finished suite"),
            }
        });

        info!(test_id = %test_id, "Suite accepted");
        Ok(test_id)
    }

    pub async fn status(&self, test_id: Uuid) -> ProbeResult<Option<TestState>> {
        self.registry.get(test_id).await
    }

    /// Cancel pending delays and stop tracking the suite. Calls already in
    /// flight to the target or generator are not interrupted.
    pub async fn stop(&self, test_id: Uuid) -> ProbeResult<bool> {
        if let Some((_, token)) = self.cancellations.remove(&test_id) {
            token.cancel();
        }
        let removed = self.registry.remove(test_id).await?.is_some();
        if removed {
            info!(test_id = %test_id, "Suite stopped");
        }
        Ok(removed)
    }
}
