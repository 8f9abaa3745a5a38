//! Test suite orchestrator: runs a batch of conversations sequentially,
//! aggregates them into a report, and persists it.

use std::sync::Arc;
use std::time::Duration;

use chatprobe_core::types::{Persona, ScenarioCategory, TestReport, TestSuiteConfig};
use chatprobe_core::ProbeResult;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapter::TargetAdapter;
use crate::aggregator::aggregate;
use crate::delay::cancellable_sleep;
use crate::persona::{pad_variations, sample_opening, PersonaGenerator};
use crate::policy::{ResolutionJudge, TerminationPolicy};
use crate::runner::{ConversationPlan, ConversationRunner};
use crate::store::ReportStore;

/// External collaborators a suite needs. Cheap to clone.
#[derive(Clone)]
pub struct Collaborators {
    pub adapter: Arc<dyn TargetAdapter>,
    pub generator: Arc<dyn PersonaGenerator>,
    pub store: Arc<dyn ReportStore>,
    pub judge: Option<Arc<dyn ResolutionJudge>>,
    pub policy: TerminationPolicy,
}

impl Collaborators {
    pub fn new(
        adapter: Arc<dyn TargetAdapter>,
        generator: Arc<dyn PersonaGenerator>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            adapter,
            generator,
            store,
            judge: None,
            policy: TerminationPolicy::default(),
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn ResolutionJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

pub struct SuiteOrchestrator {
    collaborators: Collaborators,
    cancel: CancellationToken,
}

impl SuiteOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run every planned conversation one after another and return the
    /// finalized report.
    ///
    /// Only an invalid configuration is an error; failed conversations are
    /// recorded in the report and a store failure is logged.
    pub async fn run_suite(
        &self,
        test_id: Uuid,
        config: TestSuiteConfig,
    ) -> ProbeResult<TestReport> {
        config.validate()?;

        let personas = config.effective_personas();
        let planned = config.planned_conversations();
        let per_category = config.number_of_conversations as usize;
        let turn_delay = Duration::from_millis(config.delay_between_turns_ms);
        let conversation_delay = Duration::from_millis(config.delay_between_conversations_ms);
        let categories: Vec<Option<ScenarioCategory>> = if config.categories.is_empty() {
            vec![None]
        } else {
            config.categories.iter().cloned().map(Some).collect()
        };

        let runner = ConversationRunner::new(
            self.collaborators.adapter.clone(),
            self.collaborators.generator.clone(),
        )
        .with_policy(self.collaborators.policy.clone())
        .with_judge(self.collaborators.judge.clone())
        .with_cancellation(self.cancel.clone());

        let mut report = TestReport::new(test_id, config.clone());
        metrics::counter!("chatprobe.suites_started").increment(1);
        info!(
            test_id = %test_id,
            planned,
            personas = personas.len(),
            max_turns = config.max_turns_per_conversation,
            "Suite starting"
        );

        let mut index = 0usize;
        'suite: for category in &categories {
            let seed = category
                .as_ref()
                .and_then(|c| c.seed_prompt.as_deref())
                .or(config.seed_prompt.as_deref());
            let variants = match seed {
                Some(seed) => self.scenario_variants(seed, per_category).await,
                None => Vec::new(),
            };

            for slot in 0..per_category {
                if self.cancel.is_cancelled() {
                    warn!(test_id = %test_id, completed = index, planned, "Suite cancelled");
                    break 'suite;
                }

                let persona: &Persona = &personas[index % personas.len()];
                let initial_message = variants
                    .get(slot)
                    .cloned()
                    .unwrap_or_else(|| sample_opening(persona.persona_type, index));

                let plan = ConversationPlan {
                    initial_message,
                    persona: persona.clone(),
                    category: category.as_ref().map(|c| c.name.clone()),
                    max_turns: config.max_turns_per_conversation,
                    turn_delay,
                };
                let result = runner.run(&plan).await;

                let outcome = if result.success { "success" } else { "failure" };
                metrics::counter!("chatprobe.conversations", "outcome" => outcome).increment(1);
                report.record(result);
                index += 1;

                if index < planned && !cancellable_sleep(conversation_delay, &self.cancel).await {
                    warn!(test_id = %test_id, completed = index, planned, "Suite cancelled");
                    break 'suite;
                }
            }
        }

        report.finalize(aggregate(&report.conversations));
        metrics::counter!("chatprobe.suites_completed").increment(1);
        info!(
            test_id = %test_id,
            total = report.total_conversations,
            successful = report.successful_conversations,
            failed = report.failed_conversations,
            success_rate = report.metrics.success_rate,
            "Suite completed"
        );

        if let Err(e) = self.collaborators.store.save(&report).await {
            error!(test_id = %test_id, error = %e, "Failed to persist report");
        }

        Ok(report)
    }

    /// Scenario openings for one category. Falls back to persona samples
    /// (an empty list) if generation fails.
    async fn scenario_variants(&self, seed: &str, count: usize) -> Vec<String> {
        match self
            .collaborators
            .generator
            .initial_variations(seed, count)
            .await
        {
            Ok(variants) => pad_variations(variants, seed, count),
            Err(e) => {
                warn!(error = %e, "Scenario variation failed, using persona samples");
                Vec::new()
            }
        }
    }
}
