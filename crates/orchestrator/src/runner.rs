//! Conversation runner: drives a single simulated conversation turn by turn
//! until the termination policy, the persona generator, or the turn limit
//! ends it.

use std::sync::Arc;
use std::time::Duration;

use chatprobe_core::types::{ConversationResult, ConversationTurn, Persona, TargetReply};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{normalize_confidence, TargetAdapter};
use crate::delay::cancellable_sleep;
use crate::persona::PersonaGenerator;
use crate::policy::{ResolutionJudge, TerminationDecision, TerminationPolicy, TerminationReason};

/// Parameters for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationPlan {
    pub initial_message: String,
    pub persona: Persona,
    pub category: Option<String>,
    pub max_turns: u32,
    pub turn_delay: Duration,
}

/// Runs conversations against a target using a persona generator.
///
/// Adapter and generator failures are caught per turn: they end the current
/// conversation only and are recorded as `"Turn N: <message>"`.
#[derive(Clone)]
pub struct ConversationRunner {
    adapter: Arc<dyn TargetAdapter>,
    generator: Arc<dyn PersonaGenerator>,
    policy: TerminationPolicy,
    judge: Option<Arc<dyn ResolutionJudge>>,
    cancel: CancellationToken,
}

impl ConversationRunner {
    pub fn new(adapter: Arc<dyn TargetAdapter>, generator: Arc<dyn PersonaGenerator>) -> Self {
        Self {
            adapter,
            generator,
            policy: TerminationPolicy::default(),
            judge: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_judge(mut self, judge: Option<Arc<dyn ResolutionJudge>>) -> Self {
        self.judge = judge;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run one conversation to completion and return the finalized result.
    pub async fn run(&self, plan: &ConversationPlan) -> ConversationResult {
        let persona = &plan.persona;
        let mut result = ConversationResult::new(persona.persona_type, plan.category.clone());
        let context = json!({
            "persona": persona.persona_type,
            "responseStyle": persona.response_style,
            "category": plan.category,
        });

        info!(
            conversation_id = %result.conversation_id,
            persona = %persona.persona_type,
            max_turns = plan.max_turns,
            "Conversation starting"
        );

        let mut message = plan.initial_message.clone();
        let mut reason = TerminationReason::TurnLimitReached;

        for turn in 1..=plan.max_turns {
            if self.cancel.is_cancelled() {
                result.record_failure(turn, TerminationReason::Cancelled);
                reason = TerminationReason::Cancelled;
                break;
            }

            let reply = match self
                .adapter
                .send(&message, &result.session_id, Some(&context))
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(
                        conversation_id = %result.conversation_id,
                        turn,
                        error = %e,
                        "Target call failed"
                    );
                    metrics::counter!("chatprobe.turn_failures").increment(1);
                    result.record_failure(turn, &e);
                    reason = TerminationReason::TurnFailed;
                    break;
                }
            };

            metrics::counter!("chatprobe.turns").increment(1);
            metrics::histogram!("chatprobe.target_latency_ms").record(reply.latency_ms as f64);

            let reply = TargetReply {
                confidence: reply.confidence.and_then(normalize_confidence),
                ..reply
            };
            let last_response = reply.response.clone();
            result.push_turn(std::mem::take(&mut message), reply);

            let decision = self.decide(&result.turns, persona).await;
            debug!(
                conversation_id = %result.conversation_id,
                turn,
                reason = %decision.reason,
                "Termination check"
            );
            if decision.should_end {
                result.resolution_achieved = decision.resolved;
                reason = decision.reason;
                break;
            }

            let next = match self
                .generator
                .next_message(&result.turns, persona, &last_response)
                .await
            {
                Ok(next) => next,
                Err(e) => {
                    warn!(
                        conversation_id = %result.conversation_id,
                        turn,
                        error = %e,
                        "Persona generation failed"
                    );
                    metrics::counter!("chatprobe.turn_failures").increment(1);
                    result.record_failure(turn, &e);
                    reason = TerminationReason::TurnFailed;
                    break;
                }
            };

            if next.trim().is_empty() {
                result.resolution_achieved = true;
                reason = TerminationReason::CustomerEnded;
                break;
            }

            if turn == plan.max_turns {
                break;
            }

            // A cut-short delay is recorded by the check at the top of the
            // loop, against the turn that never ran.
            cancellable_sleep(plan.turn_delay, &self.cancel).await;
            message = next;
        }

        result.termination_reason = Some(reason.to_string());
        result.finalize();

        info!(
            conversation_id = %result.conversation_id,
            turns = result.turns.len(),
            resolved = result.resolution_achieved,
            success = result.success,
            reason = %reason,
            "Conversation finished"
        );
        result
    }

    /// Keyword rules first; the judge only weighs in on a plain "continue".
    /// A failing judge never ends a conversation.
    async fn decide(&self, history: &[ConversationTurn], persona: &Persona) -> TerminationDecision {
        let decision = self.policy.evaluate(history, persona);
        if decision.reason != TerminationReason::Continue {
            return decision;
        }
        let Some(judge) = &self.judge else {
            return decision;
        };
        match judge.judge(history, persona).await {
            Ok(judged) => judged,
            Err(e) => {
                warn!(error = %e, "Resolution judge failed, continuing conversation");
                TerminationDecision::continue_()
            }
        }
    }
}
