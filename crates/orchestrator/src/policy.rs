//! Termination policy: decides after every turn whether a conversation
//! should stop and whether it counts as resolved.
//!
//! Rules are evaluated in a fixed priority order:
//! 1. customer satisfaction phrase in the last customer message
//! 2. agent resolution claim awaiting customer confirmation
//! 3. persona patience budget exceeded
//! 4. hard safety cap on conversation length
//! 5. continue

use async_trait::async_trait;
use chatprobe_core::types::{ConversationTurn, Persona, PersonaType};
use chatprobe_core::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};

/// Why a conversation stopped (or did not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    CustomerSatisfied,
    AwaitingConfirmation,
    PatienceExhausted,
    MaxLengthReached,
    Continue,
    /// The persona generator returned an empty message.
    CustomerEnded,
    TurnLimitReached,
    TurnFailed,
    Cancelled,
    /// Decision supplied by a resolution judge.
    Judged(String),
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CustomerSatisfied => f.write_str("customer satisfied"),
            Self::AwaitingConfirmation => f.write_str("awaiting confirmation"),
            Self::PatienceExhausted => f.write_str("patience exhausted"),
            Self::MaxLengthReached => f.write_str("max length reached"),
            Self::Continue => f.write_str("continue"),
            Self::CustomerEnded => f.write_str("customer ended conversation"),
            Self::TurnLimitReached => f.write_str("turn limit reached"),
            Self::TurnFailed => f.write_str("turn failed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Judged(reason) => write!(f, "judged: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationDecision {
    pub should_end: bool,
    pub resolved: bool,
    pub reason: TerminationReason,
}

impl TerminationDecision {
    pub fn end(resolved: bool, reason: TerminationReason) -> Self {
        Self {
            should_end: true,
            resolved,
            reason,
        }
    }

    pub fn proceed(reason: TerminationReason) -> Self {
        Self {
            should_end: false,
            resolved: false,
            reason,
        }
    }

    pub fn continue_() -> Self {
        Self::proceed(TerminationReason::Continue)
    }
}

/// A satisfaction phrase: every `all_of` term and at least one `any_of` term
/// must appear in the lowercased customer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatisfactionMarker {
    pub all_of: Vec<String>,
    pub any_of: Vec<String>,
}

impl SatisfactionMarker {
    fn matches(&self, lowered: &str) -> bool {
        self.all_of.iter().all(|term| lowered.contains(term.as_str()))
            && (self.any_of.is_empty()
                || self.any_of.iter().any(|term| lowered.contains(term.as_str())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatienceBudget {
    pub persona: PersonaType,
    /// The conversation ends once the turn count exceeds this.
    pub max_turns: usize,
}

/// Phrase lists and thresholds. The defaults are shared by every run loop so
/// suites stay reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRules {
    pub satisfaction: Vec<SatisfactionMarker>,
    pub resolution_markers: Vec<String>,
    pub patience: Vec<PatienceBudget>,
    pub safety_cap: usize,
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self {
            satisfaction: vec![SatisfactionMarker {
                all_of: vec!["thank".into()],
                any_of: vec!["help".into(), "resolve".into()],
            }],
            resolution_markers: vec!["resolved".into(), "completed".into(), "fixed".into()],
            patience: vec![
                PatienceBudget {
                    persona: PersonaType::Frustrated,
                    max_turns: 8,
                },
                PatienceBudget {
                    persona: PersonaType::Impatient,
                    max_turns: 6,
                },
            ],
            safety_cap: 16,
        }
    }
}

/// Pure decision function over the turn history.
#[derive(Debug, Clone, Default)]
pub struct TerminationPolicy {
    rules: PolicyRules,
}

impl TerminationPolicy {
    pub fn new(rules: PolicyRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PolicyRules {
        &self.rules
    }

    pub fn customer_satisfied(&self, customer_message: &str) -> bool {
        let lowered = customer_message.to_lowercase();
        self.rules.satisfaction.iter().any(|m| m.matches(&lowered))
    }

    pub fn agent_claims_resolution(&self, agent_response: &str) -> bool {
        let lowered = agent_response.to_lowercase();
        self.rules
            .resolution_markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
    }

    pub fn patience_budget(&self, persona: PersonaType) -> Option<usize> {
        self.rules
            .patience
            .iter()
            .find(|b| b.persona == persona)
            .map(|b| b.max_turns)
    }

    pub fn evaluate(&self, history: &[ConversationTurn], persona: &Persona) -> TerminationDecision {
        let Some(last) = history.last() else {
            return TerminationDecision::continue_();
        };
        let turn_count = history.len();

        if self.customer_satisfied(&last.user_message) {
            return TerminationDecision::end(true, TerminationReason::CustomerSatisfied);
        }

        // An agent-side claim only earns one more turn for the customer to confirm.
        if self.agent_claims_resolution(&last.target_response) {
            return TerminationDecision::proceed(TerminationReason::AwaitingConfirmation);
        }

        if let Some(budget) = self.patience_budget(persona.persona_type) {
            if turn_count > budget {
                return TerminationDecision::end(false, TerminationReason::PatienceExhausted);
            }
        }

        if turn_count > self.rules.safety_cap {
            return TerminationDecision::end(false, TerminationReason::MaxLengthReached);
        }

        TerminationDecision::continue_()
    }
}

/// Optional LLM-backed check consulted when the keyword rules say "continue".
#[async_trait]
pub trait ResolutionJudge: Send + Sync {
    async fn judge(
        &self,
        history: &[ConversationTurn],
        persona: &Persona,
    ) -> ProbeResult<TerminationDecision>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Judgement {
    should_end: bool,
    resolved: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse a judge's structured reply, tolerating code fences and prose
/// around the JSON object.
pub fn parse_judgement(raw: &str) -> ProbeResult<TerminationDecision> {
    let start = raw
        .find('{')
        .ok_or_else(|| ProbeError::Policy("judgement contains no JSON object".into()))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ProbeError::Policy("judgement JSON object is unterminated".into()))?;

    let judgement: Judgement = serde_json::from_str(&raw[start..=end])
        .map_err(|e| ProbeError::Policy(format!("malformed judgement: {e}")))?;

    let reason = TerminationReason::Judged(
        judgement
            .reason
            .unwrap_or_else(|| "no reason given".to_string()),
    );
    if judgement.should_end {
        Ok(TerminationDecision::end(judgement.resolved, reason))
    } else {
        Ok(TerminationDecision::proceed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(n: u32, user: &str, agent: &str) -> ConversationTurn {
        ConversationTurn {
            turn_number: n,
            timestamp: Utc::now(),
            user_message: user.into(),
            target_response: agent.into(),
            intent: None,
            confidence: None,
            latency_ms: Some(10),
        }
    }

    fn history(len: usize, agent: &str) -> Vec<ConversationTurn> {
        (1..=len as u32)
            .map(|n| turn(n, "It still doesn't work", agent))
            .collect()
    }

    fn persona(kind: PersonaType) -> Persona {
        Persona::new(kind, "test", "plain")
    }

    #[test]
    fn test_customer_satisfaction_resolves() {
        let policy = TerminationPolicy::default();
        let turns = vec![turn(
            1,
            "Thank you, that really helped me resolve this!",
            "Glad to hear it",
        )];
        let decision = policy.evaluate(&turns, &persona(PersonaType::Polite));
        assert_eq!(
            decision,
            TerminationDecision::end(true, TerminationReason::CustomerSatisfied)
        );
    }

    #[test]
    fn test_thanks_alone_is_not_satisfaction() {
        let policy = TerminationPolicy::default();
        assert!(!policy.customer_satisfied("Thanks, but what about my refund?"));
        assert!(policy.customer_satisfied("THANKS for the HELP"));
    }

    #[test]
    fn test_agent_claim_waits_for_confirmation() {
        let policy = TerminationPolicy::default();
        let turns = vec![turn(1, "My card was charged twice", "Your issue has been resolved.")];
        let decision = policy.evaluate(&turns, &persona(PersonaType::Polite));
        assert!(!decision.should_end);
        assert!(!decision.resolved);
        assert_eq!(decision.reason, TerminationReason::AwaitingConfirmation);
    }

    #[test]
    fn test_satisfaction_outranks_agent_claim() {
        let policy = TerminationPolicy::default();
        let turns = vec![turn(1, "Thanks, that helps", "The ticket is completed")];
        let decision = policy.evaluate(&turns, &persona(PersonaType::Polite));
        assert!(decision.should_end && decision.resolved);
    }

    #[test]
    fn test_frustrated_patience_cutoff() {
        let policy = TerminationPolicy::default();
        let frustrated = persona(PersonaType::Frustrated);

        let at_budget = policy.evaluate(&history(8, "Let me look"), &frustrated);
        assert!(!at_budget.should_end);

        let over_budget = policy.evaluate(&history(9, "Let me look"), &frustrated);
        assert!(over_budget.should_end);
        assert!(!over_budget.resolved);
        assert_eq!(over_budget.reason, TerminationReason::PatienceExhausted);
    }

    #[test]
    fn test_impatient_patience_cutoff() {
        let policy = TerminationPolicy::default();
        let impatient = persona(PersonaType::Impatient);
        assert!(!policy.evaluate(&history(6, "One moment"), &impatient).should_end);
        assert!(policy.evaluate(&history(7, "One moment"), &impatient).should_end);
    }

    #[test]
    fn test_safety_cap() {
        let policy = TerminationPolicy::default();
        let polite = persona(PersonaType::Polite);
        assert!(!policy.evaluate(&history(16, "Checking"), &polite).should_end);
        let decision = policy.evaluate(&history(17, "Checking"), &polite);
        assert_eq!(
            decision,
            TerminationDecision::end(false, TerminationReason::MaxLengthReached)
        );
    }

    #[test]
    fn test_empty_history_continues() {
        let policy = TerminationPolicy::default();
        let decision = policy.evaluate(&[], &persona(PersonaType::Polite));
        assert_eq!(decision, TerminationDecision::continue_());
    }

    #[test]
    fn test_custom_rules() {
        let policy = TerminationPolicy::new(PolicyRules {
            safety_cap: 2,
            ..PolicyRules::default()
        });
        let decision = policy.evaluate(&history(3, "Hmm"), &persona(PersonaType::Technical));
        assert_eq!(decision.reason, TerminationReason::MaxLengthReached);
    }

    #[test]
    fn test_parse_judgement() {
        let raw = "```json\n{\"shouldEnd\": true, \"resolved\": true, \"reason\": \"refund issued\"}\n```";
        let decision = parse_judgement(raw).unwrap();
        assert!(decision.should_end && decision.resolved);
        assert_eq!(
            decision.reason,
            TerminationReason::Judged("refund issued".into())
        );
    }

    #[test]
    fn test_parse_judgement_malformed() {
        assert!(matches!(
            parse_judgement("the customer seems happy"),
            Err(ProbeError::Policy(_))
        ));
        assert!(matches!(
            parse_judgement("{\"shouldEnd\": \"yes\"}"),
            Err(ProbeError::Policy(_))
        ));
    }
}
