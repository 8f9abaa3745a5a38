use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProbeError, ProbeResult};

// ─── Personas ───────────────────────────────────────────────────────────────

/// Behavioural profile of the synthetic customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaType {
    Frustrated,
    Impatient,
    Confused,
    Polite,
    Technical,
}

impl PersonaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frustrated => "frustrated",
            Self::Impatient => "impatient",
            Self::Confused => "confused",
            Self::Polite => "polite",
            Self::Technical => "technical",
        }
    }
}

impl std::fmt::Display for PersonaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    #[serde(rename = "type")]
    pub persona_type: PersonaType,
    pub description: String,
    pub response_style: String,
}

impl Persona {
    pub fn new(
        persona_type: PersonaType,
        description: impl Into<String>,
        response_style: impl Into<String>,
    ) -> Self {
        Self {
            persona_type,
            description: description.into(),
            response_style: response_style.into(),
        }
    }

    /// The built-in persona set used when a suite does not supply its own.
    pub fn defaults() -> Vec<Persona> {
        vec![
            Persona::new(
                PersonaType::Frustrated,
                "Customer who has had the same problem several times and is running out of patience",
                "short, irritated, repeats the complaint",
            ),
            Persona::new(
                PersonaType::Impatient,
                "Busy customer who wants an answer immediately",
                "terse, asks for the fastest option",
            ),
            Persona::new(
                PersonaType::Confused,
                "Customer unsure what went wrong or which product they use",
                "vague, asks clarifying questions",
            ),
            Persona::new(
                PersonaType::Polite,
                "Friendly customer who follows instructions",
                "courteous, complete sentences",
            ),
            Persona::new(
                PersonaType::Technical,
                "Experienced user who has already tried the obvious fixes",
                "precise, mentions error codes and steps taken",
            ),
        ]
    }
}

// ─── Conversations ──────────────────────────────────────────────────────────

/// What the system under test returned for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReply {
    pub response: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub latency_ms: u64,
}

/// One request/response exchange. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub turn_number: u32,
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub target_response: String,
    pub intent: Option<String>,
    /// Normalized to 0–1.
    pub confidence: Option<f64>,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetrics {
    pub total_turns: usize,
    pub average_response_time: f64,
    pub intent_recognition_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResult {
    pub conversation_id: Uuid,
    pub session_id: String,
    pub persona: PersonaType,
    pub category: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub turns: Vec<ConversationTurn>,
    pub success: bool,
    pub errors: Vec<String>,
    pub resolution_achieved: bool,
    pub termination_reason: Option<String>,
    pub metrics: ConversationMetrics,
}

impl ConversationResult {
    pub fn new(persona: PersonaType, category: Option<String>) -> Self {
        let conversation_id = Uuid::new_v4();
        Self {
            conversation_id,
            session_id: format!("session-{conversation_id}"),
            persona,
            category,
            start_time: Utc::now(),
            end_time: None,
            turns: Vec::new(),
            success: true,
            errors: Vec::new(),
            resolution_achieved: false,
            termination_reason: None,
            metrics: ConversationMetrics::default(),
        }
    }

    /// Append the next turn. Turn numbers are assigned here so they stay
    /// contiguous from 1.
    pub fn push_turn(&mut self, user_message: impl Into<String>, reply: TargetReply) -> u32 {
        let turn_number = self.turns.len() as u32 + 1;
        self.turns.push(ConversationTurn {
            turn_number,
            timestamp: Utc::now(),
            user_message: user_message.into(),
            target_response: reply.response,
            intent: reply.intent,
            confidence: reply.confidence,
            latency_ms: Some(reply.latency_ms),
        });
        turn_number
    }

    /// Record a turn-level failure and mark the conversation unsuccessful.
    pub fn record_failure(&mut self, turn: u32, message: impl std::fmt::Display) {
        self.errors.push(format!("Turn {turn}: {message}"));
        self.success = false;
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Set `end_time` and compute per-conversation metrics. Subsequent calls
    /// are no-ops.
    pub fn finalize(&mut self) {
        if self.is_finalized() {
            return;
        }
        self.end_time = Some(Utc::now());

        let latencies: Vec<u64> = self.turns.iter().filter_map(|t| t.latency_ms).collect();
        let average_response_time = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };

        let confidences: Vec<f64> = self
            .turns
            .iter()
            .filter(|t| t.intent.is_some())
            .filter_map(|t| t.confidence)
            .collect();
        let intent_recognition_accuracy = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        self.metrics = ConversationMetrics {
            total_turns: self.turns.len(),
            average_response_time,
            intent_recognition_accuracy,
        };
    }

    /// Intent reported for the earliest turn that has one.
    pub fn first_intent(&self) -> Option<&str> {
        self.turns.iter().find_map(|t| t.intent.as_deref())
    }
}

// ─── Suite configuration ────────────────────────────────────────────────────

/// A scenario family; conversations are generated once per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioCategory {
    pub name: String,
    #[serde(default)]
    pub seed_prompt: Option<String>,
}

/// Immutable once a suite starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub number_of_conversations: u32,
    pub max_turns_per_conversation: u32,
    #[serde(default)]
    pub delay_between_turns_ms: u64,
    #[serde(default)]
    pub delay_between_conversations_ms: u64,
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub categories: Vec<ScenarioCategory>,
    #[serde(default)]
    pub seed_prompt: Option<String>,
}

impl TestSuiteConfig {
    pub fn new(number_of_conversations: u32, max_turns_per_conversation: u32) -> Self {
        Self {
            name: None,
            number_of_conversations,
            max_turns_per_conversation,
            delay_between_turns_ms: 0,
            delay_between_conversations_ms: 0,
            personas: Vec::new(),
            categories: Vec::new(),
            seed_prompt: None,
        }
    }

    pub fn validate(&self) -> ProbeResult<()> {
        if self.number_of_conversations < 1 {
            return Err(ProbeError::Configuration(
                "numberOfConversations must be at least 1".into(),
            ));
        }
        if self.max_turns_per_conversation < 1 {
            return Err(ProbeError::Configuration(
                "maxTurnsPerConversation must be at least 1".into(),
            ));
        }
        if self.categories.iter().any(|c| c.name.trim().is_empty()) {
            return Err(ProbeError::Configuration(
                "category names must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Personas to rotate through: the configured list, or the defaults.
    pub fn effective_personas(&self) -> Vec<Persona> {
        if self.personas.is_empty() {
            Persona::defaults()
        } else {
            self.personas.clone()
        }
    }

    /// Total conversations the suite will attempt.
    pub fn planned_conversations(&self) -> usize {
        self.categories.len().max(1) * self.number_of_conversations as usize
    }
}

// ─── Reports ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentCount {
    pub intent: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMetrics {
    pub category: String,
    pub total_conversations: usize,
    pub successful_conversations: usize,
    pub success_rate: f64,
    pub average_conversation_length: f64,
    pub average_response_time: f64,
    pub top_intents: Vec<IntentCount>,
}

/// Suite-level statistics derived from a list of finalized conversations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteMetrics {
    pub success_rate: f64,
    pub resolution_rate: f64,
    pub average_conversation_length: f64,
    pub average_response_time: f64,
    pub common_intents: Vec<IntentCount>,
    pub error_summary: Vec<ErrorCount>,
    pub category_breakdown: Vec<CategoryMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub test_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub configuration: TestSuiteConfig,
    pub total_conversations: usize,
    pub successful_conversations: usize,
    pub failed_conversations: usize,
    #[serde(flatten)]
    pub metrics: SuiteMetrics,
    pub conversations: Vec<ConversationResult>,
}

impl TestReport {
    pub fn new(test_id: Uuid, configuration: TestSuiteConfig) -> Self {
        Self {
            test_id,
            start_time: Utc::now(),
            end_time: None,
            configuration,
            total_conversations: 0,
            successful_conversations: 0,
            failed_conversations: 0,
            metrics: SuiteMetrics::default(),
            conversations: Vec::new(),
        }
    }

    /// Append a finished conversation and update the running counts.
    pub fn record(&mut self, result: ConversationResult) {
        self.total_conversations += 1;
        if result.success {
            self.successful_conversations += 1;
        } else {
            self.failed_conversations += 1;
        }
        self.conversations.push(result);
    }

    /// Stamp the end time and attach the aggregated statistics.
    pub fn finalize(&mut self, metrics: SuiteMetrics) {
        self.end_time = Some(Utc::now());
        self.metrics = metrics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(latency_ms: u64, intent: Option<&str>, confidence: Option<f64>) -> TargetReply {
        TargetReply {
            response: "ok".into(),
            intent: intent.map(Into::into),
            confidence,
            latency_ms,
        }
    }

    #[test]
    fn test_turn_numbers_are_contiguous() {
        let mut result = ConversationResult::new(PersonaType::Polite, None);
        assert_eq!(result.push_turn("a", reply(10, None, None)), 1);
        assert_eq!(result.push_turn("b", reply(10, None, None)), 2);
        assert_eq!(result.push_turn("c", reply(10, None, None)), 3);
        let numbers: Vec<u32> = result.turns.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_finalize_metrics() {
        let mut result = ConversationResult::new(PersonaType::Technical, None);
        result.push_turn("a", reply(100, Some("billing"), Some(0.8)));
        result.push_turn("b", reply(300, None, Some(0.1)));
        result.push_turn("c", reply(200, Some("refund"), Some(0.6)));
        result.finalize();

        assert_eq!(result.metrics.total_turns, 3);
        assert!((result.metrics.average_response_time - 200.0).abs() < 1e-9);
        // Only turns carrying both an intent and a confidence count.
        assert!((result.metrics.intent_recognition_accuracy - 0.7).abs() < 1e-9);
        assert!(result.is_finalized());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut result = ConversationResult::new(PersonaType::Polite, None);
        result.finalize();
        let end = result.end_time;
        result.push_turn("late", reply(5, None, None));
        result.finalize();
        assert_eq!(result.end_time, end);
        assert_eq!(result.metrics.total_turns, 0);
    }

    #[test]
    fn test_empty_conversation_metrics_are_zero() {
        let mut result = ConversationResult::new(PersonaType::Confused, None);
        result.finalize();
        assert_eq!(result.metrics.average_response_time, 0.0);
        assert_eq!(result.metrics.intent_recognition_accuracy, 0.0);
    }

    #[test]
    fn test_record_failure_prefix() {
        let mut result = ConversationResult::new(PersonaType::Impatient, None);
        result.record_failure(2, "connection refused");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Turn 2: connection refused".to_string()]);
    }

    #[test]
    fn test_config_validation() {
        assert!(TestSuiteConfig::new(1, 1).validate().is_ok());
        assert!(matches!(
            TestSuiteConfig::new(0, 5).validate(),
            Err(ProbeError::Configuration(_))
        ));
        assert!(matches!(
            TestSuiteConfig::new(3, 0).validate(),
            Err(ProbeError::Configuration(_))
        ));
    }

    #[test]
    fn test_planned_conversations() {
        let mut config = TestSuiteConfig::new(3, 5);
        assert_eq!(config.planned_conversations(), 3);
        config.categories = vec![
            ScenarioCategory {
                name: "billing".into(),
                seed_prompt: None,
            },
            ScenarioCategory {
                name: "orders".into(),
                seed_prompt: None,
            },
        ];
        assert_eq!(config.planned_conversations(), 6);
        assert_eq!(config.effective_personas().len(), 5);
    }

    #[test]
    fn test_report_counts() {
        let mut report = TestReport::new(Uuid::new_v4(), TestSuiteConfig::new(2, 3));
        let ok = ConversationResult::new(PersonaType::Polite, None);
        let mut bad = ConversationResult::new(PersonaType::Polite, None);
        bad.record_failure(1, "timeout");
        report.record(ok);
        report.record(bad);
        assert_eq!(report.total_conversations, 2);
        assert_eq!(
            report.total_conversations,
            report.successful_conversations + report.failed_conversations
        );
    }

    #[test]
    fn test_suite_config_camel_case() {
        let config: TestSuiteConfig = serde_json::from_str(
            r#"{"numberOfConversations": 2, "maxTurnsPerConversation": 3,
                "personas": [{"type": "frustrated", "description": "d", "responseStyle": "s"}]}"#,
        )
        .unwrap();
        assert_eq!(config.number_of_conversations, 2);
        assert_eq!(config.delay_between_turns_ms, 0);
        assert_eq!(config.personas[0].persona_type, PersonaType::Frustrated);
    }
}
