//! Suite-level statistics over finalized conversations.
//!
//! Everything here is a pure function of its input: the same conversation
//! list always produces the same `SuiteMetrics`, ordering included.

use std::collections::HashMap;

use chatprobe_core::types::{
    CategoryMetrics, ConversationResult, ErrorCount, IntentCount, SuiteMetrics,
};

/// Number of entries kept in `commonIntents`.
pub const COMMON_INTENT_LIMIT: usize = 10;
/// Number of intents kept per category in the breakdown.
pub const CATEGORY_TOP_INTENTS: usize = 3;
/// Normalized error messages are cut to this many characters.
pub const ERROR_MESSAGE_LIMIT: usize = 100;

/// Substring → category, checked in order against the lowercased intent.
const CATEGORY_RULES: &[(&[&str], &str)] = &[
    (&["bill", "payment", "refund", "charge"], "billing"),
    (&["account", "login", "password"], "account"),
    (&["order", "ship", "deliver", "track"], "orders"),
    (&["error", "bug", "crash", "technical"], "technical"),
    (&["greet", "hello", "welcome"], "general"),
];

const UNCATEGORIZED: &str = "other";

pub fn categorize_intent(intent: &str) -> &'static str {
    let lowered = intent.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(_, category)| *category)
        .unwrap_or(UNCATEGORIZED)
}

/// Count occurrences and sort by count descending. Ties keep first-seen order.
fn rank<'a>(items: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    for item in items {
        match index.get(item) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(item, counts.len());
                counts.push((item.to_string(), 1));
            }
        }
    }
    // sort_by is stable, which preserves first-seen order among ties.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn rank_intents(conversations: &[ConversationResult], limit: usize) -> Vec<IntentCount> {
    let intents = conversations
        .iter()
        .flat_map(|c| c.turns.iter())
        .filter_map(|t| t.intent.as_deref());
    rank(intents)
        .into_iter()
        .take(limit)
        .map(|(intent, count)| IntentCount { intent, count })
        .collect()
}

/// Strip the `"Turn N: "` prefix and truncate.
pub fn normalize_error(error: &str) -> String {
    let stripped = error
        .strip_prefix("Turn ")
        .and_then(|rest| {
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            rest[digits..].strip_prefix(": ")
        })
        .unwrap_or(error);
    stripped.chars().take(ERROR_MESSAGE_LIMIT).collect()
}

pub fn summarize_errors(conversations: &[ConversationResult]) -> Vec<ErrorCount> {
    let normalized: Vec<String> = conversations
        .iter()
        .flat_map(|c| c.errors.iter())
        .map(|e| normalize_error(e))
        .collect();
    rank(normalized.iter().map(String::as_str))
        .into_iter()
        .map(|(error, count)| ErrorCount { error, count })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

pub fn category_breakdown(conversations: &[ConversationResult]) -> Vec<CategoryMetrics> {
    let mut groups: Vec<(&'static str, Vec<&ConversationResult>)> = Vec::new();
    for conversation in conversations {
        let category = conversation
            .first_intent()
            .map(categorize_intent)
            .unwrap_or(UNCATEGORIZED);
        match groups.iter_mut().find(|(name, _)| *name == category) {
            Some((_, members)) => members.push(conversation),
            None => groups.push((category, vec![conversation])),
        }
    }

    groups
        .into_iter()
        .map(|(category, members)| {
            let successful = members.iter().filter(|c| c.success).count();
            let intents = members
                .iter()
                .flat_map(|c| c.turns.iter())
                .filter_map(|t| t.intent.as_deref());
            CategoryMetrics {
                category: category.to_string(),
                total_conversations: members.len(),
                successful_conversations: successful,
                success_rate: ratio(successful, members.len()),
                average_conversation_length: mean(members.iter().map(|c| c.turns.len() as f64)),
                average_response_time: mean(
                    members.iter().map(|c| c.metrics.average_response_time),
                ),
                top_intents: rank(intents)
                    .into_iter()
                    .take(CATEGORY_TOP_INTENTS)
                    .map(|(intent, count)| IntentCount { intent, count })
                    .collect(),
            }
        })
        .collect()
}

/// Compute all suite statistics for a list of finalized conversations.
pub fn aggregate(conversations: &[ConversationResult]) -> SuiteMetrics {
    let total = conversations.len();
    let successful = conversations.iter().filter(|c| c.success).count();
    let resolved = conversations
        .iter()
        .filter(|c| c.resolution_achieved)
        .count();

    SuiteMetrics {
        success_rate: ratio(successful, total),
        resolution_rate: ratio(resolved, total),
        average_conversation_length: mean(conversations.iter().map(|c| c.turns.len() as f64)),
        average_response_time: mean(
            conversations
                .iter()
                .map(|c| c.metrics.average_response_time),
        ),
        common_intents: rank_intents(conversations, COMMON_INTENT_LIMIT),
        error_summary: summarize_errors(conversations),
        category_breakdown: category_breakdown(conversations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatprobe_core::types::{PersonaType, TargetReply};

    fn conversation(intents: &[&str], latency_ms: u64) -> ConversationResult {
        let mut c = ConversationResult::new(PersonaType::Polite, None);
        for intent in intents {
            c.push_turn(
                "hi",
                TargetReply {
                    response: "hello".into(),
                    intent: Some(intent.to_string()),
                    confidence: Some(0.8),
                    latency_ms,
                },
            );
        }
        c.finalize();
        c
    }

    fn failed(errors: &[&str]) -> ConversationResult {
        let mut c = ConversationResult::new(PersonaType::Impatient, None);
        for e in errors {
            c.errors.push(e.to_string());
        }
        c.success = false;
        c.finalize();
        c
    }

    #[test]
    fn test_intent_ranking() {
        let conversations = vec![
            conversation(&["a", "a", "b"], 10),
            conversation(&["c", "c", "c"], 10),
        ];
        let ranked = rank_intents(&conversations, COMMON_INTENT_LIMIT);
        assert_eq!(
            ranked,
            vec![
                IntentCount {
                    intent: "c".into(),
                    count: 3,
                },
                IntentCount {
                    intent: "a".into(),
                    count: 2,
                },
                IntentCount {
                    intent: "b".into(),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_ranking_ties_keep_first_seen_order() {
        let conversations = vec![conversation(&["z", "y", "x", "y", "z", "x"], 10)];
        let ranked: Vec<String> = rank_intents(&conversations, 10)
            .into_iter()
            .map(|i| i.intent)
            .collect();
        assert_eq!(ranked, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_common_intents_limit() {
        let names: Vec<String> = (0..15).map(|i| format!("intent_{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let metrics = aggregate(&[conversation(&refs, 10)]);
        assert_eq!(metrics.common_intents.len(), COMMON_INTENT_LIMIT);
    }

    #[test]
    fn test_normalize_error() {
        assert_eq!(normalize_error("Turn 12: timeout"), "timeout");
        assert_eq!(normalize_error("Turnstile broke"), "Turnstile broke");
        assert_eq!(normalize_error("Turn x: bad"), "Turn x: bad");
        let long = format!("Turn 1: {}", "e".repeat(250));
        assert_eq!(normalize_error(&long).chars().count(), ERROR_MESSAGE_LIMIT);
    }

    #[test]
    fn test_error_summary_groups_across_turns() {
        let conversations = vec![
            failed(&["Turn 1: connection refused"]),
            failed(&["Turn 4: connection refused"]),
            failed(&["Turn 2: quota exceeded"]),
        ];
        let summary = summarize_errors(&conversations);
        assert_eq!(
            summary,
            vec![
                ErrorCount { error: "connection refused".into(), count: 2 },
                ErrorCount { error: "quota exceeded".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_rates_and_means() {
        let conversations = vec![
            conversation(&["greeting", "refund_request"], 100),
            conversation(&["greeting"], 300),
            failed(&["Turn 1: timeout"]),
        ];
        let metrics = aggregate(&conversations);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.average_conversation_length - 1.0).abs() < 1e-9);
        assert!((metrics.average_response_time - 400.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.average_conversation_length, 0.0);
        assert!(metrics.common_intents.is_empty());
        assert!(metrics.category_breakdown.is_empty());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let conversations = vec![
            conversation(&["billing_question", "payment_update", "greeting"], 120),
            conversation(&["login_issue", "password_reset"], 80),
            failed(&["Turn 3: Target adapter error: request timed out after 12000ms"]),
        ];
        assert_eq!(aggregate(&conversations), aggregate(&conversations));
    }

    #[test]
    fn test_categorize_intent() {
        assert_eq!(categorize_intent("Refund_Request"), "billing");
        assert_eq!(categorize_intent("password_reset"), "account");
        assert_eq!(categorize_intent("track_package"), "orders");
        assert_eq!(categorize_intent("app_crash"), "technical");
        assert_eq!(categorize_intent("greeting"), "general");
        assert_eq!(categorize_intent("small_talk"), "other");
    }

    #[test]
    fn test_category_breakdown() {
        let conversations = vec![
            conversation(&["refund_request", "refund_status"], 100),
            conversation(&["greeting", "refund_request"], 200),
            conversation(&["billing_dispute"], 300),
        ];
        let breakdown = category_breakdown(&conversations);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].category, "billing");
        assert_eq!(breakdown[0].total_conversations, 2);
        assert!((breakdown[0].average_response_time - 200.0).abs() < 1e-9);
        assert_eq!(breakdown[0].top_intents[0].intent, "refund_request");
        assert_eq!(breakdown[1].category, "general");
    }
}
