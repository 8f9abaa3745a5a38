//! Persona generator: produces the synthetic customer's side of the
//! conversation.

use async_trait::async_trait;
use chatprobe_core::types::{ConversationTurn, Persona, PersonaType};
use chatprobe_core::ProbeResult;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::policy::TerminationPolicy;

/// Source of customer messages. An empty `next_message` means the customer
/// is done and the issue is assumed resolved. Output is not guaranteed to be
/// deterministic.
#[async_trait]
pub trait PersonaGenerator: Send + Sync {
    async fn next_message(
        &self,
        history: &[ConversationTurn],
        persona: &Persona,
        last_target_response: &str,
    ) -> ProbeResult<String>;

    /// Scenario variants of a seed prompt. May return fewer than `count`.
    async fn initial_variations(&self, seed_prompt: &str, count: usize)
        -> ProbeResult<Vec<String>>;
}

/// Truncate or pad (by repeating the seed) so exactly `count` variants remain.
pub fn pad_variations(mut variants: Vec<String>, seed_prompt: &str, count: usize) -> Vec<String> {
    variants.truncate(count);
    while variants.len() < count {
        variants.push(seed_prompt.to_string());
    }
    variants
}

fn openings(persona: PersonaType) -> &'static [&'static str] {
    match persona {
        PersonaType::Frustrated => &[
            "This is the third time I'm contacting you. My order still hasn't arrived.",
            "I was charged twice again and nobody has fixed it.",
            "Your app keeps logging me out and I'm sick of it.",
        ],
        PersonaType::Impatient => &[
            "Need my refund status now.",
            "Quick question, where is my package?",
            "Reset my password, I'm in a hurry.",
        ],
        PersonaType::Confused => &[
            "Hi, I think something is wrong with my account but I'm not sure what.",
            "I got an email about a payment and I don't understand it.",
            "Which plan am I on? The website says something different.",
        ],
        PersonaType::Polite => &[
            "Hello! Could you help me update the shipping address on my order?",
            "Good morning, I'd like to ask about a charge on my last invoice.",
            "Hi there, I'm having a bit of trouble logging in. Could you assist?",
        ],
        PersonaType::Technical => &[
            "Checkout fails with error 502 after submitting payment. Cleared cache and retried.",
            "The API returns 401 for a valid token since yesterday's release.",
            "Order sync to my account shows status PENDING for 48h, tried re-login.",
        ],
    }
}

fn follow_ups(persona: PersonaType) -> &'static [&'static str] {
    match persona {
        PersonaType::Frustrated => &[
            "That's not what I asked. Can you actually do something?",
            "I already tried that. It didn't work.",
            "Can I talk to a real person?",
        ],
        PersonaType::Impatient => &[
            "Faster please.",
            "Just tell me the next step.",
            "How long will this take?",
        ],
        PersonaType::Confused => &[
            "Sorry, I don't follow. What do I click?",
            "Where do I find that?",
            "Is that the same as my account number?",
        ],
        PersonaType::Polite => &[
            "Thank you. What should I do next?",
            "I see, could you explain a little more?",
            "Okay, I've done that. Anything else?",
        ],
        PersonaType::Technical => &[
            "Which service logs should I check for that?",
            "I already verified the config. Any known incident?",
            "Can you confirm the request ID on your side?",
        ],
    }
}

fn confirmations(persona: PersonaType) -> &'static str {
    match persona {
        PersonaType::Frustrated => "Finally. Thanks for the help.",
        PersonaType::Impatient => "Thanks, that helped.",
        PersonaType::Confused => "Oh, I get it now, thank you for your help!",
        PersonaType::Polite => "Thank you, that really helped me resolve this!",
        PersonaType::Technical => "Confirmed working on my side. Thanks for the help.",
    }
}

/// Persona-specific opening used when no scenario variant is available.
pub fn sample_opening(persona: PersonaType, index: usize) -> String {
    let options = openings(persona);
    options[index % options.len()].to_string()
}

const FRAMINGS: &[&str] = &[
    "{seed}",
    "Hi, {seed}",
    "{seed} Can you help me with this?",
    "Hello. {seed} I need this sorted today.",
    "{seed} This has happened before.",
];

/// Offline generator driven by canned persona lines. It confirms as soon as
/// the agent claims a resolution and gives up after `max_follow_ups`.
pub struct ScriptedPersonaGenerator {
    max_follow_ups: usize,
    policy: TerminationPolicy,
    rng: Mutex<StdRng>,
}

impl ScriptedPersonaGenerator {
    pub fn new(max_follow_ups: usize) -> Self {
        Self {
            max_follow_ups,
            policy: TerminationPolicy::default(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }
}

#[async_trait]
impl PersonaGenerator for ScriptedPersonaGenerator {
    async fn next_message(
        &self,
        history: &[ConversationTurn],
        persona: &Persona,
        last_target_response: &str,
    ) -> ProbeResult<String> {
        if self.policy.agent_claims_resolution(last_target_response) {
            return Ok(confirmations(persona.persona_type).to_string());
        }
        if history.len() > self.max_follow_ups {
            return Ok(String::new());
        }

        let lines = follow_ups(persona.persona_type);
        let line = lines
            .choose(&mut *self.rng.lock())
            .copied()
            .unwrap_or(lines[0]);
        Ok(line.to_string())
    }

    async fn initial_variations(
        &self,
        seed_prompt: &str,
        count: usize,
    ) -> ProbeResult<Vec<String>> {
        Ok(FRAMINGS
            .iter()
            .take(count)
            .map(|framing| framing.replace("{seed}", seed_prompt.trim()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (1..=n as u32)
            .map(|i| ConversationTurn {
                turn_number: i,
                timestamp: Utc::now(),
                user_message: "still broken".into(),
                target_response: "checking".into(),
                intent: None,
                confidence: None,
                latency_ms: None,
            })
            .collect()
    }

    #[test]
    fn test_pad_variations() {
        let padded = pad_variations(vec!["a".into()], "seed", 3);
        assert_eq!(padded, vec!["a", "seed", "seed"]);
        let truncated = pad_variations(vec!["a".into(), "b".into(), "c".into()], "seed", 2);
        assert_eq!(truncated, vec!["a", "b"]);
    }

    #[test]
    fn test_sample_opening_rotates() {
        let first = sample_opening(PersonaType::Polite, 0);
        let wrapped = sample_opening(PersonaType::Polite, 3);
        assert_eq!(first, wrapped);
        assert_ne!(first, sample_opening(PersonaType::Polite, 1));
    }

    #[tokio::test]
    async fn test_confirms_after_resolution_claim() {
        let generator = ScriptedPersonaGenerator::new(4).with_seed(7);
        let policy = TerminationPolicy::default();
        for persona in Persona::defaults() {
            let msg = generator
                .next_message(&turns(1), &persona, "Your refund has been completed.")
                .await
                .unwrap();
            assert!(policy.customer_satisfied(&msg), "{msg}");
        }
    }

    #[tokio::test]
    async fn test_ends_after_follow_up_budget() {
        let generator = ScriptedPersonaGenerator::new(2).with_seed(1);
        let persona = Persona::new(PersonaType::Confused, "d", "s");
        let msg = generator
            .next_message(&turns(2), &persona, "Could you share your order number?")
            .await
            .unwrap();
        assert!(!msg.is_empty());
        let msg = generator
            .next_message(&turns(3), &persona, "Could you share your order number?")
            .await
            .unwrap();
        assert!(msg.is_empty());
    }

    #[tokio::test]
    async fn test_initial_variations_may_be_short() {
        let generator = ScriptedPersonaGenerator::new(2);
        let variants = generator
            .initial_variations("My invoice is wrong.", 8)
            .await
            .unwrap();
        assert_eq!(variants.len(), FRAMINGS.len());
        assert_eq!(variants[0], "My invoice is wrong.");
        assert_eq!(pad_variations(variants, "My invoice is wrong.", 8).len(), 8);
    }
}
