//! Derived customer scores. Always recomputed, never stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::CustomerMemory;

/// Engagement bucket for a potential score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementTier {
    Low,
    Medium,
    High,
}

impl EngagementTier {
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            EngagementTier::High
        } else if score >= 40 {
            EngagementTier::Medium
        } else {
            EngagementTier::Low
        }
    }
}

/// Each component is weighted and capped on its own; the total is capped
/// at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialScore {
    pub facts: u32,
    pub conversation: u32,
    pub interests: u32,
    pub recent_activity: u32,
}

impl PotentialScore {
    pub fn compute(memory: &CustomerMemory, now: DateTime<Utc>) -> Self {
        let since = now - Duration::hours(24);
        let recent = memory
            .conversation_history
            .iter()
            .filter(|turn| turn.timestamp > since)
            .count();

        Self {
            facts: weighted(memory.facts.len(), 10, 30),
            conversation: weighted(memory.conversation_history.len(), 5, 20),
            interests: weighted(memory.preferences.product_interests.len(), 15, 30),
            recent_activity: weighted(recent, 10, 20),
        }
    }

    pub fn total(&self) -> u32 {
        (self.facts + self.conversation + self.interests + self.recent_activity).min(100)
    }

    pub fn tier(&self) -> EngagementTier {
        EngagementTier::from_score(self.total())
    }
}

fn weighted(count: usize, weight: u32, cap: u32) -> u32 {
    u32::try_from(count)
        .unwrap_or(u32::MAX)
        .saturating_mul(weight)
        .min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationTurn, MemoryFact};
    use crate::topics::Intent;
    use chatrag_knowledge::BotScope;
    use pretty_assertions::assert_eq;

    fn turn(at: DateTime<Utc>) -> ConversationTurn {
        ConversationTurn {
            timestamp: at,
            user_message: "hello".to_string(),
            bot_response: "hi".to_string(),
            topics: Vec::new(),
            intent: Intent::Greeting,
        }
    }

    #[test]
    fn test_new_customer_is_low() {
        let now = Utc::now();
        let memory = CustomerMemory::new("c", BotScope::new("b"), now);
        let score = PotentialScore::compute(&memory, now);
        assert_eq!(score.total(), 0);
        assert_eq!(score.tier(), EngagementTier::Low);
    }

    #[test]
    fn test_components_are_capped() {
        let now = Utc::now();
        let mut memory = CustomerMemory::new("c", BotScope::new("b"), now);
        for field in ["name", "phone", "email", "business"] {
            memory.facts.push(MemoryFact::direct(field, "x", now));
        }
        for _ in 0..2 {
            memory.conversation_history.push(turn(now - Duration::days(3)));
        }
        memory.conversation_history.push(turn(now));
        memory.preferences.product_interests = vec!["pro".to_string()];

        let score = PotentialScore::compute(&memory, now);
        assert_eq!(
            score,
            PotentialScore {
                facts: 30,
                conversation: 15,
                interests: 15,
                recent_activity: 10,
            }
        );
        assert_eq!(score.total(), 70);
        assert_eq!(score.tier(), EngagementTier::High);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(EngagementTier::from_score(39), EngagementTier::Low);
        assert_eq!(EngagementTier::from_score(40), EngagementTier::Medium);
        assert_eq!(EngagementTier::from_score(69), EngagementTier::Medium);
        assert_eq!(EngagementTier::from_score(70), EngagementTier::High);
    }
}
