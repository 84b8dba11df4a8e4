//! Chat prompt assembly.

use std::fmt::Write as _;

use chatrag_llm::ChatMessage;
use chatrag_memory::{CustomerMemory, PotentialScore};
use chatrag_retrieval::MergedKnowledgeItem;
use chrono::Utc;

use crate::bots::BotProfile;
use crate::response::{DATA_END, DATA_START};

/// Builds the message list for one chat completion.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    history_turns: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { history_turns: 4 }
    }
}

impl PromptBuilder {
    pub fn new(history_turns: usize) -> Self {
        Self { history_turns }
    }

    /// System prompt, the last few turns as messages, then the new message.
    pub fn build(
        &self,
        bot: &BotProfile,
        memory: &CustomerMemory,
        knowledge: &[MergedKnowledgeItem],
        message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.system_prompt(bot, memory, knowledge))];

        let history = &memory.conversation_history;
        let skip = history.len().saturating_sub(self.history_turns);
        for turn in &history[skip..] {
            messages.push(ChatMessage::user(turn.user_message.clone()));
            messages.push(ChatMessage::assistant(turn.bot_response.clone()));
        }

        messages.push(ChatMessage::user(message));
        messages
    }

    fn system_prompt(
        &self,
        bot: &BotProfile,
        memory: &CustomerMemory,
        knowledge: &[MergedKnowledgeItem],
    ) -> String {
        let mut prompt = bot.system_prompt.trim().to_string();

        prompt.push_str("\n\n## What you know about this customer\n");
        if memory.facts.is_empty() && memory.attributes.is_empty() {
            prompt.push_str("- Nothing yet.\n");
        }
        for fact in &memory.facts {
            let _ = writeln!(prompt, "- {}: {} ({})", fact.field_name, fact.field_value, fact.source);
        }
        for (key, value) in &memory.attributes {
            if memory.fact(key).is_none() {
                let _ = writeln!(prompt, "- {key}: {value}");
            }
        }
        if !memory.preferences.topics_of_interest.is_empty() {
            let _ = writeln!(
                prompt,
                "- Interested in: {}",
                memory.preferences.topics_of_interest.join(", ")
            );
        }
        if let Some(summary) = &memory.context_summary {
            let _ = writeln!(prompt, "- Conversation so far: {summary}");
        }
        if let Some(profile) = &memory.profile {
            let _ = writeln!(prompt, "- Personality: {profile}");
        }
        let score = PotentialScore::compute(memory, Utc::now());
        let _ = writeln!(prompt, "- Engagement: {:?}", score.tier());

        prompt.push_str("\n## Reference material\n");
        if knowledge.is_empty() {
            prompt.push_str("- None for this message.\n");
        }
        for item in knowledge {
            match &item.entity_id {
                Some(entity) => {
                    let _ = writeln!(prompt, "- [{entity}] {}", item.content);
                }
                None => {
                    let _ = writeln!(prompt, "- {}", item.content);
                }
            }
        }

        prompt.push_str(
            "\n## How to answer\n\
             - Reply in the customer's language, briefly and naturally, without Markdown.\n\
             - Do not ask again for anything listed above.\n\
             - Do not repeat greetings or explanations from earlier turns.\n",
        );

        if !bot.customer_fields.is_empty() {
            let fields: Vec<&str> = bot
                .customer_fields
                .iter()
                .map(|f| f.field_name.as_str())
                .collect();
            let missing: Vec<&str> = fields
                .iter()
                .copied()
                .filter(|f| memory.fact(f).is_none())
                .collect();
            let _ = writeln!(
                prompt,
                "- When the customer gives one of [{}], record it as [SAVE:field=value].",
                fields.join(", ")
            );
            if !missing.is_empty() {
                let _ = writeln!(
                    prompt,
                    "- Still missing, ask naturally when it fits: {}",
                    missing.join(", ")
                );
            }
            let _ = writeln!(
                prompt,
                "- Other structured details go at the very end as {DATA_START}{{\"key\": \"value\"}}{DATA_END}"
            );
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::{CustomerField, FieldType};
    use chatrag_knowledge::BotScope;
    use chatrag_llm::Role;
    use chatrag_memory::{ConversationTurn, Intent, MemoryFact};
    use pretty_assertions::assert_eq;

    fn memory_with_turns(n: usize) -> CustomerMemory {
        let now = Utc::now();
        let mut memory = CustomerMemory::new("c1", BotScope::new("shop"), now);
        for i in 0..n {
            memory.conversation_history.push(ConversationTurn {
                timestamp: now,
                user_message: format!("question {i}"),
                bot_response: format!("answer {i}"),
                topics: Vec::new(),
                intent: Intent::GeneralInquiry,
            });
        }
        memory
    }

    #[test]
    fn test_history_is_bounded() {
        let bot = BotProfile::new("shop", "Shop", "You sell plans.");
        let messages = PromptBuilder::new(2).build(&bot, &memory_with_turns(5), &[], "new");

        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "question 3");
        assert_eq!(messages[4].content, "answer 4");
        assert_eq!(messages[5].content, "new");
    }

    #[test]
    fn test_system_prompt_sections() {
        let bot = BotProfile::new("shop", "Shop", "You sell plans.")
            .with_field(CustomerField::new("name", FieldType::Text))
            .with_field(CustomerField::new("phone", FieldType::Phone));
        let mut memory = memory_with_turns(0);
        memory
            .facts
            .push(MemoryFact::direct("name", "Lan", Utc::now()));
        let knowledge = vec![MergedKnowledgeItem {
            entity_id: Some("pro-plan".to_string()),
            content: "Pro costs 500k a month.".to_string(),
            keywords: Default::default(),
            score: 0.9,
            provenance: vec!["c-0".to_string()],
        }];

        let messages = PromptBuilder::default().build(&bot, &memory, &knowledge, "hi");
        let system = &messages[0].content;

        assert!(system.starts_with("You sell plans."));
        assert!(system.contains("- name: Lan (direct)"));
        assert!(system.contains("- [pro-plan] Pro costs 500k a month."));
        assert!(system.contains("[SAVE:field=value]"));
        assert!(system.contains("Still missing, ask naturally when it fits: phone"));
    }

    #[test]
    fn test_empty_context() {
        let bot = BotProfile::new("shop", "Shop", "You sell plans.");
        let messages = PromptBuilder::default().build(&bot, &memory_with_turns(0), &[], "hi");
        let system = &messages[0].content;
        assert!(system.contains("- Nothing yet."));
        assert!(system.contains("- None for this message."));
        assert!(!system.contains("[SAVE:"));
    }
}
