//! Rule-based intent and topic tagging of customer messages.
//!
//! Keyword tables cover Vietnamese and English. Matching is on whole words,
//! so "hi" does not fire inside "this".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag used when no topic matches.
pub const GENERAL_TOPIC: &str = "general";

/// What the customer is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    PriceInquiry,
    PurchaseIntent,
    Consultation,
    Gratitude,
    Timing,
    Location,
    #[default]
    GeneralInquiry,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::PriceInquiry => "price_inquiry",
            Intent::PurchaseIntent => "purchase_intent",
            Intent::Consultation => "consultation",
            Intent::Gratitude => "gratitude",
            Intent::Timing => "timing",
            Intent::Location => "location",
            Intent::GeneralInquiry => "general_inquiry",
        }
    }

    /// Intents that benefit from a knowledge lookup.
    pub fn wants_knowledge(&self) -> bool {
        !matches!(self, Intent::Greeting | Intent::Gratitude)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked in order; the first match wins.
const INTENT_RULES: &[(Intent, &[&str])] = &[
    (
        Intent::Greeting,
        &["xin chào", "chào", "chào bạn", "hello", "hi", "hey", "good morning"],
    ),
    (
        Intent::PriceInquiry,
        &["giá", "bao nhiêu tiền", "price", "cost", "how much"],
    ),
    (
        Intent::PurchaseIntent,
        &["mua", "đặt hàng", "buy", "order", "purchase"],
    ),
    (
        Intent::Consultation,
        &["tư vấn", "tìm hiểu", "advice", "recommend", "consult"],
    ),
    (Intent::Gratitude, &["cảm ơn", "cám ơn", "thanks", "thank you"]),
    (
        Intent::Timing,
        &["khi nào", "thời gian", "bao lâu", "when", "how long"],
    ),
    (
        Intent::Location,
        &["địa chỉ", "ở đâu", "address", "where"],
    ),
];

const TOPIC_RULES: &[(&str, &[&str])] = &[
    (
        "pricing",
        &["giá", "bao nhiêu tiền", "chi phí", "đắt", "rẻ", "price", "cost", "cheap", "expensive"],
    ),
    (
        "features",
        &["tính năng", "chức năng", "làm được gì", "có gì", "feature", "features", "function"],
    ),
    (
        "guidance",
        &["hướng dẫn", "sử dụng", "cài đặt", "tích hợp", "how to", "setup", "install", "integrate"],
    ),
    (
        "payment",
        &["thanh toán", "mua", "đặt hàng", "mua ở đâu", "payment", "pay", "checkout"],
    ),
    (
        "support",
        &["hỗ trợ", "giúp đỡ", "tư vấn", "troubleshoot", "support", "help"],
    ),
];

/// Whether `phrase` occurs in `text` with no letter or digit on either side.
pub(crate) fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Classify a customer message.
pub fn detect_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| contains_phrase(&lower, p)))
        .map_or(Intent::GeneralInquiry, |(intent, _)| *intent)
}

/// Topic tags for a message, or `["general"]` when none match.
pub fn derive_topics(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let topics: Vec<String> = TOPIC_RULES
        .iter()
        .filter(|(_, phrases)| phrases.iter().any(|p| contains_phrase(&lower, p)))
        .map(|(topic, _)| topic.to_string())
        .collect();

    if topics.is_empty() {
        vec![GENERAL_TOPIC.to_string()]
    } else {
        topics
    }
}
