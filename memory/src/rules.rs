//! Fact extraction rules.
//!
//! Each rule is a data record behind the [`FactRule`] trait, so the table
//! can grow or shrink without touching the memory engine.

use regex_lite::Regex;

use crate::error::{MemoryError, Result};

/// Lowercase letters used in Vietnamese and English names.
const NAME_LETTERS: &str = "a-zàáạảãâầấậẩẫăằắặẳẵèéẹẻẽêềếệểễìíịỉĩòóọỏõôồốộổỗơờớợởỡùúụủũưừứựửữỳýỵỷỹđ";

/// Proposes a value for one customer field from a chat message.
pub trait FactRule: Send + Sync {
    /// Field the rule fills.
    fn field(&self) -> &str;

    /// The value found in `message`, if any.
    fn extract(&self, message: &str) -> Option<String>;
}

/// A rule backed by a regex whose first capture group is the value.
///
/// Messages are lowercased before matching.
#[derive(Debug, Clone)]
pub struct PatternRule {
    field: String,
    pattern: Regex,
}

impl PatternRule {
    pub fn new(field: impl Into<String>, pattern: &str) -> Result<Self> {
        let field = field.into();
        let pattern = Regex::new(pattern).map_err(|e| MemoryError::InvalidRule {
            field: field.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { field, pattern })
    }
}

impl FactRule for PatternRule {
    fn field(&self) -> &str {
        &self.field
    }

    fn extract(&self, message: &str) -> Option<String> {
        let lower = message.to_lowercase();
        let value = self.pattern.captures(&lower)?.get(1)?.as_str();
        let value = value
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// A proposal made by a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FactProposal {
    pub field_name: String,
    pub field_value: String,
}

/// Ordered rule table.
pub struct FactRuleSet {
    rules: Vec<Box<dyn FactRule>>,
}

impl FactRuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Name, phone, email, business domain, and location rules.
    pub fn standard() -> Result<Self> {
        let name = format!(
            r"(?:tên (?:tôi |mình |em )?là|tôi tên là|mình tên là|tôi tên|mình tên|my name is)\s+([{NAME_LETTERS}]+(?:\s+[{NAME_LETTERS}]+){{0,4}})"
        );
        let rules: Vec<Box<dyn FactRule>> = vec![
            Box::new(PatternRule::new("name", &name)?),
            Box::new(PatternRule::new(
                "phone",
                r"(?:^|[^0-9])((?:\+84|0)[35789][0-9]{8})(?:[^0-9]|$)",
            )?),
            Box::new(PatternRule::new(
                "email",
                r"([a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,})",
            )?),
            Box::new(PatternRule::new(
                "business",
                r"(?:kinh doanh|lĩnh vực|ngành|my business is|we sell|i sell)\s+([^.,!?\n]+)",
            )?),
            Box::new(PatternRule::new(
                "location",
                r"(?:cửa hàng|quán|doanh nghiệp|công ty|shop|store|office)(?:\s+(?:của|mình|tôi|em|my|our))*\s+(?:ở|tại|is in|is at|in|at)\s+([^.,!?\n]+)",
            )?),
        ];
        Ok(Self { rules })
    }

    pub fn with_rule(mut self, rule: Box<dyn FactRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Drop every rule for `field`.
    pub fn without_field(mut self, field: &str) -> Self {
        self.rules.retain(|rule| rule.field() != field);
        self
    }

    pub fn fields(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.field()).collect()
    }

    /// Run every rule over `message`. Each field is proposed at most once,
    /// by the first rule that fires for it.
    pub fn extract(&self, message: &str) -> Vec<FactProposal> {
        let mut proposals: Vec<FactProposal> = Vec::new();
        for rule in &self.rules {
            if proposals.iter().any(|p| p.field_name == rule.field()) {
                continue;
            }
            if let Some(value) = rule.extract(message) {
                proposals.push(FactProposal {
                    field_name: rule.field().to_string(),
                    field_value: value,
                });
            }
        }
        proposals
    }
}
