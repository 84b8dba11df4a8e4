//! Parsing of model replies.
//!
//! A reply may carry two kinds of hidden instructions for the pipeline:
//! inline `[SAVE:field=value]` commands and one trailing
//! `|||DATA_START|||{json}|||DATA_END|||` block. Both are removed from the
//! text the customer sees.

use std::sync::LazyLock;

use chatrag_llm::json::parse_first_object;
use chatrag_memory::AttributeValue;
use indexmap::IndexMap;
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::bots::BotProfile;

pub const DATA_START: &str = "|||DATA_START|||";
pub const DATA_END: &str = "|||DATA_END|||";

static SAVE_COMMAND: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[SAVE:([^=\]]+)=([^\]]+)\]").ok());

/// A model reply split into customer text and captured data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    /// What the customer sees.
    pub text: String,
    /// Facts to store as direct evidence, in reply order.
    pub direct_facts: Vec<(String, String)>,
    /// Every value from the data block.
    pub data: IndexMap<String, AttributeValue>,
}

/// Split `raw` into visible text and the bot's captured data.
///
/// Save commands for fields the bot does not collect are stripped but
/// ignored. Data block keys always become attributes; keys naming a
/// collected field also become direct facts. A malformed data block is
/// dropped.
pub fn parse_reply(raw: &str, bot: &BotProfile) -> ParsedReply {
    let (visible, block) = split_data_block(raw);

    let mut parsed = ParsedReply::default();
    let Some(save_command) = SAVE_COMMAND.as_ref() else {
        parsed.text = visible.trim().to_string();
        return parsed;
    };
    for caps in save_command.captures_iter(visible) {
        let (Some(field), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let field = field.as_str().trim();
        let value = value.as_str().trim();
        if bot.collects(field) && !value.is_empty() {
            push_fact(&mut parsed.direct_facts, field, value);
        } else {
            debug!("Ignoring save command for uncollected field {field}");
        }
    }

    let stripped = save_command.replace_all(visible, "");
    parsed.text = stripped
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    if let Some(block) = block {
        match parse_first_object::<serde_json::Map<String, serde_json::Value>>(block) {
            Ok(object) => {
                for (key, value) in object {
                    let Some(value) = AttributeValue::from_json(&value) else {
                        continue;
                    };
                    if bot.collects(&key) {
                        push_fact(&mut parsed.direct_facts, &key, &value.to_string());
                    }
                    parsed.data.insert(key, value);
                }
            }
            Err(e) => warn!("Discarding malformed reply data block: {e}"),
        }
    }

    parsed
}

/// The text before the data block and the block's contents, if any.
fn split_data_block(raw: &str) -> (&str, Option<&str>) {
    let Some(start) = raw.find(DATA_START) else {
        return (raw, None);
    };
    let rest = &raw[start + DATA_START.len()..];
    let block = match rest.find(DATA_END) {
        Some(end) => &rest[..end],
        None => rest,
    };
    (&raw[..start], Some(block))
}

/// A later value for the same field replaces the earlier one.
fn push_fact(facts: &mut Vec<(String, String)>, field: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    match facts.iter_mut().find(|(f, _)| f == field) {
        Some(existing) => existing.1 = value.to_string(),
        None => facts.push((field.to_string(), value.to_string())),
    }
}
