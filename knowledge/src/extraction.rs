//! AI-assisted knowledge extraction from chunks.
//!
//! The model is asked for a JSON array of knowledge items per chunk. Any
//! malformed answer counts as "nothing worth keeping" for that chunk.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chatrag_llm::json::parse_first_array;
use chatrag_llm::{ChatMessage, GenerateOptions, LanguageModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fragment::FragmentDraft;

const EXTRACTION_PROMPT: &str = "You extract reusable knowledge for a customer-support bot.\n\
Read the document chunk and return ONLY a JSON array. Each element:\n\
{\"entityId\": \"stable-kebab-case-id of the product, service, policy or topic\",\n \
\"title\": \"short title\",\n \
\"content\": \"self-contained factual text, keep numbers and prices exact\",\n \
\"keywords\": [\"search\", \"terms\"],\n \
\"type\": \"entity\" | \"fact\" | \"table\",\n \
\"confidence\": 0.0-1.0}\n\
Use the same entityId for every item about the same subject.\n\
Return [] if the chunk is navigation, boilerplate or otherwise noise.";

/// What kind of knowledge an item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Entity,
    #[default]
    Fact,
    Table,
}

/// Which chunk an item was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl From<&FragmentDraft> for Provenance {
    fn from(draft: &FragmentDraft) -> Self {
        Self {
            chunk_id: draft.chunk_id.clone(),
            chunk_index: draft.chunk_index,
            start_offset: draft.start_offset,
            end_offset: draft.end_offset,
        }
    }
}

/// One knowledge item proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub entity_id: Option<String>,
    pub title: String,
    pub content: String,
    pub keywords: BTreeSet<String>,
    pub kind: ItemKind,
    pub confidence: f32,
    pub provenance: Vec<Provenance>,
}

/// The shape the model is asked for. Everything but `content` is optional.
#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default, rename = "entityId", alias = "entity_id")]
    entity_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

impl RawItem {
    fn into_item(self, provenance: Provenance) -> Option<ExtractedItem> {
        let content = self.content.trim().to_string();
        if content.is_empty() {
            return None;
        }

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let entity_id = self
            .entity_id
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .or_else(|| title.clone());

        let kind = match self.kind.as_deref().map(str::to_lowercase).as_deref() {
            Some("entity") => ItemKind::Entity,
            Some("table") => ItemKind::Table,
            _ => ItemKind::Fact,
        };

        Some(ExtractedItem {
            entity_id,
            title: title.unwrap_or_default(),
            content,
            keywords: self
                .keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            kind,
            confidence: self.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
            provenance: vec![provenance],
        })
    }
}

/// Asks a language model to turn chunks into knowledge items.
pub struct KnowledgeExtractor {
    model: Arc<dyn LanguageModel>,
    options: GenerateOptions,
}

impl KnowledgeExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            options: GenerateOptions::structured(1500),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Extract items from one chunk. Model errors and malformed output yield `[]`.
    pub async fn extract(&self, draft: &FragmentDraft) -> Vec<ExtractedItem> {
        let mut user = String::new();
        if let Some(heading) = &draft.heading {
            user.push_str(&format!("Section: {heading}\n\n"));
        }
        user.push_str(&draft.content);

        let messages = [ChatMessage::system(EXTRACTION_PROMPT), ChatMessage::user(user)];

        let completion = match self.model.generate(&messages, self.options).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Extraction skipped for {}: {e}", draft.chunk_id);
                return Vec::new();
            }
        };

        let raw: Vec<RawItem> = match parse_first_array(&completion) {
            Ok(items) => items,
            Err(e) => {
                warn!("Discarding malformed extraction for {}: {e}", draft.chunk_id);
                return Vec::new();
            }
        };

        let items: Vec<ExtractedItem> = raw
            .into_iter()
            .filter_map(|item| item.into_item(Provenance::from(draft)))
            .collect();

        debug!("Extracted {} items from {}", items.len(), draft.chunk_id);
        items
    }
}

/// Collapse items describing the same subject.
///
/// Items sharing a lower-cased entity id are merged: content is appended
/// unless already contained, keywords are unioned, the longest title and the
/// highest confidence win. Entity-less items whose content already appears in
/// a kept item are dropped.
pub fn merge_extracted(items: Vec<ExtractedItem>) -> Vec<ExtractedItem> {
    let mut merged: Vec<ExtractedItem> = Vec::new();
    let mut by_entity: HashMap<String, usize> = HashMap::new();
    let mut loose: Vec<ExtractedItem> = Vec::new();

    for item in items {
        let Some(key) = item.entity_id.as_ref().map(|e| e.to_lowercase()) else {
            loose.push(item);
            continue;
        };

        match by_entity.get(&key) {
            Some(&index) => {
                let target = &mut merged[index];
                if !target.content.contains(&item.content) {
                    target.content.push_str("\n\n");
                    target.content.push_str(&item.content);
                }
                target.keywords.extend(item.keywords);
                if item.title.chars().count() > target.title.chars().count() {
                    target.title = item.title;
                }
                target.confidence = target.confidence.max(item.confidence);
                target.provenance.extend(item.provenance);
            }
            None => {
                by_entity.insert(key, merged.len());
                merged.push(item);
            }
        }
    }

    for item in loose {
        if merged.iter().any(|kept| kept.content.contains(&item.content)) {
            continue;
        }
        merged.push(item);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatrag_llm::{LlmError, Result as LlmResult};
    use pretty_assertions::assert_eq;

    use crate::fragment::SourceMeta;

    struct Canned(LlmResult<String>);

    #[async_trait]
    impl LanguageModel for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _: &[ChatMessage], options: GenerateOptions) -> LlmResult<String> {
            assert_eq!(options.temperature, 0.0);
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(LlmError::Transport("down".to_string())),
            }
        }
    }

    fn draft() -> FragmentDraft {
        FragmentDraft {
            chunk_id: "doc-0-0-abcdef".to_string(),
            chunk_index: 0,
            content: "Pro plan: 500k/month. Basic plan: 200k/month.".to_string(),
            start_offset: 0,
            end_offset: 46,
            heading: None,
            source: SourceMeta::default(),
        }
    }

    fn item(entity: Option<&str>, title: &str, content: &str, confidence: f32) -> ExtractedItem {
        ExtractedItem {
            entity_id: entity.map(String::from),
            title: title.to_string(),
            content: content.to_string(),
            keywords: BTreeSet::new(),
            kind: ItemKind::Fact,
            confidence,
            provenance: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_extracts_fenced_array() {
        let reply = "Sure!\n```json\n[{\"entityId\": \"pro-plan\", \"title\": \"Pro\", \
                     \"content\": \"Pro plan costs 500k/month\", \"keywords\": [\"Pro\", \"price\"], \
                     \"type\": \"entity\", \"confidence\": 0.9},\
                     {\"title\": \"Basic\", \"content\": \"Basic plan costs 200k/month\"}]\n```";
        let extractor = KnowledgeExtractor::new(Arc::new(Canned(Ok(reply.to_string()))));

        let items = extractor.extract(&draft()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].entity_id.as_deref(), Some("pro-plan"));
        assert_eq!(items[0].kind, ItemKind::Entity);
        assert!(items[0].keywords.contains("pro"));
        // Missing entity id falls back to the title, missing confidence to 0.8.
        assert_eq!(items[1].entity_id.as_deref(), Some("Basic"));
        assert_eq!(items[1].confidence, 0.8);
        assert_eq!(items[1].provenance[0].chunk_id, "doc-0-0-abcdef");
    }

    #[tokio::test]
    async fn test_malformed_output_is_empty() {
        let extractor =
            KnowledgeExtractor::new(Arc::new(Canned(Ok("I could not find anything".to_string()))));
        assert!(extractor.extract(&draft()).await.is_empty());

        let broken = KnowledgeExtractor::new(Arc::new(Canned(Ok("[{\"content\": ".to_string()))));
        assert!(broken.extract(&draft()).await.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_is_empty() {
        let extractor = KnowledgeExtractor::new(Arc::new(Canned(Err(LlmError::Timeout(1)))));
        assert!(extractor.extract(&draft()).await.is_empty());
    }

    #[test]
    fn test_merge_groups_by_entity_case_insensitively() {
        let merged = merge_extracted(vec![
            item(Some("Pro-Plan"), "Pro", "Costs 500k.", 0.7),
            item(Some("pro-plan"), "Pro plan", "Includes support.", 0.9),
            item(Some("pro-plan"), "P", "Costs 500k.", 0.5),
            item(None, "", "Includes support.", 0.6),
            item(None, "", "Open 9 to 5.", 0.6),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "Costs 500k.\n\nIncludes support.");
        assert_eq!(merged[0].title, "Pro plan");
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[1].content, "Open 9 to 5.");
    }
}
