//! Knowledge fragment data model.

use std::collections::BTreeSet;
use std::fmt;

use chatrag_embeddings::Embedding;
use serde::{Deserialize, Serialize};

/// Identifies the bot whose knowledge base and customers are addressed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotScope(String);

impl BotScope {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BotScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BotScope {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for BotScope {
    fn from(code: String) -> Self {
        Self(code)
    }
}

/// Where a fragment's text came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Original file name.
    pub filename: Option<String>,

    /// Source URL for crawled pages.
    pub url: Option<String>,

    /// Human-readable document title.
    pub title: Option<String>,

    /// Page number within the source document.
    pub page: Option<u32>,

    /// MIME type the text was extracted from.
    pub mime_type: Option<String>,
}

impl SourceMeta {
    pub fn from_filename(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Default::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Stable identifier used in chunk ids.
    pub fn identifier(&self) -> String {
        let base = self
            .filename
            .as_deref()
            .or(self.url.as_deref())
            .or(self.title.as_deref())
            .unwrap_or("document");
        match self.page {
            Some(page) => format!("{base}#p{page}"),
            None => base.to_string(),
        }
    }
}

/// An unembedded chunk produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDraft {
    /// Deterministic id derived from source, index, and offset.
    pub chunk_id: String,

    /// Position of this chunk in the document's chunk sequence.
    pub chunk_index: usize,

    pub content: String,

    /// Char offset of the first character in the cleaned text.
    pub start_offset: usize,

    /// Char offset one past the last character.
    pub end_offset: usize,

    /// Heading of the section the chunk was cut from.
    pub heading: Option<String>,

    pub source: SourceMeta,
}

impl FragmentDraft {
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// A stored, searchable piece of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFragment {
    pub chunk_id: String,

    pub content: String,

    pub keywords: BTreeSet<String>,

    /// Vector for semantic search; absent until embedded.
    pub embedding: Option<Embedding>,

    /// Model that produced `embedding`.
    pub embedding_model: Option<String>,

    /// Canonical grouping key assigned by AI extraction.
    pub entity_id: Option<String>,

    pub title: Option<String>,

    pub source: SourceMeta,

    pub chunk_index: usize,

    pub start_offset: usize,

    pub end_offset: usize,
}

impl KnowledgeFragment {
    /// Wrap a draft with no enrichment.
    pub fn from_draft(draft: FragmentDraft, keywords: BTreeSet<String>) -> Self {
        Self {
            chunk_id: draft.chunk_id,
            content: draft.content,
            keywords,
            embedding: None,
            embedding_model: None,
            entity_id: None,
            title: draft.heading,
            source: draft.source,
            chunk_index: draft.chunk_index,
            start_offset: draft.start_offset,
            end_offset: draft.end_offset,
        }
    }

    pub fn with_embedding(mut self, embedding: Embedding, model: impl Into<String>) -> Self {
        self.embedding = Some(embedding);
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// The text that gets embedded: title and keywords sharpen short items.
    pub fn embedding_text(&self) -> String {
        let mut text = String::new();
        if let Some(title) = &self.title {
            text.push_str(title);
            text.push('\n');
        }
        text.push_str(&self.content);
        if !self.keywords.is_empty() {
            text.push('\n');
            text.push_str(&self.keywords.iter().cloned().collect::<Vec<_>>().join(", "));
        }
        text
    }
}

/// A keyword-search match as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextHit {
    pub chunk_id: String,
    pub content: String,
    pub keywords: BTreeSet<String>,
    pub entity_id: Option<String>,
    /// Store-native relevance.
    pub score: f32,
}
