//! Document ingestion: chunk, enrich, embed, store.

use std::collections::BTreeSet;
use std::sync::Arc;

use chatrag_embeddings::{Embedder, Embedding};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::error::Result;
use crate::extraction::{ExtractedItem, KnowledgeExtractor, merge_extracted};
use crate::fragment::{BotScope, FragmentDraft, KnowledgeFragment, SourceMeta};
use crate::keywords::{DEFAULT_MAX_KEYWORDS, derive_keywords};
use crate::store::KnowledgeStore;

/// What one ingestion produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks cut from the document.
    pub drafts: usize,

    /// Fragments written to the store.
    pub fragments: usize,

    /// Fragments that came from AI extraction.
    pub extracted: usize,

    /// Fragments stored without a vector because embedding failed.
    pub unembedded: usize,
}

/// Builds a bot's knowledge base from raw document text.
pub struct Ingestor {
    chunker: Chunker,
    extractor: Option<KnowledgeExtractor>,
    embedder: Arc<Embedder>,
    store: Arc<dyn KnowledgeStore>,
}

impl Ingestor {
    pub fn new(chunker: Chunker, embedder: Arc<Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            chunker,
            extractor: None,
            embedder,
            store,
        }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Enrich chunks with AI extraction before storing them.
    pub fn with_extractor(mut self, extractor: KnowledgeExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Ingest one document into `bot`'s knowledge base.
    pub async fn ingest(
        &self,
        bot: &BotScope,
        raw_text: &str,
        source: &SourceMeta,
    ) -> Result<IngestReport> {
        let drafts = self.chunker.chunk(raw_text, source);
        let mut report = IngestReport {
            drafts: drafts.len(),
            ..Default::default()
        };
        if drafts.is_empty() {
            return Ok(report);
        }

        let mut fragments = match &self.extractor {
            Some(extractor) => self.extract_all(extractor, &drafts).await,
            None => Vec::new(),
        };
        report.extracted = fragments.len();

        // Nothing extracted at all, whether the model is down or every chunk
        // was judged noise: index the raw drafts rather than nothing.
        if fragments.is_empty() {
            fragments = drafts
                .into_iter()
                .map(|draft| {
                    let keywords = derive_keywords(&draft.content, DEFAULT_MAX_KEYWORDS);
                    KnowledgeFragment::from_draft(draft, keywords)
                })
                .collect();
        }

        let vectors = self.vectors_for(&fragments).await;
        let mut embedded = Vec::with_capacity(fragments.len());
        for (fragment, vector) in fragments.into_iter().zip(vectors) {
            match vector {
                Some(vector) => {
                    embedded.push(fragment.with_embedding(vector, self.embedder.model_name()))
                }
                None => {
                    report.unembedded += 1;
                    embedded.push(fragment);
                }
            }
        }

        report.fragments = embedded.len();
        self.store.upsert_fragments(bot, embedded).await?;

        info!(
            "Ingested {} into {bot}: {} drafts, {} fragments",
            source.identifier(),
            report.drafts,
            report.fragments
        );
        Ok(report)
    }

    async fn extract_all(
        &self,
        extractor: &KnowledgeExtractor,
        drafts: &[FragmentDraft],
    ) -> Vec<KnowledgeFragment> {
        let mut items: Vec<ExtractedItem> = Vec::new();
        for draft in drafts {
            items.extend(extractor.extract(draft).await);
        }

        merge_extracted(items)
            .into_iter()
            .enumerate()
            .filter_map(|(n, item)| {
                let first = item.provenance.first()?.clone();
                let source = drafts
                    .get(first.chunk_index)
                    .map(|d| d.source.clone())
                    .unwrap_or_default();
                let mut keywords: BTreeSet<String> = item.keywords;
                if keywords.is_empty() {
                    keywords = derive_keywords(&item.content, DEFAULT_MAX_KEYWORDS);
                }
                Some(KnowledgeFragment {
                    chunk_id: format!("{}-e{n}", first.chunk_id),
                    content: item.content,
                    keywords,
                    embedding: None,
                    embedding_model: None,
                    entity_id: item.entity_id,
                    title: (!item.title.is_empty()).then_some(item.title),
                    source,
                    chunk_index: first.chunk_index,
                    start_offset: first.start_offset,
                    end_offset: item
                        .provenance
                        .iter()
                        .map(|p| p.end_offset)
                        .max()
                        .unwrap_or(first.end_offset),
                })
            })
            .collect()
    }

    /// One vector per fragment, in order. A failed batch is retried one
    /// fragment at a time so a single bad text does not cost the rest.
    async fn vectors_for(&self, fragments: &[KnowledgeFragment]) -> Vec<Option<Embedding>> {
        let texts: Vec<String> = fragments
            .iter()
            .map(KnowledgeFragment::embedding_text)
            .collect();
        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => return vectors.into_iter().map(Some).collect(),
            Err(e) => warn!("Batch embedding failed, embedding one by one: {e}"),
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (fragment, text) in fragments.iter().zip(&texts) {
            match self.embedder.embed(text).await {
                Ok(vector) => vectors.push(Some(vector)),
                Err(e) => {
                    warn!("Storing {} without embedding: {e}", fragment.chunk_id);
                    vectors.push(None);
                }
            }
        }
        vectors
    }

    /// Re-embed fragments whose vectors came from a different model.
    ///
    /// Returns how many were updated. In hashing mode nothing is touched, so
    /// neural vectors survive a temporary outage.
    pub async fn reembed_stale(&self, bot: &BotScope) -> Result<usize> {
        if !self.embedder.mode().is_neural() {
            warn!("Skipping re-embedding of {bot}: no neural model available");
            return Ok(0);
        }

        let active = self.embedder.model_name();
        let stale: Vec<KnowledgeFragment> = self
            .store
            .find_fragments(bot)
            .await?
            .into_iter()
            .filter(|f| f.embedding_model.as_deref() != Some(active))
            .collect();

        let vectors = self.vectors_for(&stale).await;
        let updated: Vec<KnowledgeFragment> = stale
            .into_iter()
            .zip(vectors)
            .filter_map(|(fragment, vector)| Some(fragment.with_embedding(vector?, active)))
            .collect();

        let count = updated.len();
        if count > 0 {
            self.store.upsert_fragments(bot, updated).await?;
            info!("Re-embedded {count} fragments of {bot} with {active}");
        }
        Ok(count)
    }
}
