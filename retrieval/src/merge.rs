//! Merge and cluster retrieval candidates into knowledge items.
//!
//! ```text
//! candidates ──┬── entity id ──► group by lowercased id ──┐
//!              │                                          ├──► sort by score ──► top `limit`
//!              └── no entity ──► cluster (cosine | overlap)┘
//! ```

use std::collections::BTreeSet;

use chatrag_embeddings::cosine_similarity;
use indexmap::IndexMap;

use crate::candidate::{MergedKnowledgeItem, RetrievalCandidate};

/// Joins distinct contents of one group.
pub const CONTENT_SEPARATOR: &str = "\n\n";

/// Collapse candidates describing the same thing into one item each.
///
/// Entity-bearing candidates are grouped by entity id. The rest are clustered
/// by cosine similarity at `max(cluster_floor, threshold)` when every one of
/// them carries an embedding, or by content containment and keyword overlap
/// otherwise.
pub fn merge(
    candidates: Vec<RetrievalCandidate>,
    limit: usize,
    threshold: f32,
    cluster_floor: f32,
) -> Vec<MergedKnowledgeItem> {
    let (with_entity, without_entity): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| c.entity_key().is_some());

    let mut groups: IndexMap<String, Vec<RetrievalCandidate>> = IndexMap::new();
    for candidate in with_entity {
        if let Some(key) = candidate.entity_key() {
            groups.entry(key).or_default().push(candidate);
        }
    }

    let mut items: Vec<MergedKnowledgeItem> = groups.into_values().map(combine).collect();

    let clusters = if without_entity.iter().all(|c| c.embedding.is_some()) {
        cluster_by_similarity(without_entity, cluster_floor.max(threshold))
    } else {
        cluster_by_overlap(without_entity)
    };
    items.extend(clusters.into_iter().map(combine));

    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    items.truncate(limit);
    items
}

/// Greedy seed clustering: each unassigned candidate seeds a cluster and
/// absorbs every unassigned candidate similar enough to it.
fn cluster_by_similarity(
    candidates: Vec<RetrievalCandidate>,
    min_similarity: f32,
) -> Vec<Vec<RetrievalCandidate>> {
    group_by_seed(candidates, |seed, other| {
        match (&seed.embedding, &other.embedding) {
            (Some(a), Some(b)) => cosine_similarity(a, b) >= min_similarity,
            _ => false,
        }
    })
}

fn cluster_by_overlap(candidates: Vec<RetrievalCandidate>) -> Vec<Vec<RetrievalCandidate>> {
    group_by_seed(candidates, overlaps)
}

fn group_by_seed<F>(candidates: Vec<RetrievalCandidate>, joins: F) -> Vec<Vec<RetrievalCandidate>>
where
    F: Fn(&RetrievalCandidate, &RetrievalCandidate) -> bool,
{
    let mut assigned = vec![false; candidates.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for seed in 0..candidates.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];
        for other in (seed + 1)..candidates.len() {
            if !assigned[other] && joins(&candidates[seed], &candidates[other]) {
                assigned[other] = true;
                members.push(other);
            }
        }
        clusters.push(members);
    }

    let mut slots: Vec<Option<RetrievalCandidate>> = candidates.into_iter().map(Some).collect();
    clusters
        .into_iter()
        .map(|members| {
            members
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect()
        })
        .collect()
}

/// One content contains the other, or the keyword sets share at least half
/// of the smaller one.
fn overlaps(a: &RetrievalCandidate, b: &RetrievalCandidate) -> bool {
    let (left, right) = (a.content.trim(), b.content.trim());
    if !left.is_empty() && !right.is_empty() && (left.contains(right) || right.contains(left)) {
        return true;
    }

    let smaller = a.keywords.len().min(b.keywords.len());
    if smaller == 0 {
        return false;
    }
    let shared = a.keywords.intersection(&b.keywords).count();
    shared >= 1 && shared * 2 >= smaller
}

fn combine(group: Vec<RetrievalCandidate>) -> MergedKnowledgeItem {
    let mut contents: Vec<&str> = Vec::new();
    let mut keywords = BTreeSet::new();
    let mut provenance = Vec::with_capacity(group.len());
    let mut total = 0.0;

    for candidate in &group {
        let content = candidate.content.trim();
        if !content.is_empty() && !contents.contains(&content) {
            contents.push(content);
        }
        keywords.extend(candidate.keywords.iter().cloned());
        provenance.push(candidate.chunk_id.clone());
        total += candidate.score;
    }

    let score = if group.is_empty() {
        0.0
    } else {
        total / group.len() as f32
    };

    MergedKnowledgeItem {
        entity_id: group.iter().find_map(|c| c.entity_id.clone()),
        content: contents.join(CONTENT_SEPARATOR),
        keywords,
        score,
        provenance,
    }
}
