//! Frequency-based keyword derivation for fragments that skip AI extraction.

use std::collections::{BTreeSet, HashMap};

use chatrag_embeddings::hashing::tokenize;

/// Keywords kept per fragment.
pub const DEFAULT_MAX_KEYWORDS: usize = 8;

const STOP_WORDS: &[&str] = &[
    // English
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "her", "was", "one",
    "our", "out", "has", "have", "had", "this", "that", "with", "from", "they", "will", "would",
    "there", "their", "what", "which", "when", "where", "who", "how", "your", "about", "into",
    "than", "then", "them", "these", "those", "been", "were", "also", "its", "per", "via",
    // Vietnamese
    "của", "và", "các", "những", "được", "cho", "với", "này", "khi", "thì", "là", "có", "không",
    "một", "trong", "để", "đã", "sẽ", "cũng", "như", "theo", "từ", "tại", "bạn", "chúng",
    "tôi", "mình", "nên", "rất", "hay", "hoặc", "nếu", "vào", "ra", "lên",
];

/// Whether `token` (already lower-cased) carries no topical signal.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokens of at least three chars that are not stop words.
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !is_stop_word(t))
        .collect()
}

/// The `max` most frequent content tokens; ties go to the earlier token.
pub fn derive_keywords(text: &str, max: usize) -> BTreeSet<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, token) in content_tokens(text).into_iter().enumerate() {
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));

    ranked.into_iter().take(max).map(|(token, _)| token).collect()
}
