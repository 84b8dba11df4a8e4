//! Document chunking for knowledge retrieval.
//!
//! Raw text goes through three passes before it is windowed:
//! 1. Boilerplate: page-number lines and running headers/footers
//! 2. Noise: control characters, opaque encoded runs, stray short lines
//! 3. Sections: markdown headings, else heading-looking paragraphs
//!
//! Each section is then cut by a sliding window of `max_chars` with
//! `overlap_chars` of overlap. All offsets are char offsets into the cleaned
//! text returned by [`Chunker::clean`].

use std::collections::HashMap;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::fragment::{FragmentDraft, SourceMeta};

/// Runs of base64-ish characters longer than this are treated as binary.
const OPAQUE_RUN_CHARS: usize = 100;

/// Configuration for the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Window size in characters.
    pub max_chars: usize,

    /// Characters shared by consecutive windows of a section.
    pub overlap_chars: usize,

    /// Windows shorter than this are only kept when they are a section's only window.
    pub min_chunk_chars: usize,

    /// Cleaned documents shorter than this produce nothing.
    pub min_document_chars: usize,

    /// A short line seen this many times is a running header or footer.
    pub repeated_line_threshold: usize,

    /// Longest line considered for header/footer detection.
    pub max_repeated_line_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            overlap_chars: 600,
            min_chunk_chars: 200,
            min_document_chars: 50,
            repeated_line_threshold: 3,
            max_repeated_line_chars: 80,
        }
    }
}

impl ChunkerConfig {
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_overlap_chars(mut self, overlap_chars: usize) -> Self {
        self.overlap_chars = overlap_chars;
        self
    }

    pub fn with_min_chunk_chars(mut self, min_chunk_chars: usize) -> Self {
        self.min_chunk_chars = min_chunk_chars;
        self
    }

    fn window(&self) -> usize {
        self.max_chars.max(1)
    }

    fn step(&self) -> usize {
        self.window().saturating_sub(self.overlap_chars).max(1)
    }

    fn min_chunk(&self) -> usize {
        self.min_chunk_chars.min(self.window())
    }
}

/// A contiguous span of the cleaned text, in char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    start: usize,
    end: usize,
    heading: Option<String>,
}

/// Splits raw document text into overlapping, noise-free drafts.
pub struct Chunker {
    config: ChunkerConfig,
    page_line: Option<Regex>,
    bare_page_number: Option<Regex>,
    opaque_run: Option<Regex>,
    repeated_spaces: Option<Regex>,
    blank_lines: Option<Regex>,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    /// Create a chunker with the given configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            page_line: Regex::new(r"(?i)^(?:page|trang)\s*\d+(?:\s*(?:/|of|trên)\s*\d+)?$").ok(),
            bare_page_number: Regex::new(r"^-?\s*\d{1,4}\s*-?$").ok(),
            opaque_run: Regex::new(&format!("[A-Za-z0-9+/=]{{{},}}", OPAQUE_RUN_CHARS + 1)).ok(),
            repeated_spaces: Regex::new(" {2,}").ok(),
            blank_lines: Regex::new(r"\n{3,}").ok(),
        }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk `raw_text`, tagging every draft with `source`.
    pub fn chunk(&self, raw_text: &str, source: &SourceMeta) -> Vec<FragmentDraft> {
        let cleaned = self.clean(raw_text);
        let chars: Vec<char> = cleaned.chars().collect();

        if chars.len() < self.config.min_document_chars {
            debug!(
                "Skipping {}: only {} chars after cleaning",
                source.identifier(),
                chars.len()
            );
            return Vec::new();
        }

        let mut spans: Vec<(usize, usize, Option<String>)> = Vec::new();
        for section in self.sections(&cleaned, chars.len()) {
            for (start, end) in self.windows(section.start, section.end) {
                if chars[start..end].iter().all(|c| c.is_whitespace()) {
                    continue;
                }
                spans.push((start, end, section.heading.clone()));
            }
        }

        if spans.is_empty() {
            debug!("No sections in {}, using fixed windows", source.identifier());
            spans = self
                .windows(0, chars.len())
                .into_iter()
                .map(|(start, end)| (start, end, None))
                .collect();
        }

        let source_id = source.identifier();
        let drafts: Vec<FragmentDraft> = spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end, heading))| FragmentDraft {
                chunk_id: chunk_id(&source_id, index, start),
                chunk_index: index,
                content: chars[start..end].iter().collect(),
                start_offset: start,
                end_offset: end,
                heading,
                source: source.clone(),
            })
            .collect();

        debug!("Chunked {source_id} into {} drafts", drafts.len());
        drafts
    }

    /// Normalize whitespace and remove boilerplate and noise.
    pub fn clean(&self, raw_text: &str) -> String {
        let normalized: String = raw_text
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\t', " ")
            .chars()
            .filter(|c| *c == '\n' || !c.is_control())
            .collect();

        let without_blobs = match &self.opaque_run {
            Some(re) => re.replace_all(&normalized, "").into_owned(),
            None => normalized,
        };

        let lines: Vec<String> = without_blobs
            .split('\n')
            .map(|line| {
                let collapsed = match &self.repeated_spaces {
                    Some(re) => re.replace_all(line, " ").into_owned(),
                    None => line.to_string(),
                };
                collapsed.trim().to_string()
            })
            .collect();

        let repeated = self.repeated_lines(&lines);

        let kept: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|line| {
                if line.is_empty() {
                    return true;
                }
                !self.is_page_line(line)
                    && !repeated.contains_key(*line)
                    && line.chars().count() >= 3
            })
            .collect();

        let joined = kept.join("\n");
        let collapsed = match &self.blank_lines {
            Some(re) => re.replace_all(&joined, "\n\n").into_owned(),
            None => joined,
        };
        collapsed.trim().to_string()
    }

    fn is_page_line(&self, line: &str) -> bool {
        self.page_line.as_ref().is_some_and(|re| re.is_match(line))
            || self
                .bare_page_number
                .as_ref()
                .is_some_and(|re| re.is_match(line))
    }

    /// Short lines that occur often enough to be running headers or footers.
    fn repeated_lines<'a>(&self, lines: &'a [String]) -> HashMap<&'a str, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for line in lines {
            let len = line.chars().count();
            if len > 0 && len <= self.config.max_repeated_line_chars {
                *counts.entry(line.as_str()).or_insert(0) += 1;
            }
        }
        counts.retain(|_, count| *count >= self.config.repeated_line_threshold);
        counts
    }

    /// Partition the cleaned text into contiguous sections.
    fn sections(&self, cleaned: &str, total_chars: usize) -> Vec<Section> {
        let lines = lines_with_offsets(cleaned);

        let mut starts: Vec<(usize, Option<String>)> = lines
            .iter()
            .filter_map(|(offset, line)| markdown_heading(line).map(|title| (*offset, Some(title))))
            .collect();

        if starts.is_empty() {
            // Paragraph starts whose first line looks like a heading.
            let mut previous_blank = true;
            for (offset, line) in &lines {
                let blank = line.trim().is_empty();
                if previous_blank && !blank {
                    if let Some(title) = plain_heading(line) {
                        starts.push((*offset, Some(title)));
                    }
                }
                previous_blank = blank;
            }
        }

        if starts.first().is_none_or(|(offset, _)| *offset != 0) {
            starts.insert(0, (0, None));
        }

        let mut sections = Vec::with_capacity(starts.len());
        for (i, (start, heading)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(total_chars, |(next, _)| *next);
            if end > *start {
                sections.push(Section {
                    start: *start,
                    end,
                    heading: heading.clone(),
                });
            }
        }
        sections
    }

    /// Sliding windows over `[start, end)`.
    ///
    /// Stops at the first window that reaches `end`. A short tail is only
    /// possible when the overlap is smaller than `min_chunk_chars`; it is pulled
    /// back to `min_chunk_chars` so no text goes unindexed.
    fn windows(&self, start: usize, end: usize) -> Vec<(usize, usize)> {
        let window = self.config.window();
        let step = self.config.step();
        let min_chunk = self.config.min_chunk();

        let mut out: Vec<(usize, usize)> = Vec::new();
        let mut pos = start;
        while pos < end {
            let window_end = (pos + window).min(end);
            if !out.is_empty() && window_end - pos < min_chunk {
                out.push((window_end.saturating_sub(min_chunk).max(start), window_end));
            } else {
                out.push((pos, window_end));
            }
            if window_end == end {
                break;
            }
            pos += step;
        }
        out
    }
}

/// Deterministic id: source, index, offset, and a short digest of the three.
fn chunk_id(source_id: &str, index: usize, offset: usize) -> String {
    let digest = Sha256::digest(format!("{source_id}|{index}|{offset}").as_bytes());
    let short: String = digest.iter().take(3).map(|b| format!("{b:02x}")).collect();
    format!("{source_id}-{index}-{offset}-{short}")
}

/// Split on `\n`, pairing each line with its starting char offset.
fn lines_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        out.push((offset, line));
        offset += line.chars().count() + 1;
    }
    out
}

/// `# Title` through `###### Title`.
fn markdown_heading(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// ALL-CAPS lines of at least ten characters, or lines ending with a colon.
fn plain_heading(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let len = trimmed.chars().count();

    let all_caps = len >= 10
        && trimmed.chars().any(char::is_alphabetic)
        && !trimmed.chars().any(char::is_lowercase);
    let label = len > 1 && trimmed.ends_with(':');

    (all_caps || label).then(|| trimmed.trim_end_matches(':').trim().to_string())
}
