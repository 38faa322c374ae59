//! Text chunking and statistics.
//!
//! Sizes are counted in Unicode scalar values (`chars`), never bytes, so a
//! Bengali or Japanese chunk is bounded the same way an English one is.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Chunk size used when the caller has no preference (matches the translation backend payload limit).
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

// A whitespace run preceded by `.`, `!` or `?`. The punctuation mark is part of the
// match so the sentence can keep it; it is always a single ASCII byte.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("Invalid sentence boundary regex"));

/// Character, word and sentence counts of a text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStats {
    pub characters: usize,
    pub words: usize,
    pub sentences: usize,
}

/// One entry of [`process_batch`].
#[derive(Debug, Clone)]
pub struct ProcessedText {
    pub text: String,
    pub chunks: Vec<String>,
    pub stats: TextStats,
}

/// Splits `text` into trimmed, non-empty sentences.
///
/// A boundary is any whitespace run that follows `.`, `!` or `?`. Abbreviations
/// such as "Dr. Smith" over-split; callers only use sentences as packing units.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last_end = 0;

    for mat in SENTENCE_BOUNDARY.find_iter(text) {
        push_trimmed(&mut sentences, &text[last_end..mat.start() + 1]);
        last_end = mat.end();
    }
    push_trimmed(&mut sentences, &text[last_end..]);

    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, segment: &'a str) {
    let segment = segment.trim();
    if !segment.is_empty() {
        out.push(segment);
    }
}

/// Splits text into chunks of at most `max_chunk_size` characters, keeping
/// sentences whole where possible.
///
/// Sentences are packed greedily. A sentence longer than the limit is broken
/// on whitespace instead; a single word longer than the limit becomes its own
/// chunk, so words are never cut.
pub fn split_into_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = Packer::new(max_chunk_size);

    for sentence in split_sentences(text) {
        if char_len(sentence) > max_chunk_size {
            chunks.extend(current.finish());

            let mut words = Packer::new(max_chunk_size);
            for word in sentence.split_whitespace() {
                chunks.extend(words.push(word));
            }
            chunks.extend(words.finish());
            continue;
        }

        chunks.extend(current.push(sentence));
    }

    chunks.extend(current.finish());
    chunks
}

/// Joins chunks back into a single text.
pub fn combine_chunks<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Greedy accumulator shared by sentence and word packing.
///
/// Every appended unit is charged its length plus one separator; a unit that
/// opens a new chunk after a flush is charged its bare length.
struct Packer<'a> {
    max: usize,
    parts: Vec<&'a str>,
    size: usize,
}

impl<'a> Packer<'a> {
    fn new(max: usize) -> Self {
        Self {
            max,
            parts: Vec::new(),
            size: 0,
        }
    }

    /// Adds a unit, returning the closed chunk if the unit did not fit.
    fn push(&mut self, unit: &'a str) -> Option<String> {
        let len = char_len(unit);
        if self.size + len + 1 <= self.max {
            self.parts.push(unit);
            self.size += len + 1;
            return None;
        }

        let closed = self.finish();
        self.parts.push(unit);
        self.size = len;
        closed
    }

    fn finish(&mut self) -> Option<String> {
        if self.parts.is_empty() {
            return None;
        }
        let chunk = self.parts.join(" ");
        self.parts.clear();
        self.size = 0;
        Some(chunk)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Counts characters, whitespace-delimited words and sentences.
///
/// Sentences use the same boundaries as [`split_into_chunks`].
pub fn text_stats(text: &str) -> TextStats {
    if text.is_empty() {
        return TextStats::default();
    }

    TextStats {
        characters: char_len(text),
        words: text.split_whitespace().count(),
        sentences: split_sentences(text).len(),
    }
}

/// Renders stats as `Characters: 12,345 | Words: 2,001 | Sentences: 97`.
pub fn format_stats(stats: &TextStats) -> String {
    format!(
        "Characters: {} | Words: {} | Sentences: {}",
        group_thousands(stats.characters),
        group_thousands(stats.words),
        group_thousands(stats.sentences)
    )
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Chunks and measures each text of a batch.
pub fn process_batch<S: AsRef<str>>(texts: &[S], max_chunk_size: usize) -> Vec<ProcessedText> {
    texts
        .iter()
        .map(|text| {
            let text = text.as_ref();
            ProcessedText {
                text: text.to_string(),
                chunks: split_into_chunks(text, max_chunk_size),
                stats: text_stats(text),
            }
        })
        .collect()
}
