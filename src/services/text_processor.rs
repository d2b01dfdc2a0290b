// Text Processing Service
// Fixed-stride chunking plus the word/sentence tokenization used by stylometry

use crate::models::{Chunk, ChunkOffsets, ChunkingOptions};
use regex::Regex;
use std::sync::OnceLock;

// Letters, numbers (including superscripts and fractions) and underscore. Combining
// marks are not word characters.
fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").expect("word regex"))
}

fn sentence_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("sentence regex"))
}

/// Split text into non-overlapping windows of `chunk_size` characters.
///
/// Windows are taken at a fixed stride with no sentence alignment. A window is kept
/// only when its trimmed length is at least `min_chunk_size` characters, so the
/// result may be empty; interpreting that is up to the caller.
pub fn chunk_text(text: &str, chunk_size: usize, min_chunk_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if chunk_size == 0 || text.is_empty() {
        return chunks;
    }

    // Byte position of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let mut start = 0usize;
    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        let window = &text[boundaries[start]..boundaries[end]];

        if trim_space(window).chars().count() >= min_chunk_size {
            chunks.push(Chunk {
                index: chunks.len(),
                offsets: ChunkOffsets {
                    start,
                    len: end - start,
                },
                text: window.to_string(),
            });
        }

        start += chunk_size;
    }

    chunks
}

/// Chunk with the given options.
pub fn chunk_with_options(text: &str, options: &ChunkingOptions) -> Vec<Chunk> {
    chunk_text(text, options.chunk_size, options.min_chunk_size)
}

/// Unicode whitespace plus the information separators U+001C..=U+001F.
pub fn is_space(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Trim both ends by [`is_space`].
pub fn trim_space(text: &str) -> &str {
    text.trim_matches(is_space)
}

/// Maximal runs of word characters.
pub fn word_tokens(text: &str) -> Vec<&str> {
    word_re().find_iter(text).map(|m| m.as_str()).collect()
}

/// Naive sentence split on runs of `.`, `!`, `?`; whitespace-only spans are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_break_re()
        .split(text)
        .filter(|s| !trim_space(s).is_empty())
        .collect()
}
