// Stylometric Feature Extraction
// Eight surface-level statistics per chunk; no model required.

use crate::models::StylometricVector;
use crate::services::text_processor::{is_space, split_sentences, trim_space, word_tokens};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Closed stopword set used by the stopword ratio.
pub const STOPWORDS: [&str; 22] = [
    "the", "is", "in", "and", "to", "of", "a", "that", "it", "on", "for", "as", "with", "was",
    "were", "be", "by", "this", "are", "from", "or", "at",
];

const PUNCTUATION: [char; 5] = ['.', ',', ';', '!', '?'];

// Decimal digits plus digit-valued superscripts, subscripts and circled or
// parenthesized forms. Fractions and roman numerals are not digits.
fn digit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"[\p{Nd}\x{B2}\x{B3}\x{B9}\x{1369}-\x{1371}\x{19DA}\x{2070}\x{2074}-\x{2079}",
            r"\x{2080}-\x{2089}\x{2460}-\x{2468}\x{2474}-\x{247C}\x{2488}-\x{2490}\x{24EA}",
            r"\x{24F5}-\x{24FD}\x{24FF}\x{2776}-\x{277E}\x{2780}-\x{2788}\x{278A}-\x{2792}",
            r"\x{10A40}-\x{10A43}\x{10E60}-\x{10E68}\x{11052}-\x{1105A}\x{1E8C7}-\x{1E8CF}",
            r"\x{1F100}-\x{1F10A}]",
        ))
        .expect("digit regex")
    })
}

fn is_digit(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_digit();
    }
    let mut buf = [0u8; 4];
    digit_re().is_match(c.encode_utf8(&mut buf))
}

fn is_stopword(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOPWORDS.contains(&lower.as_str())
}

/// Compute the stylometric vector for a chunk.
///
/// Order: average word length, average sentence length (words per sentence),
/// vocabulary richness, then punctuation / uppercase / digit / whitespace ratios over
/// the untrimmed character count, then stopword ratio. Blank input and input without
/// any word characters both yield the zero vector.
pub fn extract_stylometric_features(text: &str) -> StylometricVector {
    if trim_space(text).is_empty() {
        return StylometricVector::zeros();
    }

    let words = word_tokens(text);
    if words.is_empty() {
        return StylometricVector::zeros();
    }

    let sentence_count = split_sentences(text).len();
    let word_count = words.len() as f64;

    let avg_word_len = words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / word_count;
    let avg_sentence_len = word_count / sentence_count.max(1) as f64;
    let unique: HashSet<&str> = words.iter().copied().collect();
    let vocab_richness = unique.len() as f64 / word_count;

    let mut total = 0usize;
    let mut punctuation = 0usize;
    let mut uppercase = 0usize;
    let mut digits = 0usize;
    let mut whitespace = 0usize;
    for c in text.chars() {
        total += 1;
        if PUNCTUATION.contains(&c) {
            punctuation += 1;
        }
        if c.is_uppercase() {
            uppercase += 1;
        }
        if is_digit(c) {
            digits += 1;
        }
        if is_space(c) {
            whitespace += 1;
        }
    }
    let total = total as f64;

    let stopwords = words.iter().filter(|w| is_stopword(w)).count() as f64;

    StylometricVector([
        avg_word_len,
        avg_sentence_len,
        vocab_richness,
        punctuation as f64 / total,
        uppercase as f64 / total,
        digits as f64 / total,
        whitespace as f64 / total,
        stopwords / word_count,
    ])
}
