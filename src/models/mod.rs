// Hybrid Detect Data Models
// Request-scoped values flowing through the chunk -> features -> verdict pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of handcrafted stylometric features per chunk.
pub const STYLOMETRIC_DIM: usize = 8;

/// Feature names in vector order.
pub const STYLOMETRIC_FEATURE_NAMES: [&str; STYLOMETRIC_DIM] = [
    "avg_word_len",
    "avg_sentence_len",
    "vocab_richness",
    "punctuation_ratio",
    "uppercase_ratio",
    "digit_ratio",
    "whitespace_ratio",
    "stopword_ratio",
];

/// Dense chunk embedding as returned by the embedding model.
pub type SemanticVector = Vec<f32>;

// ============ Chunking ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingOptions {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOffsets {
    /// Character offset (Unicode scalar values, 0-based) into the analyzed text.
    pub start: usize,
    /// Length in characters.
    pub len: usize,
}

impl ChunkOffsets {
    /// End-exclusive character offset.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A fixed-stride window of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub offsets: ChunkOffsets,
    pub text: String,
}

// ============ Stylometry ============

/// Ordered stylometric features; the length is fixed by the type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StylometricVector(pub [f64; STYLOMETRIC_DIM]);

impl StylometricVector {
    pub fn zeros() -> Self {
        Self([0.0; STYLOMETRIC_DIM])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// (name, value) pairs in vector order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        STYLOMETRIC_FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}

/// Named view of a [`StylometricVector`] for reports.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StylometryFeatures {
    pub avg_word_len: f64,
    pub avg_sentence_len: f64,
    pub vocab_richness: f64,
    pub punctuation_ratio: f64,
    pub uppercase_ratio: f64,
    pub digit_ratio: f64,
    pub whitespace_ratio: f64,
    pub stopword_ratio: f64,
}

impl From<&StylometricVector> for StylometryFeatures {
    fn from(v: &StylometricVector) -> Self {
        let [avg_word_len, avg_sentence_len, vocab_richness, punctuation_ratio, uppercase_ratio, digit_ratio, whitespace_ratio, stopword_ratio] =
            v.0;
        Self {
            avg_word_len,
            avg_sentence_len,
            vocab_richness,
            punctuation_ratio,
            uppercase_ratio,
            digit_ratio,
            whitespace_ratio,
            stopword_ratio,
        }
    }
}

// ============ Verdicts ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "AI")]
    Ai,
    Human,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Ai => f.write_str("AI"),
            Label::Human => f.write_str("Human"),
        }
    }
}

/// Document-level verdict. Field names match the public JSON contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub label: Label,
    /// Probability of the predicted class, always in [0.5, 1].
    pub confidence: f64,
    pub chunks_analyzed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub offsets: ChunkOffsets,
    pub ai_probability: f64,
    pub stylometry: StylometryFeatures,
}

// ============ Detection Report ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub request_id: String,
    pub result: DocumentResult,
    pub mean_ai_probability: f64,
    pub chunks: Vec<ChunkResult>,
    pub chunking: ChunkingOptions,
    pub embedding_model: String,
    pub classifier_model: String,
    pub latency_ms: i64,
}

// ============ Default Value Functions ============

fn default_chunk_size() -> usize { 800 }
fn default_min_chunk_size() -> usize { 40 }
