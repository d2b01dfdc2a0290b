// Detection Module
// Hybrid AI text detection organized into specialized submodules:
// - stylometry: Eight hand-crafted writing-style features per chunk
// - fusion: Concatenates the semantic embedding with the stylometric vector
// - classifier: Fused vector -> AI probability (trait + logistic regression)
// - aggregation: Mean of chunk probabilities -> document label and confidence
// - hybrid: Request pipeline tying chunking, embedding and scoring together
// - error: Typed failures surfaced to callers

pub mod error;
pub mod stylometry;
pub mod fusion;
pub mod classifier;
pub mod aggregation;
pub mod hybrid;

// Re-export commonly used items
pub use error::{DetectionError, DetectionResult};
pub use stylometry::{extract_stylometric_features, STOPWORDS};
pub use fusion::{fuse_features, fused_dim, FusedVector};
pub use classifier::{ChunkClassifier, ClassifierError, ClassifierOutput, LogisticRegressionClassifier};
pub use aggregation::{aggregate_chunk_probabilities, mean_probability, single_pass_result, DECISION_THRESHOLD};
pub use hybrid::HybridDetector;
