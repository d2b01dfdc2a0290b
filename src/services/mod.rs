// Hybrid Detect Core Services

pub mod text_processor;
pub mod config_store;
pub mod providers;
pub mod detection;

pub use text_processor::*;
pub use config_store::*;
pub use providers::*;

// Re-export detection entry points
pub use detection::{
    aggregate_chunk_probabilities,
    extract_stylometric_features,
    fuse_features,
    ChunkClassifier,
    DetectionError,
    DetectionResult,
    HybridDetector,
    LogisticRegressionClassifier,
};
