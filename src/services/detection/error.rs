// Detection Errors
// Single typed failure surfaced at the request boundary

use thiserror::Error;

const GENERIC_FAILURE_MESSAGE: &str = "The analysis service failed to process this text. Please try again later.";

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Text too short to analyze (need at least {min_chunk_size} characters of content)")]
    InputTooShort { min_chunk_size: usize },
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
    #[error("Inference failed for chunk {chunk_index}: {reason}")]
    InferenceFailure { chunk_index: usize, reason: String },
    #[error("Analysis timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Chunk worker failed: {0}")]
    TaskFailed(String),
}

pub type DetectionResult<T> = Result<T, DetectionError>;

impl DetectionError {
    pub fn inference(chunk_index: usize, reason: impl Into<String>) -> Self {
        Self::InferenceFailure {
            chunk_index,
            reason: reason.into(),
        }
    }

    /// Message safe to show to end users. Only the too-short case carries detail.
    pub fn user_message(&self) -> String {
        match self {
            Self::InputTooShort { min_chunk_size } => format!(
                "Text too short to analyze. Please provide more text (at least {} characters).",
                min_chunk_size
            ),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Whether the request was rejected because of the input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InputTooShort { .. })
    }
}
