// Hybrid Detector
// chunk -> (stylometry + embedding) -> fusion -> classifier -> aggregation
//
// Chunks are scored concurrently; any chunk failure fails the whole request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Chunk, ChunkOffsets, ChunkResult, ChunkingOptions, DetectionReport, DocumentResult};
use crate::services::config_store::{AppConfig, ConfigStore, DetectionConfig};
use crate::services::providers::{get_api_key, EmbeddingProvider, HttpEmbeddingProvider};
use crate::services::text_processor::{chunk_with_options, is_space, trim_space};

use super::aggregation::{aggregate_chunk_probabilities, mean_probability, single_pass_result};
use super::classifier::{ChunkClassifier, LogisticRegressionClassifier};
use super::error::{DetectionError, DetectionResult};
use super::fusion::{fuse_features, fused_dim};
use super::stylometry::extract_stylometric_features;

const WARM_UP_TEXT: &str = "This is a short warm-up sentence used to check the embedding service.";

/// Request-scoped pipeline over shared, read-only collaborators.
#[derive(Clone)]
pub struct HybridDetector {
    embedder: Arc<dyn EmbeddingProvider>,
    classifier: Arc<dyn ChunkClassifier>,
    config: DetectionConfig,
}

impl HybridDetector {
    /// Wire collaborators together. Fails if the classifier was calibrated for a
    /// different fused dimension than this embedder produces.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        classifier: Arc<dyn ChunkClassifier>,
        config: DetectionConfig,
    ) -> DetectionResult<Self> {
        config
            .validate()
            .map_err(|e| DetectionError::Config(e.to_string()))?;

        let expected = fused_dim(embedder.dimensions());
        if classifier.input_dim() != expected {
            return Err(DetectionError::CollaboratorUnavailable(format!(
                "classifier {} expects {} features but embedder {} yields {} (+ stylometry = {})",
                classifier.model_id(),
                classifier.input_dim(),
                embedder.model_id(),
                embedder.dimensions(),
                expected
            )));
        }

        Ok(Self {
            embedder,
            classifier,
            config,
        })
    }

    /// Build the HTTP embedder and the logistic-regression classifier from config.
    pub fn from_config(store: &ConfigStore, config: &AppConfig) -> DetectionResult<Self> {
        let api_key = get_api_key(Some(store));
        let embedder = HttpEmbeddingProvider::new(&config.embedding, api_key).map_err(|e| {
            DetectionError::CollaboratorUnavailable(format!("embedding provider: {}", e))
        })?;

        let weights_path = store.classifier_path(config);
        let classifier = LogisticRegressionClassifier::load(&weights_path)
            .map_err(|e| DetectionError::CollaboratorUnavailable(e.to_string()))?;

        Self::new(Arc::new(embedder), Arc::new(classifier), config.detection.clone())
    }

    /// Embed a warm-up sentence once so an unreachable or misconfigured embedding
    /// service fails at startup instead of on the first request.
    pub async fn warm_up(&self) -> DetectionResult<()> {
        let started = Instant::now();
        let vector = self
            .embedder
            .embed(WARM_UP_TEXT, self.config.max_tokens)
            .await
            .map_err(|e| DetectionError::CollaboratorUnavailable(format!("embedding warm-up failed: {}", e)))?;

        if vector.len() != self.embedder.dimensions() {
            return Err(DetectionError::CollaboratorUnavailable(format!(
                "embedding warm-up returned {} dims, expected {}",
                vector.len(),
                self.embedder.dimensions()
            )));
        }

        info!(
            embedder = self.embedder.model_id(),
            classifier = self.classifier.model_id(),
            warm_up_ms = started.elapsed().as_millis(),
            "[HYBRID] collaborators ready"
        );
        Ok(())
    }

    pub fn chunking(&self) -> ChunkingOptions {
        self.config.chunking()
    }

    /// Classify a document of any length by chunk-level scoring and mean aggregation.
    pub async fn predict_long_text(&self, text: &str) -> DetectionResult<DocumentResult> {
        let (result, _) = self.run_chunked(text).await?;
        Ok(result)
    }

    /// Same verdict as [`predict_long_text`](Self::predict_long_text), plus per-chunk detail.
    pub async fn analyze(&self, text: &str) -> DetectionResult<DetectionReport> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        let (result, chunks) = self.run_chunked(text).await?;
        let probabilities: Vec<f64> = chunks.iter().map(|c| c.ai_probability).collect();
        let mean_ai_probability = mean_probability(&probabilities).unwrap_or_default();

        Ok(DetectionReport {
            request_id,
            result,
            mean_ai_probability,
            chunks,
            chunking: self.chunking(),
            embedding_model: self.embedder.model_id().to_string(),
            classifier_model: self.classifier.model_id().to_string(),
            latency_ms: started.elapsed().as_millis() as i64,
        })
    }

    /// Score the whole text as a single unit, without chunking. A 0.5 tie is Human.
    pub async fn predict_text(&self, text: &str) -> DetectionResult<DocumentResult> {
        let trimmed = trim_space(text);
        if trimmed.is_empty() {
            return Err(DetectionError::InputTooShort {
                min_chunk_size: self.config.min_chunk_size,
            });
        }

        let leading = text.len() - text.trim_start_matches(is_space).len();
        let chunk = Chunk {
            index: 0,
            offsets: ChunkOffsets {
                start: text[..leading].chars().count(),
                len: trimmed.chars().count(),
            },
            text: trimmed.to_string(),
        };
        let fut = score_chunk(
            Arc::clone(&self.embedder),
            Arc::clone(&self.classifier),
            chunk,
            self.config.max_tokens,
        );
        let scored = self.with_timeout(fut).await?;
        Ok(single_pass_result(scored.ai_probability))
    }

    async fn run_chunked(&self, text: &str) -> DetectionResult<(DocumentResult, Vec<ChunkResult>)> {
        let started = Instant::now();
        let chunking = self.chunking();
        let chunks = chunk_with_options(text, &chunking);
        info!(
            "[HYBRID] Text length: {} chars, chunks: {} (chunk_size={}, min_chunk_size={})",
            text.chars().count(),
            chunks.len(),
            chunking.chunk_size,
            chunking.min_chunk_size
        );

        if chunks.is_empty() {
            return Err(DetectionError::InputTooShort {
                min_chunk_size: chunking.min_chunk_size,
            });
        }

        let chunk_results = self.with_timeout(self.score_chunks(chunks)).await?;
        let probabilities: Vec<f64> = chunk_results.iter().map(|c| c.ai_probability).collect();
        let result = aggregate_chunk_probabilities(&probabilities, chunking.min_chunk_size)?;

        info!(
            label = %result.label,
            confidence = result.confidence,
            chunks = result.chunks_analyzed,
            elapsed_ms = started.elapsed().as_millis(),
            "[HYBRID] verdict"
        );
        Ok((result, chunk_results))
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = DetectionResult<T>>) -> DetectionResult<T> {
        match self.config.request_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
                .await
                .map_err(|_| {
                    warn!("[HYBRID] request timed out after {}s", secs);
                    DetectionError::Timeout { secs }
                })?,
            None => fut.await,
        }
    }

    /// Score all chunks concurrently and return results in chunk order.
    async fn score_chunks(&self, chunks: Vec<Chunk>) -> DetectionResult<Vec<ChunkResult>> {
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut set = JoinSet::new();

        for chunk in chunks {
            let embedder = Arc::clone(&self.embedder);
            let classifier = Arc::clone(&self.classifier);
            let semaphore = Arc::clone(&semaphore);
            let max_tokens = self.config.max_tokens;
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| DetectionError::TaskFailed("semaphore closed".to_string()))?;
                score_chunk(embedder, classifier, chunk, max_tokens).await
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    warn!("[HYBRID] aborting request: {}", e);
                    set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    warn!("[HYBRID] chunk task failed: {}", e);
                    set.abort_all();
                    return Err(DetectionError::TaskFailed(e.to_string()));
                }
            }
        }

        // Aggregation sums in chunk order.
        results.sort_by_key(|r| r.chunk_index);
        Ok(results)
    }
}

async fn score_chunk(
    embedder: Arc<dyn EmbeddingProvider>,
    classifier: Arc<dyn ChunkClassifier>,
    chunk: Chunk,
    max_tokens: usize,
) -> DetectionResult<ChunkResult> {
    let stylometric = extract_stylometric_features(&chunk.text);

    let semantic = embedder
        .embed(&chunk.text, max_tokens)
        .await
        .map_err(|e| DetectionError::inference(chunk.index, format!("embedding: {}", e)))?;
    if semantic.len() != embedder.dimensions() {
        return Err(DetectionError::inference(
            chunk.index,
            format!(
                "embedding has {} dims, expected {}",
                semantic.len(),
                embedder.dimensions()
            ),
        ));
    }

    let fused = fuse_features(&semantic, &stylometric);
    let ai_probability = classifier
        .predict_probability(&fused)
        .map_err(|e| DetectionError::inference(chunk.index, format!("classifier: {}", e)))?;

    Ok(ChunkResult {
        chunk_index: chunk.index,
        offsets: chunk.offsets,
        ai_probability,
        stylometry: (&stylometric).into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Label, STYLOMETRIC_DIM};
    use crate::services::detection::classifier::{ClassifierError, ClassifierOutput};
    use crate::services::detection::fusion::FusedVector;
    use crate::services::providers::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMS: usize = 4;

    /// First component encodes the chunk's first letter; the rest are zero.
    struct LetterEmbedder {
        dims: usize,
        delay_ms: u64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl LetterEmbedder {
        fn new(dims: usize) -> Self {
            Self::with_delay(dims, 0)
        }

        fn with_delay(dims: usize, delay_ms: u64) -> Self {
            Self {
                dims,
                delay_ms,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        async fn embed(&self, text: &str, _max_tokens: usize) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let p = match text.trim_start().chars().next() {
                Some('a') => 0.25,
                Some('b') => 0.75,
                Some('c') => 0.125,
                Some('x') => return Err(ProviderError::MissingContent),
                Some('w') => return Ok(vec![0.5; self.dims + 1]),
                _ => 0.5,
            };
            let mut v = vec![0.0; self.dims];
            v[0] = p;
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model_id(&self) -> &str {
            "letter-embedder"
        }
    }

    /// Returns the first fused feature as the AI probability.
    struct FirstFeatureClassifier {
        input_dim: usize,
        as_distribution: bool,
    }

    impl ChunkClassifier for FirstFeatureClassifier {
        fn predict(&self, features: &FusedVector) -> Result<ClassifierOutput, ClassifierError> {
            let p = features.as_slice()[0];
            Ok(if self.as_distribution {
                ClassifierOutput::Distribution(vec![1.0 - p, p])
            } else {
                ClassifierOutput::Probability(p)
            })
        }

        fn input_dim(&self) -> usize {
            self.input_dim
        }

        fn model_id(&self) -> &str {
            "first-feature"
        }
    }

    fn classifier() -> Arc<dyn ChunkClassifier> {
        Arc::new(FirstFeatureClassifier {
            input_dim: DIMS + STYLOMETRIC_DIM,
            as_distribution: false,
        })
    }

    fn small_chunks() -> DetectionConfig {
        DetectionConfig {
            chunk_size: 100,
            min_chunk_size: 40,
            ..DetectionConfig::default()
        }
    }

    fn detector(config: DetectionConfig) -> HybridDetector {
        HybridDetector::new(Arc::new(LetterEmbedder::new(DIMS)), classifier(), config).unwrap()
    }

    #[tokio::test]
    async fn test_mean_over_chunks_tie_is_ai() {
        let text = format!("{}{}", "a".repeat(100), "b".repeat(100));
        let result = detector(small_chunks()).predict_long_text(&text).await.unwrap();
        assert_eq!(result.label, Label::Ai);
        assert!((result.confidence - 0.5).abs() < 1e-9);
        assert_eq!(result.chunks_analyzed, 2);
    }

    #[tokio::test]
    async fn test_human_verdict() {
        let text = format!("{}{}{}", "c".repeat(100), "a".repeat(100), "c".repeat(100));
        let result = detector(small_chunks()).predict_long_text(&text).await.unwrap();
        assert_eq!(result.label, Label::Human);
        assert!((result.confidence - (1.0 - (0.125 + 0.25 + 0.125) / 3.0)).abs() < 1e-9);
        assert_eq!(result.chunks_analyzed, 3);
    }

    #[tokio::test]
    async fn test_input_too_short() {
        let det = detector(DetectionConfig::default());
        let err = det.predict_long_text("short").await.unwrap_err();
        assert!(matches!(err, DetectionError::InputTooShort { min_chunk_size: 40 }));
        assert!(det.predict_long_text("").await.is_err());
        assert!(det.predict_long_text(&" ".repeat(2000)).await.is_err());
    }

    #[tokio::test]
    async fn test_distribution_output_is_normalized() {
        let clf = Arc::new(FirstFeatureClassifier {
            input_dim: DIMS + STYLOMETRIC_DIM,
            as_distribution: true,
        });
        let det = HybridDetector::new(Arc::new(LetterEmbedder::new(DIMS)), clf, small_chunks()).unwrap();
        let result = det.predict_long_text(&"b".repeat(100)).await.unwrap();
        assert_eq!(result.label, Label::Ai);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_one_failing_chunk_fails_request() {
        let text = format!("{}{}{}", "a".repeat(100), "x".repeat(100), "b".repeat(100));
        let err = detector(small_chunks()).predict_long_text(&text).await.unwrap_err();
        assert!(matches!(err, DetectionError::InferenceFailure { chunk_index: 1, .. }));
    }

    #[tokio::test]
    async fn test_malformed_vector_length_fails_request() {
        let text = format!("{}{}", "a".repeat(100), "w".repeat(100));
        let err = detector(small_chunks()).predict_long_text(&text).await.unwrap_err();
        assert!(matches!(err, DetectionError::InferenceFailure { chunk_index: 1, .. }));
        assert!(!err.user_message().contains("dims"));
    }

    #[test]
    fn test_fused_dimension_mismatch_is_fatal() {
        let clf = Arc::new(FirstFeatureClassifier {
            input_dim: DIMS,
            as_distribution: false,
        });
        let err = HybridDetector::new(Arc::new(LetterEmbedder::new(DIMS)), clf, small_chunks())
            .err()
            .unwrap();
        assert!(matches!(err, DetectionError::CollaboratorUnavailable(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DetectionConfig {
            chunk_size: 0,
            ..DetectionConfig::default()
        };
        let err = HybridDetector::new(Arc::new(LetterEmbedder::new(DIMS)), classifier(), config)
            .err()
            .unwrap();
        assert!(matches!(err, DetectionError::Config(_)));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let text = "The committee reviewed the proposal. It was approved with minor changes, \
                    and the budget for 2024 was set at 1.2 million. Everyone agreed!"
            .repeat(12);
        let det = detector(DetectionConfig::default());
        let first = det.predict_long_text(&text).await.unwrap();
        let second = det.predict_long_text(&text).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let embedder = Arc::new(LetterEmbedder::with_delay(DIMS, 20));
        let config = DetectionConfig {
            max_concurrency: 2,
            ..small_chunks()
        };
        let det = HybridDetector::new(embedder.clone(), classifier(), config).unwrap();

        let text = "a".repeat(1000);
        let result = det.predict_long_text(&text).await.unwrap();
        assert_eq!(result.chunks_analyzed, 10);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 10);
        assert!(embedder.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_request_timeout_aborts() {
        let embedder = Arc::new(LetterEmbedder::with_delay(DIMS, 3_000));
        let config = DetectionConfig {
            request_timeout_secs: Some(1),
            ..small_chunks()
        };
        let det = HybridDetector::new(embedder, classifier(), config).unwrap();
        let err = det.predict_long_text(&"a".repeat(200)).await.unwrap_err();
        assert!(matches!(err, DetectionError::Timeout { secs: 1 }));
    }

    #[tokio::test]
    async fn test_analyze_report_matches_verdict() {
        let text = format!("{}{}{}", "b".repeat(100), "a".repeat(100), "b".repeat(60));
        let det = detector(small_chunks());
        let report = det.analyze(&text).await.unwrap();
        let verdict = det.predict_long_text(&text).await.unwrap();

        assert_eq!(report.result, verdict);
        assert!(Uuid::parse_str(&report.request_id).is_ok());
        assert_eq!(report.chunks.len(), 3);
        let indices: Vec<usize> = report.chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.chunks[2].offsets, ChunkOffsets { start: 200, len: 60 });
        assert_eq!(report.embedding_model, "letter-embedder");
        assert!((report.mean_ai_probability - (0.75 + 0.25 + 0.75) / 3.0).abs() < 1e-9);
        assert!(report.chunks[0].stylometry.avg_word_len > 0.0);
    }

    #[tokio::test]
    async fn test_predict_text_single_pass() {
        let det = detector(small_chunks());
        let result = det.predict_text(&"b".repeat(5000)).await.unwrap();
        assert_eq!(result.chunks_analyzed, 1);
        assert_eq!(result.label, Label::Ai);

        let err = det.predict_text("   ").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_predict_text_tie_is_human() {
        let det = detector(small_chunks());
        // 'z' maps to exactly 0.5
        let result = det.predict_text(&"z".repeat(300)).await.unwrap();
        assert_eq!(result.label, Label::Human);
        assert_eq!(result.confidence, 0.5);

        // the chunked path keeps ties on AI
        let chunked = det.predict_long_text(&"z".repeat(300)).await.unwrap();
        assert_eq!(chunked.label, Label::Ai);
    }

    #[tokio::test]
    async fn test_warm_up() {
        assert!(detector(small_chunks()).warm_up().await.is_ok());
    }
}
