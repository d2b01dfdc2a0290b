// Configuration Storage Service
// Handles config file read/write and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::providers::PoolingMode;
use crate::models::ChunkingOptions;

pub const CLASSIFIER_PATH_ENV: &str = "HYBRID_DETECT_CLASSIFIER_PATH";
const APP_DIR_NAME: &str = "hybrid-detect";
const MAX_BACKUPS: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid detection config: {0}")]
    Invalid(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Io { path, source }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            max_tokens: default_max_tokens(),
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: None,
        }
    }
}

impl DetectionConfig {
    pub fn chunking(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.chunk_size,
            min_chunk_size: self.min_chunk_size,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunkSize must be > 0".to_string()));
        }
        if self.min_chunk_size > self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "minChunkSize ({}) exceeds chunkSize ({})",
                self.min_chunk_size, self.chunk_size
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("maxTokens must be > 0".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("maxConcurrency must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    #[serde(default)]
    pub pooling: PoolingMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Proxy URL for embedding requests; no proxy when unset.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            pooling: PoolingMode::default(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
        }
    }
}

fn default_chunk_size() -> usize { 800 }
fn default_min_chunk_size() -> usize { 40 }
fn default_max_tokens() -> usize { 512 }
fn default_max_concurrency() -> usize { 4 }
fn default_embedding_url() -> String { "http://127.0.0.1:8080".to_string() }
fn default_embedding_model() -> String { "Yash9911/Ai-Text-Detector".to_string() }
fn default_embedding_dimensions() -> usize { 768 }
fn default_timeout_secs() -> u64 { 60 }
fn default_max_retries() -> usize { 3 }
fn default_weights_path() -> PathBuf { PathBuf::from("hybrid_classifier.json") }

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store backed by an explicit config file; its directory holds backups.
    pub fn from_file(config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(io_err(&self.config_dir))
    }

    /// Load configuration from file; defaults when the file does not exist
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(io_err(&self.config_file))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content).map_err(io_err(&self.config_file))
    }

    /// Classifier weights path: env override, then config (relative to the config dir)
    pub fn classifier_path(&self, config: &AppConfig) -> PathBuf {
        let path = match env::var(CLASSIFIER_PATH_ENV) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => config.classifier.weights_path.clone(),
        };
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(io_err(&backup_dir))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(io_err(&backup_file))?;

        self.cleanup_old_backups(&backup_dir, MAX_BACKUPS)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(io_err(backup_dir))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Timestamped names sort oldest first
        entries.sort_by_key(|e| e.file_name());

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, provider: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.detection.chunk_size, 800);
        assert_eq!(config.detection.min_chunk_size, 40);
        assert_eq!(config.detection.max_tokens, 512);
        assert_eq!(config.embedding.pooling, PoolingMode::Server);
        assert!(config.detection.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"detection": {"chunkSize": 400}, "embedding": {"pooling": "mean"}}"#).unwrap();
        assert_eq!(parsed.detection.chunk_size, 400);
        assert_eq!(parsed.detection.min_chunk_size, 40);
        assert_eq!(parsed.embedding.pooling, PoolingMode::Mean);
        assert_eq!(parsed.embedding.dimensions, 768);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = DetectionConfig::default();
        cfg.chunk_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectionConfig::default();
        cfg.min_chunk_size = 900;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectionConfig::default();
        cfg.max_concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        let config = store.load().unwrap();
        assert_eq!(config.detection.chunk_size, 800);
    }

    #[test]
    fn test_save_load_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("cfg"));

        let mut config = AppConfig::default();
        config.version = "1.0.0".to_string();
        store.save(&config).unwrap();
        store.set_api_key("embedding", "secret").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, "1.0.0");
        assert_eq!(store.get_api_key("embedding").unwrap().as_deref(), Some("secret"));

        store.delete_api_key("embedding").unwrap();
        assert_eq!(store.get_api_key("embedding").unwrap(), None);

        let backups = fs::read_dir(dir.path().join("cfg").join("backups")).unwrap().count();
        assert!(backups >= 1 && backups <= MAX_BACKUPS);
    }

    #[test]
    fn test_classifier_path_relative_to_config_dir() {
        let store = ConfigStore::new(PathBuf::from("/etc/hybrid-detect"));
        let config = AppConfig::default();
        if env::var(CLASSIFIER_PATH_ENV).is_err() {
            assert_eq!(
                store.classifier_path(&config),
                PathBuf::from("/etc/hybrid-detect/hybrid_classifier.json")
            );
        }
    }
}
