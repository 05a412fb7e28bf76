//! Configuration management for Consilium.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (`.consilium/config.yaml`)
//! - Environment variables
//! - Host overrides
//!
//! Every tunable constant of the retrieval, specialization, consensus and
//! fine-tuning machinery lives here so hosts can adjust them without code
//! changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::Domain;
use crate::error::{AppError, AppResult};

/// Main Consilium configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsiliumConfig {
    /// Path to the workspace root (contains .consilium/)
    #[serde(skip)]
    pub workspace: PathBuf,

    /// Config file this configuration was loaded from, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// The closed set of domains; one knowledge index is created per entry
    #[serde(default = "default_domains")]
    pub domains: Vec<Domain>,

    /// Answer-generation provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval layer settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Specialization tracker settings
    #[serde(default)]
    pub specialization: SpecializationConfig,

    /// Ensemble coordinator settings
    #[serde(default)]
    pub ensemble: EnsembleConfig,

    /// Fine-tuning pipeline settings
    #[serde(default)]
    pub fine_tuning: FineTuningConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory holding expert prompt definitions (`<id>.yml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,
}

fn default_domains() -> Vec<Domain> {
    vec![Domain::general()]
}

/// Answer-generation provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Active provider for answer generation
    pub active_provider: String,

    /// Provider-specific configurations, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "ollama".to_string(),
            ProviderConfig::Ollama {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2".to_string(),
                timeout: Some(30),
            },
        );

        Self {
            active_provider: "ollama".to_string(),
            providers,
        }
    }
}

impl LlmConfig {
    /// Get the configuration of the active provider.
    pub fn active(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.active_provider)
    }
}

/// Provider-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// Local Ollama runtime
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },

    /// Deterministic offline provider (development and tests)
    Scripted {
        model: String,
        #[serde(rename = "defaultConfidence")]
        default_confidence: Option<f32>,
    },
}

impl ProviderConfig {
    /// Get the model name for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::Ollama { model, .. } => model,
            Self::Scripted { model, .. } => model,
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider name: "trigram", "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Whether to normalize embeddings to unit length
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Provider endpoint (remote providers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            normalize: true,
            endpoint: None,
        }
    }
}

/// Distance metric of a vector index. Fixed per index, since it changes ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Straight-line distance between vectors
    Euclidean,
    /// `1 - cosine_similarity`, in `[0, 2]`
    #[default]
    Cosine,
}

impl DistanceMetric {
    /// Canonical metric name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Cosine => "cosine",
        }
    }
}

/// Retrieval layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Snippets retrieved per expert call
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Distance metric for every domain index
    #[serde(default)]
    pub metric: DistanceMetric,

    /// Confidence multiplier applied when retrieval is unavailable
    #[serde(default = "default_degraded_penalty")]
    pub degraded_penalty: f32,

    /// Hits farther than this are dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,

    /// Chunk size (bytes) used by corpus ingestion
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_top_k() -> usize {
    4
}

fn default_degraded_penalty() -> f32 {
    0.6
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    64
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: DistanceMetric::default(),
            degraded_penalty: default_degraded_penalty(),
            max_distance: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Specialization tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecializationConfig {
    /// EMA smoothing constant α
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    /// Number of recent observations kept for trend detection
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Score of an unseen (expert, domain) pair
    #[serde(default = "default_prior")]
    pub prior: f32,

    /// Minimum absolute slope (per observation) to call a trend
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f32,
}

fn default_alpha() -> f32 {
    0.2
}

fn default_history_size() -> usize {
    50
}

fn default_prior() -> f32 {
    0.5
}

fn default_trend_threshold() -> f32 {
    0.005
}

impl Default for SpecializationConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            history_size: default_history_size(),
            prior: default_prior(),
            trend_threshold: default_trend_threshold(),
        }
    }
}

/// Ensemble coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleConfig {
    /// Minimum relevance to a hinted domain for an expert to be a candidate
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Answer similarity at or above which two answers share a cluster
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Per-expert answer timeout in seconds
    #[serde(default = "default_expert_timeout_secs")]
    pub expert_timeout_secs: u64,

    /// Mode used when a caller does not pick one
    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Answer similarity function: "lexical" or "embedding"
    #[serde(default = "default_similarity")]
    pub similarity: String,
}

fn default_relevance_threshold() -> f32 {
    0.3
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_expert_timeout_secs() -> u64 {
    10
}

fn default_mode() -> String {
    "weighted".to_string()
}

fn default_similarity() -> String {
    "lexical".to_string()
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            similarity_threshold: default_similarity_threshold(),
            expert_timeout_secs: default_expert_timeout_secs(),
            default_mode: default_mode(),
            similarity: default_similarity(),
        }
    }
}

/// Fine-tuning pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FineTuningConfig {
    /// Allowed validation regression before a run is rejected
    #[serde(default)]
    pub tolerance: f32,

    /// Upper bound on few-shot exemplars kept in an expert's state
    #[serde(default = "default_max_exemplars")]
    pub max_exemplars: usize,

    /// Step size used by the gradient-style strategies
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Answer quality at or above which an example counts as correct
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f32,

    /// Seed for the optional deterministic shuffle before splitting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u64>,
}

fn default_max_exemplars() -> usize {
    8
}

fn default_learning_rate() -> f32 {
    0.1
}

fn default_accuracy_threshold() -> f32 {
    0.7
}

impl Default for FineTuningConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            max_exemplars: default_max_exemplars(),
            learning_rate: default_learning_rate(),
            accuracy_threshold: default_accuracy_threshold(),
            shuffle_seed: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g., "info", "consilium_ensemble=debug")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// JSON lines output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            color: true,
            json: false,
        }
    }
}

impl Default for ConsiliumConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            domains: default_domains(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            specialization: SpecializationConfig::default(),
            ensemble: EnsembleConfig::default(),
            fine_tuning: FineTuningConfig::default(),
            logging: LoggingConfig::default(),
            prompts_dir: None,
        }
    }
}

impl ConsiliumConfig {
    /// Load configuration from the workspace config file and environment.
    ///
    /// Environment variables:
    /// - `CONSILIUM_WORKSPACE`: Override workspace path
    /// - `CONSILIUM_CONFIG`: Path to config file
    /// - `CONSILIUM_PROVIDER`: Active answer-generation provider
    /// - `CONSILIUM_MODEL`: Model for the active provider
    /// - `CONSILIUM_EXPERT_TIMEOUT_SECS`: Per-expert timeout
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use consilium_core::ConsiliumConfig;
    ///
    /// let config = ConsiliumConfig::load().expect("Failed to load config");
    /// println!("Domains: {:?}", config.domains);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut workspace = std::env::current_dir()?;
        if let Ok(ws) = std::env::var("CONSILIUM_WORKSPACE") {
            workspace = PathBuf::from(ws);
        }

        if !workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                workspace
            )));
        }

        let config_path = match std::env::var("CONSILIUM_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => workspace.join(".consilium/config.yaml"),
        };

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            Self::default()
        };
        config.workspace = workspace;

        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit YAML file.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config = Self::from_yaml_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.config_file = Some(path.to_path_buf());

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(contents: &str) -> AppResult<Self> {
        let mut config: Self = serde_yaml::from_str(contents)?;
        config.workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        config.domains.sort();
        config.domains.dedup();
        Ok(config)
    }

    /// Environment variables override file values.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(provider) = std::env::var("CONSILIUM_PROVIDER") {
            self.llm.active_provider = provider;
        }

        if let Ok(model) = std::env::var("CONSILIUM_MODEL") {
            self.set_active_model(model);
        }

        if let Ok(timeout) = std::env::var("CONSILIUM_EXPERT_TIMEOUT_SECS") {
            self.ensemble.expert_timeout_secs = timeout.parse().map_err(|e| {
                AppError::Config(format!(
                    "Invalid CONSILIUM_EXPERT_TIMEOUT_SECS '{}': {}",
                    timeout, e
                ))
            })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.logging.color = false;
        }

        Ok(())
    }

    fn set_active_model(&mut self, new_model: String) {
        match self.llm.providers.get_mut(&self.llm.active_provider) {
            Some(ProviderConfig::Ollama { model, .. }) => *model = new_model,
            Some(ProviderConfig::Scripted { model, .. }) => *model = new_model,
            None => {
                tracing::warn!(
                    "No configuration for provider '{}', ignoring model override",
                    self.llm.active_provider
                );
            }
        }
    }

    /// Get the path to the .consilium directory.
    pub fn consilium_dir(&self) -> PathBuf {
        self.workspace.join(".consilium")
    }

    /// Directory holding expert prompt definitions.
    pub fn prompts_path(&self) -> PathBuf {
        match &self.prompts_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.workspace.join(dir),
            None => self.consilium_dir().join("prompts"),
        }
    }

    /// Whether `domain` is part of the configured domain set.
    pub fn has_domain(&self, domain: &Domain) -> bool {
        self.domains.contains(domain)
    }

    /// Validate value ranges.
    pub fn validate(&self) -> AppResult<()> {
        if self.domains.is_empty() {
            return Err(AppError::Config(
                "At least one domain must be configured".to_string(),
            ));
        }

        let known_providers = ["ollama", "scripted"];
        if !known_providers.contains(&self.llm.active_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.active_provider,
                known_providers.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be positive".to_string(),
            ));
        }

        check_unit("retrieval.degradedPenalty", self.retrieval.degraded_penalty)?;
        check_unit("specialization.prior", self.specialization.prior)?;
        check_unit(
            "ensemble.relevanceThreshold",
            self.ensemble.relevance_threshold,
        )?;
        check_unit(
            "ensemble.similarityThreshold",
            self.ensemble.similarity_threshold,
        )?;
        check_unit("fineTuning.tolerance", self.fine_tuning.tolerance)?;
        check_unit(
            "fineTuning.accuracyThreshold",
            self.fine_tuning.accuracy_threshold,
        )?;

        let alpha = self.specialization.alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(AppError::Config(format!(
                "specialization.alpha must be in (0, 1], got {}",
                alpha
            )));
        }

        if self.specialization.history_size == 0 {
            return Err(AppError::Config(
                "specialization.historySize must be positive".to_string(),
            ));
        }

        if self.retrieval.chunk_size == 0 {
            return Err(AppError::Config(
                "retrieval.chunkSize must be positive".to_string(),
            ));
        }

        if self.ensemble.expert_timeout_secs == 0 {
            return Err(AppError::Config(
                "ensemble.expertTimeoutSecs must be positive".to_string(),
            ));
        }

        let known_modes = ["single", "weighted", "majority", "unanimous"];
        if !known_modes.contains(&self.ensemble.default_mode.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown ensemble.defaultMode: {}. Supported: {}",
                self.ensemble.default_mode,
                known_modes.join(", ")
            )));
        }

        let known_similarities = ["lexical", "embedding"];
        if !known_similarities.contains(&self.ensemble.similarity.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown ensemble.similarity: {}. Supported: {}",
                self.ensemble.similarity,
                known_similarities.join(", ")
            )));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> AppResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{} must be in [0, 1], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConsiliumConfig::default();
        assert_eq!(config.llm.active_provider, "ollama");
        assert_eq!(config.domains, vec![Domain::general()]);
        assert_eq!(config.specialization.alpha, 0.2);
        assert_eq!(config.specialization.history_size, 50);
        assert_eq!(config.specialization.prior, 0.5);
        assert_eq!(config.retrieval.degraded_penalty, 0.6);
        assert_eq!(config.ensemble.relevance_threshold, 0.3);
        assert_eq!(config.ensemble.similarity_threshold, 0.85);
        assert_eq!(config.ensemble.expert_timeout_secs, 10);
        assert_eq!(config.fine_tuning.tolerance, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_sections_use_defaults() {
        let yaml = r#"
domains: [Chemistry, biology, general, chemistry]
llm:
  activeProvider: scripted
  providers:
    scripted:
      model: echo
      defaultConfidence: 0.8
retrieval:
  metric: euclidean
specialization:
  alpha: 0.5
"#;
        let config = ConsiliumConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.domains,
            vec![
                Domain::new("biology"),
                Domain::new("chemistry"),
                Domain::new("general")
            ]
        );
        assert_eq!(config.retrieval.metric, DistanceMetric::Euclidean);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.specialization.alpha, 0.5);
        assert_eq!(config.specialization.history_size, 50);
        assert_eq!(
            config.llm.active(),
            Some(&ProviderConfig::Scripted {
                model: "echo".to_string(),
                default_confidence: Some(0.8)
            })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "domains: [physics]\nensemble:\n  expertTimeoutSecs: 3\n").unwrap();

        let config = ConsiliumConfig::load_from(&path).unwrap();
        assert_eq!(config.domains, vec![Domain::new("physics")]);
        assert_eq!(config.ensemble.expert_timeout_secs, 3);
        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_from_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = ConsiliumConfig::load_from(&temp.path().join("missing.yaml"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = ConsiliumConfig::default();
        config.specialization.alpha = 0.0;
        assert!(config.validate().is_err());

        let mut config = ConsiliumConfig::default();
        config.retrieval.degraded_penalty = 1.5;
        assert!(config.validate().is_err());

        let mut config = ConsiliumConfig::default();
        config.llm.active_provider = "unknown".to_string();
        assert!(config.validate().is_err());

        let mut config = ConsiliumConfig::default();
        config.domains.clear();
        assert!(config.validate().is_err());

        let mut config = ConsiliumConfig::default();
        config.ensemble.default_mode = "plurality".to_string();
        assert!(config.validate().is_err());

        let mut config = ConsiliumConfig::default();
        config.ensemble.similarity = "semantic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prompts_path_defaults_under_consilium_dir() {
        let mut config = ConsiliumConfig::default();
        config.workspace = PathBuf::from("/tmp/ws");
        assert_eq!(config.prompts_path(), PathBuf::from("/tmp/ws/.consilium/prompts"));

        config.prompts_dir = Some(PathBuf::from("prompts"));
        assert_eq!(config.prompts_path(), PathBuf::from("/tmp/ws/prompts"));
    }
}
