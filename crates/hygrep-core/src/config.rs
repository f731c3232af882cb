//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. CLI flags (applied by the caller on top of the loaded [`Config`])
//! 2. Environment variables (`HYGREP_*`)
//! 3. Project config (`<root>/.hhg/config.toml`)
//! 4. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HygrepError, HygrepResult};
use crate::types::DIMENSIONS;

/// Top-level configuration for hygrep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Corpus root path.
    pub root_path: PathBuf,

    /// Walker/scanner settings.
    #[serde(default)]
    pub scanning: ScanningConfig,

    /// Embedding model settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Reranker/query settings.
    #[serde(default)]
    pub query: QueryConfig,
}

/// Walker and scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanningConfig {
    /// Extra exclude glob patterns, merged with `.gitignore`/`.hhgignore`.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Per-file cap (bytes) for the recall-phase scan; larger files are
    /// truncated with a flag rather than skipped outright.
    #[serde(default = "ScanningConfig::default_max_scan_bytes")]
    pub max_scan_bytes: u64,

    /// Number of unreadable-file warnings tolerated before surfacing a
    /// scan-level warning.
    #[serde(default = "ScanningConfig::default_unreadable_warn_threshold")]
    pub unreadable_warn_threshold: usize,

    /// Worker pool size for the parallel scan and embedding batch prep.
    /// `0` means "use available parallelism", overridable by
    /// `HYGREP_NUM_THREADS`.
    #[serde(default)]
    pub num_threads: usize,

    /// Follow symlinks that point inside the corpus root. Symlinks
    /// pointing outside the root are never followed regardless.
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            max_scan_bytes: Self::default_max_scan_bytes(),
            unreadable_warn_threshold: Self::default_unreadable_warn_threshold(),
            num_threads: 0,
            follow_symlinks: false,
        }
    }
}

impl ScanningConfig {
    fn default_max_scan_bytes() -> u64 {
        2 * 1024 * 1024 // 2 MiB, per spec.md §4.1
    }

    fn default_unreadable_warn_threshold() -> usize {
        16
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file. Resolved by the CLI's model-acquisition
    /// module; the core treats this as opaque and fails with
    /// [`HygrepError::ModelMissing`][crate::error::HygrepError::ModelMissing]
    /// if it doesn't exist.
    #[serde(default = "EmbeddingConfig::default_model_path")]
    pub model_path: PathBuf,

    /// Path to the tokenizer.json file.
    #[serde(default = "EmbeddingConfig::default_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Output embedding dimensions. Always 384 for the bundled model;
    /// kept as a field (rather than hardcoded) so the manifest's
    /// `dimensions` check has something to compare against if a future
    /// model is swapped in.
    #[serde(default = "EmbeddingConfig::default_dimensions")]
    pub dimensions: usize,

    /// Batch size for embedding inference.
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,

    /// Maximum sequence length for the tokenizer.
    #[serde(default = "EmbeddingConfig::default_max_seq_length")]
    pub max_seq_length: usize,

    /// Opaque version string baked into the binary; governs whole-index
    /// rebuild on manifest mismatch.
    #[serde(default = "EmbeddingConfig::default_model_version")]
    pub model_version: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            tokenizer_path: Self::default_tokenizer_path(),
            dimensions: Self::default_dimensions(),
            batch_size: Self::default_batch_size(),
            max_seq_length: Self::default_max_seq_length(),
            model_version: Self::default_model_version(),
        }
    }
}

impl EmbeddingConfig {
    fn default_model_path() -> PathBuf {
        crate::embedder::default_model_dir().join("model.onnx")
    }
    fn default_tokenizer_path() -> PathBuf {
        crate::embedder::default_model_dir().join("tokenizer.json")
    }
    fn default_dimensions() -> usize {
        DIMENSIONS
    }
    fn default_batch_size() -> usize {
        crate::embedder::BATCH_SIZE
    }
    fn default_max_seq_length() -> usize {
        crate::embedder::MAX_LENGTH
    }
    fn default_model_version() -> String {
        crate::embedder::MODEL_VERSION.to_string()
    }
}

/// Reranker/query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default number of results to return (`-n`).
    #[serde(default = "QueryConfig::default_top_k")]
    pub default_top_k: usize,

    /// Maximum number of candidates considered before top-k selection.
    #[serde(default = "QueryConfig::default_max_candidates")]
    pub max_candidates: usize,

    /// Query-embedding cache capacity (process-local).
    #[serde(default = "QueryConfig::default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_top_k: Self::default_top_k(),
            max_candidates: Self::default_max_candidates(),
            cache_capacity: Self::default_cache_capacity(),
        }
    }
}

impl QueryConfig {
    fn default_top_k() -> usize {
        10
    }
    fn default_max_candidates() -> usize {
        100
    }
    fn default_cache_capacity() -> usize {
        128
    }
}

impl Config {
    /// Load configuration: defaults, overlaid with `<root>/.hhg/config.toml`
    /// if present, overlaid with environment variables.
    pub fn load(root_path: &Path) -> HygrepResult<Self> {
        let mut config = Self::defaults(root_path);

        let project_config_path = root_path.join(".hhg").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Create a default configuration for the given corpus root.
    pub fn defaults(root_path: &Path) -> Self {
        Self {
            root_path: root_path.to_path_buf(),
            scanning: ScanningConfig::default(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// The index's on-disk directory: `<root>/.hhg/`.
    pub fn index_dir(&self) -> PathBuf {
        self.root_path.join(".hhg")
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> HygrepResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content).map_err(|e| {
            HygrepError::Internal(format!("invalid TOML in {}: {e}", path.display()))
        })?;

        if let Some(scanning) = overlay.get("scanning") {
            if let Ok(parsed) = scanning.clone().try_into::<ScanningConfig>() {
                self.scanning = parsed;
            }
        }
        if let Some(embedding) = overlay.get("embedding") {
            if let Ok(parsed) = embedding.clone().try_into::<EmbeddingConfig>() {
                self.embedding = parsed;
            }
        }
        if let Some(query) = overlay.get("query") {
            if let Ok(parsed) = query.clone().try_into::<QueryConfig>() {
                self.query = parsed;
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("HYGREP_MODEL_DIR") {
            let dir = PathBuf::from(dir);
            self.embedding.model_path = dir.join("model.onnx");
            self.embedding.tokenizer_path = dir.join("tokenizer.json");
        }
        if let Ok(threads) = std::env::var("HYGREP_NUM_THREADS") {
            if let Ok(n) = threads.parse::<usize>() {
                self.scanning.num_threads = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.query.default_top_k, 10);
        assert_eq!(config.query.cache_capacity, 128);
        assert_eq!(config.scanning.max_scan_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_index_dir() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/test-repo/.hhg"));
    }

    #[test]
    fn test_language_from_extension() {
        use crate::types::Language;
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }
}
