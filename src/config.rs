//! Configuration for the retrieval engine.
//!
//! Layered settings, merged in order:
//! - Built-in defaults
//! - `.goalpath/settings.toml` (found by walking up from the cwd)
//! - Environment variables prefixed with `GOALPATH_`, nested levels
//!   separated by double underscores:
//!   - `GOALPATH_CHUNKING__MAX_CHARS=256`
//!   - `GOALPATH_EMBEDDING__PROVIDER=hashed`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::corpus::SourceCategory;

/// Directory holding per-workspace configuration and the index.
pub const WORKSPACE_DIR: &str = ".goalpath";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Toml(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory the knowledge index is built into.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Corpus file locations.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Chunking window parameters.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding backend selection.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval fan-out parameters.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Log levels.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the corpus files live, one JSONL file per source category.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_occupations_path")]
    pub occupations: PathBuf,

    #[serde(default = "default_standards_path")]
    pub standards: PathBuf,

    #[serde(default = "default_examples_path")]
    pub examples: PathBuf,
}

impl CorpusConfig {
    /// The corpus file for a source category.
    pub fn path_for(&self, category: SourceCategory) -> &Path {
        match category {
            SourceCategory::Occupation => &self.occupations,
            SourceCategory::Standard => &self.standards,
            SourceCategory::Example => &self.examples,
        }
    }
}

/// Chunking window parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Overlap between consecutive chunks in characters.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,

    /// How far behind a hard cut to look for a sentence or paragraph
    /// boundary.
    #[serde(default = "default_boundary_lookback")]
    pub boundary_lookback: usize,
}

impl ChunkingConfig {
    /// Validate window parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chars == 0 {
            return Err("chunking.max_chars must be positive".to_string());
        }
        if self.overlap_chars >= self.max_chars {
            return Err(format!(
                "chunking.overlap_chars ({}) must be less than chunking.max_chars ({})",
                self.overlap_chars, self.max_chars
            ));
        }
        if self.overlap_chars + self.boundary_lookback >= self.max_chars {
            return Err(format!(
                "chunking.overlap_chars + chunking.boundary_lookback ({}) must be less than chunking.max_chars ({})",
                self.overlap_chars + self.boundary_lookback,
                self.max_chars
            ));
        }
        Ok(())
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Pretrained sentence-embedding model via fastembed (ONNX).
    #[default]
    Fastembed,
    /// Deterministic hashed bag-of-words; no model download, crude
    /// quality. For offline environments and tests.
    Hashed,
}

/// Embedding backend selection.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// fastembed model name (ignored by the hashed provider).
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

/// Retrieval fan-out parameters.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct RetrievalConfig {
    /// Raw hits fetched per fan-out query before source filtering.
    #[serde(default = "default_fan_out_k")]
    pub fan_out_k: usize,

    /// Filtered hits kept per category.
    #[serde(default = "default_per_category")]
    pub per_category: usize,
}

impl RetrievalConfig {
    /// Validate fan-out parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.per_category == 0 {
            return Err("retrieval.per_category must be positive".to_string());
        }
        if self.fan_out_k < self.per_category {
            return Err(format!(
                "retrieval.fan_out_k ({}) must be at least retrieval.per_category ({})",
                self.fan_out_k, self.per_category
            ));
        }
        Ok(())
    }
}

/// Log levels: a default plus per-module overrides.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter ("error" | "warn" | "info" | "debug" | "trace").
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `retrieval = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".goalpath/index")
}
fn default_occupations_path() -> PathBuf {
    PathBuf::from("corpus/occupations.jsonl")
}
fn default_standards_path() -> PathBuf {
    PathBuf::from("corpus/standards.jsonl")
}
fn default_examples_path() -> PathBuf {
    PathBuf::from("corpus/examples.jsonl")
}
fn default_max_chars() -> usize {
    512
}
fn default_overlap_chars() -> usize {
    50
}
fn default_boundary_lookback() -> usize {
    64
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_fan_out_k() -> usize {
    10
}
fn default_per_category() -> usize {
    5
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            corpus: CorpusConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            occupations: default_occupations_path(),
            standards: default_standards_path(),
            examples: default_examples_path(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
            boundary_lookback: default_boundary_lookback(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fan_out_k: default_fan_out_k(),
            per_category: default_per_category(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file (plus defaults and env).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single
            // underscores stay inside field names.
            .merge(Env::prefixed("GOALPATH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)?;

        settings.validate().map_err(ConfigError::Invalid)?;
        Ok(settings)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    /// Find the workspace config by walking up from the cwd.
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(WORKSPACE_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }
        None
    }

    /// Write a default `settings.toml`, creating the workspace directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, ConfigError> {
        let dir = PathBuf::from(WORKSPACE_DIR);
        let path = dir.join("settings.toml");
        if path.exists() && !force {
            return Err(ConfigError::Invalid(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        std::fs::create_dir_all(&dir)?;

        let mut content = String::from(
            "# goalpath configuration\n\
             # Values here override built-in defaults; GOALPATH_* environment\n\
             # variables override both (nested keys separated by __).\n\n",
        );
        content.push_str(&toml::to_string_pretty(&Settings::default())?);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.chunking.max_chars, 512);
        assert_eq!(settings.chunking.overlap_chars, 50);
        assert_eq!(settings.retrieval.fan_out_k, 10);
        assert_eq!(settings.retrieval.per_category, 5);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Fastembed);
    }

    #[test]
    fn overlap_must_stay_below_max_chars() {
        let chunking = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 100,
            boundary_lookback: 0,
        };
        assert!(chunking.validate().is_err());
    }

    #[test]
    fn lookback_plus_overlap_must_stay_below_max_chars() {
        let chunking = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 40,
            boundary_lookback: 60,
        };
        assert!(chunking.validate().is_err());
    }

    #[test]
    fn per_category_cannot_exceed_fan_out() {
        let retrieval = RetrievalConfig {
            fan_out_k: 3,
            per_category: 5,
        };
        assert!(retrieval.validate().is_err());
    }

    #[test]
    fn corpus_paths_map_to_categories() {
        let corpus = CorpusConfig::default();
        assert_eq!(
            corpus.path_for(SourceCategory::Occupation),
            Path::new("corpus/occupations.jsonl")
        );
        assert_eq!(
            corpus.path_for(SourceCategory::Example),
            Path::new("corpus/examples.jsonl")
        );
    }

    #[test]
    fn settings_toml_roundtrip() {
        let settings = Settings::default();
        let serialized = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&serialized).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.index_path, settings.index_path);
    }
}
