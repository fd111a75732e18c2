//! Engine configuration: file defaults, then environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answers::QuestionnaireError;
use crate::arbitrator::ArbitratorConfig;
use crate::diversity::DEFAULT_MAX_SIMILARITY;
use crate::evidence::EvidenceConfig;
use crate::quality::QualityConfig;

/// Generation timeout bounds, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 4;
pub const MAX_TIMEOUT_SECS: u64 = 26;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0} (expected .toml or .json)")]
    UnsupportedFormat(String),
    #[error("invalid questionnaire: {0}")]
    Questionnaire(#[from] QuestionnaireError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_k() -> usize {
    3
}

fn default_max_similarity() -> f64 {
    DEFAULT_MAX_SIMILARITY
}

fn default_timeout_secs() -> u64 {
    22
}

fn default_max_regenerations() -> u32 {
    1
}

fn default_temperature() -> f32 {
    0.7
}

fn default_cache_capacity() -> usize {
    512
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenRouter model id. No model means no generated path.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            timeout_secs: default_timeout_secs(),
            max_regenerations: default_max_regenerations(),
            temperature: default_temperature(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file. No path means an in-memory cache.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Entry bound for the in-memory cache.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub disabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: default_cache_capacity(),
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_max_similarity")]
    pub max_similarity: f64,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    /// Catalog file. No path means the built-in catalog.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Questionnaire with explicit option scores.
    #[serde(default)]
    pub questions_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            max_similarity: default_max_similarity(),
            generation: GenerationConfig::default(),
            quality: QualityConfig::default(),
            cache: CacheConfig::default(),
            evidence: EvidenceConfig::default(),
            catalog_path: None,
            questions_path: None,
        }
    }
}

impl EngineConfig {
    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let config: EngineConfig = match ext.as_str() {
            "toml" => toml::from_str(&raw)?,
            "json" => serde_json::from_str(&raw)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `SPORTSYNC_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("SPORTSYNC_MODEL") {
            self.generation.model = Some(model.trim().to_string());
        }
        if let Some(raw) = non_empty("SPORTSYNC_GENERATION_TIMEOUT_SECONDS") {
            self.generation.timeout_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("SPORTSYNC_GENERATION_TIMEOUT_SECONDS is not a number: {raw}"))
            })?;
        }
        if let Some(path) = non_empty("SPORTSYNC_CACHE_PATH") {
            self.cache.path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty("SPORTSYNC_CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::Invalid("k must be at least 1".into()));
        }
        if !(self.max_similarity > 0.0 && self.max_similarity <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "max_similarity must be in (0, 1], got {}",
                self.max_similarity
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "generation.temperature must be in [0, 2], got {}",
                self.generation.temperature
            )));
        }
        Ok(())
    }

    pub fn arbitrator_config(&self) -> ArbitratorConfig {
        ArbitratorConfig {
            k: self.k,
            max_similarity: self.max_similarity,
            timeout: self.generation.timeout(),
            max_regenerations: self.generation.max_regenerations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.k, 3);
        assert_eq!(config.max_similarity, 0.6);
        assert_eq!(config.generation.timeout(), Duration::from_secs(22));
        assert_eq!(config.quality.min_chars, 220);
        assert!(!config.evidence.require_pass);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            k = 4
            [generation]
            model = "openai/gpt-4o-mini"
            timeout_secs = 90
            [quality]
            min_sensory_hits = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.k, 4);
        assert_eq!(config.generation.model.as_deref(), Some("openai/gpt-4o-mini"));
        assert_eq!(config.generation.timeout(), Duration::from_secs(26));
        assert_eq!(config.quality.min_sensory_hits, 2);
        assert_eq!(config.quality.min_chars, 220);
        assert_eq!(config.max_similarity, 0.6);
    }

    #[test]
    fn test_env_overrides_and_timeout_floor() {
        let vars: HashMap<&str, &str> = [
            ("SPORTSYNC_MODEL", "openai/gpt-4o"),
            ("SPORTSYNC_GENERATION_TIMEOUT_SECONDS", "1"),
            ("SPORTSYNC_CATALOG_PATH", "/tmp/catalog.json"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::default()
            .apply_env_with(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.generation.model.as_deref(), Some("openai/gpt-4o"));
        assert_eq!(config.generation.timeout(), Duration::from_secs(4));
        assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/catalog.json")));
        assert_eq!(config.cache.path, None);
    }

    #[test]
    fn test_bad_env_number_is_an_error() {
        let err = EngineConfig::default()
            .apply_env_with(|name| (name == "SPORTSYNC_GENERATION_TIMEOUT_SECONDS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("engine.json");
        std::fs::write(&json, r#"{"k": 2, "evidence": {"require_pass": true}}"#).unwrap();
        let config = EngineConfig::from_path(&json).unwrap();
        assert_eq!(config.k, 2);
        assert!(config.evidence.require_pass);

        let yaml = dir.path().join("engine.yaml");
        std::fs::write(&yaml, "k: 2").unwrap();
        assert!(matches!(EngineConfig::from_path(&yaml), Err(ConfigError::UnsupportedFormat(_))));

        let zero = dir.path().join("zero.toml");
        std::fs::write(&zero, "k = 0").unwrap();
        assert!(matches!(EngineConfig::from_path(&zero), Err(ConfigError::Invalid(_))));
    }
}
