//! Configuration management with file persistence
//!
//! The file holds preferences only. API keys are read from the environment or
//! passed explicitly, and everything is resolved once at the entry point into a
//! [`ResolvedEmbeddingConfig`] that is threaded into the core.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::embedding::types::{
    DEFAULT_DIMENSION, DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_URL, DEFAULT_OPENAI_MODEL,
    DEFAULT_OPENAI_URL, ProviderKind, RetryPolicy,
};
use crate::error::{Error, Result};
use crate::scoring::ScoringConfig;

pub const ENV_CONFIG_DIR: &str = "GRAPHRAG_CONFIG_DIR";
pub const ENV_PROVIDER: &str = "GRAPHRAG_EMBEDDING_PROVIDER";
pub const ENV_LOCAL_URL: &str = "GRAPHRAG_LOCAL_EMBEDDING_URL";
pub const ENV_LOCAL_MODEL: &str = "GRAPHRAG_LOCAL_EMBEDDING_MODEL";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Graphrag configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingSettings,
    pub vector_index: VectorIndexSettings,
    pub search: SearchSettings,
    pub scoring: ScoringConfig,
    pub database: DatabaseSettings,
}

/// Stored embedding preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    /// Cloud model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Cloud endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_model: Option<String>,
    pub dimension: usize,
    pub retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub timeout_secs: u64,
    /// Pause between consecutive batch chunks
    pub batch_pause_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: None,
            model: None,
            api_url: None,
            local_url: None,
            local_model: None,
            dimension: DEFAULT_DIMENSION,
            retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            timeout_secs: 60,
            batch_pause_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexSettings {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for VectorIndexSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_limit: usize,
    pub max_context_tokens: usize,
    /// Overall deadline for one search; unset means wait for every type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_context_tokens: 2000,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Defaults to `graphrag.db` next to the config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Per-invocation overrides, typically from CLI flags
#[derive(Debug, Clone, Default)]
pub struct EmbeddingOverrides {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

/// Cloud endpoint used once when the local provider gives up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudFallback {
    pub model: String,
    pub api_url: String,
    pub api_key: String,
}

/// Fully resolved embedding configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub fallback: Option<CloudFallback>,
    pub dimension: usize,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub batch_pause: Duration,
}

impl EmbeddingSettings {
    /// Resolve provider, endpoint, model and key.
    ///
    /// Order for every field: explicit override, stored preference, environment,
    /// built-in default. `env` is injected so resolution stays deterministic in tests.
    pub fn resolve<F>(&self, explicit: &EmbeddingOverrides, env: F) -> Result<ResolvedEmbeddingConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_some() {
            return Err(Error::Config(
                "Embedding API keys must be provided via environment variables, not stored in configuration".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".to_string()));
        }

        let provider = match explicit.provider.or(self.provider) {
            Some(p) => p,
            None => match env(ENV_PROVIDER).filter(|v| !v.trim().is_empty()) {
                Some(value) => value.parse()?,
                None => ProviderKind::OpenAi,
            },
        };

        let api_key = explicit
            .api_key
            .clone()
            .or_else(|| env(ENV_OPENAI_API_KEY))
            .filter(|k| !k.trim().is_empty());

        let cloud_model = self
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let cloud_url = self
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        let (model, api_url, fallback) = match provider {
            ProviderKind::OpenAi => {
                if api_key.is_none() {
                    return Err(Error::Config(format!(
                        "The openai embedding provider requires an API key. Set {ENV_OPENAI_API_KEY} or pass --api-key."
                    )));
                }
                (
                    explicit.model.clone().unwrap_or(cloud_model),
                    explicit.api_url.clone().unwrap_or(cloud_url),
                    None,
                )
            }
            ProviderKind::Local => {
                let model = explicit
                    .model
                    .clone()
                    .or_else(|| self.local_model.clone())
                    .or_else(|| env(ENV_LOCAL_MODEL))
                    .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
                let url = explicit
                    .api_url
                    .clone()
                    .or_else(|| self.local_url.clone())
                    .or_else(|| env(ENV_LOCAL_URL))
                    .unwrap_or_else(|| DEFAULT_LOCAL_URL.to_string());
                let fallback = api_key.clone().map(|key| CloudFallback {
                    model: cloud_model,
                    api_url: cloud_url,
                    api_key: key,
                });
                (model, url, fallback)
            }
        };

        Ok(ResolvedEmbeddingConfig {
            provider,
            model,
            api_url,
            api_key,
            fallback,
            dimension: self.dimension,
            retry: RetryPolicy {
                retries: self.retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            },
            timeout: Duration::from_secs(self.timeout_secs),
            batch_pause: Duration::from_millis(self.batch_pause_ms),
        })
    }

    /// Resolve against the process environment
    pub fn resolve_from_env(&self, explicit: &EmbeddingOverrides) -> Result<ResolvedEmbeddingConfig> {
        self.resolve(explicit, |key| env::var(key).ok())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(ENV_CONFIG_DIR) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("graphrag")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.api_key.is_some() {
            return Err(anyhow!(
                "Embedding API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(anyhow!("embedding.dimension must be positive"));
        }
        if self.vector_index.url.trim().is_empty() {
            return Err(anyhow!("vector_index.url must not be empty"));
        }
        if self.search.default_limit == 0 {
            return Err(anyhow!("search.default_limit must be positive"));
        }
        self.scoring.validate()?;
        Ok(())
    }

    /// Database file path, defaulting to the config directory
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("graphrag.db")),
        }
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let unset = || "(not set)".to_string();
        let w = &self.scoring.weights;
        match key {
            "embedding.provider" => Ok(self
                .embedding
                .provider
                .map(|p| p.to_string())
                .unwrap_or_else(unset)),
            "embedding.model" => Ok(self.embedding.model.clone().unwrap_or_else(unset)),
            "embedding.api_url" => Ok(self.embedding.api_url.clone().unwrap_or_else(unset)),
            "embedding.local_url" => Ok(self.embedding.local_url.clone().unwrap_or_else(unset)),
            "embedding.local_model" => Ok(self.embedding.local_model.clone().unwrap_or_else(unset)),
            "embedding.dimension" => Ok(self.embedding.dimension.to_string()),
            "embedding.retries" => Ok(self.embedding.retries.to_string()),
            "embedding.timeout_secs" => Ok(self.embedding.timeout_secs.to_string()),
            "embedding.api_key" | "api_key" => Ok(match env::var(ENV_OPENAI_API_KEY) {
                Ok(key) if key.chars().count() > 4 => {
                    let tail: String = key.chars().skip(key.chars().count() - 4).collect();
                    format!("***{tail}")
                }
                Ok(_) => "***".to_string(),
                Err(_) => format!("(not set - use {ENV_OPENAI_API_KEY} env var)"),
            }),

            "vector_index.url" => Ok(self.vector_index.url.clone()),
            "vector_index.timeout_secs" => Ok(self.vector_index.timeout_secs.to_string()),

            "search.default_limit" => Ok(self.search.default_limit.to_string()),
            "search.max_context_tokens" => Ok(self.search.max_context_tokens.to_string()),
            "search.timeout_ms" => Ok(self
                .search
                .timeout_ms
                .map(|ms| ms.to_string())
                .unwrap_or_else(unset)),

            "scoring.weights.similarity" => Ok(w.similarity.to_string()),
            "scoring.weights.recency" => Ok(w.recency.to_string()),
            "scoring.weights.importance" => Ok(w.importance.to_string()),
            "scoring.weights.keyword_match" => Ok(w.keyword_match.to_string()),
            "scoring.weights.popularity" => Ok(w.popularity.to_string()),
            "scoring.weights.category_match" => Ok(w.category_match.to_string()),
            "scoring.recency_half_life_days" => Ok(self.scoring.recency_half_life_days.to_string()),
            "scoring.usage_saturation" => Ok(self.scoring.usage_saturation.to_string()),

            "database.path" => Ok(self.database_path()?.display().to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `graphrag config show` to see available keys.",
                key
            )),
        }
    }

    /// List all configuration keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        Self::keys()
            .iter()
            .map(|key| {
                let value = self.get(key).unwrap_or_else(|e| format!("(error: {e})"));
                (key.to_string(), value)
            })
            .collect()
    }

    pub fn keys() -> &'static [&'static str] {
        &[
            "embedding.provider",
            "embedding.model",
            "embedding.api_url",
            "embedding.local_url",
            "embedding.local_model",
            "embedding.dimension",
            "embedding.retries",
            "embedding.timeout_secs",
            "embedding.api_key",
            "vector_index.url",
            "vector_index.timeout_secs",
            "search.default_limit",
            "search.max_context_tokens",
            "search.timeout_ms",
            "scoring.weights.similarity",
            "scoring.weights.recency",
            "scoring.weights.importance",
            "scoring.weights.keyword_match",
            "scoring.weights.popularity",
            "scoring.weights.category_match",
            "scoring.recency_half_life_days",
            "scoring.usage_saturation",
            "database.path",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.vector_index.timeout_secs, 30);
        assert_eq!(config.search.default_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [embedding]
            provider = "local"
            local_model = "mxbai-embed-large"
            dimension = 1024

            [scoring]
            recency_half_life_days = 14.0
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, Some(ProviderKind::Local));
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.embedding.retries, 3);
        assert_eq!(config.scoring.recency_half_life_days, 14.0);
        assert_eq!(config.vector_index.url, "http://localhost:8000");
    }

    #[test]
    fn test_api_key_never_read_from_file() {
        let config = Config::from_toml(
            r#"
            [embedding]
            api_key = "sk-in-file"
            "#,
        )
        .unwrap();
        assert!(config.embedding.api_key.is_none());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.embedding.api_key = Some("sk-secret".into());
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("sk-secret"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_defaults_to_openai() {
        let settings = EmbeddingSettings::default();
        let resolved = settings
            .resolve(&EmbeddingOverrides::default(), env_from(&[(ENV_OPENAI_API_KEY, "sk-test")]))
            .unwrap();

        assert_eq!(resolved.provider, ProviderKind::OpenAi);
        assert_eq!(resolved.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(resolved.api_url, DEFAULT_OPENAI_URL);
        assert_eq!(resolved.api_key.as_deref(), Some("sk-test"));
        assert!(resolved.fallback.is_none());
    }

    #[test]
    fn test_resolve_openai_requires_key() {
        let settings = EmbeddingSettings::default();
        let err = settings
            .resolve(&EmbeddingOverrides::default(), env_from(&[]))
            .unwrap_err();
        assert_eq!(err.code(), "E600");
    }

    #[test]
    fn test_resolve_order_explicit_stored_env() {
        let env = env_from(&[
            (ENV_PROVIDER, "openai"),
            (ENV_LOCAL_URL, "http://env:11434/api/embeddings"),
            (ENV_LOCAL_MODEL, "env-model"),
        ]);

        // stored preference beats environment
        let stored = EmbeddingSettings {
            provider: Some(ProviderKind::Local),
            local_model: Some("stored-model".into()),
            ..Default::default()
        };
        let resolved = stored.resolve(&EmbeddingOverrides::default(), &env).unwrap();
        assert_eq!(resolved.provider, ProviderKind::Local);
        assert_eq!(resolved.model, "stored-model");
        assert_eq!(resolved.api_url, "http://env:11434/api/embeddings");

        // explicit beats stored
        let explicit = EmbeddingOverrides {
            model: Some("explicit-model".into()),
            ..Default::default()
        };
        let resolved = stored.resolve(&explicit, &env).unwrap();
        assert_eq!(resolved.model, "explicit-model");
    }

    #[test]
    fn test_resolve_environment_provider() {
        let settings = EmbeddingSettings::default();
        let resolved = settings
            .resolve(&EmbeddingOverrides::default(), env_from(&[(ENV_PROVIDER, "local")]))
            .unwrap();
        assert_eq!(resolved.provider, ProviderKind::Local);
        assert_eq!(resolved.api_url, DEFAULT_LOCAL_URL);
        assert_eq!(resolved.model, DEFAULT_LOCAL_MODEL);

        let err = settings
            .resolve(&EmbeddingOverrides::default(), env_from(&[(ENV_PROVIDER, "bogus")]))
            .unwrap_err();
        assert_eq!(err.code(), "E600");
    }

    #[test]
    fn test_local_with_key_gets_cloud_fallback() {
        let settings = EmbeddingSettings {
            provider: Some(ProviderKind::Local),
            ..Default::default()
        };
        let resolved = settings
            .resolve(&EmbeddingOverrides::default(), env_from(&[(ENV_OPENAI_API_KEY, "sk-test")]))
            .unwrap();

        let fallback = resolved.fallback.unwrap();
        assert_eq!(fallback.api_key, "sk-test");
        assert_eq!(fallback.model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn test_get_and_list() {
        let config = Config::default();
        assert_eq!(config.get("embedding.dimension").unwrap(), "1536");
        assert_eq!(config.get("embedding.provider").unwrap(), "(not set)");
        assert!(config.get("nope").is_err());

        let listed = config.list();
        assert_eq!(listed.len(), Config::keys().len());
    }
}
