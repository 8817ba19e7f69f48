use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{GenerationOptions, DEFAULT_TOP_K};

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_RAG_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Bare generation backend
    pub ollama_url: String,
    /// Augmentation backend
    pub rag_url: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            rag_url: DEFAULT_RAG_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub default: String,
    /// Model for direct generation; `default` when unset
    pub fallback: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_MODEL.to_string(),
            fallback: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub num_predict: u32,
    pub top_k: usize,
    pub preview_chars: usize,
    /// Probe the augmentation backend before each augmented request
    pub health_gate: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let options = GenerationOptions::default();
        Self {
            temperature: options.temperature,
            num_predict: options.num_predict,
            top_k: DEFAULT_TOP_K,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            health_gate: true,
        }
    }
}

impl GenerationConfig {
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub probe_secs: u64,
    pub rag_probe_secs: u64,
    pub single_shot_secs: u64,
    pub stream_secs: u64,
    pub store_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            probe_secs: 2,
            rag_probe_secs: 5,
            single_shot_secs: 10,
            stream_secs: 120,
            store_secs: 5,
        }
    }
}

impl TimeoutsConfig {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn rag_probe(&self) -> Duration {
        Duration::from_secs(self.rag_probe_secs)
    }

    pub fn single_shot(&self) -> Duration {
        Duration::from_secs(self.single_shot_secs)
    }

    pub fn stream(&self) -> Duration {
        Duration::from_secs(self.stream_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    Hashing,
    #[serde(rename = "minilm")]
    MiniLm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub backend: IndexBackend,
    pub qdrant_url: String,
    pub embedder: EmbedderKind,
    pub hashing_dimension: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: Config::base_dir()
                .map(|d| d.join("knowledge"))
                .unwrap_or_else(|_| PathBuf::from("knowledge")),
            backend: IndexBackend::Local,
            qdrant_url: "http://localhost:6334".to_string(),
            embedder: EmbedderKind::Hashing,
            hashing_dimension: crate::embedding::hashing::DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist,
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if !config_path.exists() {
            let config = Config::default();
            config.save()?;
            config
        } else {
            Self::load_from(&config_path)?
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, toml_string)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Directory holding config and default knowledge data
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".trackrag"))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    /// Model used for direct generation
    pub fn fallback_model(&self) -> &str {
        self.models.fallback.as_deref().unwrap_or(&self.models.default)
    }

    /// Apply TRACKRAG_* environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TRACKRAG_OLLAMA_URL") {
            self.backends.ollama_url = url;
        }
        if let Some(url) = lookup("TRACKRAG_RAG_URL") {
            self.backends.rag_url = url;
        }
        if let Some(dir) = lookup("TRACKRAG_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backends.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.generation.top_k, 3);
        assert_eq!(config.timeouts.single_shot_secs, 10);
        assert_eq!(config.store.backend, IndexBackend::Local);
        assert_eq!(config.fallback_model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [models]
            default = "gpt-oss:20b"
            fallback = "llama3.2:1b"

            [store]
            embedder = "minilm"
            "#,
        )
        .unwrap();
        assert_eq!(config.models.default, "gpt-oss:20b");
        assert_eq!(config.fallback_model(), "llama3.2:1b");
        assert_eq!(config.store.embedder, EmbedderKind::MiniLm);
        assert_eq!(config.backends.rag_url, DEFAULT_RAG_URL);
        assert_eq!(config.timeouts.stream_secs, 120);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.models.default = "qwen2.5:7b-instruct".to_string();

        let toml_string = toml::to_string(&config).unwrap();
        assert!(toml_string.contains("qwen2.5:7b-instruct"));

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(deserialized.models.default, "qwen2.5:7b-instruct");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "TRACKRAG_RAG_URL" => Some("http://10.0.0.5:8000".to_string()),
            "TRACKRAG_DATA_DIR" => Some("/srv/knowledge".to_string()),
            _ => None,
        });
        assert_eq!(config.backends.rag_url, "http://10.0.0.5:8000");
        assert_eq!(config.backends.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.store.data_dir, PathBuf::from("/srv/knowledge"));
    }
}
