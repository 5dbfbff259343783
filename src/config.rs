//! Configuration loading.
//!
//! Layered over a [`Config::default()`] baseline using the `config` crate:
//! an optional YAML file, then environment variables prefixed `CQO_`
//! (e.g. `CQO_RETRIEVAL__MAX_CHUNKS=8`), with the environment taking
//! precedence. Nested section structs, a flat `Default` baseline, and a `validate`
//! pass that fails closed unless `TestMode` is set.
//!
//! Every section carries `#[serde(default)]` so a source that mentions
//! only one field of one section (as a single `CQO_` env var typically
//! does) still deserializes — missing fields fall back to that section's
//! `Default` impl rather than failing the whole load.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub apikey: Option<String>,
    pub endpoint: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self { apikey: None, endpoint: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub retrieve_url: String,
    pub websearch_url: String,
    pub synthesize_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            retrieve_url: "http://localhost:8081/search".to_string(),
            websearch_url: "http://localhost:8082/search".to_string(),
            synthesize_url: "http://localhost:8083/synthesize".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub max_chunks: usize,
    pub fallback_threshold: usize,
    pub confidence_threshold: f64,
    pub fallback_score_threshold: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { max_chunks: 5, fallback_threshold: 3, confidence_threshold: 0.7, fallback_score_threshold: 0.7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    pub max_results: usize,
    pub freshness_keywords: Vec<String>,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            max_results: 3,
            freshness_keywords: vec!["latest".to_string(), "current".to_string(), "newest".to_string(), "today".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self { model: "gpt-4o".to_string(), max_tokens: 2000, temperature: 0.3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStorageType {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub storage_type: SessionStorageType,
    pub default_ttl_minutes: i64,
    pub max_sessions: usize,
    pub cleanup_interval_minutes: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { storage_type: SessionStorageType::Memory, default_ttl_minutes: 30, max_sessions: 1000, cleanup_interval_minutes: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// Analysis interval, e.g. `"1h"`; see [`LearningSettings::analysis_interval_duration`].
    pub analysis_interval: String,
    pub lookback_days: i64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self { analysis_interval: "1h".to_string(), lookback_days: 30 }
    }
}

impl LearningSettings {
    /// Parse `analysis_interval` (`"30m"`, `"1h"`, `"45s"`) into a
    /// [`std::time::Duration`]. Falls back to one hour on a malformed value.
    pub fn analysis_interval_duration(&self) -> std::time::Duration {
        parse_human_duration(&self.analysis_interval).unwrap_or(std::time::Duration::from_secs(3600))
    }
}

fn parse_human_duration(raw: &str) -> Option<std::time::Duration> {
    let raw = raw.trim();
    let split_at = raw.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = raw.split_at(split_at);
    let value: u64 = digits.parse().ok()?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return None,
    };
    Some(std::time::Duration::from_secs(seconds))
}

/// Root configuration, layered over defaults. Missing required fields (an OpenAI
/// API key) fail [`Config::validate`] at startup unless `test_mode` is set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub services: ServicesConfig,
    pub retrieval: RetrievalSettings,
    pub websearch: WebSearchSettings,
    pub synthesis: SynthesisSettings,
    pub session: SessionSettings,
    pub learning: LearningSettings,
    pub test_mode: bool,
}

impl Config {
    /// Layer an optional YAML file and `CQO_`-prefixed environment
    /// variables over the documented defaults. The environment takes
    /// precedence over the file. Neither source is required to
    /// exist; an empty load yields [`Config::default`].
    pub fn load(yaml_path: Option<&str>) -> CoreResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = yaml_path {
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("CQO").separator("__").try_parsing(true));

        let built = builder.build().map_err(|e| CoreError::ConfigError(e.to_string()))?;
        let loaded: Config = built.try_deserialize().map_err(|e| CoreError::ConfigError(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Fail startup if a required field is missing, unless `test_mode` is
    /// set (missing required fields fail startup unless test mode is set).
    pub fn validate(&self) -> CoreResult<()> {
        if self.test_mode {
            return Ok(());
        }
        if self.openai.apikey.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::ConfigError("openai.apikey is required outside test mode".to_string()));
        }
        if self.retrieval.max_chunks == 0 {
            return Err(CoreError::ConfigError("retrieval.max_chunks must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.confidence_threshold) {
            return Err(CoreError::ConfigError("retrieval.confidence_threshold must be in [0, 1]".to_string()));
        }
        Ok(())
    }
}
