//! Configuration for the extraction pipeline.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`] or loaded from the environment with
//! [`ExtractionConfig::from_env`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which backend acts as the primary for [`crate::gateway::InferenceGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Ollama on a local or on-prem host. (default)
    #[default]
    Local,
    /// Hosted OpenAI-compatible API (Groq by default).
    Cloud,
}

impl FromStr for InferenceMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(InferenceMode::Local),
            "cloud" => Ok(InferenceMode::Cloud),
            other => Err(ExtractError::InvalidConfig(format!(
                "inference mode must be 'local' or 'cloud', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceMode::Local => f.write_str("local"),
            InferenceMode::Cloud => f.write_str("cloud"),
        }
    }
}

/// Configuration for document extraction.
///
/// Built via [`ExtractionConfig::builder()`], [`ExtractionConfig::from_env()`]
/// or [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use docsift::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .mode(docsift::InferenceMode::Local)
///     .ollama_model("phi3:mini")
///     .max_retries(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Primary backend selection. Default: [`InferenceMode::Local`].
    pub mode: InferenceMode,

    /// Ollama API host. Default: `http://localhost:11434`.
    pub ollama_host: String,

    /// Ollama model name. Default: `phi3:mini`.
    ///
    /// Phi-3 Mini extracts invoices acceptably on CPU-only hosts; larger
    /// documents or résumés with dense formatting benefit from a 7B+ model.
    pub ollama_model: String,

    /// API key for the hosted backend. Required for cloud mode; if absent in
    /// local mode, no cloud fallback is constructed.
    pub cloud_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible hosted API.
    /// Default: `https://api.groq.com/openai/v1`.
    pub cloud_base_url: String,

    /// Hosted model name. Default: `llama-3.1-70b-versatile`.
    pub cloud_model: String,

    /// Per-request timeout in seconds. Default: 60.
    ///
    /// Applies to every network call the gateway makes. A timed-out call is
    /// an ordinary failed attempt subject to retry/fallback, not a special
    /// case.
    pub request_timeout_secs: u64,

    /// Attempts against the primary backend per `generate()` call. Default: 3.
    ///
    /// Most 5xx and timeout errors are transient (overloaded backend, network
    /// blip). Non-retryable statuses (400/401/403/404) abort straight to the
    /// fallback instead of burning attempts.
    pub max_retries: u32,

    /// Whether to construct and use the other backend as fallback. Default: true.
    pub fallback_enabled: bool,

    /// Orchestrator-level attempts around the whole Infer stage. Default: 2.
    ///
    /// Composes with the gateway's internal retries: a second orchestrator
    /// attempt re-runs the full primary-then-fallback sequence.
    pub extract_attempts: u32,

    /// Minimum classifier confidence to commit to a type. Default: 0.3.
    /// Below this, detection yields [`crate::DocumentType::Unknown`].
    pub min_detection_confidence: f64,

    /// Minimum aggregate validation score for `is_valid`. Default: 0.5.
    pub min_validation_score: f64,

    /// Whether unresolved critical issues force `is_valid = false`. Default: true.
    pub fail_on_critical: bool,

    /// Maximum document characters forwarded to the model. Default: 8000.
    /// Longer texts are truncated with a marker appended.
    pub max_text_length: usize,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the document, which is
    /// exactly what extraction wants. Higher values hallucinate fields.
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 2048.
    pub max_tokens: u32,

    /// Concurrent in-flight extractions in batch mode. Default: 4.
    pub concurrency: usize,

    /// Currency assumed when no code or symbol can be detected. Default: USD.
    pub default_currency: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: InferenceMode::Local,
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "phi3:mini".to_string(),
            cloud_api_key: None,
            cloud_base_url: "https://api.groq.com/openai/v1".to_string(),
            cloud_model: "llama-3.1-70b-versatile".to_string(),
            request_timeout_secs: 60,
            max_retries: 3,
            fallback_enabled: true,
            extract_attempts: 2,
            min_detection_confidence: 0.3,
            min_validation_score: 0.5,
            fail_on_critical: true,
            max_text_length: 8000,
            temperature: 0.1,
            max_tokens: 2048,
            concurrency: 4,
            default_currency: "USD".to_string(),
        }
    }
}

impl ExtractionConfig {
    /// Create a new builder.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Re-enter the builder to override individual fields, e.g. applying CLI
    /// flags on top of an environment-derived config.
    pub fn into_builder(self) -> ExtractionConfigBuilder {
        ExtractionConfigBuilder { config: self }
    }

    /// Load configuration from environment variables.
    ///
    /// Recognised variables (unset variables keep their defaults):
    /// `DOCSIFT_MODE`, `OLLAMA_HOST`, `OLLAMA_MODEL`, `CLOUD_API_KEY`,
    /// `CLOUD_BASE_URL`, `CLOUD_MODEL`, `DOCSIFT_TIMEOUT`,
    /// `DOCSIFT_MAX_RETRIES`, `DOCSIFT_FALLBACK`, `DOCSIFT_MIN_CONFIDENCE`,
    /// `DOCSIFT_MAX_TEXT`.
    pub fn from_env() -> Result<Self, ExtractError> {
        let mut config = Self::default();

        if let Ok(mode) = std::env::var("DOCSIFT_MODE") {
            config.mode = mode.parse()?;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                config.ollama_host = host;
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            if !model.is_empty() {
                config.ollama_model = model;
            }
        }
        if let Ok(key) = std::env::var("CLOUD_API_KEY") {
            if !key.is_empty() {
                config.cloud_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("CLOUD_BASE_URL") {
            if !url.is_empty() {
                config.cloud_base_url = url;
            }
        }
        if let Ok(model) = std::env::var("CLOUD_MODEL") {
            if !model.is_empty() {
                config.cloud_model = model;
            }
        }
        if let Ok(secs) = std::env::var("DOCSIFT_TIMEOUT") {
            config.request_timeout_secs = secs.parse().map_err(|_| {
                ExtractError::InvalidConfig(format!("DOCSIFT_TIMEOUT must be an integer, got '{secs}'"))
            })?;
        }
        if let Ok(n) = std::env::var("DOCSIFT_MAX_RETRIES") {
            config.max_retries = n.parse().map_err(|_| {
                ExtractError::InvalidConfig(format!("DOCSIFT_MAX_RETRIES must be an integer, got '{n}'"))
            })?;
        }
        if let Ok(flag) = std::env::var("DOCSIFT_FALLBACK") {
            config.fallback_enabled = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("DOCSIFT_MIN_CONFIDENCE") {
            config.min_validation_score = v.parse().map_err(|_| {
                ExtractError::InvalidConfig(format!("DOCSIFT_MIN_CONFIDENCE must be a float, got '{v}'"))
            })?;
        }
        if let Ok(n) = std::env::var("DOCSIFT_MAX_TEXT") {
            config.max_text_length = n.parse().map_err(|_| {
                ExtractError::InvalidConfig(format!("DOCSIFT_MAX_TEXT must be an integer, got '{n}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints (cloud key presence, ranges).
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.mode == InferenceMode::Cloud && self.cloud_api_key.is_none() {
            return Err(ExtractError::InvalidConfig(
                "cloud mode requires an API key (set CLOUD_API_KEY)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_validation_score) {
            return Err(ExtractError::InvalidConfig(format!(
                "min_validation_score must be in [0, 1], got {}",
                self.min_validation_score
            )));
        }
        if self.max_retries == 0 {
            return Err(ExtractError::InvalidConfig("max_retries must be ≥ 1".into()));
        }
        if self.extract_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "extract_attempts must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn mode(mut self, mode: InferenceMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn ollama_host(mut self, host: impl Into<String>) -> Self {
        self.config.ollama_host = host.into();
        self
    }

    pub fn ollama_model(mut self, model: impl Into<String>) -> Self {
        self.config.ollama_model = model.into();
        self
    }

    pub fn cloud_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.cloud_api_key = Some(key.into());
        self
    }

    pub fn cloud_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.cloud_base_url = url.into();
        self
    }

    pub fn cloud_model(mut self, model: impl Into<String>) -> Self {
        self.config.cloud_model = model.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn fallback_enabled(mut self, v: bool) -> Self {
        self.config.fallback_enabled = v;
        self
    }

    pub fn extract_attempts(mut self, n: u32) -> Self {
        self.config.extract_attempts = n.max(1);
        self
    }

    pub fn min_detection_confidence(mut self, v: f64) -> Self {
        self.config.min_detection_confidence = v.clamp(0.0, 1.0);
        self
    }

    pub fn min_validation_score(mut self, v: f64) -> Self {
        self.config.min_validation_score = v.clamp(0.0, 1.0);
        self
    }

    pub fn fail_on_critical(mut self, v: bool) -> Self {
        self.config.fail_on_critical = v;
        self
    }

    pub fn max_text_length(mut self, n: usize) -> Self {
        self.config.max_text_length = n.max(100);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, InferenceMode::Local);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn builder_clamps() {
        let config = ExtractionConfig::builder()
            .temperature(9.0)
            .concurrency(0)
            .min_validation_score(1.5)
            .build()
            .unwrap();
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.min_validation_score, 1.0);
    }

    #[test]
    fn cloud_mode_requires_key() {
        let err = ExtractionConfig::builder()
            .mode(InferenceMode::Cloud)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("API key"));

        let ok = ExtractionConfig::builder()
            .mode(InferenceMode::Cloud)
            .cloud_api_key("gsk_test")
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("LOCAL".parse::<InferenceMode>().unwrap(), InferenceMode::Local);
        assert_eq!("cloud".parse::<InferenceMode>().unwrap(), InferenceMode::Cloud);
        assert!("hybrid".parse::<InferenceMode>().is_err());
    }
}
