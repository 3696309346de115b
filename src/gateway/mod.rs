//! Inference gateway: two interchangeable completion backends behind one
//! retry/backoff/fallback protocol.
//!
//! ## Topology
//!
//! The configured [`crate::config::InferenceMode`] picks the **primary**
//! backend; when fallback is enabled the backend of the *other* kind is
//! constructed as well (cloud fallback only when an API key is present).
//! Both share a single [`reqwest::Client`], so concurrent extractions reuse
//! one connection pool instead of taking per-call locks.
//!
//! ## Retry protocol
//!
//! Each `generate()` call makes up to `max_retries` attempts against the
//! primary. Failures are classified through
//! [`InferenceError::is_retryable`]: timeouts and connection failures retry,
//! HTTP statuses retry only for 408/429/5xx, and 429 specifically sleeps
//! `min(2^attempt, 10)` seconds first so a rate-limited provider gets room
//! to recover. A non-retryable failure skips the remaining attempts. Once
//! the primary is exhausted the fallback is tried exactly once; its failure
//! becomes the final error.
//!
//! The gateway is an explicitly constructed, injected handle — no module
//! globals — so tests substitute fake backends through
//! [`CompletionBackend`].

mod cloud;
mod ollama;

pub use cloud::CloudBackend;
pub use ollama::OllamaBackend;

use crate::config::{ExtractionConfig, InferenceMode};
use crate::error::{ExtractError, InferenceError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One completion attempt. Value object: a fresh instance per attempt.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the backend for a JSON-object completion where supported.
    pub json_mode: bool,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.1,
            max_tokens: 2048,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_json_mode(mut self, v: bool) -> Self {
        self.json_mode = v;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }
}

/// Unified response from any backend. Produced only by successful attempts.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub duration_ms: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl InferenceResponse {
    /// Generation throughput, or 0 when the backend reported no duration.
    pub fn tokens_per_second(&self) -> f64 {
        if self.duration_ms > 0.0 {
            self.completion_tokens as f64 / (self.duration_ms / 1000.0)
        } else {
            0.0
        }
    }
}

/// An opaque, interchangeable completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short provider name for logs and metadata ("ollama", "groq", …).
    fn provider(&self) -> &str;

    /// Model identifier this backend is configured for.
    fn model(&self) -> &str;

    /// Run one completion. Must apply its own request timeout.
    async fn generate(&self, request: &InferenceRequest)
        -> Result<InferenceResponse, InferenceError>;

    /// Cheap availability probe (never errors, just false).
    async fn health_check(&self) -> bool;
}

/// Health snapshot of the gateway's backends.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub mode: InferenceMode,
    pub primary_provider: String,
    pub primary_available: bool,
    pub fallback_provider: Option<String>,
    pub fallback_available: bool,
}

/// Dual-backend completion gateway with retry, backoff, and fallback.
pub struct InferenceGateway {
    primary: Arc<dyn CompletionBackend>,
    fallback: Option<Arc<dyn CompletionBackend>>,
    mode: InferenceMode,
    max_retries: u32,
}

impl InferenceGateway {
    /// Build primary and fallback backends from configuration, sharing one
    /// HTTP client (and thus one connection pool) between them.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let ollama = || -> Arc<dyn CompletionBackend> {
            Arc::new(OllamaBackend::new(
                client.clone(),
                &config.ollama_host,
                &config.ollama_model,
                timeout,
            ))
        };
        let cloud = |key: &str| -> Arc<dyn CompletionBackend> {
            Arc::new(CloudBackend::new(
                client.clone(),
                &config.cloud_base_url,
                key,
                &config.cloud_model,
                timeout,
            ))
        };

        let (primary, fallback): (Arc<dyn CompletionBackend>, Option<Arc<dyn CompletionBackend>>) =
            match config.mode {
                InferenceMode::Local => {
                    let fb = if config.fallback_enabled {
                        config.cloud_api_key.as_deref().map(cloud)
                    } else {
                        None
                    };
                    (ollama(), fb)
                }
                InferenceMode::Cloud => {
                    let key = config.cloud_api_key.as_deref().ok_or_else(|| {
                        InferenceError::NotConfigured {
                            provider: "cloud".into(),
                            hint: "set CLOUD_API_KEY or switch DOCSIFT_MODE to local".into(),
                        }
                    })?;
                    let fb = config.fallback_enabled.then(ollama);
                    (cloud(key), fb)
                }
            };

        info!(
            mode = %config.mode,
            primary = primary.provider(),
            fallback = fallback.as_ref().map(|f| f.provider()),
            "inference gateway initialised"
        );

        Ok(Self {
            primary,
            fallback,
            mode: config.mode,
            max_retries: config.max_retries,
        })
    }

    /// Assemble a gateway from pre-built backends. The test seam.
    pub fn new(
        primary: Arc<dyn CompletionBackend>,
        fallback: Option<Arc<dyn CompletionBackend>>,
        max_retries: u32,
    ) -> Self {
        Self {
            primary,
            fallback,
            mode: InferenceMode::Local,
            max_retries: max_retries.max(1),
        }
    }

    /// Provider name of the primary backend.
    pub fn provider(&self) -> &str {
        self.primary.provider()
    }

    /// Run a completion with retries on the primary and a single fallback
    /// attempt.
    ///
    /// Returns the first successful [`InferenceResponse`]; on total failure
    /// returns the fallback's error when a fallback ran, otherwise the
    /// primary's last error.
    pub async fn generate(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        let mut last_err: Option<InferenceError> = None;

        for attempt in 0..self.max_retries {
            match self.primary.generate(request).await {
                Ok(response) => {
                    debug!(
                        provider = response.provider.as_str(),
                        attempt = attempt + 1,
                        tokens = response.total_tokens,
                        duration_ms = response.duration_ms,
                        "completion succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        provider = self.primary.provider(),
                        attempt = attempt + 1,
                        max = self.max_retries,
                        error = %e,
                        "primary backend failed"
                    );

                    // Rate limiting: waiting is the only useful retry.
                    if e.status() == Some(429) && attempt + 1 < self.max_retries {
                        let wait = Duration::from_secs((1u64 << attempt).min(10));
                        warn!(wait_secs = wait.as_secs(), "rate limited, backing off");
                        sleep(wait).await;
                    }

                    let retryable = e.is_retryable();
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            info!(provider = fallback.provider(), "attempting fallback backend");
            match fallback.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(provider = fallback.provider(), error = %e, "fallback backend failed");
                    // Fallback's failure is the final word once we got here.
                    return Err(e);
                }
            }
        }

        Err(last_err.unwrap_or(InferenceError::NotConfigured {
            provider: "none".into(),
            hint: "no backend produced a result".into(),
        }))
    }

    /// Blocking wrapper around [`generate`](Self::generate) with identical
    /// retry semantics. Creates a temporary tokio runtime internally; do not
    /// call from inside an async context.
    pub fn generate_sync(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| InferenceError::NotConfigured {
                provider: self.primary.provider().to_string(),
                hint: format!("failed to create tokio runtime: {e}"),
            })?
            .block_on(self.generate(request))
    }

    /// Probe both backends.
    pub async fn health_check(&self) -> GatewayHealth {
        let primary_available = self.primary.health_check().await;
        let (fallback_provider, fallback_available) = match &self.fallback {
            Some(fb) => (Some(fb.provider().to_string()), fb.health_check().await),
            None => (None, false),
        };

        GatewayHealth {
            mode: self.mode,
            primary_provider: self.primary.provider().to_string(),
            primary_available,
            fallback_provider,
            fallback_available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A backend scripted with a fixed outcome sequence.
    struct ScriptedBackend {
        provider: &'static str,
        calls: AtomicU32,
        script: Vec<Result<String, ScriptedFailure>>,
    }

    #[derive(Clone)]
    enum ScriptedFailure {
        Timeout,
        Status(u16),
    }

    impl ScriptedBackend {
        fn new(provider: &'static str, script: Vec<Result<String, ScriptedFailure>>) -> Self {
            Self {
                provider,
                calls: AtomicU32::new(0),
                script,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn provider(&self) -> &str {
            self.provider
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _request: &InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let step = self.script.get(n).or_else(|| self.script.last()).cloned();
            match step {
                Some(Ok(content)) => Ok(InferenceResponse {
                    content,
                    provider: self.provider.to_string(),
                    model: "scripted".to_string(),
                    duration_ms: 5.0,
                    prompt_tokens: 10,
                    completion_tokens: 20,
                    total_tokens: 30,
                }),
                Some(Err(ScriptedFailure::Timeout)) => Err(InferenceError::Timeout {
                    provider: self.provider.to_string(),
                    timeout_secs: 1,
                    elapsed: Duration::from_secs(1),
                }),
                Some(Err(ScriptedFailure::Status(code))) => Err(InferenceError::Response {
                    provider: self.provider.to_string(),
                    status: Some(code),
                    detail: format!("HTTP {code}"),
                }),
                None => unreachable!("empty script"),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let primary = Arc::new(ScriptedBackend::new("ollama", vec![Ok("{}".into())]));
        let gateway = InferenceGateway::new(primary.clone(), None, 3);

        let response = gateway.generate(&InferenceRequest::new("hi")).await.unwrap();
        assert_eq!(response.provider, "ollama");
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let primary = Arc::new(ScriptedBackend::new(
            "ollama",
            vec![
                Err(ScriptedFailure::Status(503)),
                Err(ScriptedFailure::Timeout),
                Ok("{}".into()),
            ],
        ));
        let gateway = InferenceGateway::new(primary.clone(), None, 3);

        let response = gateway.generate(&InferenceRequest::new("hi")).await;
        assert!(response.is_ok());
        assert_eq!(primary.call_count(), 3);
    }

    #[tokio::test]
    async fn fallback_masks_primary_timeouts() {
        let primary = Arc::new(ScriptedBackend::new(
            "ollama",
            vec![Err(ScriptedFailure::Timeout)],
        ));
        let fallback = Arc::new(ScriptedBackend::new("groq", vec![Ok("fallback".into())]));
        let gateway = InferenceGateway::new(primary.clone(), Some(fallback.clone()), 2);

        let response = gateway.generate(&InferenceRequest::new("hi")).await.unwrap();
        assert_eq!(response.provider, "groq");
        assert_eq!(response.content, "fallback");
        assert_eq!(primary.call_count(), 2, "primary exhausted its attempts");
        assert_eq!(fallback.call_count(), 1, "fallback tried exactly once");
    }

    #[tokio::test]
    async fn non_retryable_aborts_to_fallback() {
        let primary = Arc::new(ScriptedBackend::new(
            "groq",
            vec![Err(ScriptedFailure::Status(401))],
        ));
        let fallback = Arc::new(ScriptedBackend::new("ollama", vec![Ok("{}".into())]));
        let gateway = InferenceGateway::new(primary.clone(), Some(fallback.clone()), 3);

        let response = gateway.generate(&InferenceRequest::new("hi")).await;
        assert!(response.is_ok());
        assert_eq!(primary.call_count(), 1, "401 must not be retried");
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn rate_limit_retries_up_to_attempt_limit() {
        let primary = Arc::new(ScriptedBackend::new(
            "groq",
            vec![Err(ScriptedFailure::Status(429))],
        ));
        let gateway = InferenceGateway::new(primary.clone(), None, 2);

        let err = gateway.generate(&InferenceRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(primary.call_count(), 2);
    }

    #[tokio::test]
    async fn fallback_failure_is_the_final_error() {
        let primary = Arc::new(ScriptedBackend::new(
            "ollama",
            vec![Err(ScriptedFailure::Timeout)],
        ));
        let fallback = Arc::new(ScriptedBackend::new(
            "groq",
            vec![Err(ScriptedFailure::Status(500))],
        ));
        let gateway = InferenceGateway::new(primary, Some(fallback), 1);

        let err = gateway.generate(&InferenceRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.status(), Some(500), "fallback's error surfaces, not primary's");
    }

    #[test]
    fn tokens_per_second_derivation() {
        let response = InferenceResponse {
            content: String::new(),
            provider: "x".into(),
            model: "y".into(),
            duration_ms: 2000.0,
            prompt_tokens: 0,
            completion_tokens: 100,
            total_tokens: 100,
        };
        assert!((response.tokens_per_second() - 50.0).abs() < 1e-9);
    }
}
