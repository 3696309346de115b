//! Local inference over the Ollama HTTP API (`/api/generate`).

use super::{CompletionBackend, InferenceRequest, InferenceResponse};
use crate::error::InferenceError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Non-streaming completion client for an Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaCompletion {
    #[serde(default)]
    response: String,
    #[serde(default)]
    model: String,
    /// Wall time for the whole request, nanoseconds.
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaBackend {
    pub fn new(
        client: reqwest::Client,
        host: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut host = host.into();
        while host.ends_with('/') {
            host.pop();
        }
        Self {
            client,
            host,
            model: model.into(),
            timeout,
        }
    }

    fn map_request_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                provider: "ollama".into(),
                timeout_secs: self.timeout.as_secs(),
                elapsed: self.timeout,
            }
        } else if e.is_connect() {
            InferenceError::Connection {
                host: self.host.clone(),
                detail: e.to_string(),
            }
        } else {
            InferenceError::Response {
                provider: "ollama".into(),
                status: e.status().map(|s| s.as_u16()),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        if let Some(system) = &request.system {
            payload["system"] = json!(system);
        }
        if request.json_mode {
            payload["format"] = json!("json");
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Response {
                provider: "ollama".into(),
                status: Some(status.as_u16()),
                detail: truncate(&body, 200),
            });
        }

        let completion: OllamaCompletion =
            response.json().await.map_err(|e| InferenceError::Response {
                provider: "ollama".into(),
                status: None,
                detail: format!("malformed completion body: {e}"),
            })?;

        if completion.response.trim().is_empty() {
            return Err(InferenceError::Response {
                provider: "ollama".into(),
                status: None,
                detail: "empty completion from model".into(),
            });
        }

        let duration_ms = completion.total_duration as f64 / 1_000_000.0;
        let result = InferenceResponse {
            content: completion.response,
            provider: "ollama".to_string(),
            model: if completion.model.is_empty() {
                self.model.clone()
            } else {
                completion.model
            },
            duration_ms,
            prompt_tokens: completion.prompt_eval_count,
            completion_tokens: completion.eval_count,
            total_tokens: completion.prompt_eval_count + completion.eval_count,
        };
        debug!(
            model = result.model.as_str(),
            duration_ms,
            tokens_per_second = result.tokens_per_second(),
            "ollama completion finished"
        );
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_normalised() {
        let backend = OllamaBackend::new(
            reqwest::Client::new(),
            "http://localhost:11434//",
            "phi3:mini",
            Duration::from_secs(60),
        );
        assert_eq!(backend.host, "http://localhost:11434");
        assert_eq!(backend.model(), "phi3:mini");
        assert_eq!(backend.provider(), "ollama");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let t = truncate("日本語テキスト", 4);
        assert!(t.ends_with('…'));
    }
}
