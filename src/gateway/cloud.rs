//! Cloud inference over any OpenAI-compatible chat-completions API.
//!
//! Defaults target Groq, but the base URL is configurable, so any service
//! exposing `POST {base}/chat/completions` with bearer auth works.

use super::{CompletionBackend, InferenceRequest, InferenceResponse};
use crate::error::InferenceError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct CloudBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl CloudBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    fn map_request_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                provider: "cloud".into(),
                timeout_secs: self.timeout.as_secs(),
                elapsed: self.timeout,
            }
        } else if e.is_connect() {
            InferenceError::Connection {
                host: self.base_url.clone(),
                detail: e.to_string(),
            }
        } else {
            InferenceError::Response {
                provider: "cloud".into(),
                status: e.status().map(|s| s.as_u16()),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for CloudBackend {
    fn provider(&self) -> &str {
        "cloud"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        let mut messages: Vec<Value> = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_mode {
            payload["response_format"] = json!({"type": "json_object"});
        }

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Response {
                provider: "cloud".into(),
                status: Some(status.as_u16()),
                detail: body.chars().take(200).collect(),
            });
        }

        let completion: ChatCompletion =
            response.json().await.map_err(|e| InferenceError::Response {
                provider: "cloud".into(),
                status: None,
                detail: format!("malformed completion body: {e}"),
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(InferenceError::Response {
                provider: "cloud".into(),
                status: None,
                detail: "empty completion from model".into(),
            });
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            model = completion.model.as_str(),
            duration_ms,
            total_tokens = completion.usage.total_tokens,
            "cloud completion finished"
        );
        Ok(InferenceResponse {
            content,
            provider: "cloud".to_string(),
            model: if completion.model.is_empty() {
                self.model.clone()
            } else {
                completion.model
            },
            duration_ms,
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
            total_tokens: completion.usage.total_tokens,
        })
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let backend = CloudBackend::new(
            reqwest::Client::new(),
            "https://api.groq.com/openai/v1/",
            "key",
            "llama-3.1-70b-versatile",
            Duration::from_secs(60),
        );
        assert_eq!(backend.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(backend.provider(), "cloud");
    }

    #[test]
    fn completion_body_parses_openai_shape() {
        let body = r#"{
            "model": "llama-3.1-70b-versatile",
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        }"#;
        let parsed: ChatCompletion = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"ok\": true}");
        assert_eq!(parsed.usage.total_tokens, 20);
    }
}
