//! Classifier Client - external intent classification service.
//!
//! Sends `(instructions, utterance)` to an LLM backend and returns the raw
//! reply text. Parsing the reply is the resolver's job, so a malformed answer
//! surfaces there as a fallback, never here as a panic.
//! Supports Ollama and OpenAI-compatible endpoints plus a fake for tests.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Endpoint configuration shared by the classifier and knowledge clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Collaborator errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("client is disabled in configuration")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    #[error("service returned an empty response")]
    EmptyResponse,
}

/// External classifier
pub trait ClassifierClient: Send + Sync {
    /// Classify `utterance` under `instructions`, returning the raw reply
    fn classify(&self, instructions: &str, utterance: &str) -> Result<String, ClientError>;
}

/// HTTP classifier (Ollama first, OpenAI-compatible fallback)
pub struct HttpClassifierClient {
    config: ClientConfig,
    client: reqwest::blocking::Client,
}

impl HttpClassifierClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn is_ollama_endpoint(&self) -> bool {
        self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama")
    }

    fn call_ollama(&self, instructions: &str, utterance: &str) -> Result<String, ClientError> {
        let url = format!("{}/api/generate", self.config.endpoint);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "system": instructions,
            "prompt": format!("Input: {}", utterance),
            "stream": false,
            "format": "json",
            "options": {"temperature": 0.1, "num_predict": 200},
        });

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .map_err(|e| map_send_error(e, self.config.timeout_secs))?;

        if !response.status().is_success() {
            return Err(ClientError::Http(format!(
                "HTTP {} from Ollama",
                response.status()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| ClientError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        non_empty(response_json.get("response").and_then(|v| v.as_str()))
    }
}

impl ClassifierClient for HttpClassifierClient {
    fn classify(&self, instructions: &str, utterance: &str) -> Result<String, ClientError> {
        if !self.config.enabled {
            return Err(ClientError::Disabled);
        }

        if self.is_ollama_endpoint() {
            match self.call_ollama(instructions, utterance) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::debug!("Ollama API failed, trying OpenAI-compatible: {}", e);
                }
            }
        }

        call_openai_compatible(
            &self.client,
            &self.config,
            instructions,
            &format!("Input: {}", utterance),
            true,
        )
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(timeout_secs)
    } else {
        ClientError::Http(format!("Request failed: {}", e))
    }
}

fn non_empty(text: Option<&str>) -> Result<String, ClientError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.to_string()),
        _ => Err(ClientError::EmptyResponse),
    }
}

/// POST to `/v1/chat/completions` and return the first choice's content
pub(crate) fn call_openai_compatible(
    client: &reqwest::blocking::Client,
    config: &ClientConfig,
    system_prompt: &str,
    user_prompt: &str,
    json_mode: bool,
) -> Result<String, ClientError> {
    let url = format!("{}/v1/chat/completions", config.endpoint);

    let mut request_body = serde_json::json!({
        "model": config.model,
        "messages": [
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": user_prompt},
        ],
    });
    if json_mode {
        request_body["response_format"] = serde_json::json!({"type": "json_object"});
    }

    let mut request = client.post(&url).json(&request_body);
    if let Some(api_key) = &config.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request
        .send()
        .map_err(|e| map_send_error(e, config.timeout_secs))?;

    if !response.status().is_success() {
        return Err(ClientError::Http(format!(
            "HTTP {} from OpenAI-compatible API",
            response.status()
        )));
    }

    let response_json: serde_json::Value = response
        .json()
        .map_err(|e| ClientError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    non_empty(
        response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str()),
    )
}

/// Scripted classifier for tests.
///
/// Replies are consumed in order; the last one repeats forever.
pub struct FakeClassifier {
    replies: Mutex<Vec<Result<String, ClientError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeClassifier {
    pub fn new(replies: Vec<Result<String, ClientError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with this JSON
    pub fn always_json(json: serde_json::Value) -> Self {
        Self::new(vec![Ok(json.to_string())])
    }

    /// Always answer with this raw text
    pub fn always_text(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Service that is never reachable
    pub fn unreachable() -> Self {
        Self::new(vec![Err(ClientError::Http("connection refused".to_string()))])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// (instructions, utterance) pairs seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ClassifierClient for FakeClassifier {
    fn classify(&self, instructions: &str, utterance: &str) -> Result<String, ClientError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((instructions.to_string(), utterance.to_string()));
        }

        let mut replies = match self.replies.lock() {
            Ok(r) => r,
            Err(_) => return Err(ClientError::EmptyResponse),
        };
        match replies.len() {
            0 => Err(ClientError::EmptyResponse),
            1 => replies[0].clone(),
            _ => replies.remove(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "http://localhost:11434");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_client_config_partial_toml() {
        let config: ClientConfig = toml::from_str("model = \"qwen2.5:3b\"").unwrap();
        assert_eq!(config.model, "qwen2.5:3b");
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_disabled_http_client_short_circuits() {
        let config = ClientConfig {
            enabled: false,
            ..ClientConfig::default()
        };
        let client = HttpClassifierClient::new(config).unwrap();
        assert_eq!(client.classify("x", "y"), Err(ClientError::Disabled));
    }

    #[test]
    fn test_fake_repeats_last_reply() {
        let fake = FakeClassifier::always_text("{}");
        assert_eq!(fake.classify("i", "a").unwrap(), "{}");
        assert_eq!(fake.classify("i", "b").unwrap(), "{}");
        assert_eq!(fake.call_count(), 2);
        assert_eq!(fake.calls()[1].1, "b");
    }

    #[test]
    fn test_fake_sequence() {
        let fake = FakeClassifier::new(vec![
            Ok("first".to_string()),
            Err(ClientError::Timeout(15)),
        ]);
        assert_eq!(fake.classify("", "").unwrap(), "first");
        assert_eq!(fake.classify("", ""), Err(ClientError::Timeout(15)));
        assert_eq!(fake.classify("", ""), Err(ClientError::Timeout(15)));
    }
}
