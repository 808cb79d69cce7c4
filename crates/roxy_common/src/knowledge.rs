//! Knowledge lookup - free-text answers for things the classifier does not
//! recognise (anime openings, obscure artists, new releases).

use anyhow::Result;
use std::sync::Mutex;

use crate::classifier::{build_http_client, call_openai_compatible, ClientConfig, ClientError};

/// Answers shorter than this (after trimming) are not worth using
pub const MIN_USEFUL_ANSWER_CHARS: usize = 10;

/// External knowledge service
pub trait KnowledgeClient: Send + Sync {
    fn lookup(&self, query: &str) -> Result<String, ClientError>;
}

/// Whether a lookup answer carries enough text to act on
pub fn is_useful_answer(answer: &str) -> bool {
    answer.trim().chars().count() > MIN_USEFUL_ANSWER_CHARS
}

/// OpenAI-compatible chat endpoint used as a knowledge source
pub struct HttpKnowledgeClient {
    config: ClientConfig,
    client: reqwest::blocking::Client,
}

impl HttpKnowledgeClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = build_http_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }
}

impl KnowledgeClient for HttpKnowledgeClient {
    fn lookup(&self, query: &str) -> Result<String, ClientError> {
        if !self.config.enabled {
            return Err(ClientError::Disabled);
        }
        call_openai_compatible(
            &self.client,
            &self.config,
            "Responde de forma breve y concreta. Da nombres exactos cuando existan.",
            query,
            false,
        )
    }
}

/// Scripted knowledge source for tests
pub struct FakeKnowledge {
    answer: Result<String, ClientError>,
    queries: Mutex<Vec<String>>,
}

impl FakeKnowledge {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ClientError) -> Self {
        Self {
            answer: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl KnowledgeClient for FakeKnowledge {
    fn lookup(&self, query: &str) -> Result<String, ClientError> {
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        self.answer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_useful_answer_threshold() {
        assert!(!is_useful_answer("   corto   "));
        assert!(!is_useful_answer("0123456789"));
        assert!(is_useful_answer("El opening es Otonoke"));
    }

    #[test]
    fn test_fake_records_queries() {
        let k = FakeKnowledge::answering("respuesta larga suficiente");
        let _ = k.lookup("¿qué es dandadan?");
        assert_eq!(k.queries(), vec!["¿qué es dandadan?".to_string()]);
    }
}
