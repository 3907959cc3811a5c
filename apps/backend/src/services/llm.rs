//! Generative-text provider client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

pub struct Generated {
    pub content: String,
    pub model_used: Option<String>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generated>;
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateReply {
    content: String,
    #[serde(default)]
    model_used: Option<String>,
}

/// HTTP implementation talking to the configured LLM endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generated> {
        let response = self
            .client
            .post(format!("{}/generate", self.endpoint.trim_end_matches('/')))
            .json(&GenerateBody { prompt })
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("LLM provider unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| ApiError::Upstream(format!("LLM provider error: {}", e)))?;

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid LLM provider response: {}", e)))?;

        Ok(Generated {
            content: reply.content,
            model_used: reply.model_used,
        })
    }
}
