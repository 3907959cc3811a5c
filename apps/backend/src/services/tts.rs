//! Text-to-speech provider client.
//!
//! The provider is an external collaborator reached over HTTP; the trait
//! keeps the routes testable with an in-process fake.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::models::{TtsRequest, WordTiming};

/// Synthesized speech: raw audio bytes plus optional word-level timings.
pub struct Synthesis {
    pub audio: Vec<u8>,
    pub word_timings: Vec<WordTiming>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Synthesis>;
}

#[derive(Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    language_code: &'a str,
    voice_name: &'a str,
    audio_encoding: &'a str,
    enable_time_pointing: bool,
    is_ssml: bool,
}

#[derive(Deserialize)]
struct SynthesizeReply {
    audio_content: String,
    #[serde(default)]
    timepoints: Vec<WordTiming>,
}

/// HTTP implementation talking to the configured TTS endpoint.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Synthesis> {
        let body = SynthesizeBody {
            text: &request.text,
            language_code: &request.language_code,
            voice_name: &request.voice_name,
            audio_encoding: &request.audio_encoding,
            enable_time_pointing: request.enable_time_pointing,
            is_ssml: request.is_ssml,
        };

        let response = self
            .client
            .post(format!("{}/synthesize", self.endpoint.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("TTS provider unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| ApiError::Upstream(format!("TTS provider error: {}", e)))?;

        let reply: SynthesizeReply = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid TTS provider response: {}", e)))?;

        let audio = STANDARD
            .decode(&reply.audio_content)
            .map_err(|e| ApiError::Upstream(format!("invalid TTS audio payload: {}", e)))?;

        Ok(Synthesis {
            audio,
            word_timings: reply.timepoints,
        })
    }
}
