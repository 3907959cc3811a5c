//! Text-to-speech endpoint

use std::time::Instant;

use axum::{extract::State, Json};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{TtsRequest, TtsResponse};
use crate::services::storage::StorageService;
use crate::AppState;

/// POST /tts/synthesize
///
/// Proxies the request to the configured provider, uploads the audio
/// (and word timings, when the provider returned any) to object storage,
/// and logs the request.
pub async fn synthesize(
    State(state): State<AppState>,
    Json(payload): Json<TtsRequest>,
) -> Result<Json<TtsResponse>> {
    let provider = state
        .tts
        .as_ref()
        .ok_or_else(|| ApiError::Upstream("TTS provider not configured".to_string()))?;

    if payload.text.trim().is_empty() {
        return Err(ApiError::Validation("text must not be empty".to_string()));
    }

    let started = Instant::now();
    let synthesis = provider.synthesize(&payload).await?;

    let stem = Uuid::new_v4();
    let filename = format!("tts-{}.{}", stem, audio_extension(&payload.audio_encoding));
    state
        .storage
        .upload_file(
            &StorageService::make_key(&filename),
            &synthesis.audio,
            Some(content_type(&payload.audio_encoding)),
        )
        .await
        .map_err(|e| ApiError::Internal(format!("audio upload failed: {}", e)))?;

    let mut timing_filename = None;
    if !synthesis.word_timings.is_empty() {
        let name = format!("tts-{}.timings.json", stem);
        let body = serde_json::to_vec(&synthesis.word_timings)
            .map_err(|e| ApiError::Internal(format!("timing serialization failed: {}", e)))?;
        state
            .storage
            .upload_file(
                &StorageService::make_key(&name),
                &body,
                Some("application/json"),
            )
            .await
            .map_err(|e| ApiError::Internal(format!("timing upload failed: {}", e)))?;
        timing_filename = Some(name);
    }

    let elapsed_ms = started.elapsed().as_millis() as i32;
    state
        .db
        .insert_tts_record(
            &payload,
            Some(&filename),
            timing_filename.as_deref(),
            Some(elapsed_ms),
        )
        .await?;

    tracing::info!(
        filename = %filename,
        timings = synthesis.word_timings.len(),
        elapsed_ms,
        "speech synthesized"
    );

    Ok(Json(TtsResponse {
        filename,
        timing_filename,
        word_timings: synthesis.word_timings,
        text_length: payload.text.len(),
        language: payload.language_code,
        voice: payload.voice_name,
    }))
}

fn audio_extension(encoding: &str) -> &'static str {
    match encoding.to_ascii_uppercase().as_str() {
        "OGG_OPUS" => "ogg",
        "LINEAR16" => "wav",
        _ => "mp3",
    }
}

fn content_type(encoding: &str) -> &'static str {
    match encoding.to_ascii_uppercase().as_str() {
        "OGG_OPUS" => "audio/ogg",
        "LINEAR16" => "audio/wav",
        _ => "audio/mpeg",
    }
}
