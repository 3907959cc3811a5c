//! Generative-text endpoint

use std::time::Instant;

use axum::{extract::State, Json};

use crate::error::{ApiError, Result};
use crate::models::{GenerateRequest, GenerateResponse};
use crate::AppState;

/// POST /llm/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let provider = state
        .llm
        .as_ref()
        .ok_or_else(|| ApiError::Upstream("LLM provider not configured".to_string()))?;

    if payload.prompt.trim().is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }

    let started = Instant::now();
    let generated = provider.generate(&payload.prompt).await?;
    let elapsed_ms = started.elapsed().as_millis() as i32;

    state
        .db
        .insert_llm_record(
            &payload.prompt,
            Some(&generated.content),
            generated.model_used.as_deref(),
            Some(elapsed_ms),
        )
        .await?;

    tracing::info!(
        prompt_length = payload.prompt.len(),
        elapsed_ms,
        "text generated"
    );

    Ok(Json(GenerateResponse {
        content: generated.content,
        model_used: generated.model_used,
    }))
}
