//! Flashcard aggregate endpoints

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedUser;
use crate::services::storage::StorageService;
use crate::AppState;

/// Signed audio URLs stay valid for an hour
const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /flashcards
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FlashcardListResponse>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let flashcards = state.db.list_flashcards(auth.user_id, limit, offset).await?;
    Ok(Json(FlashcardListResponse { flashcards }))
}

/// POST /flashcards
///
/// Creates the card with all supplied sections in one transaction; the
/// target deck must exist and belong to the caller before anything is
/// written.
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(payload): Json<FlashcardCreateRequest>,
) -> Result<(StatusCode, Json<FlashcardResponse>)> {
    state.db.get_owned_deck(auth.user_id, payload.deck_id).await?;

    let flashcard = state.db.create_flashcard(&payload).await?;
    Ok((StatusCode::CREATED, Json(flashcard)))
}

/// GET /flashcards/{id}
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<FlashcardResponse>> {
    state.db.get_owned_flashcard(auth.user_id, card_id).await?;

    let flashcard = state
        .db
        .get_flashcard(card_id)
        .await?
        .ok_or(ApiError::CardNotFound(card_id))?;
    Ok(Json(flashcard))
}

/// PUT /flashcards/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(card_id): Path<Uuid>,
    Json(payload): Json<FlashcardUpdateRequest>,
) -> Result<Json<FlashcardResponse>> {
    state.db.get_owned_flashcard(auth.user_id, card_id).await?;

    if payload.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }

    // Reassignment only onto a deck the caller owns
    if let Some(deck_id) = payload.deck_id {
        state.db.get_owned_deck(auth.user_id, deck_id).await?;
    }

    let flashcard = state.db.update_flashcard(card_id, &payload).await?;
    Ok(Json(flashcard))
}

/// PUT /flashcards/{id}/fsrs
///
/// Scheduling-only upsert; the rest of the card is untouched.
pub async fn update_fsrs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(card_id): Path<Uuid>,
    Json(patch): Json<FsrsPatch>,
) -> Result<Json<FlashcardResponse>> {
    state.db.get_owned_flashcard(auth.user_id, card_id).await?;

    let request = FlashcardUpdateRequest {
        deck_id: None,
        stage: None,
        discussion: None,
        final_card: None,
        fsrs: Some(patch),
    };
    let flashcard = state.db.update_flashcard(card_id, &request).await?;
    Ok(Json(flashcard))
}

/// DELETE /flashcards/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(card_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.db.get_owned_flashcard(auth.user_id, card_id).await?;
    state.db.delete_flashcard(card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /flashcards/{id}/signed-urls
///
/// Fresh signed URLs for every audio row the card's sections reference.
pub async fn signed_urls(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<FlashcardSignedUrlsResponse>> {
    state.db.get_owned_flashcard(auth.user_id, card_id).await?;

    let (discussion, question, answer) = state.db.get_flashcard_audio(card_id).await?;

    Ok(Json(FlashcardSignedUrlsResponse {
        flashcard_id: card_id,
        expiration_secs: SIGNED_URL_TTL.as_secs(),
        discussion: urls_for(&state, discussion).await,
        question: urls_for(&state, question).await,
        answer: urls_for(&state, answer).await,
    }))
}

async fn urls_for(state: &AppState, audio: Option<AudioFile>) -> Option<AudioUrls> {
    let audio = audio?;

    let audio_url = state
        .storage
        .audio_url(&StorageService::make_key(&audio.filename), SIGNED_URL_TTL)
        .await;

    let mut timing_url = None;
    if let Some(timing) = &audio.timing_filename {
        timing_url = Some(
            state
                .storage
                .audio_url(&StorageService::make_key(timing), SIGNED_URL_TTL)
                .await,
        );
    }

    Some(AudioUrls {
        audio_url: Some(audio_url),
        timing_url,
    })
}
