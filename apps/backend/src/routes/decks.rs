//! Deck endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedUser;
use crate::AppState;

/// GET /decks
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<DeckListResponse>> {
    let decks = state.db.list_decks(auth.user_id).await?;
    Ok(Json(DeckListResponse { decks }))
}

/// POST /decks
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(payload): Json<DeckCreateRequest>,
) -> Result<(StatusCode, Json<DeckResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("deck name must not be empty".to_string()));
    }

    let deck = state.db.create_deck(auth.user_id, name).await?;
    Ok((StatusCode::CREATED, Json(deck_response(deck, 0))))
}

/// GET /decks/{id}
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(deck_id): Path<Uuid>,
) -> Result<Json<DeckResponse>> {
    let deck = state.db.get_owned_deck(auth.user_id, deck_id).await?;
    let card_count = state.db.count_cards(deck.id).await?;
    Ok(Json(deck_response(deck, card_count)))
}

/// PUT /decks/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(deck_id): Path<Uuid>,
    Json(payload): Json<DeckUpdateRequest>,
) -> Result<Json<DeckResponse>> {
    state.db.get_owned_deck(auth.user_id, deck_id).await?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("deck name must not be empty".to_string()))?;

    let deck = state.db.update_deck_name(deck_id, name).await?;
    let card_count = state.db.count_cards(deck.id).await?;
    Ok(Json(deck_response(deck, card_count)))
}

/// DELETE /decks/{id}
///
/// Cascades over the deck's cards, their sections, and their audio rows.
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(deck_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.db.get_owned_deck(auth.user_id, deck_id).await?;
    state.db.delete_deck(deck_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn deck_response(deck: Deck, card_count: i64) -> DeckResponse {
    DeckResponse {
        id: deck.id,
        name: deck.name,
        card_count,
        created_at: deck.created_at,
    }
}
