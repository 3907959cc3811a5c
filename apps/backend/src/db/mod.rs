//! PostgreSQL database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === User Repository ===

    /// Create a new user with a pre-hashed password
    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, is_active, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::Validation(format!("email {} is already registered", email))
            }
            _ => ApiError::Database(e),
        })?;

        Ok(user)
    }

    /// Get user by email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_active, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, is_active, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // === Refresh Token Store ===

    /// Insert a refresh token row. Only the digest is stored; the raw
    /// token exists transiently in the caller.
    pub async fn insert_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, issued_at, expires_at, revoked
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    /// Look up a non-revoked token by digest. Absent and revoked are
    /// indistinguishable to the caller.
    pub async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1 AND revoked = FALSE
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Revoke a refresh token. Idempotent.
    pub async fn revoke_refresh_token(&self, token_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE id = $1
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rotate a refresh token: revoke the predecessor and insert its
    /// successor in one transaction. The revoke is a compare-and-swap on
    /// `revoked = FALSE`, so a concurrent rotation of the same token makes
    /// exactly one caller win; the loser gets InvalidToken.
    pub async fn rotate_refresh_token(
        &self,
        old_token_id: Uuid,
        user_id: Uuid,
        new_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(old_token_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::InvalidToken);
        }

        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, issued_at, expires_at, revoked
            "#,
        )
        .bind(user_id)
        .bind(new_token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(token)
    }

    // === Deck Repository ===

    /// Create a deck owned by the given user
    pub async fn create_deck(&self, owner_id: Uuid, name: &str) -> Result<Deck> {
        let deck = sqlx::query_as::<_, Deck>(
            r#"
            INSERT INTO decks (name, owner_id)
            VALUES ($1, $2)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(name)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(deck)
    }

    /// Get deck by ID
    pub async fn get_deck(&self, deck_id: Uuid) -> Result<Option<Deck>> {
        let deck = sqlx::query_as::<_, Deck>(
            r#"
            SELECT id, name, owner_id, created_at
            FROM decks
            WHERE id = $1
            "#,
        )
        .bind(deck_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(deck)
    }

    /// Ownership guard: resolve a deck and confirm the caller owns it.
    /// Runs before every user-scoped deck or card mutation.
    pub async fn get_owned_deck(&self, user_id: Uuid, deck_id: Uuid) -> Result<Deck> {
        let deck = self
            .get_deck(deck_id)
            .await?
            .ok_or(ApiError::DeckNotFound(deck_id))?;

        if deck.owner_id != user_id {
            return Err(ApiError::Forbidden(format!(
                "deck {} is owned by another user",
                deck_id
            )));
        }

        Ok(deck)
    }

    /// List the caller's decks with card counts
    pub async fn list_decks(&self, owner_id: Uuid) -> Result<Vec<DeckResponse>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.name, d.created_at, COUNT(f.id) AS card_count
            FROM decks d
            LEFT JOIN flashcards f ON f.deck_id = d.id
            WHERE d.owner_id = $1
            GROUP BY d.id
            ORDER BY d.created_at
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DeckResponse {
                id: row.get("id"),
                name: row.get("name"),
                card_count: row.get("card_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Count cards in a deck
    pub async fn count_cards(&self, deck_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM flashcards WHERE deck_id = $1
            "#,
        )
        .bind(deck_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Rename a deck
    pub async fn update_deck_name(&self, deck_id: Uuid, name: &str) -> Result<Deck> {
        let deck = sqlx::query_as::<_, Deck>(
            r#"
            UPDATE decks
            SET name = $2
            WHERE id = $1
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(deck_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(deck)
    }

    /// Delete a deck and cascade over all its cards, their sections, and
    /// the audio rows those sections own. One transaction.
    pub async fn delete_deck(&self, deck_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let card_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM flashcards WHERE deck_id = $1")
                .bind(deck_id)
                .fetch_all(&mut *tx)
                .await?;

        for card_id in card_ids {
            delete_card_rows(&mut tx, card_id).await?;
        }

        sqlx::query("DELETE FROM decks WHERE id = $1")
            .bind(deck_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    // === Flashcard Aggregate ===

    /// Create a flashcard together with its nested sections as one
    /// transaction. Audio rows are allocated before the section rows that
    /// reference them; any failure rolls the whole card back.
    pub async fn create_flashcard(
        &self,
        payload: &FlashcardCreateRequest,
    ) -> Result<FlashcardResponse> {
        let mut tx = self.pool.begin().await?;

        let card = sqlx::query_as::<_, DbFlashcard>(
            r#"
            INSERT INTO flashcards (deck_id, stage)
            VALUES ($1, $2)
            RETURNING id, deck_id, stage, created_at
            "#,
        )
        .bind(payload.deck_id)
        .bind(payload.stage)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(discussion) = &payload.discussion {
            let audio_id = insert_audio(&mut tx, &discussion.audio).await?;
            sqlx::query(
                r#"
                INSERT INTO flashcard_discussions (flashcard_id, ssml_text, text, audio_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(card.id)
            .bind(&discussion.ssml_text)
            .bind(&discussion.text)
            .bind(audio_id)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(final_card) = &payload.final_card {
            let question_audio_id = insert_audio(&mut tx, &final_card.question_audio).await?;
            let answer_audio_id = insert_audio(&mut tx, &final_card.answer_audio).await?;
            sqlx::query(
                r#"
                INSERT INTO flashcard_final_cards
                    (flashcard_id, front, back, question_audio_id, answer_audio_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(card.id)
            .bind(&final_card.front)
            .bind(&final_card.back)
            .bind(question_audio_id)
            .bind(answer_audio_id)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(fsrs) = &payload.fsrs {
            sqlx::query(
                r#"
                INSERT INTO flashcard_fsrs
                    (flashcard_id, due, stability, difficulty, elapsed_days,
                     scheduled_days, reps, lapses, state, learning_steps)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(card.id)
            .bind(fsrs.due.naive_utc())
            .bind(fsrs.stability)
            .bind(fsrs.difficulty)
            .bind(fsrs.elapsed_days)
            .bind(fsrs.scheduled_days)
            .bind(fsrs.reps)
            .bind(fsrs.lapses)
            .bind(fsrs.state)
            .bind(fsrs.learning_steps)
            .execute(&mut *tx)
            .await
            .map_err(fsrs_write_error)?;
        }

        tx.commit().await?;

        self.get_flashcard(card.id)
            .await?
            .ok_or(ApiError::CardNotFound(card.id))
    }

    /// Read a flashcard with all nested sections and their audio rows
    pub async fn get_flashcard(&self, card_id: Uuid) -> Result<Option<FlashcardResponse>> {
        let Some(card) = sqlx::query_as::<_, DbFlashcard>(
            r#"
            SELECT id, deck_id, stage, created_at
            FROM flashcards
            WHERE id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(self.load_sections(card).await?))
    }

    /// Resolve a card and confirm the caller owns its deck
    pub async fn get_owned_flashcard(
        &self,
        user_id: Uuid,
        card_id: Uuid,
    ) -> Result<DbFlashcard> {
        let row = sqlx::query(
            r#"
            SELECT f.id, f.deck_id, f.stage, f.created_at, d.owner_id
            FROM flashcards f
            JOIN decks d ON d.id = f.deck_id
            WHERE f.id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::CardNotFound(card_id))?;

        let owner_id: Uuid = row.get("owner_id");
        if owner_id != user_id {
            return Err(ApiError::Forbidden(format!(
                "flashcard {} belongs to another user's deck",
                card_id
            )));
        }

        Ok(DbFlashcard {
            id: row.get("id"),
            deck_id: row.get("deck_id"),
            stage: row.get("stage"),
            created_at: row.get("created_at"),
        })
    }

    /// List flashcards across the caller's decks
    pub async fn list_flashcards(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FlashcardResponse>> {
        let cards = sqlx::query_as::<_, DbFlashcard>(
            r#"
            SELECT f.id, f.deck_id, f.stage, f.created_at
            FROM flashcards f
            JOIN decks d ON d.id = f.deck_id
            WHERE d.owner_id = $1
            ORDER BY f.created_at
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut responses = Vec::with_capacity(cards.len());
        for card in cards {
            responses.push(self.load_sections(card).await?);
        }

        Ok(responses)
    }

    /// Apply a partial nested update as one transaction. Existing sections
    /// are patched field by field; absent sections are created fresh,
    /// which then requires their audio payloads.
    pub async fn update_flashcard(
        &self,
        card_id: Uuid,
        request: &FlashcardUpdateRequest,
    ) -> Result<FlashcardResponse> {
        let mut tx = self.pool.begin().await?;

        if request.deck_id.is_some() || request.stage.is_some() {
            sqlx::query(
                r#"
                UPDATE flashcards
                SET deck_id = COALESCE($2, deck_id),
                    stage = COALESCE($3, stage)
                WHERE id = $1
                "#,
            )
            .bind(card_id)
            .bind(request.deck_id)
            .bind(request.stage)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(patch) = &request.discussion {
            upsert_discussion(&mut tx, card_id, patch).await?;
        }

        if let Some(patch) = &request.final_card {
            upsert_final_card(&mut tx, card_id, patch).await?;
        }

        if let Some(patch) = &request.fsrs {
            upsert_fsrs(&mut tx, card_id, patch).await?;
        }

        tx.commit().await?;

        self.get_flashcard(card_id)
            .await?
            .ok_or(ApiError::CardNotFound(card_id))
    }

    /// Delete a flashcard, its sections, and their owned audio rows as one
    /// transaction
    pub async fn delete_flashcard(&self, card_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_card_rows(&mut tx, card_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fetch the audio rows referenced by a card's sections, keyed by role
    pub async fn get_flashcard_audio(
        &self,
        card_id: Uuid,
    ) -> Result<(Option<AudioFile>, Option<AudioFile>, Option<AudioFile>)> {
        let discussion = sqlx::query_as::<_, AudioFile>(
            r#"
            SELECT a.id, a.filename, a.timing_filename
            FROM flashcard_discussions s
            JOIN audio_files a ON a.id = s.audio_id
            WHERE s.flashcard_id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        let question = sqlx::query_as::<_, AudioFile>(
            r#"
            SELECT a.id, a.filename, a.timing_filename
            FROM flashcard_final_cards s
            JOIN audio_files a ON a.id = s.question_audio_id
            WHERE s.flashcard_id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        let answer = sqlx::query_as::<_, AudioFile>(
            r#"
            SELECT a.id, a.filename, a.timing_filename
            FROM flashcard_final_cards s
            JOIN audio_files a ON a.id = s.answer_audio_id
            WHERE s.flashcard_id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok((discussion, question, answer))
    }

    async fn load_sections(&self, card: DbFlashcard) -> Result<FlashcardResponse> {
        let discussion = sqlx::query_as::<_, DbDiscussion>(
            r#"
            SELECT flashcard_id, ssml_text, text, audio_id
            FROM flashcard_discussions
            WHERE flashcard_id = $1
            "#,
        )
        .bind(card.id)
        .fetch_optional(&self.pool)
        .await?;

        let discussion = match discussion {
            Some(d) => Some(DiscussionView {
                audio: self.fetch_audio(d.audio_id).await?.into(),
                ssml_text: d.ssml_text,
                text: d.text,
            }),
            None => None,
        };

        let final_card = sqlx::query_as::<_, DbFinalCard>(
            r#"
            SELECT flashcard_id, front, back, question_audio_id, answer_audio_id
            FROM flashcard_final_cards
            WHERE flashcard_id = $1
            "#,
        )
        .bind(card.id)
        .fetch_optional(&self.pool)
        .await?;

        let final_card = match final_card {
            Some(f) => Some(FinalCardView {
                question_audio: self.fetch_audio(f.question_audio_id).await?.into(),
                answer_audio: self.fetch_audio(f.answer_audio_id).await?.into(),
                front: f.front,
                back: f.back,
            }),
            None => None,
        };

        let fsrs = sqlx::query_as::<_, DbFsrs>(
            r#"
            SELECT flashcard_id, due, stability, difficulty, elapsed_days,
                   scheduled_days, reps, lapses, state, learning_steps
            FROM flashcard_fsrs
            WHERE flashcard_id = $1
            "#,
        )
        .bind(card.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(FlashcardResponse {
            id: card.id,
            deck_id: card.deck_id,
            stage: card.stage,
            created_at: card.created_at,
            discussion,
            final_card,
            fsrs: fsrs.map(FsrsView::from),
        })
    }

    async fn fetch_audio(&self, audio_id: Uuid) -> Result<AudioFile> {
        let audio = sqlx::query_as::<_, AudioFile>(
            r#"
            SELECT id, filename, timing_filename
            FROM audio_files
            WHERE id = $1
            "#,
        )
        .bind(audio_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(audio)
    }

    // === Provider Record Repository ===

    /// Insert a TTS request log row
    pub async fn insert_tts_record(
        &self,
        request: &TtsRequest,
        audio_filename: Option<&str>,
        timing_filename: Option<&str>,
        processing_time_ms: Option<i32>,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tts_records
                (text, language_code, voice_name, audio_encoding,
                 enable_time_pointing, is_ssml,
                 audio_filename, timing_filename, processing_time_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&request.text)
        .bind(&request.language_code)
        .bind(&request.voice_name)
        .bind(&request.audio_encoding)
        .bind(request.enable_time_pointing)
        .bind(request.is_ssml)
        .bind(audio_filename)
        .bind(timing_filename)
        .bind(processing_time_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Insert a generative-text request log row
    pub async fn insert_llm_record(
        &self,
        prompt: &str,
        response: Option<&str>,
        model_used: Option<&str>,
        processing_time_ms: Option<i32>,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO llm_records (prompt, response, model_used, processing_time_ms)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(prompt)
        .bind(response)
        .bind(model_used)
        .bind(processing_time_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

/// Allocate a fresh audio row. Every nested audio field gets its own row;
/// rows are never shared between parents.
async fn insert_audio(
    tx: &mut Transaction<'_, Postgres>,
    audio: &AudioPayload,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO audio_files (filename, timing_filename)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(&audio.filename)
    .bind(&audio.timing_filename)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

async fn delete_audio(tx: &mut Transaction<'_, Postgres>, audio_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM audio_files WHERE id = $1")
        .bind(audio_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Patch or create the discussion section
async fn upsert_discussion(
    tx: &mut Transaction<'_, Postgres>,
    card_id: Uuid,
    patch: &DiscussionPatch,
) -> Result<()> {
    let existing = sqlx::query_as::<_, DbDiscussion>(
        r#"
        SELECT flashcard_id, ssml_text, text, audio_id
        FROM flashcard_discussions
        WHERE flashcard_id = $1
        "#,
    )
    .bind(card_id)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some(current) => {
            let new_audio_id = match &patch.audio {
                Some(audio) => Some(insert_audio(tx, audio).await?),
                None => None,
            };

            sqlx::query(
                r#"
                UPDATE flashcard_discussions
                SET ssml_text = COALESCE($2, ssml_text),
                    text = COALESCE($3, text),
                    audio_id = COALESCE($4, audio_id)
                WHERE flashcard_id = $1
                "#,
            )
            .bind(card_id)
            .bind(&patch.ssml_text)
            .bind(&patch.text)
            .bind(new_audio_id)
            .execute(&mut **tx)
            .await?;

            if new_audio_id.is_some() {
                delete_audio(tx, current.audio_id).await?;
            }
        }
        None => {
            // Treat update-of-absent as create; the full section payload
            // is then required.
            let text = patch.text.clone().ok_or_else(|| {
                ApiError::Validation("discussion.text is required when creating".to_string())
            })?;
            let audio = patch.audio.as_ref().ok_or_else(|| {
                ApiError::Validation("discussion.audio is required when creating".to_string())
            })?;

            let audio_id = insert_audio(tx, audio).await?;
            sqlx::query(
                r#"
                INSERT INTO flashcard_discussions (flashcard_id, ssml_text, text, audio_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(card_id)
            .bind(&patch.ssml_text)
            .bind(&text)
            .bind(audio_id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

/// Patch or create the final-card section
async fn upsert_final_card(
    tx: &mut Transaction<'_, Postgres>,
    card_id: Uuid,
    patch: &FinalCardPatch,
) -> Result<()> {
    let existing = sqlx::query_as::<_, DbFinalCard>(
        r#"
        SELECT flashcard_id, front, back, question_audio_id, answer_audio_id
        FROM flashcard_final_cards
        WHERE flashcard_id = $1
        "#,
    )
    .bind(card_id)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some(current) => {
            let new_question_id = match &patch.question_audio {
                Some(audio) => Some(insert_audio(tx, audio).await?),
                None => None,
            };
            let new_answer_id = match &patch.answer_audio {
                Some(audio) => Some(insert_audio(tx, audio).await?),
                None => None,
            };

            sqlx::query(
                r#"
                UPDATE flashcard_final_cards
                SET front = COALESCE($2, front),
                    back = COALESCE($3, back),
                    question_audio_id = COALESCE($4, question_audio_id),
                    answer_audio_id = COALESCE($5, answer_audio_id)
                WHERE flashcard_id = $1
                "#,
            )
            .bind(card_id)
            .bind(&patch.front)
            .bind(&patch.back)
            .bind(new_question_id)
            .bind(new_answer_id)
            .execute(&mut **tx)
            .await?;

            if new_question_id.is_some() {
                delete_audio(tx, current.question_audio_id).await?;
            }
            if new_answer_id.is_some() {
                delete_audio(tx, current.answer_audio_id).await?;
            }
        }
        None => {
            let front = patch.front.clone().ok_or_else(|| {
                ApiError::Validation("final_card.front is required when creating".to_string())
            })?;
            let back = patch.back.clone().ok_or_else(|| {
                ApiError::Validation("final_card.back is required when creating".to_string())
            })?;
            let question_audio = patch.question_audio.as_ref().ok_or_else(|| {
                ApiError::Validation(
                    "final_card.question_audio is required when creating".to_string(),
                )
            })?;
            let answer_audio = patch.answer_audio.as_ref().ok_or_else(|| {
                ApiError::Validation(
                    "final_card.answer_audio is required when creating".to_string(),
                )
            })?;

            let question_audio_id = insert_audio(tx, question_audio).await?;
            let answer_audio_id = insert_audio(tx, answer_audio).await?;
            sqlx::query(
                r#"
                INSERT INTO flashcard_final_cards
                    (flashcard_id, front, back, question_audio_id, answer_audio_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(card_id)
            .bind(&front)
            .bind(&back)
            .bind(question_audio_id)
            .bind(answer_audio_id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

/// Patch or create the FSRS section. `due` values arrive timezone-aware
/// and are stored naive UTC.
async fn upsert_fsrs(
    tx: &mut Transaction<'_, Postgres>,
    card_id: Uuid,
    patch: &FsrsPatch,
) -> Result<()> {
    let exists: Option<Uuid> =
        sqlx::query_scalar("SELECT flashcard_id FROM flashcard_fsrs WHERE flashcard_id = $1")
            .bind(card_id)
            .fetch_optional(&mut **tx)
            .await?;

    if exists.is_some() {
        sqlx::query(
            r#"
            UPDATE flashcard_fsrs
            SET due = COALESCE($2, due),
                stability = COALESCE($3, stability),
                difficulty = COALESCE($4, difficulty),
                elapsed_days = COALESCE($5, elapsed_days),
                scheduled_days = COALESCE($6, scheduled_days),
                reps = COALESCE($7, reps),
                lapses = COALESCE($8, lapses),
                state = COALESCE($9, state),
                learning_steps = COALESCE($10, learning_steps)
            WHERE flashcard_id = $1
            "#,
        )
        .bind(card_id)
        .bind(patch.due.map(|d| d.naive_utc()))
        .bind(patch.stability)
        .bind(patch.difficulty)
        .bind(patch.elapsed_days)
        .bind(patch.scheduled_days)
        .bind(patch.reps)
        .bind(patch.lapses)
        .bind(patch.state)
        .bind(patch.learning_steps)
        .execute(&mut **tx)
        .await
        .map_err(fsrs_write_error)?;
    } else {
        let due = patch.due.ok_or_else(|| {
            ApiError::Validation("fsrs.due is required when creating".to_string())
        })?;

        sqlx::query(
            r#"
            INSERT INTO flashcard_fsrs
                (flashcard_id, due, stability, difficulty, elapsed_days,
                 scheduled_days, reps, lapses, state, learning_steps)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(card_id)
        .bind(due.naive_utc())
        .bind(patch.stability.unwrap_or(0.0))
        .bind(patch.difficulty.unwrap_or(0.0))
        .bind(patch.elapsed_days.unwrap_or(0))
        .bind(patch.scheduled_days.unwrap_or(0))
        .bind(patch.reps.unwrap_or(0))
        .bind(patch.lapses.unwrap_or(0))
        .bind(patch.state.unwrap_or(0))
        .bind(patch.learning_steps.unwrap_or(0))
        .execute(&mut **tx)
        .await
        .map_err(fsrs_write_error)?;
    }

    Ok(())
}

/// Scheduling counters carry CHECK constraints; surface violations as
/// validation errors instead of opaque 500s.
fn fsrs_write_error(e: sqlx::Error) -> ApiError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
            ApiError::Validation("fsrs counters must be non-negative".to_string())
        }
        _ => ApiError::Database(e),
    }
}

/// Delete a card's sections, the audio rows they own, then the card itself
async fn delete_card_rows(tx: &mut Transaction<'_, Postgres>, card_id: Uuid) -> Result<()> {
    let mut audio_ids: Vec<Uuid> = Vec::new();

    if let Some(id) =
        sqlx::query_scalar("SELECT audio_id FROM flashcard_discussions WHERE flashcard_id = $1")
            .bind(card_id)
            .fetch_optional(&mut **tx)
            .await?
    {
        audio_ids.push(id);
    }

    let final_card: Option<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT question_audio_id, answer_audio_id
        FROM flashcard_final_cards
        WHERE flashcard_id = $1
        "#,
    )
    .bind(card_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((question_id, answer_id)) = final_card {
        audio_ids.push(question_id);
        audio_ids.push(answer_id);
    }

    sqlx::query("DELETE FROM flashcard_discussions WHERE flashcard_id = $1")
        .bind(card_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM flashcard_final_cards WHERE flashcard_id = $1")
        .bind(card_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM flashcard_fsrs WHERE flashcard_id = $1")
        .bind(card_id)
        .execute(&mut **tx)
        .await?;

    for audio_id in audio_ids {
        delete_audio(tx, audio_id).await?;
    }

    sqlx::query("DELETE FROM flashcards WHERE id = $1")
        .bind(card_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
