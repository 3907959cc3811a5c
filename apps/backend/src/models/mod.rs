//! Database models and API types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// === Database Entity Types ===

/// Identity principal. Created by the registration flow; owns decks.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Stored refresh token. Only the sha256 digest of the raw token is kept;
/// rows are revoked, never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deck {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbFlashcard {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub stage: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbDiscussion {
    pub flashcard_id: Uuid,
    pub ssml_text: Option<String>,
    pub text: String,
    pub audio_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbFinalCard {
    pub flashcard_id: Uuid,
    pub front: String,
    pub back: String,
    pub question_audio_id: Uuid,
    pub answer_audio_id: Uuid,
}

/// Opaque scheduling state, written wholesale by the external FSRS
/// algorithm. `due` is stored timezone-naive, canonicalized to UTC.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DbFsrs {
    pub flashcard_id: Uuid,
    pub due: NaiveDateTime,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub state: i32,
    pub learning_steps: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AudioFile {
    pub id: Uuid,
    pub filename: String,
    pub timing_filename: Option<String>,
}

// === Auth API Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Login/refresh response. The refresh token is also set as an HTTP-only
/// cookie by the route layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Body-supplied refresh token; the cookie is the fallback transport.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

// === Deck API Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct DeckCreateRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeckUpdateRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeckResponse {
    pub id: Uuid,
    pub name: String,
    pub card_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeckListResponse {
    pub decks: Vec<DeckResponse>,
}

// === Flashcard API Types ===

/// Audio reference in create payloads. A fresh audio_files row is
/// allocated per field; rows are never shared between parents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    pub filename: String,
    pub timing_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionPayload {
    pub ssml_text: Option<String>,
    pub text: String,
    pub audio: AudioPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCardPayload {
    pub front: String,
    pub back: String,
    pub question_audio: AudioPayload,
    pub answer_audio: AudioPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsrsPayload {
    pub due: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub state: i32,
    pub learning_steps: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlashcardCreateRequest {
    pub deck_id: Uuid,
    #[serde(default)]
    pub stage: i32,
    pub discussion: Option<DiscussionPayload>,
    pub final_card: Option<FinalCardPayload>,
    pub fsrs: Option<FsrsPayload>,
}

/// Partial discussion update. Fields left out keep their stored values;
/// a supplied `audio` replaces the owned audio row.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscussionPatch {
    pub ssml_text: Option<String>,
    pub text: Option<String>,
    pub audio: Option<AudioPayload>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinalCardPatch {
    pub front: Option<String>,
    pub back: Option<String>,
    pub question_audio: Option<AudioPayload>,
    pub answer_audio: Option<AudioPayload>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsrsPatch {
    pub due: Option<DateTime<Utc>>,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub elapsed_days: Option<i32>,
    pub scheduled_days: Option<i32>,
    pub reps: Option<i32>,
    pub lapses: Option<i32>,
    pub state: Option<i32>,
    pub learning_steps: Option<i32>,
}

/// Partial nested update. Unknown keys are rejected so ownership and
/// timestamp columns can never ride along in a mass assignment.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashcardUpdateRequest {
    pub deck_id: Option<Uuid>,
    pub stage: Option<i32>,
    pub discussion: Option<DiscussionPatch>,
    pub final_card: Option<FinalCardPatch>,
    pub fsrs: Option<FsrsPatch>,
}

impl FlashcardUpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.deck_id.is_none()
            && self.stage.is_none()
            && self.discussion.is_none()
            && self.final_card.is_none()
            && self.fsrs.is_none()
    }
}

// === Flashcard Read Types ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioView {
    pub id: Uuid,
    pub filename: String,
    pub timing_filename: Option<String>,
}

impl From<AudioFile> for AudioView {
    fn from(audio: AudioFile) -> Self {
        Self {
            id: audio.id,
            filename: audio.filename,
            timing_filename: audio.timing_filename,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionView {
    pub ssml_text: Option<String>,
    pub text: String,
    pub audio: AudioView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalCardView {
    pub front: String,
    pub back: String,
    pub question_audio: AudioView,
    pub answer_audio: AudioView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsrsView {
    pub due: NaiveDateTime,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i32,
    pub scheduled_days: i32,
    pub reps: i32,
    pub lapses: i32,
    pub state: i32,
    pub learning_steps: i32,
}

impl From<DbFsrs> for FsrsView {
    fn from(fsrs: DbFsrs) -> Self {
        Self {
            due: fsrs.due,
            stability: fsrs.stability,
            difficulty: fsrs.difficulty,
            elapsed_days: fsrs.elapsed_days,
            scheduled_days: fsrs.scheduled_days,
            reps: fsrs.reps,
            lapses: fsrs.lapses,
            state: fsrs.state,
            learning_steps: fsrs.learning_steps,
        }
    }
}

/// A flashcard with its nested one-to-one sections, read as a unit.
#[derive(Debug, Serialize, Deserialize)]
pub struct FlashcardResponse {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub stage: i32,
    pub created_at: DateTime<Utc>,
    pub discussion: Option<DiscussionView>,
    pub final_card: Option<FinalCardView>,
    pub fsrs: Option<FsrsView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlashcardListResponse {
    pub flashcards: Vec<FlashcardResponse>,
}

// === Audio URL Types ===

/// Signed (or fallback) URLs for one audio row.
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioUrls {
    pub audio_url: Option<String>,
    pub timing_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlashcardSignedUrlsResponse {
    pub flashcard_id: Uuid,
    pub expiration_secs: u64,
    pub discussion: Option<AudioUrls>,
    pub question: Option<AudioUrls>,
    pub answer: Option<AudioUrls>,
}

// === TTS / LLM API Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    #[serde(default = "default_audio_encoding")]
    pub audio_encoding: String,
    #[serde(default = "default_true")]
    pub enable_time_pointing: bool,
    #[serde(default)]
    pub is_ssml: bool,
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_voice_name() -> String {
    "en-US-Wavenet-D".to_string()
}

fn default_audio_encoding() -> String {
    "MP3".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub time_secs: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsResponse {
    pub filename: String,
    pub timing_filename: Option<String>,
    pub word_timings: Vec<WordTiming>,
    pub text_length: usize,
    pub language: String,
    pub voice: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub model_used: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_refresh_token_expiry() {
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "abc".to_string(),
            issued_at: now - chrono::Duration::days(31),
            expires_at: now - chrono::Duration::days(1),
            revoked: false,
        };
        assert!(token.is_expired(now));
    }

    #[test]
    fn test_update_request_rejects_unknown_fields() {
        let result: std::result::Result<FlashcardUpdateRequest, _> =
            serde_json::from_str(r#"{"stage": 2, "owner_id": "evil"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_request_is_empty() {
        let request: FlashcardUpdateRequest = serde_json::from_str("{}").unwrap();
        assert!(request.is_empty());
        let request: FlashcardUpdateRequest = serde_json::from_str(r#"{"stage": 1}"#).unwrap();
        assert!(!request.is_empty());
    }

    #[test]
    fn test_fsrs_payload_accepts_timezone_aware_due() {
        let payload: FsrsPayload = serde_json::from_str(
            r#"{"due": "2026-01-15T10:30:00+02:00", "stability": 1.0, "difficulty": 5.0,
                "elapsed_days": 0, "scheduled_days": 1, "reps": 1, "lapses": 0,
                "state": 1, "learning_steps": 0}"#,
        )
        .unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap();
        assert_eq!(payload.due, expected);
    }

    #[test]
    fn test_tts_request_defaults() {
        let request: TtsRequest = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(request.language_code, "en-US");
        assert_eq!(request.voice_name, "en-US-Wavenet-D");
        assert!(request.enable_time_pointing);
        assert!(!request.is_ssml);
    }
}
