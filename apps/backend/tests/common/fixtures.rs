//! Test fixtures and factory functions for creating test data.

use serde_json::{json, Value};
use uuid::Uuid;

/// Random email so parallel test runs never collide on the unique index.
pub fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4())
}

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn register_request(email: &str) -> Value {
    json!({ "email": email, "password": TEST_PASSWORD })
}

pub fn login_request(email: &str) -> Value {
    json!({ "email": email, "password": TEST_PASSWORD })
}

/// An audio payload with a derived timing file.
pub fn audio_json(name: &str) -> Value {
    json!({
        "filename": format!("{}.mp3", name),
        "timing_filename": format!("{}.timings.json", name),
    })
}

pub fn discussion_json(name: &str) -> Value {
    json!({
        "ssml_text": "<speak>What is ownership?</speak>",
        "text": "What is ownership?",
        "audio": audio_json(name),
    })
}

pub fn final_card_json(name: &str) -> Value {
    json!({
        "front": "What is ownership?",
        "back": "Each value has a single owner.",
        "question_audio": audio_json(&format!("{}-q", name)),
        "answer_audio": audio_json(&format!("{}-a", name)),
    })
}

pub fn fsrs_json() -> Value {
    json!({
        "due": "2026-09-01T10:00:00Z",
        "stability": 1.2,
        "difficulty": 5.4,
        "elapsed_days": 0,
        "scheduled_days": 1,
        "reps": 1,
        "lapses": 0,
        "state": 1,
        "learning_steps": 0,
    })
}

/// A fully-populated nested create payload.
pub fn flashcard_payload(deck_id: Uuid, name: &str) -> Value {
    json!({
        "deck_id": deck_id,
        "stage": 2,
        "discussion": discussion_json(name),
        "final_card": final_card_json(name),
        "fsrs": fsrs_json(),
    })
}

/// Create payload with no sections at all.
pub fn bare_flashcard_payload(deck_id: Uuid) -> Value {
    json!({ "deck_id": deck_id, "stage": 0 })
}
