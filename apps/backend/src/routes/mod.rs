pub mod auth;
pub mod decks;
pub mod flashcards;
pub mod llm;
pub mod rate_limit;
pub mod tts;
