pub mod auth;
pub mod llm;
pub mod storage;
pub mod tts;
