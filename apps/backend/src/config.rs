//! Application configuration read once at startup.
//!
//! All knobs come from environment variables (loaded via dotenvy in
//! `run()`); the resulting struct is threaded through `AppState` instead
//! of being read ad hoc at call sites.

use crate::error::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// HS256 secret for access tokens.
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_days: i64,
    pub host: String,
    pub port: String,
    /// Base URL of the TTS provider; None disables the TTS endpoints.
    pub tts_endpoint: Option<String>,
    /// Base URL of the generative-text provider; None disables them.
    pub llm_endpoint: Option<String>,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ApiError::Internal("DATABASE_URL must be set".to_string()))?;
        let jwt_secret = std::env::var("SECRET_KEY")
            .map_err(|_| ApiError::Internal("SECRET_KEY must be set".to_string()))?;

        Ok(Self {
            database_url,
            jwt_secret,
            access_token_ttl_secs: env_parse("ACCESS_TOKEN_TTL_SECS", 900),
            refresh_token_ttl_days: env_parse("REFRESH_TOKEN_TTL_DAYS", 30),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()),
            tts_endpoint: std::env::var("TTS_ENDPOINT").ok(),
            llm_endpoint: std::env::var("LLM_ENDPOINT").ok(),
            rate_limit_max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 60),
            rate_limit_window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", 60),
        })
    }

    /// Refresh token lifetime in seconds, also used as the cookie max-age.
    pub fn refresh_token_ttl_secs(&self) -> i64 {
        self.refresh_token_ttl_days * 24 * 3600
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_ttl_secs() {
        let config = Config {
            database_url: String::new(),
            jwt_secret: String::new(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_days: 30,
            host: String::new(),
            port: String::new(),
            tts_endpoint: None,
            llm_endpoint: None,
            rate_limit_max_requests: 60,
            rate_limit_window_secs: 60,
        };
        assert_eq!(config.refresh_token_ttl_secs(), 30 * 24 * 3600);
    }

    #[test]
    fn test_env_parse_default() {
        assert_eq!(env_parse("NOT_A_REAL_ENV_VAR_12345", 42i64), 42);
    }
}
