//! Refresh-token lifecycle and access-token issuance.
//!
//! Access tokens are short-lived JWTs verifiable without a database hit.
//! Refresh tokens are opaque 256-bit secrets; only their sha256 digest is
//! stored, and every use rotates them (revoke predecessor + insert
//! successor in one transaction).

use argon2::{
    password_hash::{rand_core::OsRng as HashOsRng, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{ApiError, Result};
use crate::models::{TokenResponse, User};

/// Claims carried by the signed access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// One-way digest of a raw refresh token. Deterministic so the stored
/// hash indexes lookups; irreversible so a leaked table leaks no tokens.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a raw refresh token: 32 bytes from the OS RNG, URL-safe
/// base64 encoded.
pub fn generate_raw_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Sign an access token for the user
pub fn issue_access_token(secret: &str, ttl: Duration, user: &User) -> Result<String> {
    let now = Utc::now();
    let claims = AccessTokenClaims {
        sub: user.id,
        email: user.email.clone(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign access token: {}", e)))
}

/// Decode and validate an access token
pub fn decode_access_token(secret: &str, token: &str) -> Result<AccessTokenClaims> {
    let data = decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Invalid access token".to_string()))?;

    Ok(data.claims)
}

/// Authentication service: credential checks, token issuance, and the
/// refresh-token lifecycle (issue, validate, rotate, revoke).
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt_secret: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    /// Register a new user
    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        if !email.contains('@') {
            return Err(ApiError::Validation("invalid email address".to_string()));
        }
        if password.len() < 8 {
            return Err(ApiError::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }

        let password_hash = hash_password(password)?;
        self.db.create_user(email, &password_hash).await
    }

    /// Authenticate credentials and open a session: signed access token
    /// plus a freshly stored refresh token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let user = self
            .db
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| ApiError::Authentication("invalid credentials".to_string()))?;

        verify_password(password, &user.password_hash)?;

        if !user.is_active {
            return Err(ApiError::Authentication("account is inactive".to_string()));
        }

        let access_token = issue_access_token(&self.jwt_secret, self.access_token_ttl, &user)?;
        let raw_refresh = generate_raw_token();
        let expires_at = Utc::now() + self.refresh_token_ttl;
        self.db
            .insert_refresh_token(user.id, &hash_token(&raw_refresh), expires_at)
            .await?;

        tracing::info!(user_id = %user.id, "user logged in");

        Ok(TokenResponse {
            access_token,
            refresh_token: raw_refresh,
            token_type: "bearer".to_string(),
        })
    }

    /// Validate a presented refresh token and rotate it.
    ///
    /// Check order matters: hash lookup filtered on `revoked = FALSE`
    /// first (absent and revoked collapse into InvalidToken), then the
    /// explicit expiry check, then the owner lookup. Rotation is a single
    /// transaction; a replayed token hard-fails on the CAS revoke.
    pub async fn refresh(&self, raw_token: &str) -> Result<TokenResponse> {
        let token = self
            .db
            .find_refresh_token_by_hash(&hash_token(raw_token))
            .await?
            .ok_or(ApiError::InvalidToken)?;

        if token.is_expired(Utc::now()) {
            return Err(ApiError::ExpiredToken);
        }

        let user = self
            .db
            .get_user(token.user_id)
            .await?
            .ok_or_else(|| {
                ApiError::Unauthorized("user for refresh token no longer exists".to_string())
            })?;

        let access_token = issue_access_token(&self.jwt_secret, self.access_token_ttl, &user)?;
        let raw_refresh = generate_raw_token();
        let expires_at = Utc::now() + self.refresh_token_ttl;
        self.db
            .rotate_refresh_token(token.id, user.id, &hash_token(&raw_refresh), expires_at)
            .await?;

        tracing::debug!(user_id = %user.id, "refresh token rotated");

        Ok(TokenResponse {
            access_token,
            refresh_token: raw_refresh,
            token_type: "bearer".to_string(),
        })
    }

    /// Revoke the presented refresh token, if any. Idempotent: a missing,
    /// already-revoked, or unknown token is still a successful logout.
    pub async fn logout(&self, raw_token: Option<&str>) -> Result<()> {
        let Some(raw) = raw_token else {
            return Ok(());
        };

        if let Some(token) = self.db.find_refresh_token_by_hash(&hash_token(raw)).await? {
            self.db.revoke_refresh_token(token.id).await?;
            tracing::debug!(user_id = %token.user_id, "refresh token revoked on logout");
        }

        Ok(())
    }

    /// Verify a bearer access token and return its claims
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims> {
        decode_access_token(&self.jwt_secret, token)
    }

    /// Refresh token lifetime in whole seconds (cookie max-age)
    pub fn refresh_token_max_age_secs(&self) -> i64 {
        self.refresh_token_ttl.num_seconds()
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut HashOsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| ApiError::Internal("password hashing failed".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<()> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| ApiError::Authentication("invalid credentials".to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Authentication("invalid credentials".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            password_hash: String::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_token_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn test_hash_token_is_not_the_raw_token() {
        let raw = generate_raw_token();
        let digest = hash_token(&raw);
        assert_ne!(raw, digest);
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_generate_raw_token_entropy() {
        let a = generate_raw_token();
        let b = generate_raw_token();
        assert_ne!(a, b);
        // 32 bytes of entropy, unpadded base64
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_access_token_round_trip() {
        let user = test_user();
        let token = issue_access_token("secret", Duration::minutes(15), &user).unwrap();
        let claims = decode_access_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_access_token_wrong_secret() {
        let user = test_user();
        let token = issue_access_token("secret", Duration::minutes(15), &user).unwrap();
        assert!(decode_access_token("other", &token).is_err());
    }

    #[test]
    fn test_access_token_expired() {
        let user = test_user();
        let token = issue_access_token("secret", Duration::seconds(-120), &user).unwrap();
        assert!(decode_access_token("secret", &token).is_err());
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("CorrectHorse1").unwrap();
        assert!(verify_password("CorrectHorse1", &hash).is_ok());
        assert!(verify_password("WrongHorse1", &hash).is_err());
    }
}
