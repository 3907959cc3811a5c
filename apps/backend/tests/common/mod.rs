//! Common test utilities and fixtures for integration tests.
//!
//! # Requirements
//! Integration tests require:
//! - PostgreSQL database (set DATABASE_URL env var)
//! - Optionally S3/R2 for storage tests (set S3_* env vars)

pub mod fixtures;

use std::sync::Arc;

use axum::Router;
use uuid::Uuid;

use brainflash_backend::config::Config;
use brainflash_backend::db::Database;
use brainflash_backend::services::storage::StorageService;
use brainflash_backend::{build_router, build_state, AppState};

/// Test context containing database connection and the app router.
///
/// Requires DATABASE_URL to be set. Storage gets dummy credentials when
/// none are configured; tests that never touch object storage are fine
/// with that.
pub struct TestContext {
    pub db: Arc<Database>,
    pub state: AppState,
    app: Router,
}

impl TestContext {
    /// Create a new test context.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let db = Database::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        db.run_migrations().await.expect("Failed to run migrations");

        if std::env::var("S3_BUCKET").is_err() {
            std::env::set_var("S3_BUCKET", "test-bucket");
            std::env::set_var("S3_ACCESS_KEY", "test-key");
            std::env::set_var("S3_SECRET_KEY", "test-secret");
            std::env::set_var("S3_ENDPOINT", "http://localhost:9000");
        }

        let storage = StorageService::new()
            .await
            .expect("Failed to create storage config");

        let config = Config {
            database_url,
            jwt_secret: "integration-test-secret".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_days: 30,
            host: "127.0.0.1".to_string(),
            port: "0".to_string(),
            tts_endpoint: None,
            llm_endpoint: None,
            // High enough that test traffic never trips it
            rate_limit_max_requests: 100_000,
            rate_limit_window_secs: 60,
        };

        let state = build_state(config, db, storage).expect("Failed to build app state");
        let app = build_router(state.clone());

        Self {
            db: state.db.clone(),
            state,
            app,
        }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Register a user directly through the auth service.
    pub async fn create_test_user(&self, email: &str, password: &str) -> Uuid {
        let user = self
            .state
            .auth
            .register(email, password)
            .await
            .expect("Failed to create test user");
        user.id
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Clean up all data owned by a test user.
    ///
    /// Call this after tests to remove test data.
    pub async fn cleanup_user(&self, user_id: Uuid) {
        // Cards first so the aggregate deletes take their audio rows along
        let card_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT f.id FROM flashcards f JOIN decks d ON d.id = f.deck_id WHERE d.owner_id = $1",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .unwrap_or_default();

        for card_id in card_ids {
            let _ = self.db.delete_flashcard(card_id).await;
        }

        let _ = sqlx::query("DELETE FROM decks WHERE owner_id = $1")
            .bind(user_id)
            .execute(self.db.pool())
            .await;

        let _ = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(self.db.pool())
            .await;

        let _ = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(self.db.pool())
            .await;
    }
}
