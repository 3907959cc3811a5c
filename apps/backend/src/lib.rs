pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::routes::rate_limit::RateLimiter;
use crate::services::auth::AuthService;
use crate::services::llm::{HttpGenerator, TextGenerator};
use crate::services::storage::StorageService;
use crate::services::tts::{HttpSynthesizer, SpeechSynthesizer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub storage: Arc<StorageService>,
    pub auth: Arc<AuthService>,
    pub tts: Option<Arc<dyn SpeechSynthesizer>>,
    pub llm: Option<Arc<dyn TextGenerator>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    tracing::info!("Running migrations...");
    db.run_migrations().await?;

    tracing::info!("Initializing S3 storage...");
    let storage = StorageService::new().await?;

    let state = build_state(config, db, storage)?;
    let app = build_router(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Wire services into shared state
pub fn build_state(
    config: Config,
    db: Database,
    storage: StorageService,
) -> anyhow::Result<AppState> {
    let auth = AuthService::new(db.clone(), &config);

    let tts: Option<Arc<dyn SpeechSynthesizer>> = match &config.tts_endpoint {
        Some(endpoint) => Some(Arc::new(HttpSynthesizer::new(endpoint.clone())?)),
        None => {
            tracing::warn!("TTS_ENDPOINT not set; speech synthesis disabled");
            None
        }
    };

    let llm: Option<Arc<dyn TextGenerator>> = match &config.llm_endpoint {
        Some(endpoint) => Some(Arc::new(HttpGenerator::new(endpoint.clone())?)),
        None => {
            tracing::warn!("LLM_ENDPOINT not set; text generation disabled");
            None
        }
    };

    let rate_limiter = RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    );

    Ok(AppState {
        db: Arc::new(db),
        storage: Arc::new(storage),
        auth: Arc::new(auth),
        tts,
        llm,
        rate_limiter: Arc::new(rate_limiter),
        config: Arc::new(config),
    })
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // Deck routes
        .route("/decks", get(routes::decks::list))
        .route("/decks", post(routes::decks::create))
        .route("/decks/:id", get(routes::decks::get))
        .route("/decks/:id", put(routes::decks::update))
        .route("/decks/:id", delete(routes::decks::delete))
        // Flashcard routes
        .route("/flashcards", get(routes::flashcards::list))
        .route("/flashcards", post(routes::flashcards::create))
        .route("/flashcards/:id", get(routes::flashcards::get))
        .route("/flashcards/:id", put(routes::flashcards::update))
        .route("/flashcards/:id", delete(routes::flashcards::delete))
        .route("/flashcards/:id/fsrs", put(routes::flashcards::update_fsrs))
        .route(
            "/flashcards/:id/signed-urls",
            get(routes::flashcards::signed_urls),
        )
        // Provider routes
        .route("/tts/synthesize", post(routes::tts::synthesize))
        .route("/llm/generate", post(routes::llm::generate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/auth/logout", post(routes::auth::logout))
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::rate_limit::rate_limit_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
