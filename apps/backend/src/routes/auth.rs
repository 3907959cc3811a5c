//! Authentication middleware and session endpoints

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::AppState;

const REFRESH_COOKIE: &str = "refresh_token";

/// Authenticated user info stored in request extensions
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Auth middleware - verifies the bearer access token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization format".to_string()))?;

    let claims = state.auth.verify_access_token(token)?;

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user = state.auth.register(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    let tokens = state.auth.login(&payload.email, &payload.password).await?;
    session_response(&state, tokens)
}

/// POST /auth/refresh
///
/// The refresh token arrives in the JSON body or, failing that, in the
/// session cookie. A missing token is indistinguishable from an invalid
/// one to the caller.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Response> {
    let raw = presented_token(&headers, payload).ok_or(ApiError::InvalidToken)?;
    let tokens = state.auth.refresh(&raw).await?;
    session_response(&state, tokens)
}

/// POST /auth/logout
///
/// Revokes the presented refresh token and clears the cookie. Always
/// succeeds, token or not.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Response> {
    let raw = presented_token(&headers, payload);
    state.auth.logout(raw.as_deref()).await?;

    let mut response = Json(serde_json::json!({ "message": "logged out" })).into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_str(&clear_cookie())
            .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))?,
    );
    Ok(response)
}

/// Token response with the refresh token mirrored into an HttpOnly cookie
fn session_response(state: &AppState, tokens: TokenResponse) -> Result<Response> {
    let cookie = refresh_cookie(&tokens.refresh_token, state.auth.refresh_token_max_age_secs());
    let mut response = Json(tokens).into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))?,
    );
    Ok(response)
}

/// Body token first, cookie second
fn presented_token(headers: &HeaderMap, payload: Option<Json<RefreshRequest>>) -> Option<String> {
    payload
        .and_then(|Json(body)| body.refresh_token)
        .or_else(|| cookie_token(headers))
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == REFRESH_COOKIE && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

fn refresh_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        REFRESH_COOKIE, token, max_age_secs
    )
}

fn clear_cookie() -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        REFRESH_COOKIE
    )
}
