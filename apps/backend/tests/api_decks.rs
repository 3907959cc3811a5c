//! Decks API tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL before running.

mod common;

use axum::http::{header, StatusCode};
use axum_test::TestServer;
use serde_json::json;
use uuid::Uuid;

use common::fixtures;
use common::TestContext;

async fn login(server: &TestServer, email: &str) -> (Uuid, String) {
    let response = server
        .post("/auth/register")
        .json(&fixtures::register_request(email))
        .await;
    response.assert_status(StatusCode::CREATED);
    let user: serde_json::Value = response.json();
    let user_id = Uuid::parse_str(user["id"].as_str().unwrap()).unwrap();

    let response = server
        .post("/auth/login")
        .json(&fixtures::login_request(email))
        .await;
    response.assert_status_ok();
    let tokens: serde_json::Value = response.json();
    (user_id, tokens["access_token"].as_str().unwrap().to_string())
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_list_decks_empty() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (user_id, token) = login(&server, &fixtures::unique_email()).await;

    let response = server
        .get("/decks")
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["decks"].as_array().unwrap().is_empty());

    ctx.cleanup_user(user_id).await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_create_get_update_deck() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (user_id, token) = login(&server, &fixtures::unique_email()).await;

    let response = server
        .post("/decks")
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .json(&json!({ "name": "Rust basics" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let deck: serde_json::Value = response.json();
    let deck_id = deck["id"].as_str().unwrap().to_string();
    assert_eq!(deck["name"], "Rust basics");
    assert_eq!(deck["card_count"], 0);

    let response = server
        .get(&format!("/decks/{}", deck_id))
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .await;
    response.assert_status_ok();
    let fetched: serde_json::Value = response.json();
    assert_eq!(fetched["id"], deck["id"]);

    let response = server
        .put(&format!("/decks/{}", deck_id))
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .json(&json!({ "name": "Rust ownership" }))
        .await;
    response.assert_status_ok();
    let renamed: serde_json::Value = response.json();
    assert_eq!(renamed["name"], "Rust ownership");

    ctx.cleanup_user(user_id).await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_create_deck_rejects_blank_name() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (user_id, token) = login(&server, &fixtures::unique_email()).await;

    let response = server
        .post("/decks")
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .json(&json!({ "name": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    ctx.cleanup_user(user_id).await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_delete_deck() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (user_id, token) = login(&server, &fixtures::unique_email()).await;

    let response = server
        .post("/decks")
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .json(&json!({ "name": "Ephemeral" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let deck: serde_json::Value = response.json();
    let deck_id = deck["id"].as_str().unwrap().to_string();

    let response = server
        .delete(&format!("/decks/{}", deck_id))
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    let response = server
        .get(&format!("/decks/{}", deck_id))
        .add_header(header::AUTHORIZATION, TestContext::auth_header_value(&token))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    ctx.cleanup_user(user_id).await;
}

/// A foreign deck is forbidden, whether it exists or not is still
/// distinguishable (404 for absent, 403 for someone else's).
#[tokio::test]
#[ignore = "requires database"]
async fn test_foreign_deck_forbidden() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router()).unwrap();
    let (owner_id, owner_token) = login(&server, &fixtures::unique_email()).await;
    let (intruder_id, intruder_token) = login(&server, &fixtures::unique_email()).await;

    let response = server
        .post("/decks")
        .add_header(
            header::AUTHORIZATION,
            TestContext::auth_header_value(&owner_token),
        )
        .json(&json!({ "name": "Private" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let deck: serde_json::Value = response.json();
    let deck_id = deck["id"].as_str().unwrap().to_string();

    let response = server
        .get(&format!("/decks/{}", deck_id))
        .add_header(
            header::AUTHORIZATION,
            TestContext::auth_header_value(&intruder_token),
        )
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = server
        .delete(&format!("/decks/{}", deck_id))
        .add_header(
            header::AUTHORIZATION,
            TestContext::auth_header_value(&intruder_token),
        )
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    // An id that exists nowhere is a plain 404
    let response = server
        .get(&format!("/decks/{}", Uuid::new_v4()))
        .add_header(
            header::AUTHORIZATION,
            TestContext::auth_header_value(&intruder_token),
        )
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    ctx.cleanup_user(owner_id).await;
    ctx.cleanup_user(intruder_id).await;
}
