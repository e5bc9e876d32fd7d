//! Shared fixtures for the estate_client integration tests

#![allow(dead_code)]

use std::sync::Arc;

use estate_client::{ApiClient, MemorySessionStorage, SessionStore, User};

pub fn alice() -> User {
    User {
        id: 1,
        email: "a@b.com".to_string(),
        role: "investor".to_string(),
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("Failed to build HTTP client")
}

/// Client over a fresh in-memory slot, logged out.
pub fn logged_out_client(base_url: &str) -> (ApiClient, MemorySessionStorage) {
    let storage = MemorySessionStorage::new();
    let session = Arc::new(SessionStore::load(storage.clone()));
    (
        ApiClient::with_http_client(http_client(), base_url, session),
        storage,
    )
}

/// Client signed in as alice with access token `old` and refresh token `r1`.
pub fn signed_in_client(base_url: &str) -> (ApiClient, MemorySessionStorage) {
    let (client, storage) = logged_out_client(base_url);
    client
        .session()
        .set_session(Some(alice()), "old".to_string(), "r1".to_string());
    (client, storage)
}

pub fn property_json(id: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": format!("Deal #{id}"),
        "price": 1_500_000,
        "ticket": 2000,
        "yield": 7.2,
        "daysLeft": 21,
        "soldPercent": 35,
        "imageUrl": null
    })
}

pub fn refreshed_tokens(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({ "accessToken": access, "refreshToken": refresh })
}
