#![allow(dead_code)]

use carelink_server::cache::MemoryStore;
use carelink_server::db::MemoryIdentityStore;
use carelink_server::{AppState, Settings};
use std::sync::Arc;

/// Application state over in-memory stores, plus handles to them so tests
/// can seed identities or poke at status directly.
pub fn test_state() -> (AppState, Arc<MemoryIdentityStore>, Arc<MemoryStore>) {
    let settings = Settings::new_for_test().expect("Failed to load test config");
    let identities = Arc::new(MemoryIdentityStore::new());
    let kv = Arc::new(MemoryStore::new());
    let state = AppState::with_stores(settings, identities.clone(), kv.clone());
    (state, identities, kv)
}

pub fn register_body(email: &str, role: &str) -> serde_json::Value {
    serde_json::json!({
        "email": email,
        "password": "secret123",
        "role": role,
        "firstName": "A",
        "lastName": "B",
    })
}
