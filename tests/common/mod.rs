// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::TimeZone;
use std::sync::Arc;
use trackboard::config::Config;
use trackboard::db::{Db, FirestoreDb, MemoryDb};
use trackboard::middleware::auth::create_jwt;
use trackboard::models::{Activity, Role};
use trackboard::routes::create_router;
use trackboard::time_utils::ManualClock;
use trackboard::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique id for test isolation against a shared emulator.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// App wired to an in-memory store and a manual clock.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryDb>,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn token(&self, user_id: &str) -> String {
        create_test_jwt(user_id, &self.state.config.jwt_signing_key)
    }

    /// Send a request as `user_id` (or anonymously) with an optional JSON body.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        user_id: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response {
        use tower::ServiceExt;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn seed_activity(&self, id: &str, active: bool) {
        self.state
            .db
            .upsert_activity(&Activity {
                id: id.to_string(),
                title: id.to_string(),
                icon: None,
                description: None,
                image: None,
                active,
            })
            .await
            .unwrap();
    }

    pub async fn make_admin(&self, user_id: &str) {
        self.state.db.set_user_role(user_id, Role::Admin).await.unwrap();
    }
}

/// Create a test app with an in-memory store.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let store = Arc::new(MemoryDb::new());
    let clock = Arc::new(ManualClock::new(
        chrono::Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
    ));
    let state = Arc::new(AppState::new(
        config,
        Db::new(store.clone()),
        clock.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        clock,
    }
}

/// Create a signed session token for `user_id`.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    create_jwt(user_id, signing_key).expect("Failed to create JWT")
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
