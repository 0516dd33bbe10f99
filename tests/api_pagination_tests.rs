// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking history pagination tests.
//!
//! These tests verify that:
//! 1. Pagination parameters are validated
//! 2. Cursors walk the full history without gaps or repeats

use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

mod common;
use common::{body_json, create_test_app};

#[tokio::test]
async fn test_per_page_zero_rejected() {
    let app = create_test_app();
    let response = app
        .send("GET", "/api/trackings?per_page=0", Some("alice"), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_garbage_cursor_rejected() {
    let app = create_test_app();
    let response = app
        .send("GET", "/api/trackings?cursor=not-base64!", Some("alice"), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cursor_walks_whole_history() {
    let app = create_test_app();
    app.seed_activity("cycling", true).await;

    for _ in 0..5 {
        app.send(
            "POST",
            "/api/trackings",
            Some("alice"),
            Some(json!({ "activity_id": "cycling" })),
        )
        .await;
        app.clock.advance(Duration::minutes(20));
        let response = app
            .send("POST", "/api/trackings/active/stop", Some("alice"), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let mut seen = Vec::new();
    let mut uri = "/api/trackings?per_page=2".to_string();
    loop {
        let page = body_json(app.send("GET", &uri, Some("alice"), None).await).await;
        for tracking in page["trackings"].as_array().unwrap() {
            seen.push(tracking["id"].as_str().unwrap().to_string());
        }
        match page["next_cursor"].as_str() {
            Some(cursor) => uri = format!("/api/trackings?per_page=2&cursor={}", cursor),
            None => break,
        }
    }

    assert_eq!(seen.len(), 5);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);

    // Other users see nothing
    let page = body_json(app.send("GET", "/api/trackings", Some("bob"), None).await).await;
    assert!(page["trackings"].as_array().unwrap().is_empty());
}
