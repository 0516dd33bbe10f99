// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API input validation tests.

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::create_test_app;

#[tokio::test]
async fn test_activity_id_too_long() {
    let app = create_test_app();
    let long_id = "a".repeat(101);

    let response = app
        .send(
            "POST",
            "/api/trackings",
            Some("alice"),
            Some(json!({ "activity_id": long_id })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_activity_not_found() {
    let app = create_test_app();

    let response = app
        .send(
            "POST",
            "/api/trackings",
            Some("alice"),
            Some(json!({ "activity_id": "does-not-exist" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_fields_validated() {
    let app = create_test_app();

    for body in [
        json!({ "display_name": "" }),
        json!({ "display_name": "x".repeat(51) }),
        json!({ "photo_url": "not a url" }),
    ] {
        let response = app.send("PUT", "/api/me", Some("alice"), Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_annotation_image_must_be_url() {
    let app = create_test_app();

    let response = app
        .send(
            "PATCH",
            "/api/trackings/some-id",
            Some("alice"),
            Some(json!({ "image_url": "not a url" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
