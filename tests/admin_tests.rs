//! Tests for admin principal management.

mod common;

use axum::http::StatusCode;
use common::*;
use connectrix::db::{Principal, Role};
use serde_json::json;

async fn admin_cookies(t: &TestApp) -> (Principal, String) {
    let admin = t.create_principal("root@uni.edu", None, Role::Admin).await;
    let pair = t.session(&admin);
    (admin, cookie_header(Some(&pair.access.token), None))
}

#[tokio::test]
async fn test_admin_creates_club_principal() {
    let t = TestApp::new().await;
    let (_, cookies) = admin_cookies(&t).await;

    let response = t
        .send(post_json(
            "/api/admin/principals",
            &cookies,
            json!({
                "name": "Chess Club",
                "email": "chess@uni.edu",
                "password": "club-password",
                "role": "club",
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["user"]["role"], "club");

    let id = body["user"]["id"].as_str().unwrap();
    let stored = t.db.principals().get_by_uuid(id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Club);
}

#[tokio::test]
async fn test_unknown_role_rejected() {
    let t = TestApp::new().await;
    let (_, cookies) = admin_cookies(&t).await;

    let response = t
        .send(post_json(
            "/api/admin/principals",
            &cookies,
            json!({
                "name": "Wizard",
                "email": "wizard@uni.edu",
                "password": "wizard-password",
                "role": "wizard",
            }),
        ))
        .await;

    assert!(response.status().is_client_error());
    assert!(t.db.principals().get_credentials("wizard@uni.edu").await.unwrap().is_none());
}

#[tokio::test]
async fn test_non_admin_forbidden() {
    let t = TestApp::new().await;
    let dean = t.create_principal("dean@uni.edu", None, Role::Dean).await;
    let pair = t.session(&dean);

    let response = t
        .send(post_json(
            "/api/admin/principals",
            &cookie_header(Some(&pair.access.token), None),
            json!({
                "name": "Chess Club",
                "email": "chess@uni.edu",
                "password": "club-password",
                "role": "club",
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_anonymous_unauthorized() {
    let t = TestApp::new().await;

    let response = t
        .send(json_request(
            "DELETE",
            "/api/admin/principals/6f1c2a9e-3b4d-4c5e-8f70-1a2b3c4d5e6f",
            "",
            json!({}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_set_role() {
    let t = TestApp::new().await;
    let (_, cookies) = admin_cookies(&t).await;
    let student = t.create_principal("alice@uni.edu", None, Role::Student).await;

    let response = t
        .send(json_request(
            "PUT",
            &format!("/api/admin/principals/{}/role", student.uuid),
            &cookies,
            json!({ "role": "dean" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["role"], "dean");
}

#[tokio::test]
async fn test_set_role_unknown_principal() {
    let t = TestApp::new().await;
    let (_, cookies) = admin_cookies(&t).await;

    let response = t
        .send(json_request(
            "PUT",
            "/api/admin/principals/6f1c2a9e-3b4d-4c5e-8f70-1a2b3c4d5e6f/role",
            &cookies,
            json!({ "role": "dean" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_cannot_change_own_role() {
    let t = TestApp::new().await;
    let (admin, cookies) = admin_cookies(&t).await;

    let response = t
        .send(json_request(
            "PUT",
            &format!("/api/admin/principals/{}/role", admin.uuid),
            &cookies,
            json!({ "role": "student" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_principal_ends_its_sessions_at_refresh() {
    let t = TestApp::new().await;
    let (_, cookies) = admin_cookies(&t).await;
    let student = t.create_principal("alice@uni.edu", None, Role::Student).await;
    let pair = t.session(&student);

    let response = t
        .send(json_request(
            "DELETE",
            &format!("/api/admin/principals/{}", student.uuid),
            &cookies,
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = t
        .send(post_json(
            "/api/auth/refresh",
            &cookie_header(None, Some(&pair.refresh.token)),
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .send(json_request(
            "DELETE",
            &format!("/api/admin/principals/{}", student.uuid),
            &cookies,
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_rejects_malformed_id() {
    let t = TestApp::new().await;
    let (_, cookies) = admin_cookies(&t).await;

    let response = t
        .send(json_request(
            "DELETE",
            "/api/admin/principals/not-a-uuid",
            &cookies,
            json!({}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
