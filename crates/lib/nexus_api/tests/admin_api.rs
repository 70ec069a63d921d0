//! Administrative endpoints: users, applications, access, audit, settings.

mod common;

use axum::http::StatusCode;
use common::*;
use nexus_core::models::audit::AuditAction;
use nexus_core::store::{GrantStore, SettingsStore, UserStore};
use serde_json::json;

const ADMIN_PASSWORD: &str = "Harbor#Lights92";
const IP: &str = "203.0.113.50";

async fn admin_session() -> (TestApp, String, String) {
    let app = app();
    let admin = app.add_user("root-admin", ADMIN_PASSWORD, true, false).await;
    let cookie = app.login_cookie("root-admin", ADMIN_PASSWORD).await;
    (app, cookie, admin.id)
}

fn new_app_body(name: &str, slug: &str) -> serde_json::Value {
    json!({
        "name": name,
        "slug": slug,
        "base_url": format!("https://{slug}.example.test"),
    })
}

#[tokio::test]
async fn create_user_enforces_policy_and_uniqueness() {
    let (app, cookie, _) = admin_session().await;

    let weak = app
        .send(post_json(
            "/api/users",
            json!({ "username": "bob", "password": "short" }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
    let body = json(weak).await;
    assert_eq!(body["error"], "password_policy");
    assert!(body["details"].as_array().unwrap().len() >= 3);
    assert_eq!(body["strength"]["label"], "Weak");

    let created = app
        .send(post_json(
            "/api/users",
            json!({ "username": "bob", "name": "Bob", "password": "Violet&Canyon58" }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(created.status(), StatusCode::OK);
    let body = json(created).await;
    assert_eq!(body["user"]["username"], "bob");
    assert_eq!(body["user"]["must_change_password"], true);
    assert!(body["user"].get("password_hash").is_none());

    let duplicate = app
        .send(post_json(
            "/api/users",
            json!({ "username": "bob", "password": "Violet&Canyon58" }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(app.audit_count(AuditAction::UserCreated).await, 1);
}

#[tokio::test]
async fn update_user_rejects_empty_patch_and_masks_password() {
    let (app, cookie, _) = admin_session().await;
    let bob = app.add_user("bob", "Violet&Canyon58", false, false).await;
    let uri = format!("/api/users/{}", bob.id);

    let empty = app.send(send_json("PUT", &uri, json!({}), Some(&cookie), IP)).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let updated = app
        .send(send_json(
            "PUT",
            &uri,
            json!({ "is_active": false, "password": "Initial!Secret73" }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json(updated).await["user"]["is_active"], false);

    let page = app
        .send(get("/api/audit?action=USER_UPDATED", Some(&cookie)))
        .await;
    let body = json(page).await;
    assert_eq!(body["total"], 1);
    let details = &body["logs"][0]["details"];
    assert_eq!(details["password"], "***changed***");
    assert!(!details.to_string().contains("Initial!Secret73"));

    let missing = app
        .send(send_json("PUT", "/api/users/nope", json!({ "name": "x" }), Some(&cookie), IP))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_cannot_delete_own_account() {
    let (app, cookie, admin_id) = admin_session().await;
    let bob = app.add_user("bob", "Violet&Canyon58", false, false).await;

    let own = app
        .send(send_json("DELETE", &format!("/api/users/{admin_id}"), json!({}), Some(&cookie), IP))
        .await;
    assert_eq!(own.status(), StatusCode::BAD_REQUEST);

    let other = app
        .send(send_json("DELETE", &format!("/api/users/{}", bob.id), json!({}), Some(&cookie), IP))
        .await;
    assert_eq!(other.status(), StatusCode::OK);
    assert!(app.store.get_user(&bob.id).await.unwrap().is_none());
    assert_eq!(app.audit_count(AuditAction::UserDeleted).await, 1);
}

#[tokio::test]
async fn applications_validate_slug_and_order() {
    let (app, cookie, _) = admin_session().await;

    let bad = app
        .send(post_json("/api/apps", new_app_body("Wiki", "Wiki Pages"), Some(&cookie), IP))
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let first = json(
        app.send(post_json("/api/apps", new_app_body("Wiki", "wiki"), Some(&cookie), IP))
            .await,
    )
    .await;
    let second = json(
        app.send(post_json("/api/apps", new_app_body("Docs", "docs-2"), Some(&cookie), IP))
            .await,
    )
    .await;
    assert_eq!(first["app"]["uses_auth"], true);
    assert_eq!(
        second["app"]["sort_order"].as_i64().unwrap(),
        first["app"]["sort_order"].as_i64().unwrap() + 1
    );

    let duplicate = app
        .send(post_json("/api/apps", new_app_body("Other", "wiki"), Some(&cookie), IP))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let uri = format!("/api/apps/{}", second["app"]["id"].as_str().unwrap());
    let renamed = app
        .send(send_json("PUT", &uri, json!({ "slug": "bad slug" }), Some(&cookie), IP))
        .await;
    assert_eq!(renamed.status(), StatusCode::BAD_REQUEST);

    let deleted = app.send(send_json("DELETE", &uri, json!({}), Some(&cookie), IP)).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    let listed = json(app.send(get("/api/apps", Some(&cookie))).await).await;
    assert_eq!(listed["apps"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn access_toggle_and_reconcile() {
    let (app, cookie, _) = admin_session().await;
    let bob = app.add_user("bob", "Violet&Canyon58", false, false).await;
    let wiki = app.add_app("wiki", true, true).await;
    let docs = app.add_app("docs", true, true).await;
    let chat = app.add_app("chat", true, true).await;
    app.add_app("static", true, false).await;

    let toggle = |app_id: &str, grant: bool| {
        post_json(
            "/api/access",
            json!({ "user_id": bob.id, "app_id": app_id, "grant": grant }),
            Some(&cookie),
            IP,
        )
    };
    let first = json(app.send(toggle(&wiki.id, true)).await).await;
    assert_eq!(first["changed"], true);
    let again = json(app.send(toggle(&wiki.id, true)).await).await;
    assert_eq!(again["changed"], false);
    app.send(toggle(&docs.id, true)).await;
    assert_eq!(app.audit_count(AuditAction::AccessGranted).await, 2);

    let reconciled = app
        .send(send_json(
            "PUT",
            "/api/access",
            json!({ "user_id": bob.id, "app_ids": [docs.id, chat.id, chat.id] }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(reconciled.status(), StatusCode::OK);
    let body = json(reconciled).await;
    assert_eq!(body["added"], json!([chat.id]));
    assert_eq!(body["removed"], json!([wiki.id]));
    assert_eq!(app.audit_count(AuditAction::AccessGranted).await, 3);

    let held = app.store.list_grants(&bob.id).await.unwrap();
    assert_eq!(held.len(), 2);
    assert!(held.contains(&docs.id) && held.contains(&chat.id));

    let unknown = app
        .send(send_json(
            "PUT",
            "/api/access",
            json!({ "user_id": bob.id, "app_ids": ["missing"] }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let matrix = json(app.send(get("/api/access", Some(&cookie))).await).await;
    let slugs: Vec<&str> = matrix["apps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["slug"].as_str().unwrap())
        .collect();
    assert!(!slugs.contains(&"static"));
    assert_eq!(matrix["accessMap"][&bob.id].as_array().unwrap().len(), 2);
    assert_eq!(matrix["users"][0]["username"], "bob");
}

#[tokio::test]
async fn audit_listing_filters_and_rejects_unknown_actions() {
    let (app, cookie, admin_id) = admin_session().await;
    app.login("ghost", "whatever", IP).await;

    let logins = json(app.send(get("/api/audit?action=LOGIN", Some(&cookie))).await).await;
    assert_eq!(logins["total"], 1);
    assert_eq!(logins["logs"][0]["user_id"], admin_id.as_str());
    assert_eq!(logins["logs"][0]["username"], "root-admin");

    let limited = json(app.send(get("/api/audit?limit=500", Some(&cookie))).await).await;
    assert_eq!(limited["limit"], 100);

    let bad = app.send(get("/api/audit?action=EXPLODE", Some(&cookie))).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_accept_string_values_only() {
    let (app, cookie, _) = admin_session().await;

    let before = json(app.send(get("/api/settings", Some(&cookie))).await).await;
    let port = before["settings"]["nexus_port"].clone();

    let response = app
        .send(send_json(
            "PUT",
            "/api/settings",
            json!({ "nexus_host": "hub.internal", "nexus_port": 9999 }),
            Some(&cookie),
            IP,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let settings = app.store.list_settings().await.unwrap();
    assert_eq!(settings["nexus_host"], "hub.internal");
    assert_eq!(json!(settings["nexus_port"]), port);
    assert_eq!(app.audit_count(AuditAction::SettingsUpdated).await, 1);
}
