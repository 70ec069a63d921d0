//! Request gate behaviour through the full router.

mod common;

use axum::Router;
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get as get_route;
use common::*;
use nexus_api::middleware::gate::{USER_ID_HEADER, USERNAME_HEADER, gate};
use tower::ServiceExt;

const PASSWORD: &str = "Granite^Forest64";

fn location(response: &axum::http::Response<axum::body::Body>) -> Option<&str> {
    response.headers().get(LOCATION).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn anonymous_admin_api_gets_401_without_redirect() {
    let app = app();
    let response = app.send(get("/api/users", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(location(&response).is_none());
    assert!(set_cookie_header(&response).unwrap().contains("Max-Age=0"));
    assert_eq!(json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn anonymous_admin_page_redirects_to_login_with_target() {
    let app = app();
    let response = app.send(get("/admin/users", None)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/login?redirect=%2Fadmin%2Fusers"));
}

#[tokio::test]
async fn invalid_token_is_indistinguishable_from_none() {
    let app = app();
    for path in ["/api/apps", "/admin"] {
        let absent = app.send(get(path, None)).await;
        let forged = app
            .send(get(path, Some("nexus_token=eyJhbGciOiJIUzI1NiJ9.e30.forged")))
            .await;

        assert_eq!(absent.status(), forged.status(), "{path}");
        assert_eq!(location(&absent), location(&forged), "{path}");
        assert_eq!(set_cookie_header(&absent), set_cookie_header(&forged), "{path}");
        let absent_body = axum::body::to_bytes(absent.into_body(), usize::MAX).await.unwrap();
        let forged_body = axum::body::to_bytes(forged.into_body(), usize::MAX).await.unwrap();
        assert_eq!(absent_body, forged_body, "{path}");
    }
}

#[tokio::test]
async fn token_from_another_secret_is_rejected() {
    let app = app();
    let user = app.add_user("alice", PASSWORD, true, false).await;
    let foreign = nexus_core::auth::jwt::TokenService::new(
        b"some-other-deployment-secret-0123456789",
        chrono::Duration::hours(1),
    );
    let session = nexus_core::models::auth::SessionUser::from_user(&user, vec![]);
    let token = foreign.mint(&session).unwrap();

    let response = app
        .send(get("/api/users", Some(&format!("nexus_token={token}"))))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_password_change_redirects_until_changed() {
    let app = app();
    app.add_user("dave", PASSWORD, false, true).await;
    let cookie = app.login_cookie("dave", PASSWORD).await;

    let page = app.send(get("/dashboard", Some(&cookie))).await;
    assert_eq!(page.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&page), Some("/change-password"));

    let api = app.send(get("/api/apps", Some(&cookie))).await;
    assert_eq!(api.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(api).await["error"], "password_change_required");

    let change_page = app.send(get("/change-password", Some(&cookie))).await;
    assert_ne!(change_page.status(), StatusCode::TEMPORARY_REDIRECT);

    let changed = app
        .send(post_json(
            "/api/auth/change-password",
            serde_json::json!({
                "current_password": PASSWORD,
                "new_password": "Initial!Secret73",
            }),
            Some(&cookie),
            "198.51.100.1",
        ))
        .await;
    assert_eq!(changed.status(), StatusCode::OK);
    let fresh = session_cookie(&changed).unwrap();

    let page = app.send(get("/dashboard", Some(&fresh))).await;
    assert_ne!(page.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&page).is_none());
}

#[tokio::test]
async fn non_admin_is_kept_out_of_admin_paths() {
    let app = app();
    app.add_user("erin", PASSWORD, false, false).await;
    let cookie = app.login_cookie("erin", PASSWORD).await;

    let api = app.send(get("/api/audit", Some(&cookie))).await;
    assert_eq!(api.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(api).await["error"], "forbidden");

    let page = app.send(get("/admin/settings", Some(&cookie))).await;
    assert_eq!(page.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&page), Some("/"));
}

#[tokio::test]
async fn signed_in_user_on_login_page_goes_home() {
    let app = app();
    app.add_user("frank", PASSWORD, false, false).await;
    let cookie = app.login_cookie("frank", PASSWORD).await;

    let response = app.send(get("/login", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/"));

    let anonymous = app.send(get("/login", None)).await;
    assert_ne!(anonymous.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn gate_replaces_spoofed_identity_headers() {
    let app = app();
    let user = app.add_user("grace", PASSWORD, false, false).await;
    let cookie = app.login_cookie("grace", PASSWORD).await;

    async fn echo(headers: HeaderMap) -> String {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        format!("{}|{}", value(USER_ID_HEADER), value(USERNAME_HEADER))
    }
    let router = Router::new()
        .route("/echo", get_route(echo))
        .route("/echo.txt", get_route(echo))
        .layer(axum::middleware::from_fn_with_state(app.state.clone(), gate))
        .with_state(app.state.clone());

    let spoofed = |uri: &str, cookie: Option<&str>| {
        let mut request = get(uri, cookie);
        request
            .headers_mut()
            .insert(USER_ID_HEADER, "admin-id".parse().unwrap());
        request
            .headers_mut()
            .insert(USERNAME_HEADER, "admin".parse().unwrap());
        request
    };

    let response = router
        .clone()
        .oneshot(spoofed("/echo", Some(&cookie)))
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, format!("{}|grace", user.id).as_bytes());

    let response = router.oneshot(spoofed("/echo.txt", None)).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"-|-");
}
