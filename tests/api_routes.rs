use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use storefront_api::{
    config::AppConfig,
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    routes::create_app,
    services::auth_service::issue_token,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

// Requests here are rejected before any query runs, so the pool never connects.
fn app() -> (axum::Router, AppConfig) {
    app_with(AppConfig::for_tests("postgres://postgres@127.0.0.1:1/unused"))
}

fn app_with(config: AppConfig) -> (axum::Router, AppConfig) {
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");
    (create_app(AppState::new(pool, config.clone())), config)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn session(config: &AppConfig, role: &str) -> String {
    let token = issue_token(config, Uuid::new_v4(), role).expect("token");
    format!("jwt={token}")
}

#[tokio::test]
async fn unknown_route_is_404_with_path() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["data"]["path"], "/api/nope");
}

#[tokio::test]
async fn profile_without_session_is_401() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/api/users/profile").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("no token"));
}

#[tokio::test]
async fn forged_cookie_is_401() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::get("/api/cart")
                .header(header::COOKIE, "jwt=not.a.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_admin_cannot_create_category() {
    let (app, config) = app();
    let response = app
        .oneshot(
            Request::post("/api/categories")
                .header(header::COOKIE, session(&config, ROLE_USER))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"Shoes"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn non_admin_cannot_list_users_even_with_bearer() {
    let (app, config) = app();
    let token = issue_token(&config, Uuid::new_v4(), ROLE_USER).unwrap();
    let response = app
        .oneshot(
            Request::get("/api/users")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_category_name_validated_before_storage() {
    let (app, config) = app();
    let response = app
        .oneshot(
            Request::post("/api/categories")
                .header(header::COOKIE, session(&config, ROLE_ADMIN))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"   "}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["data"]["error"].as_str().unwrap().contains("Name is required"));
}

#[tokio::test]
async fn cart_rejects_non_positive_quantity() {
    let (app, config) = app();
    let body = serde_json::json!({ "product_id": Uuid::new_v4(), "quantity": 0 });
    let response = app
        .oneshot(
            Request::post("/api/cart")
                .header(header::COOKIE, session(&config, ROLE_USER))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_expires_session_cookie() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::post("/api/users/logout").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("jwt=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn upload_requires_admin() {
    let (app, config) = app();
    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nPNG\r\n--{boundary}--\r\n"
    );
    let response = app
        .oneshot(
            Request::post("/api/uploads")
                .header(header::COOKIE, session(&config, ROLE_USER))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_upload_is_stored_and_served() {
    let (app, config) = app();
    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
    );
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/uploads")
                .header(header::COOKIE, session(&config, ROLE_ADMIN))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let path = json["data"]["image"].as_str().unwrap().to_string();
    assert!(path.starts_with("/uploads/image-"));
    assert!(path.ends_with(".png"));

    let served = app
        .oneshot(Request::get(path.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
    let bytes = to_bytes(served.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"PNGDATA");
}

#[tokio::test]
async fn rejected_product_form_leaves_no_images_on_disk() {
    let mut config = AppConfig::for_tests("postgres://postgres@127.0.0.1:1/unused");
    let upload_dir = std::env::temp_dir().join(format!("storefront-products-{}", Uuid::new_v4()));
    config.upload_dir = upload_dir.to_string_lossy().into_owned();
    let (app, config) = app_with(config);

    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nMug\r\n--{boundary}--\r\n"
    );
    let response = app
        .oneshot(
            Request::post("/api/products")
                .header(header::COOKIE, session(&config, ROLE_ADMIN))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let left = std::fs::read_dir(&upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(left, 0);
}

#[tokio::test]
async fn upload_without_content_type_is_rejected() {
    let (app, config) = app();
    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
    );
    let response = app
        .oneshot(
            Request::post("/api/uploads")
                .header(header::COOKIE, session(&config, ROLE_ADMIN))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
