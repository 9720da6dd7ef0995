use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use agentes_api::create_app;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_auth.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    // 1. Register with short password
    let short_pass_body = json!({
        "name": "Short Pass",
        "email": "short@example.com",
        "password": "curta"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(short_pass_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // 2. Register with valid user
    let valid_body = json!({
        "name": "Valid User",
        "email": "valid@example.com",
        "password": "password123"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(valid_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // 3. Duplicate email is a conflict
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "Dup", "email": "valid@example.com", "password": "password123"}).to_string(),
        ))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // 4. Login with wrong password carries the stable 401 payload
    let wrong_pass_body = json!({
        "email": "valid@example.com",
        "password": "wrongpassword"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(wrong_pass_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(payload, json!({"error": "Não autorizado"}));

    // 5. Protected route without a token: 401 with the literal payload.
    // Identity resolution is token-only, so the data layer is never reached;
    // dropping the users table makes any accidental DB access blow up loudly.
    sqlx::query("ALTER TABLE users RENAME TO users_hidden")
        .execute(&pool)
        .await?;

    let req = Request::builder()
        .method("GET")
        .uri("/agents")
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(payload, json!({"error": "Não autorizado"}));

    // 6. Garbage bearer token is indistinguishable from no token
    let req = Request::builder()
        .method("GET")
        .uri("/agents")
        .header("authorization", "Bearer not.a.jwt")
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(payload, json!({"error": "Não autorizado"}));

    sqlx::query("ALTER TABLE users_hidden RENAME TO users")
        .execute(&pool)
        .await?;

    Ok(())
}
