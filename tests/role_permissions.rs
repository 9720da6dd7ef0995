use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use agentes_api::create_app;

async fn setup(dir: &tempfile::TempDir) -> Result<(Router, SqlitePool)> {
    let db_path = dir.path().join("test_roles.db");
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
    Ok((app, pool))
}

async fn register(app: &Router, name: &str, email: &str) -> Result<String> {
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": name, "email": email, "password": "password123"}).to_string(),
        ))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let res: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    Ok(res.get("token").and_then(|v| v.as_str()).context("missing token")?.to_string())
}

/// Change the stored role, then log in again so the new token carries it.
async fn login_as(app: &Router, pool: &SqlitePool, email: &str, role: &str) -> Result<String> {
    sqlx::query("UPDATE users SET role = ? WHERE email = ?")
        .bind(role)
        .bind(email)
        .execute(pool)
        .await?;

    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({"email": email, "password": "password123"}).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let res: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    Ok(res.get("token").and_then(|v| v.as_str()).context("missing token")?.to_string())
}

#[tokio::test]
async fn role_grants_gate_routes() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let (app, pool) = setup(&dir).await?;

    let _ = register(&app, "Dona", "dona@example.com").await?;
    let viewer_token = login_as(&app, &pool, "dona@example.com", "viewer").await?;

    // viewer cannot create agents: 403 with the stable payload
    let req = Request::builder()
        .method("POST")
        .uri("/agents")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", viewer_token))
        .body(Body::from(json!({"name": "Negado"}).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(payload, json!({"error": "Acesso negado"}));

    // but the same viewer can still list their agents
    let req = Request::builder()
        .method("GET")
        .uri("/agents")
        .header("authorization", format!("Bearer {}", viewer_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // a plain user creates an agent but cannot delete it
    let user_token = register(&app, "Otto", "otto@example.com").await?;
    let req = Request::builder()
        .method("POST")
        .uri("/agents")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", user_token))
        .body(Body::from(json!({"name": "Vendas"}).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let agent: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    let agent_id = agent.get("id").and_then(|v| v.as_str()).context("missing id")?.to_string();

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/agents/{}", agent_id))
        .header("authorization", format!("Bearer {}", user_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // user cannot export analytics
    let req = Request::builder()
        .method("GET")
        .uri("/analytics/export")
        .header("authorization", format!("Bearer {}", user_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // manager can export, still cannot delete agents
    let manager_token = login_as(&app, &pool, "otto@example.com", "manager").await?;
    let req = Request::builder()
        .method("GET")
        .uri("/analytics/export")
        .header("authorization", format!("Bearer {}", manager_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/agents/{}", agent_id))
        .header("authorization", format!("Bearer {}", manager_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // non-admin cannot reach user administration
    let req = Request::builder()
        .method("GET")
        .uri("/admin/users")
        .header("authorization", format!("Bearer {}", manager_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // admin can do both
    let admin_token = login_as(&app, &pool, "otto@example.com", "admin").await?;
    let req = Request::builder()
        .method("GET")
        .uri("/admin/users")
        .header("authorization", format!("Bearer {}", admin_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let users: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert!(users.as_array().unwrap().len() >= 2);

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/agents/{}", agent_id))
        .header("authorization", format!("Bearer {}", admin_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    Ok(())
}
