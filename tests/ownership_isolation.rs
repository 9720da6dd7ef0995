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

async fn setup(dir: &tempfile::TempDir) -> Result<Router> {
    let db_path = dir.path().join("test_ownership.db");
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
    Ok(create_app(pool).await?)
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

/// Another tenant's resource must look exactly like a missing one: same 404,
/// same body, no resource fields leaking.
#[tokio::test]
async fn cross_tenant_access_is_not_found() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let app = setup(&dir).await?;

    let token_a = register(&app, "Alice", "alice@example.com").await?;
    let token_b = register(&app, "Bruno", "bruno@example.com").await?;

    // A creates an agent
    let req = Request::builder()
        .method("POST")
        .uri("/agents")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token_a))
        .body(Body::from(json!({"name": "Sigiloso", "system_prompt": "segredo"}).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let agent: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    let agent_id = agent.get("id").and_then(|v| v.as_str()).context("missing id")?.to_string();

    // B probes it with GET, PUT and DELETE
    for (method, body_payload) in [
        ("GET", None),
        ("PUT", Some(json!({"name": "Invadido"}).to_string())),
        ("DELETE", None),
    ] {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/agents/{}", agent_id))
            .header("authorization", format!("Bearer {}", token_b));
        let body_content = match body_payload {
            Some(payload) => {
                builder = builder.header("content-type", "application/json");
                Body::from(payload)
            }
            None => Body::empty(),
        };
        let resp: Response = app.clone().oneshot(builder.body(body_content)?).await?;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{method} must 404");
        let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
        let payload: serde_json::Value = serde_json::from_slice(&body_bytes)?;
        assert_eq!(payload, json!({"error": "Agente não encontrado"}));
    }

    // a genuinely missing id yields the identical response
    let req = Request::builder()
        .method("GET")
        .uri(format!("/agents/{}", uuid::Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token_b))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let payload: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(payload, json!({"error": "Agente não encontrado"}));

    // A's agent is untouched by B's probes
    let req = Request::builder()
        .method("GET")
        .uri(format!("/agents/{}", agent_id))
        .header("authorization", format!("Bearer {}", token_a))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let agent: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(agent.get("name").and_then(|v| v.as_str()), Some("Sigiloso"));

    // same rule for knowledge bases
    let req = Request::builder()
        .method("POST")
        .uri("/knowledge")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token_a))
        .body(Body::from(json!({"name": "Interna"}).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body_bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let kb: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    let kb_id = kb.get("id").and_then(|v| v.as_str()).context("missing kb id")?;

    let req = Request::builder()
        .method("GET")
        .uri(format!("/knowledge/{}", kb_id))
        .header("authorization", format!("Bearer {}", token_b))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}
