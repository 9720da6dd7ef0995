use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Identity, Permission};
use crate::errors::AppResult;
use crate::models::agent::{Agent, DbAgent};
use crate::models::conversation::{Conversation, DbConversation};
use crate::utils::utc_now;

#[derive(Debug, Serialize, ToSchema)]
pub struct OverviewResponse {
    pub agents: i64,
    pub conversations: i64,
    pub knowledge_bases: i64,
    pub documents: i64,
}

#[utoipa::path(
    get,
    path = "/analytics/overview",
    tag = "Analytics",
    responses((status = 200, description = "Per-tenant counters", body = OverviewResponse))
)]
pub async fn overview(State(state): State<AppState>, auth: Identity) -> AppResult<Json<OverviewResponse>> {
    require_permission(&state.audit, &auth, Permission::AnalyticsRead)?;

    Ok(Json(OverviewResponse {
        agents: count(&state.pool, "agents", auth.id).await?,
        conversations: count(&state.pool, "conversations", auth.id).await?,
        knowledge_bases: count(&state.pool, "knowledge_bases", auth.id).await?,
        documents: count(&state.pool, "documents", auth.id).await?,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExportResponse {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub agents: Vec<Agent>,
    pub conversations: Vec<Conversation>,
}

#[utoipa::path(
    get,
    path = "/analytics/export",
    tag = "Analytics",
    responses(
        (status = 200, description = "Full tenant data dump", body = ExportResponse),
        (status = 403, description = "Role lacks analytics:export")
    )
)]
pub async fn export(State(state): State<AppState>, auth: Identity) -> AppResult<Json<ExportResponse>> {
    require_permission(&state.audit, &auth, Permission::AnalyticsExport)?;

    let agents = sqlx::query_as::<_, DbAgent>(
        "SELECT id, user_id, name, description, model, system_prompt, temperature, created_at, updated_at, deleted_at FROM agents WHERE user_id = ? AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(auth.id)
    .fetch_all(&state.pool)
    .await?;

    let conversations = sqlx::query_as::<_, DbConversation>(
        "SELECT id, agent_id, user_id, title, created_at, updated_at, deleted_at FROM conversations WHERE user_id = ? AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(auth.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ExportResponse {
        generated_at: utc_now(),
        agents: agents.into_iter().map(Agent::from).collect(),
        conversations: conversations.into_iter().map(Conversation::from).collect(),
    }))
}

async fn count(pool: &SqlitePool, table: &str, user_id: Uuid) -> AppResult<i64> {
    // table names are compile-time constants, never caller input
    let sql = format!("SELECT COUNT(1) FROM {table} WHERE user_id = ? AND deleted_at IS NULL");
    Ok(sqlx::query_scalar(&sql).bind(user_id).fetch_one(pool).await?)
}
