use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit;
use crate::authz::{require_permission, Identity, Permission};
use crate::errors::{AppError, AppResult};
use crate::models::agent::{Agent, AgentCreateRequest, AgentUpdateRequest, DbAgent};
use crate::utils::utc_now;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.7;

#[utoipa::path(
    get,
    path = "/agents",
    tag = "Agents",
    responses((status = 200, description = "List the caller's agents", body = [Agent]))
)]
pub async fn list_agents(State(state): State<AppState>, auth: Identity) -> AppResult<Json<Vec<Agent>>> {
    require_permission(&state.audit, &auth, Permission::AgentsRead)?;

    let agents = sqlx::query_as::<_, DbAgent>(
        "SELECT id, user_id, name, description, model, system_prompt, temperature, created_at, updated_at, deleted_at FROM agents WHERE user_id = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(auth.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(agents.into_iter().map(Agent::from).collect()))
}

#[utoipa::path(
    post,
    path = "/agents",
    tag = "Agents",
    request_body = AgentCreateRequest,
    responses(
        (status = 201, description = "Agent created", body = Agent),
        (status = 403, description = "Caller's role cannot create agents")
    )
)]
pub async fn create_agent(
    State(state): State<AppState>,
    auth: Identity,
    Json(payload): Json<AgentCreateRequest>,
) -> AppResult<(StatusCode, Json<Agent>)> {
    require_permission(&state.audit, &auth, Permission::AgentsCreate)?;

    let now = utc_now();
    let agent_id = Uuid::new_v4();
    let model = payload.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let temperature = payload.temperature.unwrap_or(DEFAULT_TEMPERATURE);

    sqlx::query(
        "INSERT INTO agents (id, user_id, name, description, model, system_prompt, temperature, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(agent_id)
    .bind(auth.id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&model)
    .bind(&payload.system_prompt)
    .bind(temperature)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let agent: Agent = fetch_agent(&state.pool, auth.id, agent_id).await?.into();

    audit::record(
        &state.audit,
        "agent.created",
        Some(auth.id),
        Some(agent.id),
        serde_json::json!({ "name": agent.name }),
    );

    Ok((StatusCode::CREATED, Json(agent)))
}

#[utoipa::path(
    get,
    path = "/agents/{id}",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "Agent id")),
    responses(
        (status = 200, description = "Agent detail", body = Agent),
        (status = 404, description = "Agent absent or not owned by caller")
    )
)]
pub async fn get_agent(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Agent>> {
    require_permission(&state.audit, &auth, Permission::AgentsRead)?;

    let agent = fetch_agent(&state.pool, auth.id, id).await?;
    Ok(Json(agent.into()))
}

#[utoipa::path(
    put,
    path = "/agents/{id}",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "Agent id")),
    request_body = AgentUpdateRequest,
    responses((status = 200, description = "Agent updated", body = Agent))
)]
pub async fn update_agent(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<AgentUpdateRequest>,
) -> AppResult<Json<Agent>> {
    require_permission(&state.audit, &auth, Permission::AgentsUpdate)?;

    let mut agent = fetch_agent(&state.pool, auth.id, id).await?;

    if let Some(name) = payload.name.as_ref() {
        agent.name = name.clone();
    }
    if payload.description.is_some() {
        agent.description = payload.description.clone();
    }
    if let Some(model) = payload.model.as_ref() {
        agent.model = model.clone();
    }
    if payload.system_prompt.is_some() {
        agent.system_prompt = payload.system_prompt.clone();
    }
    if let Some(temperature) = payload.temperature {
        agent.temperature = temperature;
    }

    let now = utc_now();

    sqlx::query(
        "UPDATE agents SET name = ?, description = ?, model = ?, system_prompt = ?, temperature = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(&agent.name)
    .bind(&agent.description)
    .bind(&agent.model)
    .bind(&agent.system_prompt)
    .bind(agent.temperature)
    .bind(now)
    .bind(agent.id)
    .bind(auth.id)
    .execute(&state.pool)
    .await?;

    agent.updated_at = now;
    Ok(Json(agent.into()))
}

#[utoipa::path(
    delete,
    path = "/agents/{id}",
    tag = "Agents",
    params(("id" = Uuid, Path, description = "Agent id")),
    responses((status = 204, description = "Agent soft deleted"))
)]
pub async fn delete_agent(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state.audit, &auth, Permission::AgentsDelete)?;

    let agent = fetch_agent(&state.pool, auth.id, id).await?;

    let now = utc_now();
    let affected = sqlx::query(
        "UPDATE agents SET deleted_at = ?, updated_at = ? WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(auth.id)
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("Agente não encontrado"));
    }

    audit::record(
        &state.audit,
        "agent.deleted",
        Some(auth.id),
        Some(agent.id),
        serde_json::json!({ "name": agent.name }),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Single visibility predicate: the row must exist, be live, and belong to
/// the caller. Absent and not-owned are indistinguishable (both 404), so
/// other tenants' agent ids never leak.
pub(crate) async fn fetch_agent(pool: &SqlitePool, user_id: Uuid, agent_id: Uuid) -> AppResult<DbAgent> {
    sqlx::query_as::<_, DbAgent>(
        "SELECT id, user_id, name, description, model, system_prompt, temperature, created_at, updated_at, deleted_at FROM agents WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(agent_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Agente não encontrado"))
}
