use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Identity, Permission};
use crate::errors::{AppError, AppResult};
use crate::models::conversation::{Conversation, ConversationCreateRequest, DbConversation};
use crate::routes::agents::fetch_agent;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/agents/{agent_id}/conversations",
    tag = "Conversations",
    params(("agent_id" = Uuid, Path, description = "Agent id")),
    responses((status = 200, description = "Conversations of the agent", body = [Conversation]))
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: Identity,
    Path(agent_id): Path<Uuid>,
) -> AppResult<Json<Vec<Conversation>>> {
    require_permission(&state.audit, &auth, Permission::AgentsRead)?;

    // 404s before listing when the agent is not visible to the caller
    let _ = fetch_agent(&state.pool, auth.id, agent_id).await?;

    let conversations = sqlx::query_as::<_, DbConversation>(
        "SELECT id, agent_id, user_id, title, created_at, updated_at, deleted_at FROM conversations WHERE agent_id = ? AND user_id = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(agent_id)
    .bind(auth.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(conversations.into_iter().map(Conversation::from).collect()))
}

#[utoipa::path(
    post,
    path = "/agents/{agent_id}/conversations",
    tag = "Conversations",
    params(("agent_id" = Uuid, Path, description = "Agent id")),
    request_body = ConversationCreateRequest,
    responses((status = 201, description = "Conversation created", body = Conversation))
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: Identity,
    Path(agent_id): Path<Uuid>,
    Json(payload): Json<ConversationCreateRequest>,
) -> AppResult<(StatusCode, Json<Conversation>)> {
    require_permission(&state.audit, &auth, Permission::AgentsRead)?;

    let agent = fetch_agent(&state.pool, auth.id, agent_id).await?;

    let now = utc_now();
    let conversation_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO conversations (id, agent_id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(conversation_id)
    .bind(agent.id)
    .bind(auth.id)
    .bind(&payload.title)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let conversation = fetch_conversation(&state.pool, auth.id, conversation_id).await?;

    Ok((StatusCode::CREATED, Json(conversation.into())))
}

#[utoipa::path(
    get,
    path = "/conversations/{id}",
    tag = "Conversations",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation detail", body = Conversation),
        (status = 404, description = "Conversation absent or not owned by caller")
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Conversation>> {
    require_permission(&state.audit, &auth, Permission::AgentsRead)?;

    let conversation = fetch_conversation(&state.pool, auth.id, id).await?;
    Ok(Json(conversation.into()))
}

#[utoipa::path(
    delete,
    path = "/conversations/{id}",
    tag = "Conversations",
    params(("id" = Uuid, Path, description = "Conversation id")),
    responses((status = 204, description = "Conversation soft deleted"))
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state.audit, &auth, Permission::AgentsDelete)?;

    let _ = fetch_conversation(&state.pool, auth.id, id).await?;

    let now = utc_now();
    sqlx::query(
        "UPDATE conversations SET deleted_at = ?, updated_at = ? WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(auth.id)
    .execute(&state.pool)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_conversation(
    pool: &SqlitePool,
    user_id: Uuid,
    conversation_id: Uuid,
) -> AppResult<DbConversation> {
    sqlx::query_as::<_, DbConversation>(
        "SELECT id, agent_id, user_id, title, created_at, updated_at, deleted_at FROM conversations WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Conversa não encontrada"))
}
