use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit;
use crate::authz::{require_permission, Identity, Permission};
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, UpdateRoleRequest, User};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "Admin",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Role lacks users:manage")
    )
)]
pub async fn list_users(State(state): State<AppState>, auth: Identity) -> AppResult<Json<Vec<User>>> {
    require_permission(&state.audit, &auth, Permission::UsersManage)?;

    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, role, created_at, updated_at, deleted_at FROM users WHERE deleted_at IS NULL ORDER BY created_at",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users.into_iter().map(User::from).collect()))
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<User>> {
    require_permission(&state.audit, &auth, Permission::UsersManage)?;

    let target = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, role, created_at, updated_at, deleted_at FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("Usuário não encontrado"))?;

    let now = utc_now();
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(payload.role.as_str())
        .bind(now)
        .bind(target.id)
        .execute(&state.pool)
        .await?;

    audit::record(
        &state.audit,
        "user.role_changed",
        Some(auth.id),
        Some(target.id),
        serde_json::json!({
            "old": target.role,
            "new": payload.role.as_str(),
        }),
    );

    let mut user: User = target.into();
    user.role = payload.role;
    user.updated_at = now;
    Ok(Json(user))
}
