//! Settings, billing and integrations. Thin per-user rows; these routes
//! exist as enforcement points for the settings/billing/integrations grants.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit;
use crate::authz::{require_permission, Identity, Permission};
use crate::errors::{AppError, AppResult};
use crate::models::account::{
    BillingAccount, DbIntegration, Integration, IntegrationUpsertRequest, PlanUpdateRequest,
    SettingsUpdateRequest, UserSettings,
};
use crate::utils::utc_now;

const KNOWN_PLANS: &[&str] = &["free", "starter", "pro", "enterprise"];

#[utoipa::path(
    get,
    path = "/settings",
    tag = "Account",
    responses((status = 200, description = "Caller settings", body = UserSettings))
)]
pub async fn get_settings(State(state): State<AppState>, auth: Identity) -> AppResult<Json<UserSettings>> {
    require_permission(&state.audit, &auth, Permission::SettingsRead)?;

    let settings = sqlx::query_as::<_, UserSettings>(
        "SELECT user_id, locale, notifications_enabled, updated_at FROM user_settings WHERE user_id = ?",
    )
    .bind(auth.id)
    .fetch_optional(&state.pool)
    .await?
    .unwrap_or_else(|| UserSettings {
        user_id: auth.id,
        locale: "pt-BR".to_string(),
        notifications_enabled: true,
        updated_at: utc_now(),
    });

    Ok(Json(settings))
}

#[utoipa::path(
    put,
    path = "/settings",
    tag = "Account",
    request_body = SettingsUpdateRequest,
    responses(
        (status = 200, description = "Settings updated", body = UserSettings),
        (status = 403, description = "Role lacks settings:write")
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    auth: Identity,
    Json(payload): Json<SettingsUpdateRequest>,
) -> AppResult<Json<UserSettings>> {
    require_permission(&state.audit, &auth, Permission::SettingsWrite)?;

    let current = sqlx::query_as::<_, UserSettings>(
        "SELECT user_id, locale, notifications_enabled, updated_at FROM user_settings WHERE user_id = ?",
    )
    .bind(auth.id)
    .fetch_optional(&state.pool)
    .await?;

    let now = utc_now();
    let settings = UserSettings {
        user_id: auth.id,
        locale: payload
            .locale
            .or_else(|| current.as_ref().map(|c| c.locale.clone()))
            .unwrap_or_else(|| "pt-BR".to_string()),
        notifications_enabled: payload
            .notifications_enabled
            .or(current.as_ref().map(|c| c.notifications_enabled))
            .unwrap_or(true),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO user_settings (user_id, locale, notifications_enabled, updated_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT (user_id) DO UPDATE SET locale = excluded.locale, notifications_enabled = excluded.notifications_enabled, updated_at = excluded.updated_at",
    )
    .bind(settings.user_id)
    .bind(&settings.locale)
    .bind(settings.notifications_enabled)
    .bind(settings.updated_at)
    .execute(&state.pool)
    .await?;

    Ok(Json(settings))
}

#[utoipa::path(
    get,
    path = "/billing",
    tag = "Account",
    responses((status = 200, description = "Caller billing account", body = BillingAccount))
)]
pub async fn get_billing(State(state): State<AppState>, auth: Identity) -> AppResult<Json<BillingAccount>> {
    require_permission(&state.audit, &auth, Permission::BillingRead)?;

    let account = sqlx::query_as::<_, BillingAccount>(
        "SELECT user_id, plan, status, updated_at FROM billing_accounts WHERE user_id = ?",
    )
    .bind(auth.id)
    .fetch_optional(&state.pool)
    .await?
    .unwrap_or_else(|| BillingAccount {
        user_id: auth.id,
        plan: "free".to_string(),
        status: "active".to_string(),
        updated_at: utc_now(),
    });

    Ok(Json(account))
}

#[utoipa::path(
    put,
    path = "/billing/plan",
    tag = "Account",
    request_body = PlanUpdateRequest,
    responses(
        (status = 200, description = "Plan changed", body = BillingAccount),
        (status = 403, description = "Role lacks billing:manage")
    )
)]
pub async fn update_plan(
    State(state): State<AppState>,
    auth: Identity,
    Json(payload): Json<PlanUpdateRequest>,
) -> AppResult<Json<BillingAccount>> {
    require_permission(&state.audit, &auth, Permission::BillingManage)?;

    if !KNOWN_PLANS.contains(&payload.plan.as_str()) {
        return Err(AppError::bad_request("Plano desconhecido"));
    }

    let now = utc_now();
    sqlx::query(
        "INSERT INTO billing_accounts (user_id, plan, status, updated_at) VALUES (?, ?, 'active', ?) \
         ON CONFLICT (user_id) DO UPDATE SET plan = excluded.plan, updated_at = excluded.updated_at",
    )
    .bind(auth.id)
    .bind(&payload.plan)
    .bind(now)
    .execute(&state.pool)
    .await?;

    audit::record(
        &state.audit,
        "billing.plan_changed",
        Some(auth.id),
        Some(auth.id),
        serde_json::json!({ "plan": payload.plan }),
    );

    Ok(Json(BillingAccount {
        user_id: auth.id,
        plan: payload.plan,
        status: "active".to_string(),
        updated_at: now,
    }))
}

#[utoipa::path(
    get,
    path = "/integrations",
    tag = "Account",
    responses((status = 200, description = "Caller integrations", body = [Integration]))
)]
pub async fn list_integrations(
    State(state): State<AppState>,
    auth: Identity,
) -> AppResult<Json<Vec<Integration>>> {
    require_permission(&state.audit, &auth, Permission::SettingsRead)?;

    let integrations = sqlx::query_as::<_, DbIntegration>(
        "SELECT id, user_id, provider, enabled, config, created_at, updated_at FROM integrations WHERE user_id = ? ORDER BY provider",
    )
    .bind(auth.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(integrations.into_iter().map(Integration::from).collect()))
}

#[utoipa::path(
    put,
    path = "/integrations/{provider}",
    tag = "Account",
    params(("provider" = String, Path, description = "Integration provider key")),
    request_body = IntegrationUpsertRequest,
    responses(
        (status = 200, description = "Integration upserted", body = Integration),
        (status = 403, description = "Role lacks integrations:manage")
    )
)]
pub async fn upsert_integration(
    State(state): State<AppState>,
    auth: Identity,
    Path(provider): Path<String>,
    Json(payload): Json<IntegrationUpsertRequest>,
) -> AppResult<Json<Integration>> {
    require_permission(&state.audit, &auth, Permission::IntegrationsManage)?;

    let config = payload.config.unwrap_or_else(|| serde_json::json!({}));
    let config_text = serde_json::to_string(&config)
        .map_err(|err| AppError::internal(format!("failed to encode config: {err}")))?;

    let now = utc_now();
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO integrations (id, user_id, provider, enabled, config, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (user_id, provider) DO UPDATE SET enabled = excluded.enabled, config = excluded.config, updated_at = excluded.updated_at",
    )
    .bind(id)
    .bind(auth.id)
    .bind(&provider)
    .bind(payload.enabled)
    .bind(&config_text)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let integration = sqlx::query_as::<_, DbIntegration>(
        "SELECT id, user_id, provider, enabled, config, created_at, updated_at FROM integrations WHERE user_id = ? AND provider = ?",
    )
    .bind(auth.id)
    .bind(&provider)
    .fetch_one(&state.pool)
    .await?;

    audit::record(
        &state.audit,
        "integration.updated",
        Some(auth.id),
        Some(integration.id),
        serde_json::json!({ "provider": provider, "enabled": payload.enabled }),
    );

    Ok(Json(integration.into()))
}
