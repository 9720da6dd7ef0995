use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub locale: String,
    pub notifications_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettingsUpdateRequest {
    #[schema(example = "pt-BR")]
    pub locale: Option<String>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BillingAccount {
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlanUpdateRequest {
    #[schema(example = "pro")]
    pub plan: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Integration {
    pub id: Uuid,
    pub provider: String,
    pub enabled: bool,
    #[schema(value_type = Object)]
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbIntegration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub enabled: bool,
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbIntegration> for Integration {
    fn from(value: DbIntegration) -> Self {
        Integration {
            id: value.id,
            provider: value.provider,
            enabled: value.enabled,
            config: serde_json::from_str(&value.config).unwrap_or(Value::Object(Default::default())),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntegrationUpsertRequest {
    pub enabled: bool,
    /// Provider-specific configuration blob, stored as-is.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: Option<Value>,
}
