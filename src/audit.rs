//! Audit trail for authorization-relevant events.
//!
//! Events are broadcast on an in-process bus and persisted by a background
//! listener into `audit_log`, hash-chained so tampering with a row breaks
//! every row after it. Recording is fire and forget; audit failures must
//! never fail the request that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub detail: Value,
}

pub type EventBus = broadcast::Sender<AuditEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<AuditEvent>) {
    broadcast::channel(1024)
}

/// Emit an audit event. Dropped silently if no listener is attached.
pub fn record(
    bus: &EventBus,
    name: &str,
    actor_id: Option<Uuid>,
    subject_id: Option<Uuid>,
    detail: Value,
) {
    let event = AuditEvent {
        id: Uuid::new_v4(),
        name: name.to_string(),
        occurred_at: Utc::now(),
        actor_id,
        subject_id,
        detail,
    };

    let _ = bus.send(event);
}

pub async fn start_audit_listener(mut rx: broadcast::Receiver<AuditEvent>, pool: SqlitePool) {
    tracing::info!("audit listener started");
    while let Ok(event) = rx.recv().await {
        if let Err(err) = persist(&pool, &event).await {
            tracing::error!(error = %err, event = %event.name, "failed to persist audit event");
        }
    }
}

async fn persist(pool: &SqlitePool, event: &AuditEvent) -> anyhow::Result<()> {
    let detail = serde_json::to_string(&event.detail)?;

    // Chain: hash = SHA256(prev_hash || detail)
    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY occurred_at DESC, rowid DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    if let Some(ref prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(detail.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        "INSERT INTO audit_log (id, event_name, actor_id, subject_id, occurred_at, detail, prev_hash, hash) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.id.to_string())
    .bind(&event.name)
    .bind(event.actor_id.map(|id| id.to_string()))
    .bind(event.subject_id.map(|id| id.to_string()))
    .bind(event.occurred_at)
    .bind(&detail)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(())
}
