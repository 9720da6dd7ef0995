use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbKnowledgeBase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DbKnowledgeBase> for KnowledgeBase {
    fn from(value: DbKnowledgeBase) -> Self {
        KnowledgeBase {
            id: value.id,
            user_id: value.user_id,
            name: value.name,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DbDocument> for Document {
    fn from(value: DbDocument) -> Self {
        Document {
            id: value.id,
            knowledge_base_id: value.knowledge_base_id,
            title: value.title,
            content: value.content,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct KnowledgeBaseCreateRequest {
    #[schema(example = "FAQ do produto")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    #[schema(example = "Política de reembolso")]
    pub title: String,
    pub content: String,
}

/// One ranked hit from the term-overlap search.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResult {
    pub document_id: Uuid,
    pub title: String,
    pub score: f64,
    pub snippet: String,
}
