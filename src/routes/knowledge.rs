use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit;
use crate::authz::{require_permission, Identity, Permission};
use crate::errors::{AppError, AppResult};
use crate::models::knowledge::{
    DbDocument, DbKnowledgeBase, Document, DocumentCreateRequest, KnowledgeBase,
    KnowledgeBaseCreateRequest, SearchResult,
};
use crate::utils::utc_now;

const MAX_SEARCH_RESULTS: usize = 10;
const SNIPPET_LENGTH: usize = 160;

#[utoipa::path(
    get,
    path = "/knowledge",
    tag = "Knowledge",
    responses((status = 200, description = "List the caller's knowledge bases", body = [KnowledgeBase]))
)]
pub async fn list_bases(State(state): State<AppState>, auth: Identity) -> AppResult<Json<Vec<KnowledgeBase>>> {
    require_permission(&state.audit, &auth, Permission::KnowledgeRead)?;

    let bases = sqlx::query_as::<_, DbKnowledgeBase>(
        "SELECT id, user_id, name, description, created_at, updated_at, deleted_at FROM knowledge_bases WHERE user_id = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(auth.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(bases.into_iter().map(KnowledgeBase::from).collect()))
}

#[utoipa::path(
    post,
    path = "/knowledge",
    tag = "Knowledge",
    request_body = KnowledgeBaseCreateRequest,
    responses((status = 201, description = "Knowledge base created", body = KnowledgeBase))
)]
pub async fn create_base(
    State(state): State<AppState>,
    auth: Identity,
    Json(payload): Json<KnowledgeBaseCreateRequest>,
) -> AppResult<(StatusCode, Json<KnowledgeBase>)> {
    require_permission(&state.audit, &auth, Permission::KnowledgeUpload)?;

    let now = utc_now();
    let base_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO knowledge_bases (id, user_id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(base_id)
    .bind(auth.id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let base = fetch_base(&state.pool, auth.id, base_id).await?;
    Ok((StatusCode::CREATED, Json(base.into())))
}

#[utoipa::path(
    get,
    path = "/knowledge/{id}",
    tag = "Knowledge",
    params(("id" = Uuid, Path, description = "Knowledge base id")),
    responses((status = 200, description = "Knowledge base detail", body = KnowledgeBase))
)]
pub async fn get_base(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<KnowledgeBase>> {
    require_permission(&state.audit, &auth, Permission::KnowledgeRead)?;

    let base = fetch_base(&state.pool, auth.id, id).await?;
    Ok(Json(base.into()))
}

#[utoipa::path(
    delete,
    path = "/knowledge/{id}",
    tag = "Knowledge",
    params(("id" = Uuid, Path, description = "Knowledge base id")),
    responses((status = 204, description = "Knowledge base soft deleted"))
)]
pub async fn delete_base(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_permission(&state.audit, &auth, Permission::KnowledgeDelete)?;

    let base = fetch_base(&state.pool, auth.id, id).await?;

    let now = utc_now();
    sqlx::query(
        "UPDATE knowledge_bases SET deleted_at = ?, updated_at = ? WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(auth.id)
    .execute(&state.pool)
    .await?;

    // documents of a deleted base go with it
    sqlx::query("UPDATE documents SET deleted_at = ? WHERE knowledge_base_id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    audit::record(
        &state.audit,
        "knowledge_base.deleted",
        Some(auth.id),
        Some(base.id),
        serde_json::json!({ "name": base.name }),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/knowledge/{id}/documents",
    tag = "Knowledge",
    params(("id" = Uuid, Path, description = "Knowledge base id")),
    responses((status = 200, description = "Documents in the base", body = [Document]))
)]
pub async fn list_documents(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Document>>> {
    require_permission(&state.audit, &auth, Permission::KnowledgeRead)?;

    let _ = fetch_base(&state.pool, auth.id, id).await?;

    let documents = sqlx::query_as::<_, DbDocument>(
        "SELECT id, knowledge_base_id, user_id, title, content, created_at, updated_at, deleted_at FROM documents WHERE knowledge_base_id = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(documents.into_iter().map(Document::from).collect()))
}

#[utoipa::path(
    post,
    path = "/knowledge/{id}/documents",
    tag = "Knowledge",
    params(("id" = Uuid, Path, description = "Knowledge base id")),
    request_body = DocumentCreateRequest,
    responses((status = 201, description = "Document added", body = Document))
)]
pub async fn create_document(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    require_permission(&state.audit, &auth, Permission::KnowledgeUpload)?;

    let base = fetch_base(&state.pool, auth.id, id).await?;

    if payload.content.trim().is_empty() {
        return Err(AppError::bad_request("Conteúdo do documento vazio"));
    }

    let now = utc_now();
    let document_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO documents (id, knowledge_base_id, user_id, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document_id)
    .bind(base.id)
    .bind(auth.id)
    .bind(&payload.title)
    .bind(&payload.content)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let document = fetch_document(&state.pool, auth.id, base.id, document_id).await?;
    Ok((StatusCode::CREATED, Json(document.into())))
}

#[utoipa::path(
    delete,
    path = "/knowledge/{id}/documents/{doc_id}",
    tag = "Knowledge",
    params(
        ("id" = Uuid, Path, description = "Knowledge base id"),
        ("doc_id" = Uuid, Path, description = "Document id")
    ),
    responses((status = 204, description = "Document soft deleted"))
)]
pub async fn delete_document(
    State(state): State<AppState>,
    auth: Identity,
    Path((id, doc_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    require_permission(&state.audit, &auth, Permission::KnowledgeDelete)?;

    let document = fetch_document(&state.pool, auth.id, id, doc_id).await?;

    let now = utc_now();
    sqlx::query("UPDATE documents SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(document.id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Free-text query, matched term by term against document content.
    pub q: String,
}

#[utoipa::path(
    get,
    path = "/knowledge/{id}/search",
    tag = "Knowledge",
    params(("id" = Uuid, Path, description = "Knowledge base id"), SearchParams),
    responses((status = 200, description = "Ranked search hits", body = [SearchResult]))
)]
pub async fn search(
    State(state): State<AppState>,
    auth: Identity,
    Path(id): Path<Uuid>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<SearchResult>>> {
    require_permission(&state.audit, &auth, Permission::KnowledgeRead)?;

    let _ = fetch_base(&state.pool, auth.id, id).await?;

    let query = params.q.trim().to_lowercase();
    if query.is_empty() {
        return Err(AppError::bad_request("Parâmetro de busca vazio"));
    }

    let documents = sqlx::query_as::<_, DbDocument>(
        "SELECT id, knowledge_base_id, user_id, title, content, created_at, updated_at, deleted_at FROM documents WHERE knowledge_base_id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let mut results: Vec<SearchResult> = documents
        .iter()
        .filter_map(|doc| score_document(&query, doc))
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(MAX_SEARCH_RESULTS);

    Ok(Json(results))
}

/// Term-overlap scoring: fraction of query terms present in title or content,
/// with a bonus when the whole query appears as a substring.
fn score_document(query: &str, doc: &DbDocument) -> Option<SearchResult> {
    let haystack = format!("{} {}", doc.title, doc.content).to_lowercase();

    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }

    let matched = terms.iter().filter(|term| haystack.contains(**term)).count();
    if matched == 0 {
        return None;
    }

    let mut score = matched as f64 / terms.len() as f64;
    if haystack.contains(query) {
        score += 0.5;
    }

    Some(SearchResult {
        document_id: doc.id,
        title: doc.title.clone(),
        score,
        snippet: make_snippet(&doc.content, query),
    })
}

fn make_snippet(content: &str, query: &str) -> String {
    let lower = content.to_lowercase();
    let pos = lower
        .find(query)
        .or_else(|| query.split_whitespace().find_map(|term| lower.find(term)))
        .unwrap_or(0);

    // the offset comes from the lowercased copy; clamp to a char boundary
    let mut start = pos.min(content.len());
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }

    content[start..].chars().take(SNIPPET_LENGTH).collect()
}

async fn fetch_base(pool: &SqlitePool, user_id: Uuid, base_id: Uuid) -> AppResult<DbKnowledgeBase> {
    sqlx::query_as::<_, DbKnowledgeBase>(
        "SELECT id, user_id, name, description, created_at, updated_at, deleted_at FROM knowledge_bases WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(base_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Base de conhecimento não encontrada"))
}

async fn fetch_document(
    pool: &SqlitePool,
    user_id: Uuid,
    base_id: Uuid,
    document_id: Uuid,
) -> AppResult<DbDocument> {
    sqlx::query_as::<_, DbDocument>(
        "SELECT id, knowledge_base_id, user_id, title, content, created_at, updated_at, deleted_at FROM documents WHERE id = ? AND knowledge_base_id = ? AND user_id = ? AND deleted_at IS NULL",
    )
    .bind(document_id)
    .bind(base_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Documento não encontrado"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(title: &str, content: &str) -> DbDocument {
        DbDocument {
            id: Uuid::new_v4(),
            knowledge_base_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn no_overlap_yields_no_hit() {
        let d = doc("Reembolso", "Pedidos podem ser devolvidos em até 30 dias.");
        assert!(score_document("horário atendimento", &d).is_none());
    }

    #[test]
    fn full_phrase_outranks_partial_overlap() {
        let exact = doc("Planos", "O plano pro custa 99 reais por mês.");
        let partial = doc("Preços", "Temos um plano gratuito. Valores em reais.");

        let exact_score = score_document("plano pro", &exact).unwrap().score;
        let partial_score = score_document("plano pro", &partial).unwrap().score;
        assert!(exact_score > partial_score);
    }

    #[test]
    fn matching_is_case_insensitive_over_title_and_body() {
        let d = doc("Política de Reembolso", "Detalhes gerais.");
        let hit = score_document("reembolso", &d).unwrap();
        assert!(hit.score >= 1.0);
        assert!(!hit.snippet.is_empty());
    }
}
