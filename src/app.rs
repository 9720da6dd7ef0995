use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::{self, EventBus};
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{account, admin, agents, analytics, auth, conversations, health, knowledge};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub audit: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, audit: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            audit,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (bus, rx) = audit::init_event_bus();
    tokio::spawn(audit::start_audit_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/permissions", get(auth::permissions))
        .route("/logout", post(auth::logout));

    let agent_routes = Router::new()
        .route("/", get(agents::list_agents))
        .route("/", post(agents::create_agent))
        .route("/:id", get(agents::get_agent))
        .route("/:id", put(agents::update_agent))
        .route("/:id", delete(agents::delete_agent))
        .route("/:agent_id/conversations", get(conversations::list_conversations))
        .route("/:agent_id/conversations", post(conversations::create_conversation));

    let conversation_routes = Router::new()
        .route("/:id", get(conversations::get_conversation))
        .route("/:id", delete(conversations::delete_conversation));

    let knowledge_routes = Router::new()
        .route("/", get(knowledge::list_bases))
        .route("/", post(knowledge::create_base))
        .route("/:id", get(knowledge::get_base))
        .route("/:id", delete(knowledge::delete_base))
        .route("/:id/documents", get(knowledge::list_documents))
        .route("/:id/documents", post(knowledge::create_document))
        .route("/:id/documents/:doc_id", delete(knowledge::delete_document))
        .route("/:id/search", get(knowledge::search));

    let analytics_routes = Router::new()
        .route("/overview", get(analytics::overview))
        .route("/export", get(analytics::export));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/:id/role", put(admin::update_user_role));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/agents", agent_routes)
        .nest("/conversations", conversation_routes)
        .nest("/knowledge", knowledge_routes)
        .nest("/analytics", analytics_routes)
        .nest("/admin", admin_routes)
        .route("/settings", get(account::get_settings))
        .route("/settings", put(account::update_settings))
        .route("/billing", get(account::get_billing))
        .route("/billing/plan", put(account::update_plan))
        .route("/integrations", get(account::list_integrations))
        .route("/integrations/:provider", put(account::upsert_integration))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
