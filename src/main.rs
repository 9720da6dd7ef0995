use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use agentes_api::{app, db};

#[derive(OpenApi)]
#[openapi(
    paths(
        agentes_api::routes::auth::register,
        agentes_api::routes::auth::login,
        agentes_api::routes::auth::me,
        agentes_api::routes::auth::permissions,
        agentes_api::routes::auth::logout,
        agentes_api::routes::agents::list_agents,
        agentes_api::routes::agents::create_agent,
        agentes_api::routes::agents::get_agent,
        agentes_api::routes::agents::update_agent,
        agentes_api::routes::agents::delete_agent,
        agentes_api::routes::conversations::list_conversations,
        agentes_api::routes::conversations::create_conversation,
        agentes_api::routes::conversations::get_conversation,
        agentes_api::routes::conversations::delete_conversation,
        agentes_api::routes::knowledge::list_bases,
        agentes_api::routes::knowledge::create_base,
        agentes_api::routes::knowledge::get_base,
        agentes_api::routes::knowledge::delete_base,
        agentes_api::routes::knowledge::list_documents,
        agentes_api::routes::knowledge::create_document,
        agentes_api::routes::knowledge::delete_document,
        agentes_api::routes::knowledge::search,
        agentes_api::routes::analytics::overview,
        agentes_api::routes::analytics::export,
        agentes_api::routes::admin::list_users,
        agentes_api::routes::admin::update_user_role,
        agentes_api::routes::account::get_settings,
        agentes_api::routes::account::update_settings,
        agentes_api::routes::account::get_billing,
        agentes_api::routes::account::update_plan,
        agentes_api::routes::account::list_integrations,
        agentes_api::routes::account::upsert_integration,
        agentes_api::routes::health::health,
    ),
    components(schemas(
        agentes_api::authz::Role,
        agentes_api::authz::Permission,
        agentes_api::models::user::User,
        agentes_api::models::user::AuthResponse,
        agentes_api::models::user::LoginRequest,
        agentes_api::models::user::RegisterRequest,
        agentes_api::models::user::UpdateRoleRequest,
        agentes_api::models::agent::Agent,
        agentes_api::models::agent::AgentCreateRequest,
        agentes_api::models::agent::AgentUpdateRequest,
        agentes_api::models::conversation::Conversation,
        agentes_api::models::conversation::ConversationCreateRequest,
        agentes_api::models::knowledge::KnowledgeBase,
        agentes_api::models::knowledge::KnowledgeBaseCreateRequest,
        agentes_api::models::knowledge::Document,
        agentes_api::models::knowledge::DocumentCreateRequest,
        agentes_api::models::knowledge::SearchResult,
        agentes_api::models::account::UserSettings,
        agentes_api::models::account::SettingsUpdateRequest,
        agentes_api::models::account::BillingAccount,
        agentes_api::models::account::PlanUpdateRequest,
        agentes_api::models::account::Integration,
        agentes_api::models::account::IntegrationUpsertRequest,
        agentes_api::routes::auth::PermissionsResponse,
        agentes_api::routes::auth::MessageResponse,
        agentes_api::routes::analytics::OverviewResponse,
        agentes_api::routes::analytics::ExportResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Authentication and session"),
        (name = "Agents", description = "Conversational agent management"),
        (name = "Conversations", description = "Agent conversations"),
        (name = "Knowledge", description = "Knowledge bases and document search"),
        (name = "Analytics", description = "Per-tenant metrics and export"),
        (name = "Admin", description = "User and role administration"),
        (name = "Account", description = "Settings, billing and integrations"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = db::init().await?;
    let app = app::create_app(pool).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
