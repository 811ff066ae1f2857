use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Ambient concerns.
pub mod config;
pub mod error;
pub mod response;

// Content model: declarative collection schemas and their validation.
pub mod resources;
pub mod schema;
pub mod validation;

// Data access.
pub mod memory;
pub mod repository;

// Behaviour.
pub mod auth;
pub mod engine;
pub mod models;
pub mod operations;

// HTTP surface.
pub mod handlers;
pub mod routes;
use routes::{admin, collections, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use memory::MemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json`. Collection payloads
/// are schema-driven at runtime, so only the fixed wire types are listed as
/// components.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_records, handlers::get_record, handlers::create_record,
        handlers::update_record, handlers::delete_record, handlers::reorder_records,
        handlers::get_settings, handlers::put_settings, handlers::get_stats,
        handlers::patch_stats, handlers::unsubscribe, handlers::get_dashboard,
        handlers::login, handlers::logout, handlers::me, handlers::init_admin,
    ),
    components(
        schemas(
            error::FieldError, response::Pagination, models::UserProfile,
            models::LoginRequest, models::SessionResponse, models::SettingEntry,
            models::QuizTotals, models::DashboardSummary, models::ContactTally,
            models::PublishedTally, models::SubscriberTally, models::OrderTally,
            models::RecentContact, models::RecentOrder,
        )
    ),
    tags(
        (name = "lumina", description = "Lumina agency CMS content API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state: the store handle and the immutable configuration.
/// Handlers and extractors pull what they need through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route, the documentation and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(collections::collection_routes())
        .nest("/api/admin", admin::admin_routes())
        .with_state(state);

    // Request id first so the trace span can carry it; propagated back on
    // the response.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `http_request` span for `TraceLayer`, tagging every log line of
/// a request with its method, URI and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
