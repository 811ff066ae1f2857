use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Nested under `/api/admin`. Every handler takes the `AdminUser` extractor,
/// which rejects with 401 before any read happens.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/admin/dashboard
        // Totals across the CMS plus the five latest contacts and orders.
        // Reads run concurrently and the response fails if any of them fails.
        .route("/dashboard", get(handlers::get_dashboard))
}
