use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any client may call. Login, logout and init manage the session
/// cookie; `/api/auth/me` answers 401 without a valid session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        // POST /api/auth/init
        // Creates the configured admin account; 400 once it exists.
        .route("/api/auth/init", post(handlers::init_admin))
        // POST /api/newsletter/unsubscribe
        // Deactivates a subscriber by email. Takes precedence over the
        // generic `/api/{resource}/{key}` route.
        .route("/api/newsletter/unsubscribe", post(handlers::unsubscribe))
}
