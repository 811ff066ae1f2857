use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Collections Router Module
///
/// The generic CRUD surface. `{resource}` is resolved against the schema
/// registry in the handlers; unknown segments answer 404. Reads are public
/// (visibility rules apply), writes check for an admin session before the
/// body is parsed, except for the public submission collections.
///
/// Static segments (`settings`, `stats`) take precedence over `{resource}`.
pub fn collection_routes() -> Router<AppState> {
    Router::new()
        // GET|PUT /api/settings
        // Key-indexed settings; PUT upserts a batch without a transaction.
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        // GET|PATCH /api/stats
        .route(
            "/api/stats",
            get(handlers::get_stats)
                .patch(handlers::patch_stats)
                .put(handlers::patch_stats),
        )
        // GET /api/{resource}?page=&limit=&admin=&<filters>
        // POST /api/{resource}
        // PUT /api/menu-items (bulk reorder)
        .route(
            "/api/{resource}",
            get(handlers::list_records)
                .post(handlers::create_record)
                .put(handlers::reorder_records),
        )
        // GET|PUT|PATCH|DELETE /api/{resource}/{key}
        // `key` is a slug, unique key or id depending on the collection.
        .route(
            "/api/{resource}/{key}",
            get(handlers::get_record)
                .put(handlers::update_record)
                .patch(handlers::update_record)
                .delete(handlers::delete_record),
        )
}
