use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use validator::Validate;

use crate::{
    AppState,
    auth::{self, AdminUser, RequestContext},
    engine::{self, ClientInfo},
    error::{ApiError, ApiResult},
    models::{
        DashboardSummary, LoginRequest, ReorderRequest, SessionResponse, SettingsMap, StatsMap,
        UserProfile,
    },
    operations::{self, Subscription},
    resources::{self, MENU_ITEMS, MENUS, QUIZ_RESULTS, SUBSCRIBERS},
    response::Envelope,
    schema::{Access, Record, ResourceSpec},
};

fn spec_for(resource: &str) -> ApiResult<&'static ResourceSpec> {
    resources::by_segment(resource).ok_or_else(|| ApiError::NotFound("Resource".to_string()))
}

// Public submissions only echo the new identifier back.
fn created(spec: &ResourceSpec, record: Record) -> Response {
    let message = format!("{} created", spec.label);
    match spec.access {
        Access::PublicSubmission => (
            StatusCode::CREATED,
            Json(Envelope::data(json!({ "id": record.id })).with_message(message)),
        )
            .into_response(),
        Access::Cms => (
            StatusCode::CREATED,
            Json(Envelope::data(record).with_message(message)),
        )
            .into_response(),
    }
}

// --- Generic collections ---

/// list_records
///
/// One page of a collection. Anonymous callers only ever see public records;
/// `admin=true` requires an admin session. `GET /api/quiz` answers with the
/// quiz analytics instead of a plain page.
#[utoipa::path(
    get,
    path = "/api/{resource}",
    params(
        ("resource" = String, Path, description = "Collection segment, e.g. `portfolio`"),
        ("page" = Option<i64>, Query, description = "1-based page"),
        ("limit" = Option<i64>, Query, description = "Page size, at most 100"),
        ("admin" = Option<bool>, Query, description = "Include non-public records (admin only)"),
    ),
    responses(
        (status = 200, description = "Records and pagination"),
        (status = 400, description = "Malformed query"),
        (status = 401, description = "Admin view without an admin session"),
        (status = 404, description = "Unknown collection"),
    )
)]
pub async fn list_records(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(resource): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    let spec = spec_for(&resource)?;
    if spec == &QUIZ_RESULTS {
        ctx.require_admin()?;
        let analytics = operations::quiz_analytics(&state.repo, &params).await?;
        return Ok(Json(Envelope::data(analytics)).into_response());
    }

    let (records, pagination) = engine::list(&state.repo, &ctx, spec, &params).await?;
    Ok(Json(Envelope::data(records).with_pagination(pagination)).into_response())
}

/// get_record
///
/// A single record by its lookup key. Hidden records answer 404 to
/// non-admins. `GET /api/menus/{location}` returns the menu with its item tree.
#[utoipa::path(
    get,
    path = "/api/{resource}/{key}",
    params(
        ("resource" = String, Path, description = "Collection segment"),
        ("key" = String, Path, description = "Slug, unique key or id, depending on the collection"),
    ),
    responses(
        (status = 200, description = "The record"),
        (status = 401, description = "Admin-only collection"),
        (status = 404, description = "Absent or not visible"),
    )
)]
pub async fn get_record(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((resource, key)): Path<(String, String)>,
) -> ApiResult<Response> {
    let spec = spec_for(&resource)?;
    if spec == &MENUS {
        let tree = operations::menu_tree(&state.repo, &ctx, &key).await?;
        return Ok(Json(Envelope::data(tree)).into_response());
    }

    let record = engine::get(&state.repo, &ctx, spec, &key).await?;
    Ok(Json(Envelope::data(record)).into_response())
}

/// create_record
///
/// Admins create CMS records; contact, newsletter and quiz submissions are
/// open to anyone. The gate runs before the body is read.
#[utoipa::path(
    post,
    path = "/api/{resource}",
    params(("resource" = String, Path, description = "Collection segment")),
    request_body(content = String, description = "JSON object of the collection's fields", content_type = "application/json"),
    responses(
        (status = 201, description = "Created"),
        (status = 200, description = "Newsletter subscription reactivated"),
        (status = 400, description = "Invalid data or duplicate unique value"),
        (status = 401, description = "Admin session required"),
    )
)]
pub async fn create_record(
    State(state): State<AppState>,
    ctx: RequestContext,
    client: ClientInfo,
    Path(resource): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let spec = spec_for(&resource)?;
    engine::ensure_may_create(&ctx, spec)?;
    let body = engine::parse_body(&body)?;

    if spec == &SUBSCRIBERS {
        return match operations::subscribe(&state.repo, &body, &client).await? {
            Subscription::Created(record) => Ok(created(spec, record)),
            Subscription::Reactivated(record) => Ok(Json(
                Envelope::data(json!({ "id": record.id })).with_message("Subscription reactivated"),
            )
            .into_response()),
        };
    }

    let record = engine::create(&state.repo, spec, &body, &client).await?;
    Ok(created(spec, record))
}

/// update_record
///
/// Partial update; omitted fields keep their value. Serves both PUT and PATCH.
#[utoipa::path(
    patch,
    path = "/api/{resource}/{key}",
    params(
        ("resource" = String, Path, description = "Collection segment"),
        ("key" = String, Path, description = "Slug, unique key or id"),
    ),
    request_body(content = String, description = "Subset of the collection's fields", content_type = "application/json"),
    responses(
        (status = 200, description = "Updated record"),
        (status = 400, description = "Invalid data, duplicate or disallowed transition"),
        (status = 401, description = "Admin session required"),
        (status = 404, description = "Absent"),
    )
)]
pub async fn update_record(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((resource, key)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Envelope<Record>>> {
    let spec = spec_for(&resource)?;
    ctx.require_admin()?;
    let body = engine::parse_body(&body)?;

    let record = engine::update(&state.repo, spec, &key, &body).await?;
    Ok(Json(
        Envelope::data(record).with_message(format!("{} updated", spec.label)),
    ))
}

/// delete_record
///
/// Immediate removal. Parents with children are refused.
#[utoipa::path(
    delete,
    path = "/api/{resource}/{key}",
    params(
        ("resource" = String, Path, description = "Collection segment"),
        ("key" = String, Path, description = "Slug, unique key or id"),
    ),
    responses(
        (status = 200, description = "Deleted"),
        (status = 400, description = "Dependent records still exist"),
        (status = 401, description = "Admin session required"),
        (status = 500, description = "Nothing to delete"),
    )
)]
pub async fn delete_record(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((resource, key)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<()>>> {
    let spec = spec_for(&resource)?;
    ctx.require_admin()?;

    engine::delete(&state.repo, spec, &key).await?;
    Ok(Json(Envelope::ok(format!("{} deleted", spec.label))))
}

/// reorder_records
///
/// Bulk `{id, displayOrder, parentId}` update of menu items. Entries are
/// applied independently; the call fails if any entry fails.
#[utoipa::path(
    put,
    path = "/api/{resource}",
    params(("resource" = String, Path, description = "Only `menu-items` supports reordering")),
    request_body(content = String, description = "`{items: [{id, displayOrder, parentId}]}`", content_type = "application/json"),
    responses(
        (status = 200, description = "All entries applied"),
        (status = 401, description = "Admin session required"),
        (status = 404, description = "Collection cannot be reordered"),
    )
)]
pub async fn reorder_records(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(resource): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Envelope<()>>> {
    let spec = spec_for(&resource)?;
    if spec != &MENU_ITEMS {
        return Err(ApiError::NotFound("Resource".to_string()));
    }
    ctx.require_admin()?;
    let body = engine::parse_body(&body)?;
    let request: ReorderRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::invalid("items", format!("Invalid reorder payload: {e}")))?;

    let applied = operations::reorder_menu_items(&state.repo, request.items).await?;
    Ok(Json(Envelope::ok(format!("{applied} menu items reordered"))))
}

// --- Key/value collections ---

/// get_settings
///
/// Settings keyed by name. Non-admins only receive public settings.
#[utoipa::path(
    get,
    path = "/api/settings",
    params(
        ("group" = Option<String>, Query, description = "Restrict to one group"),
        ("public" = Option<bool>, Query, description = "Only public settings, even for admins"),
    ),
    responses((status = 200, description = "Key-indexed settings"))
)]
pub async fn get_settings(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Envelope<SettingsMap>>> {
    let settings = operations::read_settings(&state.repo, &ctx, &params).await?;
    Ok(Json(Envelope::data(settings)))
}

/// put_settings
///
/// Batch upsert keyed by setting name. No transaction spans the batch.
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body(content = String, description = "`{key: {value, type, group, ...}}`", content_type = "application/json"),
    responses(
        (status = 200, description = "Every entry written"),
        (status = 400, description = "An entry is invalid; nothing written"),
        (status = 401, description = "Admin session required"),
    )
)]
pub async fn put_settings(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    body: Bytes,
) -> ApiResult<Json<Envelope<()>>> {
    let body = engine::parse_body(&body)?;
    let written = operations::write_settings(&state.repo, &body).await?;
    Ok(Json(Envelope::ok(format!("{written} settings updated"))))
}

/// get_stats
///
/// Public site counters, defaults filled in.
#[utoipa::path(
    get,
    path = "/api/stats",
    responses((status = 200, description = "Key-indexed counters"))
)]
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<Envelope<StatsMap>>> {
    let stats = operations::read_stats(&state.repo).await?;
    Ok(Json(Envelope::data(stats)))
}

/// patch_stats
#[utoipa::path(
    patch,
    path = "/api/stats",
    request_body(content = String, description = "`{key: integer}`", content_type = "application/json"),
    responses(
        (status = 200, description = "Counters written"),
        (status = 400, description = "A value is not an integer"),
        (status = 401, description = "Admin session required"),
    )
)]
pub async fn patch_stats(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    body: Bytes,
) -> ApiResult<Json<Envelope<()>>> {
    let body = engine::parse_body(&body)?;
    let written = operations::write_stats(&state.repo, &body).await?;
    Ok(Json(Envelope::ok(format!("{written} stats updated"))))
}

/// unsubscribe
#[utoipa::path(
    post,
    path = "/api/newsletter/unsubscribe",
    request_body(content = String, description = "`{email}`", content_type = "application/json"),
    responses(
        (status = 200, description = "Unsubscribed"),
        (status = 404, description = "Unknown address"),
    )
)]
pub async fn unsubscribe(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Envelope<()>>> {
    let body = engine::parse_body(&body)?;
    operations::unsubscribe(&state.repo, &body).await?;
    Ok(Json(Envelope::ok("Successfully unsubscribed")))
}

/// get_dashboard
///
/// Admin overview. Any failing read fails the whole response.
#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Summary", body = DashboardSummary),
        (status = 401, description = "Admin session required"),
    )
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<Envelope<DashboardSummary>>> {
    let summary = operations::dashboard(&state.repo).await?;
    Ok(Json(Envelope::data(summary)))
}

// --- Accounts ---

/// login
///
/// Verifies credentials, then sets the session cookie and returns the same
/// token in the body.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "Malformed credentials"),
        (status = 401, description = "Invalid credentials"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<(CookieJar, Json<Envelope<SessionResponse>>)> {
    let body = engine::parse_body(&body)?;
    let request: LoginRequest = serde_json::from_value(body)
        .map_err(|_| ApiError::invalid("body", "email and password are required"))?;
    request.validate()?;

    let (token, user) = operations::login(&state.repo, &state.config, &request).await?;
    let jar = jar.add(auth::session_cookie(token.clone()));
    let session = SessionResponse {
        token,
        user: UserProfile::from(&user),
    };
    Ok((jar, Json(Envelope::data(session).with_message("Logged in"))))
}

/// logout
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Session cookie cleared"))
)]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Envelope<()>>) {
    (jar.remove(auth::cleared_cookie()), Json(Envelope::ok("Logged out")))
}

/// me
///
/// The account behind the current session.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current account", body = UserProfile),
        (status = 401, description = "No session"),
    )
)]
pub async fn me(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Json<Envelope<UserProfile>>> {
    let identity = ctx.identity.ok_or(ApiError::Unauthorized)?;
    let user = state
        .repo
        .get_user(identity.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(Envelope::data(UserProfile::from(&user))))
}

/// init_admin
///
/// Creates the configured admin account on demand.
#[utoipa::path(
    post,
    path = "/api/auth/init",
    responses(
        (status = 201, description = "Admin created", body = UserProfile),
        (status = 400, description = "Admin already exists"),
    )
)]
pub async fn init_admin(State(state): State<AppState>) -> ApiResult<Response> {
    match operations::ensure_admin(&state.repo, &state.config).await? {
        Some(user) => Ok((
            StatusCode::CREATED,
            Json(Envelope::data(UserProfile::from(&user)).with_message("Admin user created")),
        )
            .into_response()),
        None => Err(ApiError::Conflict("Admin user already exists".to_string())),
    }
}
