//! The generic CRUD engine.
//!
//! One implementation of list, get, create, update and delete, parameterised
//! by a [`ResourceSpec`]. The order of checks is fixed for every collection:
//! authorization first, then input validation, then reference, workflow and
//! uniqueness checks, and only then the write.

use std::{collections::HashMap, convert::Infallible};

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::RequestContext,
    error::{ApiError, ApiResult, FieldError, StoreError},
    repository::RepositoryState,
    response::Pagination,
    schema::{
        Access, Condition, Document, FieldKind, FieldValue, ID, ListQuery, Lookup, MAX_LIMIT,
        Record, ResourceSpec, Visibility,
    },
    validation::{self, Mode},
};

/// Longest ancestor chain walked when checking a new parent.
const MAX_DEPTH: usize = 64;

/// Origin metadata stamped on public submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| header("x-real-ip"))
            .unwrap_or("unknown")
            .to_string();
        let user_agent = header("user-agent").unwrap_or("unknown").to_string();
        Self {
            ip_address,
            user_agent,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Parse a request body after the caller has passed the gate.
pub fn parse_body(bytes: &[u8]) -> ApiResult<Value> {
    serde_json::from_slice(bytes).map_err(|_| ApiError::invalid("body", "Malformed JSON body"))
}

// --- Visibility ---

/// Whether an anonymous caller may see `record`.
pub fn is_public(spec: &ResourceSpec, record: &Record) -> bool {
    match spec.visibility {
        Visibility::Always => true,
        Visibility::Flag { field, .. } => record.get(field).as_flag() == Some(true),
        Visibility::Status { field, public } => record.get(field).as_text() == Some(public),
        Visibility::AdminOnly => false,
    }
}

fn public_condition(spec: &ResourceSpec) -> Option<Condition> {
    match spec.visibility {
        Visibility::Flag { field, .. } => Some(Condition::eq(field, FieldValue::Flag(true))),
        Visibility::Status { field, public } => {
            Some(Condition::eq(field, FieldValue::Text(public.to_string())))
        }
        Visibility::Always | Visibility::AdminOnly => None,
    }
}

/// The query parameter through which admins filter on the visibility field.
fn visibility_param(spec: &ResourceSpec) -> Option<(&'static str, &'static str)> {
    match spec.visibility {
        Visibility::Flag { field, param } => Some((param, field)),
        Visibility::Status { field, .. } => Some(("status", field)),
        Visibility::Always | Visibility::AdminOnly => None,
    }
}

// --- List ---

/// ListRequest
///
/// The parsed query string of a list call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub page: i64,
    pub limit: i64,
    pub admin_view: bool,
    pub conditions: Vec<Condition>,
}

fn parse_number(params: &HashMap<String, String>, name: &str) -> Result<Option<i64>, FieldError> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| FieldError::new(name, format!("{name} must be an integer"))),
    }
}

/// Interprets `page`, `limit`, `admin` and the collection's filters.
///
/// `page` below 1 is treated as 1 and `limit` is clamped to `1..=100`.
/// Without an admin view the visibility filter is forced to public, whatever
/// the caller asked for.
pub fn list_request(
    ctx: &RequestContext,
    spec: &ResourceSpec,
    params: &HashMap<String, String>,
) -> ApiResult<ListRequest> {
    let wants_admin = match params.get("admin").map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => false,
        Some(raw) => validation::parse_flag("admin", raw)
            .map_err(|message| ApiError::Validation(vec![FieldError::new("admin", message)]))?,
    };
    if wants_admin || spec.is_admin_only() {
        ctx.require_admin()?;
    }
    let admin_view = wants_admin || spec.is_admin_only();

    let mut errors = Vec::new();
    let page = parse_number(params, "page")
        .unwrap_or_else(|e| {
            errors.push(e);
            None
        })
        .unwrap_or(1)
        .max(1);
    let limit = parse_number(params, "limit")
        .unwrap_or_else(|e| {
            errors.push(e);
            None
        })
        .unwrap_or(spec.default_limit)
        .clamp(1, MAX_LIMIT);

    let mut conditions = Vec::new();
    let mut filter = |param: &str, field_name: &'static str| {
        let Some(raw) = params.get(param).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
            return;
        };
        let Some(field) = spec.field(field_name) else {
            return;
        };
        match validation::coerce_param(field, raw) {
            Ok(value) => conditions.push(Condition::eq(field_name, value)),
            Err(message) => errors.push(FieldError::new(param, message)),
        }
    };

    if admin_view {
        if let Some((param, field)) = visibility_param(spec) {
            filter(param, field);
        }
    }
    for f in spec.filters {
        filter(f.param, f.field);
    }
    if !admin_view {
        conditions.extend(public_condition(spec));
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    Ok(ListRequest {
        page,
        limit,
        admin_view,
        conditions,
    })
}

/// list
///
/// One page of a collection plus its pagination block. The count and the
/// window are read concurrently.
pub async fn list(
    repo: &RepositoryState,
    ctx: &RequestContext,
    spec: &'static ResourceSpec,
    params: &HashMap<String, String>,
) -> ApiResult<(Vec<Record>, Pagination)> {
    let request = list_request(ctx, spec, params)?;
    let pagination = Pagination::new(request.page, request.limit, 0);
    let query = ListQuery {
        conditions: request.conditions,
        offset: pagination.offset(),
        limit: request.limit,
    };

    let (total, records) = tokio::try_join!(
        repo.count(spec, &query.conditions),
        repo.list(spec, &query)
    )?;

    Ok((records, Pagination::new(request.page, request.limit, total)))
}

// --- Single records ---

/// Finds the record addressed by a path key, according to the collection's
/// lookup rule.
pub async fn resolve(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    key: &str,
) -> ApiResult<Option<Record>> {
    let by_id = Uuid::parse_str(key).ok();
    let found = match spec.lookup {
        Lookup::Id => match by_id {
            Some(id) => repo.find(spec, ID, &FieldValue::Reference(id)).await?,
            None => None,
        },
        Lookup::Key(field) => repo.find(spec, field, &FieldValue::Text(key.to_string())).await?,
        Lookup::KeyOrId(field) => {
            let mut found = None;
            if let Some(id) = by_id {
                found = repo.find(spec, ID, &FieldValue::Reference(id)).await?;
            }
            match found {
                Some(record) => Some(record),
                None => repo.find(spec, field, &FieldValue::Text(key.to_string())).await?,
            }
        }
    };
    Ok(found)
}

fn not_found(spec: &ResourceSpec) -> ApiError {
    ApiError::NotFound(spec.label.to_string())
}

/// get
///
/// A single record. Absent and hidden records are indistinguishable to
/// non-admins. Collections with a view counter are bumped in the background;
/// the returned record shows the count before this read.
pub async fn get(
    repo: &RepositoryState,
    ctx: &RequestContext,
    spec: &'static ResourceSpec,
    key: &str,
) -> ApiResult<Record> {
    if spec.is_admin_only() {
        ctx.require_admin()?;
    }

    let record = resolve(repo, spec, key).await?.ok_or_else(|| not_found(spec))?;
    if !ctx.is_admin() && !is_public(spec, &record) {
        return Err(not_found(spec));
    }

    if let Some(counter) = spec.view_counter {
        let repo = repo.clone();
        let id = record.id;
        tokio::spawn(async move {
            if let Err(e) = repo.increment(spec, id, counter).await {
                tracing::warn!(table = spec.table, %id, error = %e, "view count not recorded");
            }
        });
    }

    Ok(record)
}

// --- Writes ---

/// Every non-null reference in `document` must name an existing record.
/// For tree collections the new parent must also not be the record itself
/// or one of its descendants.
async fn check_references(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    document: &Document,
    own_id: Option<Uuid>,
) -> ApiResult<()> {
    let mut errors = Vec::new();

    for field in spec.fields {
        let FieldKind::Reference { target } = field.kind else {
            continue;
        };
        let Some(FieldValue::Reference(id)) = document.get(field.name) else {
            continue;
        };

        if spec.parent == Some(field.name) && Some(*id) == own_id {
            errors.push(FieldError::new(field.name, "A record cannot be its own parent"));
            continue;
        }

        let exists = repo.find(target, ID, &FieldValue::Reference(*id)).await?;
        if exists.is_none() {
            errors.push(FieldError::new(
                field.name,
                format!("{} does not reference an existing {}", field.name, target.label.to_lowercase()),
            ));
            continue;
        }

        if spec.parent == Some(field.name) {
            if let Some(own) = own_id {
                if creates_cycle(repo, spec, field.name, own, *id).await? {
                    errors.push(FieldError::new(
                        field.name,
                        "A record cannot be moved under one of its descendants",
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Walks up from `parent`; true when `own` is met on the way.
async fn creates_cycle(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    parent_field: &'static str,
    own: Uuid,
    parent: Uuid,
) -> ApiResult<bool> {
    let mut current = parent;
    for _ in 0..MAX_DEPTH {
        if current == own {
            return Ok(true);
        }
        let Some(record) = repo.find(spec, ID, &FieldValue::Reference(current)).await? else {
            return Ok(false);
        };
        match record.get(parent_field).as_reference() {
            Some(next) => current = next,
            None => return Ok(false),
        }
    }
    // A chain this deep is treated as corrupt rather than walked forever.
    Ok(true)
}

/// Unique fields in `document` must not collide with another record.
/// Check-then-write: a concurrent duplicate is caught by the store instead.
async fn check_unique(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    document: &Document,
    own_id: Option<Uuid>,
) -> ApiResult<()> {
    for &name in spec.unique {
        let Some(value) = document.get(name).filter(|v| !v.is_null()) else {
            continue;
        };
        if let Some(other) = repo.find(spec, name, value).await? {
            if Some(other.id) != own_id {
                return Err(ApiError::Conflict(format!(
                    "A {} with this {name} already exists",
                    spec.label.to_lowercase()
                )));
            }
        }
    }
    Ok(())
}

fn check_workflow(spec: &ResourceSpec, current: &Record, changes: &Document) -> ApiResult<()> {
    let Some(workflow) = spec.workflow else {
        return Ok(());
    };
    let Some(to) = changes.get(workflow.field).and_then(FieldValue::as_text) else {
        return Ok(());
    };
    let from = current.get(workflow.field).as_text().unwrap_or_default();
    if (workflow.allows)(from, to) {
        Ok(())
    } else {
        Err(ApiError::invalid(
            workflow.field,
            format!("{} cannot change from '{from}' to '{to}'", workflow.field),
        ))
    }
}

/// Gate for creation: CMS collections need an admin, submissions are open.
pub fn ensure_may_create(ctx: &RequestContext, spec: &ResourceSpec) -> ApiResult<()> {
    if spec.access == Access::Cms {
        ctx.require_admin()?;
    }
    Ok(())
}

/// create
///
/// Validates, checks references and uniqueness, stamps submission metadata
/// and inserts. The caller must have passed [`ensure_may_create`].
pub async fn create(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    body: &Value,
    client: &ClientInfo,
) -> ApiResult<Record> {
    let mut document = validation::validate(spec, body, Mode::Create).map_err(ApiError::Validation)?;
    check_references(repo, spec, &document, None).await?;
    check_unique(repo, spec, &document, None).await?;

    if spec.captures_client {
        document.insert("ipAddress", FieldValue::Text(client.ip_address.clone()));
        document.insert("userAgent", FieldValue::Text(client.user_agent.clone()));
    }

    let record = repo.insert(spec, document).await?;
    tracing::info!(table = spec.table, id = %record.id, "record created");
    Ok(record)
}

/// update
///
/// Partial update of an existing record. Omitted fields keep their value and
/// an empty body returns the record untouched. The caller must be admin.
pub async fn update(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    key: &str,
    body: &Value,
) -> ApiResult<Record> {
    let current = resolve(repo, spec, key).await?.ok_or_else(|| not_found(spec))?;
    let changes = validation::validate(spec, body, Mode::Partial).map_err(ApiError::Validation)?;
    if changes.is_empty() {
        return Ok(current);
    }

    check_workflow(spec, &current, &changes)?;
    check_references(repo, spec, &changes, Some(current.id)).await?;
    check_unique(repo, spec, &changes, Some(current.id)).await?;

    let record = repo.update(spec, current.id, changes).await?;
    tracing::info!(table = spec.table, id = %record.id, "record updated");
    Ok(record)
}

/// delete
///
/// Refuses while dependent records still point at the target. An absent
/// target surfaces as a storage error.
pub async fn delete(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    key: &str,
) -> ApiResult<()> {
    let id = match resolve(repo, spec, key).await? {
        Some(record) => record.id,
        None => match Uuid::parse_str(key) {
            Ok(id) => id,
            Err(_) => {
                return Err(StoreError::RowMissing {
                    table: spec.table,
                    id: key.to_string(),
                }
                .into());
            }
        },
    };

    for dependent in spec.dependents {
        let condition = Condition::eq(dependent.field, FieldValue::Reference(id));
        let count = repo.count(dependent.collection, &[condition]).await?;
        if count > 0 {
            return Err(ApiError::Conflict(format!(
                "Cannot delete this {}: {count} {} record(s) still reference it",
                spec.label.to_lowercase(),
                dependent.collection.label.to_lowercase()
            )));
        }
    }

    repo.delete(spec, id).await?;
    tracing::info!(table = spec.table, %id, "record deleted");
    Ok(())
}
