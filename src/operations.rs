//! Operations outside the uniform CRUD contract: key/value batches, the
//! newsletter lifecycle, quiz analytics, menu trees and reordering, the
//! dashboard and account bootstrap.

use std::collections::HashMap;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    auth::{self, RequestContext},
    config::AppConfig,
    engine::{self, ClientInfo},
    error::{ApiError, ApiResult, FieldError},
    models::{
        ADMIN_ROLE, ContactTally, DashboardSummary, LoginRequest, MenuNode, MenuTree, NewUser,
        OrderTally, PublishedTally, QuizAnalytics, QuizTotals, RecentContact, RecentOrder,
        ReorderItem, SettingEntry, SettingsMap, StatsMap, SubscriberTally, User,
    },
    repository::RepositoryState,
    resources::{
        BLOG, CONTACTS, MENU_ITEMS, MENUS, ORDERS, PROJECTS, QUIZ_RESULTS, SERVICES, SETTINGS,
        STATS, SUBSCRIBERS, TESTIMONIALS,
    },
    schema::{Condition, Document, FieldValue, ListQuery, Record, ResourceSpec},
    validation::{self, Mode},
};

/// Upper bound for reads that return a whole (small) collection.
const WHOLE_COLLECTION: i64 = 10_000;

/// Counters shown on the public site until an admin sets them.
pub const DEFAULT_STATS: &[(&str, i64)] = &[
    ("projects_completed", 50),
    ("happy_clients", 30),
    ("satisfaction_rate", 98),
    ("years_experience", 5),
];

const QUIZ_WINDOW: i64 = 100;
const RECENT: i64 = 5;

fn everything(conditions: Vec<Condition>) -> ListQuery {
    ListQuery {
        conditions,
        offset: 0,
        limit: WHOLE_COLLECTION,
    }
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

/// Runs independent writes concurrently. Every write is attempted; the
/// first failure (in input order) is returned once all have finished.
async fn all_or_first_error<F>(writes: Vec<F>) -> ApiResult<usize>
where
    F: Future<Output = ApiResult<Record>>,
{
    let results = join_all(writes).await;
    let total = results.len();
    let mut first_error = None;
    for result in results {
        if let Err(e) = result {
            tracing::warn!(error = %e, "batch entry failed");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(total),
    }
}

fn expect_object(body: &Value) -> ApiResult<&Map<String, Value>> {
    body.as_object()
        .ok_or_else(|| ApiError::invalid("body", "Expected a JSON object"))
}

// --- Settings ---

/// Settings keyed by `key`, optionally narrowed to one group. Anonymous
/// callers (or anyone passing `public=true`) only receive public settings.
pub async fn read_settings(
    repo: &RepositoryState,
    ctx: &RequestContext,
    params: &HashMap<String, String>,
) -> ApiResult<SettingsMap> {
    let mut conditions = Vec::new();
    if let Some(group) = params.get("group").filter(|g| !g.is_empty()) {
        conditions.push(Condition::eq("group", text(group)));
    }
    if !ctx.is_admin() || params.get("public").map(String::as_str) == Some("true") {
        conditions.push(Condition::eq("isPublic", FieldValue::Flag(true)));
    }

    let records = repo.list(&SETTINGS, &everything(conditions)).await?;
    Ok(records
        .iter()
        .filter_map(|r| Some((r.get("key").as_text()?.to_string(), SettingEntry::from(r))))
        .collect())
}

// Scalars are stored as text; the admin UI may send booleans and numbers.
fn stringify_scalars(entry: &mut Map<String, Value>) {
    for name in ["value", "valueAr"] {
        if let Some(value) = entry.get_mut(name) {
            if value.is_number() || value.is_boolean() {
                *value = Value::String(value.to_string());
            }
        }
    }
}

/// Upserts every `key → setting` pair of the body. All entries are validated
/// first; the writes are then applied independently, without a transaction.
pub async fn write_settings(repo: &RepositoryState, body: &Value) -> ApiResult<usize> {
    let entries = expect_object(body)?;

    let mut documents = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for (key, entry) in entries {
        let Some(entry) = entry.as_object() else {
            errors.push(FieldError::new(key.as_str(), "Expected a setting object"));
            continue;
        };
        let mut entry = entry.clone();
        stringify_scalars(&mut entry);
        entry.insert("key".to_string(), Value::String(key.clone()));

        match validation::validate(&SETTINGS, &Value::Object(entry), Mode::Create) {
            Ok(doc) => documents.push(doc),
            Err(field_errors) => errors.extend(
                field_errors
                    .into_iter()
                    .map(|e| FieldError::new(format!("{key}.{}", e.field), e.message)),
            ),
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let writes = documents
        .into_iter()
        .map(|doc| async move { Ok::<_, ApiError>(repo.upsert(&SETTINGS, "key", doc).await?) })
        .collect();
    all_or_first_error(writes).await
}

// --- Stats ---

/// Stored counters merged over [`DEFAULT_STATS`].
pub async fn read_stats(repo: &RepositoryState) -> ApiResult<StatsMap> {
    let records = repo.list(&STATS, &everything(Vec::new())).await?;
    Ok(merge_stats(&records))
}

fn merge_stats(records: &[Record]) -> StatsMap {
    let mut stats: StatsMap = DEFAULT_STATS
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect();
    stats.extend(stored_stats(records));
    stats
}

fn stored_stats(records: &[Record]) -> StatsMap {
    records
        .iter()
        .filter_map(|r| match (r.get("key"), r.get("value")) {
            (FieldValue::Text(key), FieldValue::Integer(value)) => Some((key.clone(), *value)),
            _ => None,
        })
        .collect()
}

/// Upserts `{key: integer}` pairs independently.
pub async fn write_stats(repo: &RepositoryState, body: &Value) -> ApiResult<usize> {
    let entries = expect_object(body)?;

    let mut errors = Vec::new();
    let mut documents = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let entry = serde_json::json!({ "key": key, "value": value });
        match validation::validate(&STATS, &entry, Mode::Create) {
            Ok(doc) => documents.push(doc),
            Err(_) => errors.push(FieldError::new(key.as_str(), format!("{key} must be an integer"))),
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let writes = documents
        .into_iter()
        .map(|doc| async move { Ok::<_, ApiError>(repo.upsert(&STATS, "key", doc).await?) })
        .collect();
    all_or_first_error(writes).await
}

// --- Newsletter ---

#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    Created(Record),
    Reactivated(Record),
}

fn normalized_email(body: &Value) -> ApiResult<Value> {
    let mut body = expect_object(body)?.clone();
    if let Some(Value::String(email)) = body.get_mut("email") {
        *email = email.trim().to_lowercase();
    }
    Ok(Value::Object(body))
}

/// Subscribes an address. An unsubscribed address is reactivated; an active
/// one is a conflict.
pub async fn subscribe(
    repo: &RepositoryState,
    body: &Value,
    client: &ClientInfo,
) -> ApiResult<Subscription> {
    let body = normalized_email(body)?;
    let document = validation::validate(&SUBSCRIBERS, &body, Mode::Create).map_err(ApiError::Validation)?;
    let email = document.get("email").cloned().unwrap_or(FieldValue::Null);

    match repo.find(&SUBSCRIBERS, "email", &email).await? {
        Some(existing) if existing.get("isActive").as_flag() == Some(true) => {
            Err(ApiError::Conflict("This email is already subscribed".to_string()))
        }
        Some(existing) => {
            let mut changes = Document::new();
            changes.insert("isActive", FieldValue::Flag(true));
            changes.insert("unsubscribedAt", FieldValue::Null);
            let record = repo.update(&SUBSCRIBERS, existing.id, changes).await?;
            tracing::info!(id = %record.id, "subscription reactivated");
            Ok(Subscription::Reactivated(record))
        }
        None => Ok(Subscription::Created(
            engine::create(repo, &SUBSCRIBERS, &body, client).await?,
        )),
    }
}

/// Marks a subscriber inactive and stamps the time. Repeating it is harmless.
pub async fn unsubscribe(repo: &RepositoryState, body: &Value) -> ApiResult<Record> {
    let body = normalized_email(body)?;
    let email = body
        .get("email")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::invalid("email", "email is required"))?;

    let existing = repo
        .find(&SUBSCRIBERS, "email", &text(email))
        .await?
        .ok_or_else(|| ApiError::NotFound(SUBSCRIBERS.label.to_string()))?;
    if existing.get("isActive").as_flag() == Some(false) {
        return Ok(existing);
    }

    let mut changes = Document::new();
    changes.insert("isActive", FieldValue::Flag(false));
    changes.insert("unsubscribedAt", FieldValue::Timestamp(Utc::now()));
    Ok(repo.update(&SUBSCRIBERS, existing.id, changes).await?)
}

// --- Quiz ---

/// Latest results plus attempt count and mean score, optionally for one quiz type.
pub async fn quiz_analytics(
    repo: &RepositoryState,
    params: &HashMap<String, String>,
) -> ApiResult<QuizAnalytics> {
    let mut conditions = Vec::new();
    if let Some(kind) = params.get("type").filter(|t| !t.is_empty()) {
        conditions.push(Condition::eq("quizType", text(kind)));
    }
    let window = ListQuery {
        conditions: conditions.clone(),
        offset: 0,
        limit: QUIZ_WINDOW,
    };

    let (results, total_attempts, average) = tokio::try_join!(
        repo.list(&QUIZ_RESULTS, &window),
        repo.count(&QUIZ_RESULTS, &conditions),
        repo.average(&QUIZ_RESULTS, "score", &conditions),
    )?;

    Ok(QuizAnalytics {
        results,
        analytics: QuizTotals {
            total_attempts,
            average_score: average.unwrap_or(0.0),
        },
    })
}

// --- Menus ---

/// A menu with its active items nested under their parents. Items whose
/// parent is hidden are left out along with it.
pub async fn menu_tree(
    repo: &RepositoryState,
    ctx: &RequestContext,
    key: &str,
) -> ApiResult<MenuTree> {
    let menu = engine::get(repo, ctx, &MENUS, key).await?;
    let items = repo
        .list(
            &MENU_ITEMS,
            &everything(vec![
                Condition::eq("menuId", FieldValue::Reference(menu.id)),
                Condition::eq("isActive", FieldValue::Flag(true)),
            ]),
        )
        .await?;
    Ok(MenuTree {
        menu,
        items: nest(&items, None),
    })
}

fn nest(items: &[Record], parent: Option<Uuid>) -> Vec<MenuNode> {
    items
        .iter()
        .filter(|item| item.get("parentId").as_reference() == parent)
        .map(|item| MenuNode {
            item: item.clone(),
            children: nest(items, Some(item.id)),
        })
        .collect()
}

/// Applies `{id, displayOrder, parentId}` entries independently. Succeeds only
/// when every entry does; earlier entries are not rolled back.
pub async fn reorder_menu_items(repo: &RepositoryState, items: Vec<ReorderItem>) -> ApiResult<usize> {
    let writes = items
        .into_iter()
        .map(|item| async move {
            let changes: Map<String, Value> = item
                .changes
                .into_iter()
                .filter(|(name, _)| name == "displayOrder" || name == "parentId")
                .collect();
            engine::update(repo, &MENU_ITEMS, &item.id.to_string(), &Value::Object(changes)).await
        })
        .collect();
    all_or_first_error(writes).await
}

// --- Dashboard ---

async fn tally(
    repo: &RepositoryState,
    spec: &'static ResourceSpec,
    field: &'static str,
    value: FieldValue,
) -> ApiResult<i64> {
    Ok(repo.count(spec, &[Condition::eq(field, value)]).await?)
}

async fn total(repo: &RepositoryState, spec: &'static ResourceSpec) -> ApiResult<i64> {
    Ok(repo.count(spec, &[]).await?)
}

async fn latest(repo: &RepositoryState, spec: &'static ResourceSpec) -> ApiResult<Vec<Record>> {
    let query = ListQuery {
        conditions: Vec::new(),
        offset: 0,
        limit: RECENT,
    };
    Ok(repo.list(spec, &query).await?)
}

/// dashboard
///
/// Fans out every read concurrently and fails as a whole if any read fails.
pub async fn dashboard(repo: &RepositoryState) -> ApiResult<DashboardSummary> {
    let (
        contacts_total,
        contacts_new,
        projects_total,
        projects_published,
        services_active,
        blog_total,
        blog_published,
        testimonials_approved,
        subscribers_total,
        subscribers_active,
        orders_total,
        orders_pending,
        recent_contacts,
        recent_orders,
        stats,
    ) = tokio::try_join!(
        total(repo, &CONTACTS),
        tally(repo, &CONTACTS, "status", text("new")),
        total(repo, &PROJECTS),
        tally(repo, &PROJECTS, "status", text("published")),
        tally(repo, &SERVICES, "isActive", FieldValue::Flag(true)),
        total(repo, &BLOG),
        tally(repo, &BLOG, "status", text("published")),
        tally(repo, &TESTIMONIALS, "approved", FieldValue::Flag(true)),
        total(repo, &SUBSCRIBERS),
        tally(repo, &SUBSCRIBERS, "isActive", FieldValue::Flag(true)),
        total(repo, &ORDERS),
        tally(repo, &ORDERS, "status", text("pending")),
        latest(repo, &CONTACTS),
        latest(repo, &ORDERS),
        async { Ok::<_, ApiError>(repo.list(&STATS, &everything(Vec::new())).await?) },
    )?;

    Ok(DashboardSummary {
        contacts: ContactTally {
            total: contacts_total,
            new: contacts_new,
        },
        projects: PublishedTally {
            total: projects_total,
            published: projects_published,
        },
        services: services_active,
        blog: PublishedTally {
            total: blog_total,
            published: blog_published,
        },
        testimonials: testimonials_approved,
        subscribers: SubscriberTally {
            total: subscribers_total,
            active: subscribers_active,
        },
        orders: OrderTally {
            total: orders_total,
            pending: orders_pending,
        },
        site_stats: stored_stats(&stats),
        recent_contacts: recent_contacts.iter().map(RecentContact::from).collect(),
        recent_orders: recent_orders.iter().map(RecentOrder::from).collect(),
    })
}

// --- Accounts ---

/// Checks credentials and signs a session. Unknown accounts, inactive
/// accounts and wrong passwords all answer 401.
pub async fn login(
    repo: &RepositoryState,
    config: &AppConfig,
    request: &LoginRequest,
) -> ApiResult<(String, User)> {
    let user = repo
        .find_user_by_email(&request.email.trim().to_lowercase())
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::Unauthorized)?;

    let valid = auth::verify_password(&request.password, &user.password_hash)
        .map_err(|e| ApiError::Unexpected(format!("stored password hash unreadable: {e}")))?;
    if !valid {
        tracing::info!(user = %user.id, "rejected login");
        return Err(ApiError::Unauthorized);
    }

    let token = auth::issue_token(&user, &config.session_secret)
        .map_err(|e| ApiError::Unexpected(format!("token signing failed: {e}")))?;
    tracing::info!(user = %user.id, "session issued");
    Ok((token, user))
}

/// Creates the configured admin account unless it exists. Returns the new
/// account, or `None` when there was nothing to do.
pub async fn ensure_admin(repo: &RepositoryState, config: &AppConfig) -> ApiResult<Option<User>> {
    let email = config.admin_email.trim().to_lowercase();
    if repo.find_user_by_email(&email).await?.is_some() {
        return Ok(None);
    }

    let password_hash = auth::hash_password(&config.admin_password)
        .map_err(|e| ApiError::Unexpected(format!("password hashing failed: {e}")))?;
    let user = repo
        .create_user(NewUser {
            email,
            name: Some("Admin".to_string()),
            password_hash,
            role: ADMIN_ROLE.to_string(),
        })
        .await?;
    tracing::info!(user = %user.id, "admin account created");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn stored_stats_override_defaults() {
        let record = Record {
            id: Uuid::new_v4(),
            fields: [("key", text("happy_clients")), ("value", FieldValue::Integer(42))]
                .into_iter()
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let stats = merge_stats(&[record]);
        assert_eq!(stats["happy_clients"], 42);
        assert_eq!(stats["projects_completed"], 50);
        assert_eq!(stats.len(), 4);
    }

    #[tokio::test]
    async fn settings_batch_reports_entry_errors_with_key() {
        let repo: RepositoryState = Arc::new(MemoryRepository::new());
        let body = json!({ "site_name": { "value": "Lumina" }, "theme": { "type": "colour" } });
        let err = write_settings(&repo, &body).await.unwrap_err();
        match err {
            ApiError::Validation(errors) => assert_eq!(errors[0].field, "theme.type"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(repo.count(&SETTINGS, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ensure_admin_runs_once() {
        let repo: RepositoryState = Arc::new(MemoryRepository::new());
        let config = AppConfig::default();
        assert!(ensure_admin(&repo, &config).await.unwrap().is_some());
        assert!(ensure_admin(&repo, &config).await.unwrap().is_none());

        let request = LoginRequest {
            email: config.admin_email.clone(),
            password: config.admin_password.clone(),
        };
        let (_, user) = login(&repo, &config, &request).await.unwrap();
        assert_eq!(user.role, ADMIN_ROLE);

        let wrong = LoginRequest {
            email: config.admin_email.clone(),
            password: "nope".into(),
        };
        assert!(matches!(login(&repo, &config, &wrong).await, Err(ApiError::Unauthorized)));
    }
}
