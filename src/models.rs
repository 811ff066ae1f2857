use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::schema::{FieldValue, Record};

// --- Accounts ---

/// User
///
/// An account able to sign in to the CMS, stored in the `users` table.
/// The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    // 'admin' or 'editor'. Only admins may write.
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create an account; identity and timestamp are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: String,
}

pub const ADMIN_ROLE: &str = "admin";

/// UserProfile
///
/// Public view of an account, returned by login and `/api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// SessionResponse
///
/// Issued on successful login. The same token is also set as the session
/// cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserProfile,
}

// --- Batch payloads ---

/// One entry of a menu reorder. Only `displayOrder` and `parentId` are
/// applied; anything else in the object is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub changes: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

// --- Read models ---

/// SettingEntry
///
/// A setting as exposed by `GET /api/settings`, keyed by its `key`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SettingEntry {
    pub value: Option<String>,
    pub value_ar: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub group: String,
    pub label: Option<String>,
    pub label_ar: Option<String>,
    pub is_public: bool,
}

impl From<&Record> for SettingEntry {
    fn from(record: &Record) -> Self {
        Self {
            value: text(record, "value"),
            value_ar: text(record, "valueAr"),
            kind: text(record, "type").unwrap_or_else(|| "string".to_string()),
            group: text(record, "group").unwrap_or_else(|| "general".to_string()),
            label: text(record, "label"),
            label_ar: text(record, "labelAr"),
            is_public: record.get("isPublic").as_flag().unwrap_or(false),
        }
    }
}

pub type SettingsMap = BTreeMap<String, SettingEntry>;
pub type StatsMap = BTreeMap<String, i64>;

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuizTotals {
    pub total_attempts: i64,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizAnalytics {
    pub results: Vec<Record>,
    pub analytics: QuizTotals,
}

/// A menu item with its nested children.
#[derive(Debug, Clone, Serialize)]
pub struct MenuNode {
    #[serde(flatten)]
    pub item: Record,
    pub children: Vec<MenuNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: Record,
    pub items: Vec<MenuNode>,
}

// --- Dashboard ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct ContactTally {
    pub total: i64,
    pub new: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct PublishedTally {
    pub total: i64,
    pub published: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct SubscriberTally {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct OrderTally {
    pub total: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecentContact {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub project_type: Option<String>,
    pub status: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Record> for RecentContact {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            name: text(record, "name"),
            email: text(record, "email"),
            project_type: text(record, "projectType"),
            status: text(record, "status"),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: Uuid,
    pub order_number: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&Record> for RecentOrder {
    fn from(record: &Record) -> Self {
        let amount = match record.get("amount") {
            FieldValue::Decimal(n) => Some(*n),
            _ => None,
        };
        Self {
            id: record.id,
            order_number: text(record, "orderNumber"),
            amount,
            currency: text(record, "currency"),
            status: text(record, "status"),
            payment_status: text(record, "paymentStatus"),
            created_at: record.created_at,
        }
    }
}

/// DashboardSummary
///
/// Totals across the CMS collections plus the latest contacts and orders.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub contacts: ContactTally,
    pub projects: PublishedTally,
    /// Active services.
    pub services: i64,
    pub blog: PublishedTally,
    /// Approved testimonials.
    pub testimonials: i64,
    pub subscribers: SubscriberTally,
    pub orders: OrderTally,
    pub site_stats: StatsMap,
    pub recent_contacts: Vec<RecentContact>,
    pub recent_orders: Vec<RecentOrder>,
}

fn text(record: &Record, field: &str) -> Option<String> {
    record.get(field).as_text().map(str::to_string)
}
