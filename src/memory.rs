//! In-process `Repository` used by the test suites and for running the API
//! without a database.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{NewUser, User},
    repository::Repository,
    schema::{Condition, Document, FieldValue, ListQuery, Record, ResourceSpec},
};

#[derive(Default)]
struct State {
    tables: HashMap<&'static str, Vec<Record>>,
    users: Vec<User>,
    failing: HashSet<&'static str>,
    read_only: HashSet<&'static str>,
    clock: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing timestamps, so creation order is always observable.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn check(&self, table: &'static str) -> Result<(), StoreError> {
        if self.failing.contains(table) {
            return Err(StoreError::Unavailable(format!("{table} is offline")));
        }
        Ok(())
    }

    fn check_write(&self, table: &'static str) -> Result<(), StoreError> {
        self.check(table)?;
        if self.read_only.contains(table) {
            return Err(StoreError::Unavailable(format!("{table} is read-only")));
        }
        Ok(())
    }

    fn rows(&self, table: &'static str) -> &[Record] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rejects a write that would duplicate a unique field of another record.
    fn ensure_unique(
        &self,
        spec: &'static ResourceSpec,
        id: Option<Uuid>,
        fields: &Document,
    ) -> Result<(), StoreError> {
        for name in spec.unique {
            let Some(value) = fields.get(name).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .rows(spec.table)
                .iter()
                .any(|r| Some(r.id) != id && r.get(name) == value);
            if clash {
                return Err(StoreError::UniqueViolation {
                    table: spec.table,
                    constraint: format!("{}_{}_key", spec.table, name),
                });
            }
        }
        Ok(())
    }
}

/// MemoryRepository
///
/// Mirrors the Postgres store: same ordering rules, unique keys enforced,
/// `RowMissing` on absent rows. Individual tables can be taken offline with
/// [`MemoryRepository::fail_table`] to exercise error paths.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent operation on `table` fails with `Unavailable`.
    pub async fn fail_table(&self, table: &'static str) {
        self.state.write().await.failing.insert(table);
    }

    /// Reads of `table` keep working; every write fails with `Unavailable`.
    pub async fn fail_writes(&self, table: &'static str) {
        self.state.write().await.read_only.insert(table);
    }
}

fn matches_all(record: &Record, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| c.matches(record))
}

fn sorted(spec: &ResourceSpec, mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| {
        for sort in spec.order {
            let ordering = a.sort_key(sort.field).sort_cmp(&b.sort_key(sort.field));
            let ordering = if sort.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    });
    records
}

/// Fills undeclared fields with `Null` so records always carry every column.
fn complete(spec: &ResourceSpec, mut fields: Document) -> Document {
    for field in spec.fields {
        fields.entry(field.name).or_insert(FieldValue::Null);
    }
    fields
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list(
        &self,
        spec: &'static ResourceSpec,
        query: &ListQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().await;
        state.check(spec.table)?;
        let matching = state
            .rows(spec.table)
            .iter()
            .filter(|r| matches_all(r, &query.conditions))
            .cloned()
            .collect();
        Ok(sorted(spec, matching)
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn count(
        &self,
        spec: &'static ResourceSpec,
        conditions: &[Condition],
    ) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        state.check(spec.table)?;
        Ok(state
            .rows(spec.table)
            .iter()
            .filter(|r| matches_all(r, conditions))
            .count() as i64)
    }

    async fn find(
        &self,
        spec: &'static ResourceSpec,
        field: &'static str,
        value: &FieldValue,
    ) -> Result<Option<Record>, StoreError> {
        let state = self.state.read().await;
        state.check(spec.table)?;
        let condition = Condition::eq(field, value.clone());
        Ok(state
            .rows(spec.table)
            .iter()
            .find(|r| condition.matches(r))
            .cloned())
    }

    async fn insert(
        &self,
        spec: &'static ResourceSpec,
        document: Document,
    ) -> Result<Record, StoreError> {
        let mut state = self.state.write().await;
        state.check_write(spec.table)?;
        state.ensure_unique(spec, None, &document)?;
        let now = state.tick();
        let record = Record {
            id: Uuid::new_v4(),
            fields: complete(spec, document),
            created_at: now,
            updated_at: now,
        };
        state.tables.entry(spec.table).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        spec: &'static ResourceSpec,
        id: Uuid,
        changes: Document,
    ) -> Result<Record, StoreError> {
        let mut state = self.state.write().await;
        state.check_write(spec.table)?;
        state.ensure_unique(spec, Some(id), &changes)?;
        let now = state.tick();
        let record = state
            .tables
            .get_mut(spec.table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| StoreError::RowMissing {
                table: spec.table,
                id: id.to_string(),
            })?;
        record.fields.extend(changes);
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn delete(&self, spec: &'static ResourceSpec, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.check_write(spec.table)?;
        let rows = state.tables.entry(spec.table).or_default();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(StoreError::RowMissing {
                table: spec.table,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn increment(
        &self,
        spec: &'static ResourceSpec,
        id: Uuid,
        field: &'static str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.check_write(spec.table)?;
        if let Some(record) = state
            .tables
            .get_mut(spec.table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
        {
            let current = match record.get(field) {
                FieldValue::Integer(n) => *n,
                _ => 0,
            };
            record.fields.insert(field, FieldValue::Integer(current + 1));
        }
        Ok(())
    }

    async fn average(
        &self,
        spec: &'static ResourceSpec,
        field: &'static str,
        conditions: &[Condition],
    ) -> Result<Option<f64>, StoreError> {
        let state = self.state.read().await;
        state.check(spec.table)?;
        let values: Vec<f64> = state
            .rows(spec.table)
            .iter()
            .filter(|r| matches_all(r, conditions))
            .filter_map(|r| match r.get(field) {
                FieldValue::Integer(n) => Some(*n as f64),
                FieldValue::Decimal(n) => Some(*n),
                _ => None,
            })
            .collect();
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
    }

    async fn upsert(
        &self,
        spec: &'static ResourceSpec,
        key_field: &'static str,
        document: Document,
    ) -> Result<Record, StoreError> {
        let mut state = self.state.write().await;
        state.check_write(spec.table)?;
        let key = document.get(key_field).cloned().unwrap_or(FieldValue::Null);
        let now = state.tick();
        let rows = state.tables.entry(spec.table).or_default();

        if let Some(record) = rows.iter_mut().find(|r| *r.get(key_field) == key) {
            record.fields.extend(document);
            record.updated_at = now;
            return Ok(record.clone());
        }

        let record = Record {
            id: Uuid::new_v4(),
            fields: complete(spec, document),
            created_at: now,
            updated_at: now,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        state.check("users")?;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        state.check("users")?;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        state.check_write("users")?;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation {
                table: "users",
                constraint: "users_email_key".to_string(),
            });
        }
        let created_at = state.tick();
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            created_at,
        };
        state.users.push(user.clone());
        Ok(user)
    }
}
