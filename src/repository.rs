use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{NewUser, User},
    schema::{
        Condition, Document, FieldKind, FieldValue, ListQuery, Record, ResourceSpec,
    },
};

/// Repository Trait
///
/// The data-access contract shared by every collection. Operations are keyed
/// by a static [`ResourceSpec`], which supplies the table, the columns and
/// their kinds; values always travel as typed [`FieldValue`]s.
///
/// Implementations must be `Send + Sync` so that `Arc<dyn Repository>` can be
/// shared by all request handlers.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Filtered, ordered window of a collection. Ordering follows `spec.order`
    /// with the identifier as the final tie-breaker.
    async fn list(
        &self,
        spec: &'static ResourceSpec,
        query: &ListQuery,
    ) -> Result<Vec<Record>, StoreError>;

    async fn count(
        &self,
        spec: &'static ResourceSpec,
        conditions: &[Condition],
    ) -> Result<i64, StoreError>;

    /// Single record whose `field` (a schema field or `id`) equals `value`.
    async fn find(
        &self,
        spec: &'static ResourceSpec,
        field: &'static str,
        value: &FieldValue,
    ) -> Result<Option<Record>, StoreError>;

    async fn insert(
        &self,
        spec: &'static ResourceSpec,
        document: Document,
    ) -> Result<Record, StoreError>;

    /// Applies only the supplied fields. `RowMissing` when `id` is absent.
    async fn update(
        &self,
        spec: &'static ResourceSpec,
        id: Uuid,
        changes: Document,
    ) -> Result<Record, StoreError>;

    /// `RowMissing` when `id` is absent.
    async fn delete(&self, spec: &'static ResourceSpec, id: Uuid) -> Result<(), StoreError>;

    /// Adds one to an integer column.
    async fn increment(
        &self,
        spec: &'static ResourceSpec,
        id: Uuid,
        field: &'static str,
    ) -> Result<(), StoreError>;

    /// Mean of a numeric column over the matching records; `None` when none match.
    async fn average(
        &self,
        spec: &'static ResourceSpec,
        field: &'static str,
        conditions: &[Condition],
    ) -> Result<Option<f64>, StoreError>;

    /// Insert, or overwrite the supplied fields of the record whose
    /// `key_field` matches.
    async fn upsert(
        &self,
        spec: &'static ResourceSpec,
        key_field: &'static str,
        document: Document,
    ) -> Result<Record, StoreError>;

    // --- Accounts ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Statements are assembled with
/// `QueryBuilder`: identifiers come only from the static schemas and every
/// value is bound.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))
    }
}

fn select_head(spec: &ResourceSpec) -> String {
    let mut columns = String::from("id, created_at, updated_at");
    for field in spec.fields {
        columns.push_str(", ");
        columns.push_str(field.column);
    }
    columns
}

fn column_of(spec: &ResourceSpec, field: &str) -> Result<&'static str, StoreError> {
    spec.column(field).ok_or_else(|| StoreError::Corrupt {
        table: spec.table,
        column: "?",
        reason: format!("unknown field {field}"),
    })
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, kind: Option<FieldKind>, value: &FieldValue) {
    match value {
        FieldValue::Null => push_null(builder, kind),
        FieldValue::Text(s) => {
            builder.push_bind(s.clone());
        }
        FieldValue::Integer(n) => {
            builder.push_bind(*n);
        }
        FieldValue::Decimal(n) => {
            builder.push_bind(*n);
        }
        FieldValue::Flag(b) => {
            builder.push_bind(*b);
        }
        FieldValue::List(items) => {
            builder.push_bind(items.clone());
        }
        FieldValue::Timestamp(at) => {
            builder.push_bind(*at);
        }
        FieldValue::Reference(id) => {
            builder.push_bind(*id);
        }
    }
}

// NULL needs the column's type so Postgres can infer the parameter.
fn push_null(builder: &mut QueryBuilder<'_, Postgres>, kind: Option<FieldKind>) {
    match kind {
        Some(FieldKind::Integer { .. }) => {
            builder.push_bind(None::<i64>);
        }
        Some(FieldKind::Decimal) => {
            builder.push_bind(None::<f64>);
        }
        Some(FieldKind::Flag) => {
            builder.push_bind(None::<bool>);
        }
        Some(FieldKind::List { .. }) => {
            builder.push_bind(None::<Vec<String>>);
        }
        Some(FieldKind::Timestamp) => {
            builder.push_bind(None::<DateTime<Utc>>);
        }
        Some(FieldKind::Reference { .. }) => {
            builder.push_bind(None::<Uuid>);
        }
        _ => {
            builder.push_bind(None::<String>);
        }
    }
}

fn push_conditions(
    builder: &mut QueryBuilder<'_, Postgres>,
    spec: &ResourceSpec,
    conditions: &[Condition],
) -> Result<(), StoreError> {
    builder.push(" WHERE TRUE");
    for condition in conditions {
        let column = column_of(spec, condition.field)?;
        builder.push(" AND ");
        builder.push(column);
        if condition.value.is_null() {
            builder.push(" IS NULL");
        } else {
            builder.push(" = ");
            push_value(builder, spec.field(condition.field).map(|f| f.kind), &condition.value);
        }
    }
    Ok(())
}

fn decode(spec: &'static ResourceSpec, row: &PgRow) -> Result<Record, StoreError> {
    let corrupt = |column: &'static str, e: sqlx::Error| StoreError::Corrupt {
        table: spec.table,
        column,
        reason: e.to_string(),
    };

    let mut fields = Document::new();
    for field in spec.fields {
        let column = field.column;
        let value = match field.kind {
            FieldKind::Integer { .. } => row
                .try_get::<Option<i64>, _>(column)
                .map(|v| v.map(FieldValue::Integer)),
            FieldKind::Decimal => row
                .try_get::<Option<f64>, _>(column)
                .map(|v| v.map(FieldValue::Decimal)),
            FieldKind::Flag => row
                .try_get::<Option<bool>, _>(column)
                .map(|v| v.map(FieldValue::Flag)),
            FieldKind::List { .. } => row
                .try_get::<Option<Vec<String>>, _>(column)
                .map(|v| v.map(FieldValue::List)),
            FieldKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(column)
                .map(|v| v.map(FieldValue::Timestamp)),
            FieldKind::Reference { .. } => row
                .try_get::<Option<Uuid>, _>(column)
                .map(|v| v.map(FieldValue::Reference)),
            FieldKind::Text { .. }
            | FieldKind::Email
            | FieldKind::Url
            | FieldKind::Slug
            | FieldKind::Choice(_) => row
                .try_get::<Option<String>, _>(column)
                .map(|v| v.map(FieldValue::Text)),
        }
        .map_err(|e| corrupt(column, e))?;
        fields.insert(field.name, value.unwrap_or(FieldValue::Null));
    }

    Ok(Record {
        id: row.try_get("id").map_err(|e| corrupt("id", e))?,
        fields,
        created_at: row.try_get("created_at").map_err(|e| corrupt("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| corrupt("updated_at", e))?,
    })
}

/// Maps driver errors, singling out unique violations.
fn classify(table: &'static str, error: sqlx::Error) -> StoreError {
    if let Some(db_error) = error.as_database_error() {
        if db_error.is_unique_violation() {
            return StoreError::UniqueViolation {
                table,
                constraint: db_error.constraint().unwrap_or("unique").to_string(),
            };
        }
    }
    tracing::error!(table, error = ?error, "query failed");
    StoreError::Database(error)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list(
        &self,
        spec: &'static ResourceSpec,
        query: &ListQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM {}", select_head(spec), spec.table));
        push_conditions(&mut builder, spec, &query.conditions)?;

        builder.push(" ORDER BY ");
        for sort in spec.order {
            builder.push(column_of(spec, sort.field)?);
            builder.push(if sort.descending { " DESC, " } else { " ASC, " });
        }
        builder.push("id ASC LIMIT ");
        builder.push_bind(query.limit);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?;
        rows.iter().map(|row| decode(spec, row)).collect()
    }

    async fn count(
        &self,
        spec: &'static ResourceSpec,
        conditions: &[Condition],
    ) -> Result<i64, StoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", spec.table));
        push_conditions(&mut builder, spec, conditions)?;
        builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))
    }

    async fn find(
        &self,
        spec: &'static ResourceSpec,
        field: &'static str,
        value: &FieldValue,
    ) -> Result<Option<Record>, StoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM {}", select_head(spec), spec.table));
        push_conditions(&mut builder, spec, &[Condition::eq(field, value.clone())])?;
        builder.push(" LIMIT 1");

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?;
        row.as_ref().map(|row| decode(spec, row)).transpose()
    }

    async fn insert(
        &self,
        spec: &'static ResourceSpec,
        document: Document,
    ) -> Result<Record, StoreError> {
        let now = Utc::now();
        let mut builder = QueryBuilder::new(format!("INSERT INTO {} (id, created_at, updated_at", spec.table));
        for name in document.keys() {
            builder.push(", ");
            builder.push(column_of(spec, name)?);
        }
        builder.push(") VALUES (");
        builder.push_bind(Uuid::new_v4());
        builder.push(", ");
        builder.push_bind(now);
        builder.push(", ");
        builder.push_bind(now);
        for (name, value) in &document {
            builder.push(", ");
            push_value(&mut builder, spec.field(name).map(|f| f.kind), value);
        }
        builder.push(format!(") RETURNING {}", select_head(spec)));

        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?;
        decode(spec, &row)
    }

    async fn update(
        &self,
        spec: &'static ResourceSpec,
        id: Uuid,
        changes: Document,
    ) -> Result<Record, StoreError> {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET updated_at = ", spec.table));
        builder.push_bind(Utc::now());
        for (name, value) in &changes {
            builder.push(", ");
            builder.push(column_of(spec, name)?);
            builder.push(" = ");
            push_value(&mut builder, spec.field(name).map(|f| f.kind), value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {}", select_head(spec)));

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?
            .ok_or_else(|| StoreError::RowMissing {
                table: spec.table,
                id: id.to_string(),
            })?;
        decode(spec, &row)
    }

    async fn delete(&self, spec: &'static ResourceSpec, id: Uuid) -> Result<(), StoreError> {
        let mut builder = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ", spec.table));
        builder.push_bind(id);
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?;
        if result.rows_affected() == 0 {
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
        let column = column_of(spec, field)?;
        let mut builder = QueryBuilder::new(format!(
            "UPDATE {table} SET {column} = COALESCE({column}, 0) + 1 WHERE id = ",
            table = spec.table
        ));
        builder.push_bind(id);
        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?;
        Ok(())
    }

    async fn average(
        &self,
        spec: &'static ResourceSpec,
        field: &'static str,
        conditions: &[Condition],
    ) -> Result<Option<f64>, StoreError> {
        let column = column_of(spec, field)?;
        let mut builder = QueryBuilder::new(format!(
            "SELECT AVG({column})::DOUBLE PRECISION FROM {}",
            spec.table
        ));
        push_conditions(&mut builder, spec, conditions)?;
        builder
            .build_query_scalar::<Option<f64>>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))
    }

    async fn upsert(
        &self,
        spec: &'static ResourceSpec,
        key_field: &'static str,
        document: Document,
    ) -> Result<Record, StoreError> {
        let key_column = column_of(spec, key_field)?;
        let now = Utc::now();

        let mut builder = QueryBuilder::new(format!("INSERT INTO {} (id, created_at, updated_at", spec.table));
        let mut columns = Vec::with_capacity(document.len());
        for name in document.keys() {
            let column = column_of(spec, name)?;
            columns.push(column);
            builder.push(", ");
            builder.push(column);
        }
        builder.push(") VALUES (");
        builder.push_bind(Uuid::new_v4());
        builder.push(", ");
        builder.push_bind(now);
        builder.push(", ");
        builder.push_bind(now);
        for (name, value) in &document {
            builder.push(", ");
            push_value(&mut builder, spec.field(name).map(|f| f.kind), value);
        }
        builder.push(format!(
            ") ON CONFLICT ({key_column}) DO UPDATE SET updated_at = EXCLUDED.updated_at"
        ));
        for column in columns.iter().filter(|c| **c != key_column) {
            builder.push(format!(", {column} = EXCLUDED.{column}"));
        }
        builder.push(format!(" RETURNING {}", select_head(spec)));

        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(spec.table, e))?;
        decode(spec, &row)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, password_hash, role, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify("users", e))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, password_hash, role, is_active, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify("users", e))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, NOW())
            RETURNING id, email, name, password_hash, role, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.email)
        .bind(user.name)
        .bind(user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify("users", e))
    }
}

