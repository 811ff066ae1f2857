//! Runs against a real Postgres. Ignored by default:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use lumina_api::{
    error::StoreError,
    repository::{PostgresRepository, Repository},
    resources::{CATEGORIES, PROJECTS, STATS},
    schema::{Condition, Document, FieldValue, ListQuery},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

fn project(slug: &str) -> Document {
    let mut doc = Document::new();
    doc.insert("title", FieldValue::Text("Integration".into()));
    doc.insert("slug", FieldValue::Text(slug.into()));
    doc.insert("description", FieldValue::Text("Stored by the integration suite".into()));
    doc.insert("category", FieldValue::Text("SaaS".into()));
    doc.insert(
        "technologies",
        FieldValue::List(vec!["Rust".into(), "sqlx".into()]),
    );
    doc.insert("images", FieldValue::Null);
    doc.insert("status", FieldValue::Text("draft".into()));
    doc
}

fn unique_slug() -> String {
    format!("it-{}", Uuid::new_v4().simple())
}

// --- Tests ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_project_round_trip_and_views() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let slug = unique_slug();

    let created = repo.insert(&PROJECTS, project(&slug)).await.unwrap();
    assert_eq!(
        created.get("technologies"),
        &FieldValue::List(vec!["Rust".into(), "sqlx".into()])
    );
    assert_eq!(created.get("images"), &FieldValue::Null);
    assert_eq!(created.get("views"), &FieldValue::Integer(0));

    repo.increment(&PROJECTS, created.id, "views").await.unwrap();
    let found = repo
        .find(&PROJECTS, "slug", &FieldValue::Text(slug.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("views"), &FieldValue::Integer(1));

    let mut changes = Document::new();
    changes.insert("status", FieldValue::Text("published".into()));
    let updated = repo.update(&PROJECTS, created.id, changes).await.unwrap();
    assert_eq!(updated.get("status"), &FieldValue::Text("published".into()));
    assert_eq!(updated.get("slug"), &FieldValue::Text(slug));
    assert!(updated.updated_at >= created.updated_at);

    repo.delete(&PROJECTS, created.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_slug_is_a_unique_violation() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let slug = unique_slug();

    let first = repo.insert(&PROJECTS, project(&slug)).await.unwrap();
    let second = repo.insert(&PROJECTS, project(&slug)).await;
    assert!(matches!(second, Err(StoreError::UniqueViolation { .. })));

    repo.delete(&PROJECTS, first.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_missing_rows_are_reported() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let result = repo.delete(&PROJECTS, Uuid::new_v4()).await;
    assert!(matches!(result, Err(StoreError::RowMissing { .. })));
    let result = repo.update(&PROJECTS, Uuid::new_v4(), project(&unique_slug())).await;
    assert!(matches!(result, Err(StoreError::RowMissing { .. })));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_null_conditions_and_counts() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let slug = unique_slug();

    let mut root = Document::new();
    root.insert("name", FieldValue::Text("Root".into()));
    root.insert("slug", FieldValue::Text(slug.clone()));
    root.insert("type", FieldValue::Text("it".into()));
    let root = repo.insert(&CATEGORIES, root).await.unwrap();

    let mut child = Document::new();
    child.insert("name", FieldValue::Text("Child".into()));
    child.insert("slug", FieldValue::Text(format!("{slug}-child")));
    child.insert("type", FieldValue::Text("it".into()));
    child.insert("parentId", FieldValue::Reference(root.id));
    let child = repo.insert(&CATEGORIES, child).await.unwrap();

    let under_root = [Condition::eq("parentId", FieldValue::Reference(root.id))];
    assert_eq!(repo.count(&CATEGORIES, &under_root).await.unwrap(), 1);

    let top_level = ListQuery {
        conditions: vec![
            Condition::eq("type", FieldValue::Text("it".into())),
            Condition::eq("parentId", FieldValue::Null),
        ],
        offset: 0,
        limit: 100,
    };
    let roots = repo.list(&CATEGORIES, &top_level).await.unwrap();
    assert!(roots.iter().any(|r| r.id == root.id));
    assert!(roots.iter().all(|r| r.id != child.id));

    repo.delete(&CATEGORIES, child.id).await.unwrap();
    repo.delete(&CATEGORIES, root.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_upsert_by_key() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let key = format!("it_{}", Uuid::new_v4().simple());

    let mut doc = Document::new();
    doc.insert("key", FieldValue::Text(key.clone()));
    doc.insert("value", FieldValue::Integer(1));
    let first = repo.upsert(&STATS, "key", doc.clone()).await.unwrap();

    doc.insert("value", FieldValue::Integer(2));
    let second = repo.upsert(&STATS, "key", doc).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.get("value"), &FieldValue::Integer(2));

    repo.delete(&STATS, first.id).await.unwrap();
}
