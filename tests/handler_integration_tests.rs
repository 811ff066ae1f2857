use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use lumina_api::{
    AppState, MemoryRepository, create_router,
    config::AppConfig,
    operations,
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

// --- Harness ---

struct TestApp {
    router: Router,
    store: Arc<MemoryRepository>,
    admin_id: Uuid,
}

#[derive(Clone, Copy, PartialEq)]
enum As {
    Anonymous,
    Admin,
}

async fn setup() -> TestApp {
    let store = Arc::new(MemoryRepository::new());
    let repo = store.clone() as RepositoryState;
    let config = AppConfig::default();
    let admin = operations::ensure_admin(&repo, &config)
        .await
        .expect("bootstrap")
        .expect("fresh store has no admin");

    TestApp {
        router: create_router(AppState { repo, config }),
        store,
        admin_id: admin.id,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, who: As, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if who == As::Admin {
            request = request.header("x-user-id", self.admin_id.to_string());
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(request.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str, who: As) -> (StatusCode, Value) {
        self.call(Method::GET, uri, who, None).await
    }

    async fn post(&self, uri: &str, who: As, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, who, Some(body)).await
    }

    async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PATCH, uri, As::Admin, Some(body)).await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, As::Admin, None).await
    }
}

fn project(slug: &str) -> Value {
    json!({
        "title": "Demo Project",
        "slug": slug,
        "description": "A demo project for the portfolio",
        "category": "Web",
        "technologies": ["Rust", "Postgres"],
    })
}

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().expect("id in response").to_string()
}

// --- Generic CRUD ---

#[tokio::test]
async fn test_portfolio_publication_flow() {
    let app = setup().await;

    let (status, body) = app.post("/api/portfolio", As::Admin, project("demo-project")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["technologies"], json!(["Rust", "Postgres"]));
    assert_eq!(body["data"]["featured"], false);

    let (status, body) = app.post("/api/portfolio", As::Admin, project("demo-project")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    let (status, _) = app.get("/api/portfolio/demo-project", As::Anonymous).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get("/api/portfolio/demo-project", As::Admin).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .patch("/api/portfolio/demo-project", json!({ "status": "published" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/portfolio/demo-project", As::Anonymous).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slug"], "demo-project");
    assert_eq!(body["data"]["technologies"], json!(["Rust", "Postgres"]));
}

#[tokio::test]
async fn test_anonymous_writes_are_rejected_without_side_effects() {
    let app = setup().await;

    let (status, body) = app.post("/api/portfolio", As::Anonymous, project("sneaky")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    // Gate runs before the body is parsed.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/services")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.get("/api/portfolio?admin=true", As::Admin).await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error_for_admins() {
    let app = setup().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/services")
        .header("x-user-id", app.admin_id.to_string())
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn test_every_invalid_field_is_reported() {
    let app = setup().await;
    let (status, body) = app
        .post(
            "/api/portfolio",
            As::Admin,
            json!({
                "title": "A",
                "slug": "Not A Slug",
                "description": "short",
                "category": "Desktop",
                "technologies": [],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid data");

    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    for expected in ["title", "slug", "description", "category", "technologies"] {
        assert!(fields.contains(&expected), "missing error for {expected}: {fields:?}");
    }
}

#[tokio::test]
async fn test_empty_patch_keeps_the_record() {
    let app = setup().await;
    let (_, created) = app.post("/api/portfolio", As::Admin, project("steady")).await;

    let (status, body) = app.patch("/api/portfolio/steady", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], created["data"]);
}

#[tokio::test]
async fn test_list_pagination_block() {
    let app = setup().await;
    seed_services(&app, 3).await;

    let (status, body) = app.get("/api/services?page=2&limit=2", As::Anonymous).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["slug"], "service-2");
    assert_eq!(
        body["pagination"],
        json!({ "page": 2, "limit": 2, "total": 3, "totalPages": 2 })
    );

    let (status, body) = app.get("/api/services?limit=abc", As::Anonymous).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "limit");
}

async fn seed_services(app: &TestApp, count: i64) {
    for n in 0..count {
        let (status, _) = app
            .post(
                "/api/services",
                As::Admin,
                json!({
                    "title": format!("Service {n}"),
                    "slug": format!("service-{n}"),
                    "shortDescription": "Something we do very well",
                    "displayOrder": n,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_walking_every_page_yields_the_full_list_once() {
    let app = setup().await;
    seed_services(&app, 7).await;

    let (_, everything) = app.get("/api/services?limit=100", As::Anonymous).await;
    let expected: Vec<Value> = everything["data"].as_array().unwrap().clone();
    assert_eq!(expected.len(), 7);

    let mut walked = Vec::new();
    let mut page = 1;
    loop {
        let (status, body) = app
            .get(&format!("/api/services?page={page}&limit=3"), As::Anonymous)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["totalPages"], 3);
        let rows = body["data"].as_array().unwrap();
        if rows.is_empty() {
            break;
        }
        walked.extend(rows.iter().cloned());
        page += 1;
    }
    assert_eq!(page, 4);
    assert_eq!(walked, expected);
}

#[tokio::test]
async fn test_page_far_beyond_the_end_is_empty() {
    let app = setup().await;
    seed_services(&app, 3).await;

    let (status, body) = app
        .get("/api/services?page=9223372036854775807&limit=10", As::Anonymous)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(
        body["pagination"],
        json!({ "page": i64::MAX, "limit": 10, "total": 3, "totalPages": 1 })
    );
}

#[tokio::test]
async fn test_admin_flag_must_be_a_boolean() {
    let app = setup().await;
    for raw in ["1", "TRUE", "yes"] {
        let (status, body) = app
            .get(&format!("/api/portfolio?admin={raw}"), As::Admin)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "admin={raw}");
        assert_eq!(body["errors"][0]["field"], "admin");
    }

    let (status, _) = app.get("/api/portfolio?admin=false", As::Anonymous).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_slug_changes_respect_uniqueness() {
    let app = setup().await;
    app.post("/api/portfolio", As::Admin, project("first")).await;
    app.post("/api/portfolio", As::Admin, project("second")).await;

    let (status, body) = app.patch("/api/portfolio/second", json!({ "slug": "first" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    let (status, body) = app
        .patch("/api/portfolio/second", json!({ "slug": "second", "title": "Still Second" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Still Second");

    let (status, _) = app.patch("/api/portfolio/second", json!({ "slug": "third" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/portfolio/third", As::Admin).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_defaulted_fields_cannot_be_nulled() {
    let app = setup().await;
    app.post("/api/portfolio", As::Admin, project("demo")).await;

    let (status, body) = app
        .patch(
            "/api/portfolio/demo",
            json!({ "status": null, "featured": null, "displayOrder": null }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);

    let (_, body) = app.get("/api/portfolio/demo", As::Admin).await;
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["featured"], false);
    assert_eq!(body["data"]["displayOrder"], 0);

    let (status, body) = app.patch("/api/portfolio/demo", json!({ "clientName": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["clientName"], Value::Null);
}

#[tokio::test]
async fn test_project_reads_count_views() {
    let app = setup().await;
    app.post("/api/portfolio", As::Admin, project("viewed")).await;
    app.patch("/api/portfolio/viewed", json!({ "status": "published" })).await;

    let (status, body) = app.get("/api/portfolio/viewed", As::Anonymous).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["views"], 0);

    // The counter is bumped in the background.
    let mut views = 0;
    for _ in 0..50 {
        tokio::task::yield_now().await;
        let (_, body) = app.get("/api/portfolio/viewed", As::Anonymous).await;
        views = body["data"]["views"].as_i64().unwrap();
        if views > 0 {
            break;
        }
    }
    assert!(views > 0);

    app.store.fail_writes("projects").await;
    let (status, body) = app.get("/api/portfolio/viewed", As::Anonymous).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slug"], "viewed");
}

#[tokio::test]
async fn test_unapproved_testimonials_stay_hidden() {
    let app = setup().await;
    let (status, _) = app
        .post(
            "/api/testimonials",
            As::Admin,
            json!({ "quote": "They shipped on time, twice.", "authorName": "Dana", "rating": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.get("/api/testimonials", As::Anonymous).await;
    assert_eq!(body["pagination"]["total"], 0);

    let (status, _) = app.get("/api/testimonials?admin=true", As::Anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.get("/api/testimonials?admin=true", As::Admin).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["approved"], false);
}

#[tokio::test]
async fn test_unknown_collection_is_not_found() {
    let app = setup().await;
    let (status, body) = app.get("/api/widgets", As::Admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Resource not found");
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

// --- Submissions ---

#[tokio::test]
async fn test_contact_submission_and_triage() {
    let app = setup().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/contact")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .header(header::USER_AGENT, "integration-test")
        .body(Body::from(
            json!({
                "name": "Sam Client",
                "email": "sam@example.com",
                "projectType": "web",
                "message": "We need a new marketing site.",
                "status": "converted",
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED);
    let data = body["data"].as_object().unwrap();
    assert_eq!(data.len(), 1, "submissions only echo the id");
    let id = id_of(&body);

    let (status, _) = app.get("/api/contact", As::Anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.get("/api/contact", As::Admin).await;
    assert_eq!(body["data"][0]["status"], "new");
    assert_eq!(body["data"][0]["ipAddress"], "203.0.113.7");
    assert_eq!(body["data"][0]["userAgent"], "integration-test");

    let (status, _) = app.patch(&format!("/api/contact/{id}"), json!({ "status": "converted" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .patch(
            &format!("/api/contact/{id}"),
            json!({ "status": "contacted", "notes": "Called back" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "contacted");
    assert_eq!(body["data"]["notes"], "Called back");
}

#[tokio::test]
async fn test_newsletter_lifecycle() {
    let app = setup().await;
    let email = json!({ "email": "Reader@Example.com" });

    let (status, _) = app.post("/api/newsletter", As::Anonymous, email.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post("/api/newsletter", As::Anonymous, email.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This email is already subscribed");

    let (status, _) = app.post("/api/newsletter/unsubscribe", As::Anonymous, email.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/newsletter", As::Admin).await;
    assert_eq!(body["data"][0]["isActive"], false);
    assert!(body["data"][0]["unsubscribedAt"].is_string());

    let (status, body) = app.post("/api/newsletter", As::Anonymous, email).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Subscription reactivated");

    let (_, body) = app.get("/api/newsletter", As::Admin).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["email"], "reader@example.com");
    assert_eq!(body["data"][0]["isActive"], true);
    assert!(body["data"][0]["unsubscribedAt"].is_null());

    let (status, _) = app
        .post("/api/newsletter/unsubscribe", As::Anonymous, json!({ "email": "nobody@example.com" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_quiz_analytics() {
    let app = setup().await;
    for score in [80, 60] {
        let (status, _) = app
            .post(
                "/api/quiz",
                As::Anonymous,
                json!({ "quizType": "business", "score": score, "answers": ["a", "b"] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    app.post(
        "/api/quiz",
        As::Anonymous,
        json!({ "quizType": "developer", "score": 10, "answers": ["c"] }),
    )
    .await;

    let (status, _) = app.get("/api/quiz", As::Anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/api/quiz?type=business", As::Admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["analytics"]["totalAttempts"], 2);
    assert_eq!(body["data"]["analytics"]["averageScore"], 70.0);

    let (_, body) = app.get("/api/quiz?type=designer", As::Admin).await;
    assert_eq!(body["data"]["analytics"]["totalAttempts"], 0);
    assert_eq!(body["data"]["analytics"]["averageScore"], 0.0);
}

// --- Hierarchies ---

#[tokio::test]
async fn test_category_delete_is_refused_while_children_exist() {
    let app = setup().await;
    let (_, parent) = app
        .post(
            "/api/categories",
            As::Admin,
            json!({ "name": "Services", "slug": "services", "type": "faq" }),
        )
        .await;
    let parent_id = id_of(&parent);

    let (status, child) = app
        .post(
            "/api/categories",
            As::Admin,
            json!({ "name": "Billing", "slug": "billing", "type": "faq", "parentId": parent_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let child_id = id_of(&child);

    let (status, _) = app
        .patch(&format!("/api/categories/{parent_id}"), json!({ "parentId": child_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "cycles are refused");

    let (status, body) = app.delete(&format!("/api/categories/{parent_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Cannot delete"));

    let (status, _) = app.delete(&format!("/api/categories/{child_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.delete("/api/categories/services").await;
    assert_eq!(status, StatusCode::OK);

    // Deleting what is already gone is a storage error.
    let (status, _) = app.delete(&format!("/api/categories/{parent_id}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_menu_tree_and_bulk_reorder() {
    let app = setup().await;
    let (status, menu) = app
        .post("/api/menus", As::Admin, json!({ "name": "Header", "location": "header" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let menu_id = id_of(&menu);

    let (_, about) = app
        .post(
            "/api/menu-items",
            As::Admin,
            json!({ "menuId": menu_id, "label": "About", "displayOrder": 1 }),
        )
        .await;
    let about_id = id_of(&about);
    let (_, team) = app
        .post(
            "/api/menu-items",
            As::Admin,
            json!({ "menuId": menu_id, "label": "Team", "parentId": about_id }),
        )
        .await;
    let team_id = id_of(&team);
    app.post(
        "/api/menu-items",
        As::Admin,
        json!({ "menuId": menu_id, "label": "Hidden", "isActive": false }),
    )
    .await;

    let (status, body) = app.get("/api/menus/header", As::Anonymous).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["location"], "header");
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["label"], "About");
    assert_eq!(items[0]["children"][0]["label"], "Team");

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/menu-items",
            As::Admin,
            Some(json!({ "items": [
                { "id": team_id, "displayOrder": 0, "parentId": null },
                { "id": about_id, "displayOrder": 2 },
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/menus/header", As::Anonymous).await;
    let labels: Vec<&str> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, ["Team", "About"]);

    // One bad entry fails the call; the good one is still applied.
    let (status, _) = app
        .call(
            Method::PUT,
            "/api/menu-items",
            As::Admin,
            Some(json!({ "items": [
                { "id": team_id, "displayOrder": 9 },
                { "id": Uuid::new_v4(), "displayOrder": 1 },
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get(&format!("/api/menu-items/{team_id}"), As::Admin).await;
    assert_eq!(body["data"]["displayOrder"], 9);

    let (status, _) = app.delete(&format!("/api/menus/{menu_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "menu still has items");

    let (status, _) = app.call(Method::PUT, "/api/menu-items", As::Anonymous, Some(json!({ "items": [] }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// --- Key/value collections ---

#[tokio::test]
async fn test_settings_visibility_and_batch_upsert() {
    let app = setup().await;
    let (status, _) = app
        .call(
            Method::PUT,
            "/api/settings",
            As::Admin,
            Some(json!({
                "site_name": { "value": "Lumina", "isPublic": true },
                "smtp_host": { "value": "mail.internal", "group": "email" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/settings", As::Anonymous).await;
    let public = body["data"].as_object().unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(body["data"]["site_name"]["value"], "Lumina");
    assert_eq!(body["data"]["site_name"]["type"], "string");

    let (_, body) = app.get("/api/settings?group=email", As::Admin).await;
    assert_eq!(body["data"].as_object().unwrap().len(), 1);
    assert_eq!(body["data"]["smtp_host"]["value"], "mail.internal");

    let (status, _) = app
        .call(Method::PUT, "/api/settings", As::Anonymous, Some(json!({ "x": { "value": "y" } })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stats_defaults_and_updates() {
    let app = setup().await;
    let (_, body) = app.get("/api/stats", As::Anonymous).await;
    assert_eq!(body["data"]["projects_completed"], 50);
    assert_eq!(body["data"]["happy_clients"], 30);

    let (status, _) = app
        .call(Method::PATCH, "/api/stats", As::Admin, Some(json!({ "happy_clients": 42 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/stats", As::Anonymous).await;
    assert_eq!(body["data"]["happy_clients"], 42);
    assert_eq!(body["data"]["years_experience"], 5);

    let (status, body) = app
        .call(Method::PATCH, "/api/stats", As::Admin, Some(json!({ "happy_clients": "lots" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "happy_clients");
}

// --- Dashboard ---

#[tokio::test]
async fn test_dashboard_is_all_or_nothing() {
    let app = setup().await;
    app.post(
        "/api/contact",
        As::Anonymous,
        json!({
            "name": "Lee",
            "email": "lee@example.com",
            "projectType": "mobile",
            "message": "An app for our shop, please.",
        }),
    )
    .await;

    let (status, _) = app.get("/api/admin/dashboard", As::Anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/api/admin/dashboard", As::Admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contacts"], json!({ "total": 1, "new": 1 }));
    assert_eq!(body["data"]["recentContacts"][0]["name"], "Lee");
    assert_eq!(body["data"]["orders"]["total"], 0);

    app.store.fail_table("orders").await;
    let (status, body) = app.get("/api/admin/dashboard", As::Admin).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());
}

// --- Accounts ---

#[tokio::test]
async fn test_login_and_session() {
    let app = setup().await;
    let defaults = AppConfig::default();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": defaults.admin_email, "password": defaults.admin_password }).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("lumina_session="));
    assert!(cookie.contains("HttpOnly"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["data"]["token"].as_str().unwrap();
    assert_eq!(body["data"]["user"]["role"], "admin");

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], defaults.admin_email);

    let (status, _) = app.get("/api/auth/me", As::Anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/auth/login",
            As::Anonymous,
            json!({ "email": defaults.admin_email, "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post("/api/auth/login", As::Anonymous, json!({ "email": "not-an-email", "password": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "email");

    let (status, body) = app.call(Method::POST, "/api/auth/init", As::Anonymous, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Admin user already exists");
}

#[tokio::test]
async fn test_invalid_token_is_treated_as_anonymous() {
    let app = setup().await;
    let request = Request::builder()
        .uri("/api/portfolio")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/api/portfolio?admin=true")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
