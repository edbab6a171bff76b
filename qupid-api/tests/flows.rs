//! Request flows against a real Postgres. Point `TEST_DATABASE_URL` at a
//! scratch database to run them; without it each test returns early.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use qupid_api::app::build_router;
use qupid_api::config::AppConfig;
use qupid_api::schema::{email_verifications, users};
use qupid_api::AppState;
use qupid_shared::clients::db::{create_pool, DbPool};
use qupid_shared::middleware::detached_metrics_handle;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
const PASSWORD: &str = "correct-horse";

fn shared_pool() -> Option<DbPool> {
    static POOL: OnceLock<Option<DbPool>> = OnceLock::new();
    POOL.get_or_init(|| {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url, 8).expect("test database reachable");
        let mut conn = pool.get().expect("test connection");
        conn.run_pending_migrations(MIGRATIONS).expect("migrations apply");
        Some(pool)
    })
    .clone()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}{}", &Uuid::new_v4().simple().to_string()[..10])
}

struct Account {
    id: Uuid,
    token: String,
    display_name: String,
}

struct TestApp {
    router: Router,
    db: DbPool,
}

impl TestApp {
    fn start() -> Option<Self> {
        let Some(db) = shared_pool() else {
            eprintln!("TEST_DATABASE_URL not set, skipping");
            return None;
        };
        let upload_dir = std::env::temp_dir().join("qupid-flows");
        let config = AppConfig {
            upload_dir: upload_dir.display().to_string(),
            ..AppConfig::default()
        };
        let state = AppState::new(config, db.clone(), detached_metrics_handle());
        Some(Self { router: build_router(Arc::new(state)), db })
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(&self, uri: &str, who: &Account) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(&who.token), None).await
    }

    async fn post(&self, uri: &str, who: &Account, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(&who.token), Some(body)).await
    }

    async fn register(&self, name: &str) -> Account {
        let display_name = unique(name);
        let email = format!("{}@kyushu-u.ac.jp", display_name.to_lowercase());
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "display_name": display_name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        Account {
            id: body["data"]["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: body["data"]["token"].as_str().unwrap().to_string(),
            display_name,
        }
    }

    async fn like(&self, from: &Account, to: &Account) -> (StatusCode, Value) {
        self.post("/likes", from, json!({ "liked_user_id": to.id })).await
    }

    async fn block(&self, from: &Account, to: &Account) {
        let (status, body) = self.post("/blocks", from, json!({ "blocked_user_id": to.id })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    async fn search_ids(&self, who: &Account, query: &str) -> Vec<String> {
        let (status, body) = self.get(&format!("/users/search?{query}"), who).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        ids(&body["data"]["items"])
    }

    async fn suggestion_ids(&self, who: &Account) -> Vec<String> {
        let (status, body) = self.get("/users/suggestions?limit=50", who).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        ids(&body["data"])
    }

    fn update_user<F>(&self, id: Uuid, apply: F)
    where
        F: FnOnce(&mut PgConnection, Uuid) -> QueryResult<usize>,
    {
        let mut conn = self.db.get().unwrap();
        apply(&mut *conn, id).unwrap();
    }
}

fn ids(items: &Value) -> Vec<String> {
    items
        .as_array()
        .map(|items| items.iter().filter_map(|i| i["id"].as_str().map(String::from)).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn likes_reject_self_and_duplicates_and_detect_matches() {
    let Some(app) = TestApp::start() else { return };
    let a = app.register("aki").await;
    let b = app.register("bo").await;

    let (status, _) = app.like(&a, &a).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.like(&a, &b).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["is_match"], false);

    let (status, body) = app.like(&b, &a).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["is_match"], true);
    assert_eq!(body["data"]["matched_user"]["id"], a.id.to_string());

    let (status, _) = app.like(&a, &b).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get(&format!("/matches/{}", b.id), &a).await;
    assert_eq!(body["data"]["is_matched"], true);
    let (_, body) = app.get("/matches", &a).await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn block_stops_likes_and_hides_both_users() {
    let Some(app) = TestApp::start() else { return };
    let a = app.register("aki").await;
    let b = app.register("bo").await;

    let (status, body) = app.post("/tags", &a, json!({ "name": unique("tag") })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let tag_id = body["data"]["id"].clone();
    for who in [&a, &b] {
        let (status, body) = app.post("/users/me/tags", who, json!({ "tag_id": tag_id })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let b_id = b.id.to_string();
    let a_id = a.id.to_string();
    assert!(app.search_ids(&a, &format!("q={}", b.display_name)).await.contains(&b_id));
    assert!(app.suggestion_ids(&a).await.contains(&b_id));

    app.block(&a, &b).await;

    assert_eq!(app.like(&a, &b).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.like(&b, &a).await.0, StatusCode::FORBIDDEN);

    assert!(!app.search_ids(&a, &format!("q={}", b.display_name)).await.contains(&b_id));
    assert!(!app.search_ids(&b, &format!("q={}", a.display_name)).await.contains(&a_id));
    assert!(!app.suggestion_ids(&a).await.contains(&b_id));
    assert!(!app.suggestion_ids(&b).await.contains(&a_id));

    let (status, _) = app.get(&format!("/users/{}", a.id), &b).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn block_hides_existing_likes_and_match_status() {
    let Some(app) = TestApp::start() else { return };
    let a = app.register("aki").await;
    let b = app.register("bo").await;
    app.like(&a, &b).await;
    app.like(&b, &a).await;

    let (_, body) = app.get("/likes/sent", &b).await;
    assert_eq!(body["data"]["total"], 1);

    app.block(&a, &b).await;

    let (status, _) = app.get(&format!("/matches/{}", a.id), &b).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/matches/{}", b.id), &a).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for who in [&a, &b] {
        let (_, sent) = app.get("/likes/sent", who).await;
        assert_eq!(sent["data"]["total"], 0);
        assert!(ids(&sent["data"]["items"]).is_empty());
        let (_, received) = app.get("/likes/received", who).await;
        assert_eq!(received["data"]["total"], 0);
        let (_, matches) = app.get("/matches", who).await;
        assert_eq!(matches["data"]["total"], 0);
    }
}

#[tokio::test]
async fn conversation_flow_enforces_membership_and_blocks() {
    let Some(app) = TestApp::start() else { return };
    let a = app.register("aki").await;
    let b = app.register("bo").await;
    let c = app.register("cy").await;
    app.like(&a, &b).await;
    app.like(&b, &a).await;

    let (status, first) = app.post("/conversations", &a, json!({ "user_id": b.id })).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let conversation_id = first["data"]["id"].as_str().unwrap().to_string();

    let (status, again) = app.post("/conversations", &a, json!({ "user_id": b.id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["data"]["id"], conversation_id.as_str());
    let (status, reverse) = app.post("/conversations", &b, json!({ "user_id": a.id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reverse["data"]["id"], conversation_id.as_str());

    let (status, _) = app.post("/conversations", &a, json!({ "user_id": c.id })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let messages = format!("/conversations/{conversation_id}/messages");
    let (status, _) = app.post(&messages, &c, json!({ "content": "hello?" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, sent) = app.post(&messages, &a, json!({ "content": "hi bo" })).await;
    assert_eq!(status, StatusCode::CREATED, "{sent}");
    let message_id = sent["data"]["id"].as_str().unwrap();

    let read = format!("{messages}/{message_id}/read");
    let (status, _) = app.call(Method::PUT, &read, Some(&a.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call(Method::PUT, &read, Some(&b.token), None).await;
    assert_eq!(status, StatusCode::OK);

    app.block(&b, &a).await;
    let (status, _) = app.post(&messages, &a, json!({ "content": "still there?" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn verification_code_works_once() {
    let Some(app) = TestApp::start() else { return };
    let email = format!("{}@kyushu-u.ac.jp", unique("code"));

    let (status, body) = app
        .call(Method::POST, "/auth/email/send-code", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let verification_id: Uuid = body["data"]["verification_id"].as_str().unwrap().parse().unwrap();

    let code: String = {
        let mut conn = app.db.get().unwrap();
        email_verifications::table
            .find(verification_id)
            .select(email_verifications::verification_code)
            .first(&mut conn)
            .unwrap()
    };

    let verify = json!({ "email": email, "verification_code": code, "password": PASSWORD });
    let (status, body) = app
        .call(Method::POST, "/auth/email/verify-code", None, Some(verify.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["is_new_user"], true);
    assert!(body["data"]["auth"]["token"].is_string());

    let (status, _) = app
        .call(Method::POST, "/auth/email/verify-code", None, Some(verify))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_filters_respect_visibility() {
    let Some(app) = TestApp::start() else { return };
    let a = app.register("aki").await;
    let b = app.register("bo").await;
    let b_id = b.id.to_string();
    let campus = unique("campus");

    app.update_user(b.id, |conn, id| {
        diesel::update(users::table.find(id))
            .set((
                users::campus.eq(Some(campus.to_uppercase())),
                users::show_campus.eq(true),
                users::birthday.eq(NaiveDate::from_ymd_opt(2000, 1, 1)),
                users::show_age.eq(true),
            ))
            .execute(conn)
    });

    let by_name = format!("q={}", b.display_name);
    assert!(app.search_ids(&a, &format!("{by_name}&campus={campus}")).await.contains(&b_id));
    assert!(!app.search_ids(&a, &format!("{by_name}&campus=elsewhere")).await.contains(&b_id));
    assert!(app.search_ids(&a, &format!("{by_name}&min_age=18&max_age=99")).await.contains(&b_id));
    assert!(!app.search_ids(&a, &format!("{by_name}&max_age=18")).await.contains(&b_id));

    app.update_user(b.id, |conn, id| {
        diesel::update(users::table.find(id))
            .set((users::show_campus.eq(false), users::show_age.eq(false)))
            .execute(conn)
    });

    assert!(!app.search_ids(&a, &format!("{by_name}&campus={campus}")).await.contains(&b_id));
    assert!(!app.search_ids(&a, &format!("{by_name}&min_age=18")).await.contains(&b_id));
    assert!(app.search_ids(&a, &format!("{by_name}&campus=all")).await.contains(&b_id));
}

#[tokio::test]
async fn search_pages_in_name_order() {
    let Some(app) = TestApp::start() else { return };
    let me = app.register("me").await;
    let marker = unique("m");

    for name in ["charlie", "Alpha", "bravo"] {
        let who = app.register("x").await;
        let display_name = format!("{name}{marker}");
        app.update_user(who.id, |conn, id| {
            diesel::update(users::table.find(id))
                .set(users::display_name.eq(display_name))
                .execute(conn)
        });
    }

    let (status, body) = app
        .get(&format!("/users/search?q={marker}&sort=alphabetical&limit=2&offset=0"), &me)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["total"], 3);
    let names: Vec<&str> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["display_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec![format!("Alpha{marker}"), format!("bravo{marker}")]);

    let (_, body) = app
        .get(&format!("/users/search?q={marker}&sort=alphabetical&limit=2&offset=2"), &me)
        .await;
    assert_eq!(body["data"]["items"][0]["display_name"], format!("charlie{marker}"));
}
