//! HTTP surface tests: router driven in-process with `oneshot`

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use bookledger_server::{
    api,
    models::{actor::ActorClaims, Actor, Book, NewBook},
    repository::MemoryStore,
    services::clock::ManualClock,
    AppConfig, AppState,
};

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = SECRET.to_string();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let state = AppState::new(config, store.clone(), clock);
        Self {
            router: api::router(state),
            store,
        }
    }

    async fn book(&self, copies: i32) -> Book {
        self.store.insert_book(NewBook::new("Dune", "Sci-Fi", copies)).await
    }

    async fn send(&self, method: Method, uri: &str, actor: Option<Actor>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            let token = ActorClaims::new(actor, chrono::Duration::hours(1))
                .create_token(SECRET)
                .unwrap();
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = app.send(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn loans_require_a_token() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/v1/loans", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn borrow_until_exhausted_then_return() {
    let app = TestApp::new();
    let book = app.book(1).await;
    let (alice, bob) = (Actor::member(Uuid::new_v4()), Actor::member(Uuid::new_v4()));

    let (status, loan) = app
        .send(Method::POST, "/api/v1/loans", Some(alice), Some(json!({ "book_id": book.id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "borrowed");

    let (status, body) = app
        .send(Method::POST, "/api/v1/loans", Some(bob), Some(json!({ "book_id": book.id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Exhausted");

    let uri = format!("/api/v1/books/{}/availability", book.id);
    let (_, availability) = app.send(Method::GET, &uri, Some(bob), None).await;
    assert_eq!(availability["available_copies"], 0);

    let loan_id = loan["id"].as_str().unwrap();
    let uri = format!("/api/v1/loans/{}/return", loan_id);
    let (status, _) = app.send(Method::POST, &uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, receipt) = app.send(Method::POST, &uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["loan"]["status"], "returned");

    let (status, _) = app.send(Method::POST, &uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn borrow_validates_period() {
    let app = TestApp::new();
    let book = app.book(1).await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/loans",
            Some(Actor::member(Uuid::new_v4())),
            Some(json!({ "book_id": book.id, "borrow_days": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn librarian_routes_reject_members() {
    let app = TestApp::new();
    let member = Actor::member(Uuid::new_v4());
    let librarian = Actor::librarian(Uuid::new_v4());

    for uri in [
        "/api/v1/analytics/demand-forecast",
        "/api/v1/analytics/overdue-predictions",
        "/api/v1/dashboard/stats",
        "/api/v1/loans/overdue",
        "/api/v1/ledger/audit",
    ] {
        let (status, _) = app.send(Method::GET, uri, Some(member), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        let (status, _) = app.send(Method::GET, uri, Some(librarian), None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }

    let (status, _) = app.send(Method::POST, "/api/v1/loans/sweep", Some(member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.send(Method::POST, "/api/v1/loans/sweep", Some(librarian), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["swept"], 0);
}

#[tokio::test]
async fn recommendations_for_unknown_user_fall_back() {
    let app = TestApp::new();
    app.book(1).await;
    let uri = format!("/api/v1/recommendations/{}?limit=3", Uuid::new_v4());
    let (status, body) = app
        .send(Method::GET, &uri, Some(Actor::member(Uuid::new_v4())), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let recs = body.as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["reason"], "Popular book");
}
