//! Shared harness: a real router over a temporary SQLite file.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use skymarket::auth::session;
use skymarket::config::Config;
use skymarket::db::{self, models::{Ad, Role}};
use skymarket::market::domain::AdDraft;
use skymarket::routes;
use skymarket::state::AppState;

pub const PASSWORD: &str = "123qwe456rty";

pub struct TestApp {
    _dir: TempDir,
    pub state: AppState,
    router: Router,
}

pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.db"))
            .expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let state = AppState::new(pool, Config::default());
        let router = routes::app(state.clone());
        Self {
            _dir: dir,
            state,
            router,
        }
    }

    /// Active account with [`PASSWORD`] and a live token.
    pub async fn user(&self, email: &str, role: Role) -> TestUser {
        // Low bcrypt cost keeps the suite fast
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        let user = self.state.users.create(email, &hash, role).await.unwrap();
        let token = session::create_session(&self.state.db, user.id, 1).unwrap();
        TestUser {
            id: user.id,
            email: user.email,
            token,
        }
    }

    pub async fn ad(&self, author: &TestUser, title: &str, price: &str) -> Ad {
        let price: Decimal = price.parse().unwrap();
        let draft = AdDraft {
            title: title.to_string(),
            price_cents: (price * Decimal::ONE_HUNDRED).to_i64().unwrap(),
            description: None,
        };
        self.state.ads.create(author.id, &draft).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<&TestUser>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, user, None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        user: Option<&TestUser>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.send(Method::POST, uri, user, Some(body.to_string())).await
    }

    pub async fn patch(
        &self,
        uri: &str,
        user: Option<&TestUser>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, user, Some(body.to_string())).await
    }

    pub async fn delete(&self, uri: &str, user: Option<&TestUser>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, user, None).await
    }

    /// Sends `body` verbatim as JSON; an empty response body reads as `Null`.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&TestUser>,
        body: Option<String>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "testserver");
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", user.token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

pub fn titles(page: &Value) -> Vec<&str> {
    page["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|ad| ad["title"].as_str().unwrap())
        .collect()
}
