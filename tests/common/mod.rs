//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a test config and
//! the full [`AppContext`]. The [`TestHarness::with_server`] constructor
//! starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use agora_core::config::Config;
use agora_db::models::User;
use agora_db::pool::{init_memory_pool, DbPool};
use agora_server::context::AppContext;
use agora_server::router::build_router;
use serde_json::Value;

pub const PASSWORD: &str = "correct-horse";

/// Config tuned for tests: cheap bcrypt, no practical rate limit.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.rate_limit.auth_requests_per_minute = 10_000;
    config
}

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(db.clone(), config);
        Self { ctx, db }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(test_config()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    pub fn conn(&self) -> agora_db::pool::PooledConnection {
        agora_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Insert a user directly with password [`PASSWORD`].
    pub fn create_user(&self, nickname: &str, is_public: bool) -> User {
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        let email = format!("{nickname}@example.com");
        agora_db::queries::users::create_user(
            &self.conn(),
            &agora_db::queries::users::NewUser {
                email: &email,
                password_hash: &hash,
                first_name: nickname,
                last_name: "Tester",
                date_of_birth: "1990-05-17",
                nickname: Some(nickname),
                about_me: None,
                avatar: None,
                is_public,
            },
        )
        .unwrap()
    }

    /// Insert a user and a valid session, returning an authenticated client.
    pub fn user_client(&self, addr: SocketAddr, nickname: &str, is_public: bool) -> (User, Api) {
        let user = self.create_user(nickname, is_public);
        let token = uuid_like_token(nickname);
        let expires = agora_db::time::format(chrono_now_plus_hours(1));
        agora_db::queries::sessions::create_session(&self.conn(), user.id, &token, &expires).unwrap();
        (user, Api::new(addr, Some(token)))
    }
}

fn uuid_like_token(seed: &str) -> String {
    format!("test-session-{seed}-{}", agora_core::SessionId::new())
}

fn chrono_now_plus_hours(hours: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::hours(hours)
}

/// Thin reqwest wrapper that carries a bearer token.
pub struct Api {
    pub client: reqwest::Client,
    pub base: String,
    pub token: Option<String>,
}

impl Api {
    pub fn new(addr: SocketAddr, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("http://{addr}"),
            token,
        }
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.with_auth(self.client.get(format!("{}{path}", self.base)))
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.with_auth(self.client.post(format!("{}{path}", self.base)))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.with_auth(self.client.put(format!("{}{path}", self.base)))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.with_auth(self.client.delete(format!("{}{path}", self.base)))
            .send()
            .await
            .unwrap()
    }

    /// POST and decode the JSON body, asserting the status.
    pub async fn post_json(&self, path: &str, body: Value, status: u16) -> Value {
        let resp = self.post(path, body).await;
        assert_eq!(resp.status(), status, "POST {path}");
        resp.json().await.unwrap()
    }

    /// GET and decode the JSON body, asserting 200.
    pub async fn get_json(&self, path: &str) -> Value {
        let resp = self.get(path).await;
        assert_eq!(resp.status(), 200, "GET {path}");
        resp.json().await.unwrap()
    }
}
