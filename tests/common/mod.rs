#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use chrono::Utc;
use farmgate_api::{
    auth,
    config::AppConfig,
    db,
    entities::{customer, customer::CustomerRole, product::ProductCategory},
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "a_sufficiently_long_test_secret_key_1234";
pub const TEST_GATEWAY_SECRET: &str = "sk_test_farmgate_secret";

/// Test harness: the full application router backed by a temporary SQLite
/// database, with helpers for seeding data and issuing authenticated
/// requests.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// App with no payment gateway configured.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// App whose gateway adapter points at a mock server, signed with
    /// [`TEST_GATEWAY_SECRET`].
    pub async fn with_gateway(base_url: &str) -> Self {
        Self::build(Some(base_url.to_string())).await
    }

    async fn build(gateway_base_url: Option<String>) -> Self {
        let db_dir = TempDir::new().expect("create temp dir");
        let db_path = db_dir.path().join("farmgate_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut cfg = AppConfig::new(database_url, TEST_JWT_SECRET, "127.0.0.1", 0, "test");
        cfg.db_max_connections = 1;
        cfg.admin_email = Some("admin@farmgate.example".to_string());
        if let Some(base_url) = gateway_base_url {
            cfg.paystack.base_url = base_url;
            cfg.paystack.secret_key = Some(TEST_GATEWAY_SECRET.to_string());
            cfg.paystack.timeout_secs = 5;
        }

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("create test database");
        db::run_migrations(&pool).await.expect("run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services =
            AppServices::new(db_arc.clone(), event_sender.clone(), &cfg).expect("build services");
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", farmgate_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            state,
            router,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(
        &self,
        name: &str,
        category: ProductCategory,
        price: Decimal,
        stock: i32,
    ) -> farmgate_api::entities::product::Model {
        self.state
            .services
            .catalog
            .create_product(farmgate_api::services::catalog::CreateProductInput {
                name: name.to_string(),
                category,
                price,
                stock,
                description: Some(format!("{} from the farm", name)),
                image_url: None,
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_customer(&self, email: &str, full_name: &str) -> customer::Model {
        self.seed_account(email, full_name, CustomerRole::Customer)
            .await
    }

    pub async fn seed_staff(&self, email: &str) -> customer::Model {
        self.seed_account(email, "Staff Member", CustomerRole::Staff)
            .await
    }

    async fn seed_account(
        &self,
        email: &str,
        full_name: &str,
        role: CustomerRole,
    ) -> customer::Model {
        customer::ActiveModel {
            email: Set(email.to_string()),
            full_name: Set(full_name.to_string()),
            phone: Set(String::new()),
            role: Set(role),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed account")
    }

    pub fn customer_token(&self, customer_id: i64) -> String {
        auth::issue_token(
            TEST_JWT_SECRET,
            customer_id,
            auth::ROLE_CUSTOMER,
            Duration::from_secs(3600),
        )
        .expect("issue customer token")
    }

    pub fn staff_token(&self, staff_id: i64) -> String {
        auth::issue_token(
            TEST_JWT_SECRET,
            staff_id,
            auth::ROLE_STAFF,
            Duration::from_secs(3600),
        )
        .expect("issue staff token")
    }

    /// Sends a request through the router. `token` sets the bearer token,
    /// `session` the cart session header.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        session: Option<&str>,
        body: Option<Value>,
    ) -> Response<axum::body::Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(session) = session {
            builder = builder.header(auth::SESSION_HEADER, session);
        }

        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&value).expect("serialize body")))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Raw-body POST, for webhook deliveries where the exact bytes matter.
    pub async fn post_raw(
        &self,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Response<axum::body::Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

pub async fn response_json(response: Response<axum::body::Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Parses a JSON money field into a `Decimal`. Amounts serialize as strings,
/// but SQLite does not preserve decimal scale, so tests compare numerically
/// instead of matching exact strings.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected a decimal value, got {:?}", other),
    }
}
