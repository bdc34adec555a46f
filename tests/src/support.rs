//! # Test Support
//!
//! A fake provider cloud (auth, predictions, text model, storage, rows and a
//! file host) served by axum on an ephemeral port, plus helpers for driving
//! the gateway router in-process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use studio_gateway::adapters::{live_ports, offline_ports, InMemoryQuotaStore};
use studio_gateway::middleware::MiddlewareStack;
use studio_gateway::ports::{StudioPorts, SystemTimeSource};
use studio_gateway::{build_router, GatewayConfig, StudioService};

/// Anon key long enough to count as configured.
pub const ANON_KEY: &str = "test-anon-key-0123456789abcdef";
pub const SERVICE_KEY: &str = "test-service-role-key";
pub const REPLICATE_TOKEN: &str = "r8_test_token";
pub const GEMINI_KEY: &str = "AIza-test-key";

// =============================================================================
// FAKE PROVIDER CLOUD
// =============================================================================

#[derive(Clone)]
struct Account {
    id: String,
    password: String,
    username: String,
}

/// Recorded upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub path: String,
    pub content_type: String,
    pub size: usize,
}

/// Shared state behind the fake cloud.
#[derive(Default)]
pub struct CloudState {
    base_url: String,
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, String>>,
    polls: Mutex<HashMap<String, u32>>,
    rows: Mutex<Vec<Value>>,
    uploads: Mutex<Vec<Upload>>,
    next_id: AtomicU64,
    /// Status returned by `POST /predictions` when non-zero.
    prediction_status: AtomicU16,
    /// Status returned by the text model when non-zero.
    enhance_status: AtomicU16,
    storage_down: AtomicBool,
    rows_down: AtomicBool,
    /// `processing` polls before a prediction settles.
    pending_polls: AtomicU64,
}

impl CloudState {
    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn user_json(&self, email: &str, account: &Account) -> Value {
        json!({
            "id": account.id,
            "email": email,
            "created_at": "2026-10-19T08:00:00Z",
            "user_metadata": { "username": account.username },
        })
    }

    fn session_json(&self, email: &str, account: &Account) -> Value {
        let token = self.next("token");
        self.tokens.lock().insert(token.clone(), email.to_string());
        json!({
            "access_token": token,
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": self.user_json(email, account),
        })
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<Value> {
        let token = headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        let email = self.tokens.lock().get(token).cloned()?;
        let account = self.accounts.lock().get(&email).cloned()?;
        Some(self.user_json(&email, &account))
    }
}

/// Handle to a running fake cloud.
pub struct FakeCloud {
    pub base_url: String,
    state: Arc<CloudState>,
}

impl FakeCloud {
    /// Bind an ephemeral port and serve every fake provider on it.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(CloudState {
            base_url: base_url.clone(),
            ..Default::default()
        });

        let router = Router::new()
            .route("/auth/v1/signup", post(sign_up))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/user", get(current_user))
            .route("/auth/v1/logout", post(logout))
            .route("/v1/predictions", post(create_prediction))
            .route("/v1/predictions/:id", get(poll_prediction))
            .route("/v1beta/models/*method", post(generate_content))
            .route("/files/:name", get(file))
            .route("/storage/v1/object/:bucket/*path", post(upload))
            .route("/rest/v1/:table", get(select_rows).post(insert_rows))
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { base_url, state }
    }

    /// Gateway configuration pointing every provider at this cloud.
    pub fn config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.base_url = self.base_url.clone();
        config.auth.anon_key = ANON_KEY.to_string();
        config.generation.api_url = format!("{}/v1", self.base_url);
        config.generation.api_token = REPLICATE_TOKEN.to_string();
        config.generation.poll_interval = Duration::from_millis(5);
        config.generation.max_poll_attempts = 20;
        config.enhancement.api_url = format!("{}/v1beta", self.base_url);
        config.enhancement.api_key = GEMINI_KEY.to_string();
        config.storage.base_url = self.base_url.clone();
        config.storage.service_key = SERVICE_KEY.to_string();
        config
    }

    pub fn set_prediction_status(&self, status: u16) {
        self.state.prediction_status.store(status, Ordering::SeqCst);
    }

    pub fn set_enhance_status(&self, status: u16) {
        self.state.enhance_status.store(status, Ordering::SeqCst);
    }

    pub fn set_storage_down(&self, down: bool) {
        self.state.storage_down.store(down, Ordering::SeqCst);
    }

    pub fn set_rows_down(&self, down: bool) {
        self.state.rows_down.store(down, Ordering::SeqCst);
    }

    pub fn set_pending_polls(&self, polls: u64) {
        self.state.pending_polls.store(polls, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.uploads.lock().clone()
    }

    pub fn row_count(&self) -> usize {
        self.state.rows.lock().len()
    }
}

fn fail(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn sign_up(State(cloud): State<Arc<CloudState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let mut accounts = cloud.accounts.lock();
    if accounts.contains_key(&email) {
        return fail(422, json!({"code": 422, "msg": "User already registered"}));
    }
    let account = Account {
        id: cloud.next("user"),
        password: body["password"].as_str().unwrap_or_default().to_string(),
        username: body["data"]["username"].as_str().unwrap_or_default().to_string(),
    };
    accounts.insert(email.clone(), account.clone());
    drop(accounts);
    Json(cloud.session_json(&email, &account)).into_response()
}

async fn token(
    State(cloud): State<Arc<CloudState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    assert_eq!(query.get("grant_type").map(String::as_str), Some("password"));
    let email = body["email"].as_str().unwrap_or_default().to_lowercase();
    let password = body["password"].as_str().unwrap_or_default();
    let account = cloud.accounts.lock().get(&email).cloned();
    match account {
        Some(account) if account.password == password => {
            Json(cloud.session_json(&email, &account)).into_response()
        }
        _ => fail(
            400,
            json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}),
        ),
    }
}

async fn current_user(State(cloud): State<Arc<CloudState>>, headers: HeaderMap) -> Response {
    match cloud.user_for(&headers) {
        Some(user) => Json(user).into_response(),
        None => fail(401, json!({"msg": "invalid JWT"})),
    }
}

async fn logout(State(cloud): State<Arc<CloudState>>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        cloud.tokens.lock().remove(token);
    }
    StatusCode::NO_CONTENT
}

async fn create_prediction(
    State(cloud): State<Arc<CloudState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    assert_eq!(headers[header::AUTHORIZATION], format!("Token {REPLICATE_TOKEN}"));
    let status = cloud.prediction_status.load(Ordering::SeqCst);
    if status != 0 {
        return fail(status, json!({"detail": "upstream unavailable"}));
    }
    let id = cloud.next("pred");
    let prompt = body["input"]["prompt"].as_str().unwrap_or_default();
    // a prompt mentioning "forbidden" is refused by the model
    let refused = prompt.contains("forbidden");
    cloud
        .polls
        .lock()
        .insert(id.clone(), if refused { u32::MAX } else { 0 });
    (
        StatusCode::CREATED,
        Json(json!({"id": id, "status": "starting"})),
    )
        .into_response()
}

async fn poll_prediction(State(cloud): State<Arc<CloudState>>, Path(id): Path<String>) -> Response {
    let mut polls = cloud.polls.lock();
    let Some(count) = polls.get_mut(&id) else {
        return fail(404, json!({"detail": "Not found."}));
    };
    if *count == u32::MAX {
        return Json(json!({"id": id, "status": "failed", "error": "NSFW content detected"}))
            .into_response();
    }
    *count += 1;
    if u64::from(*count) <= cloud.pending_polls.load(Ordering::SeqCst) {
        return Json(json!({"id": id, "status": "processing"})).into_response();
    }
    Json(json!({
        "id": id,
        "status": "succeeded",
        "output": [format!("{}/files/{id}.png", cloud.base_url)],
    }))
    .into_response()
}

async fn generate_content(
    State(cloud): State<Arc<CloudState>>,
    Path(method): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    assert!(method.ends_with(":generateContent"));
    assert_eq!(query.get("key").map(String::as_str), Some(GEMINI_KEY));
    let status = cloud.enhance_status.load(Ordering::SeqCst);
    if status != 0 {
        return fail(status, json!({"error": {"code": status, "message": "model unavailable"}}));
    }
    let instruction = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
    let original = instruction
        .rsplit("Original prompt: \"")
        .next()
        .unwrap_or_default()
        .trim_end_matches('"');
    Json(json!({
        "candidates": [{
            "content": { "parts": [{ "text": format!("{original}, cinematic lighting, ultra detailed") }] }
        }]
    }))
    .into_response()
}

async fn file(Path(name): Path<String>) -> Response {
    (
        [(header::CONTENT_TYPE, "image/png")],
        Bytes::from(format!("png:{name}")),
    )
        .into_response()
}

async fn upload(
    State(cloud): State<Arc<CloudState>>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if cloud.storage_down.load(Ordering::SeqCst) {
        return fail(500, json!({"error": "storage offline"}));
    }
    assert_eq!(headers[header::AUTHORIZATION], format!("Bearer {SERVICE_KEY}"));
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    cloud.uploads.lock().push(Upload {
        path: path.clone(),
        content_type,
        size: body.len(),
    });
    Json(json!({ "Key": format!("{bucket}/{path}") })).into_response()
}

async fn insert_rows(
    State(cloud): State<Arc<CloudState>>,
    Path(table): Path<String>,
    Json(body): Json<Vec<Value>>,
) -> Response {
    assert_eq!(table, "generated_images");
    if cloud.rows_down.load(Ordering::SeqCst) {
        return fail(503, json!({"message": "database unavailable"}));
    }
    let mut stored = Vec::new();
    let mut rows = cloud.rows.lock();
    for mut row in body {
        row["id"] = json!(cloud.next("row"));
        // strictly increasing timestamps keep ordering deterministic
        row["created_at"] = json!(format!("2026-10-19T08:00:{:02}Z", rows.len() % 60));
        rows.push(row.clone());
        stored.push(row);
    }
    (StatusCode::CREATED, Json(stored)).into_response()
}

async fn select_rows(
    State(cloud): State<Arc<CloudState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if cloud.rows_down.load(Ordering::SeqCst) {
        return fail(503, json!({"message": "database unavailable"}));
    }
    let rows = cloud.rows.lock();
    let user = query.get("user_id").and_then(|f| f.strip_prefix("eq."));
    let limit = query
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let selected: Vec<Value> = rows
        .iter()
        .rev()
        .filter(|row| user.map_or(true, |u| row["user_id"] == u))
        .take(limit)
        .cloned()
        .collect();
    Json(selected).into_response()
}

// =============================================================================
// GATEWAY HARNESS
// =============================================================================

/// In-process gateway driven through `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub studio: Arc<StudioService>,
}

impl TestApp {
    pub fn new(config: GatewayConfig, ports: StudioPorts) -> Self {
        config.validate().unwrap();
        let config = Arc::new(config);
        let stack = MiddlewareStack::from_config(&config);
        let studio = Arc::new(StudioService::new(
            Arc::clone(&config),
            ports,
            stack.circuit_breaker(),
            stack.metrics(),
        ));
        Self {
            router: build_router(Arc::clone(&studio), &stack),
            studio,
        }
    }

    /// Gateway over the in-memory providers.
    pub fn offline(config: GatewayConfig) -> Self {
        let ports = offline_ports(Arc::new(SystemTimeSource), Arc::new(InMemoryQuotaStore::new()));
        Self::new(config, ports)
    }

    /// Gateway over live HTTP adapters pointed at `cloud`.
    pub fn live(cloud: &FakeCloud) -> Self {
        Self::live_with(cloud.config())
    }

    pub fn live_with(config: GatewayConfig) -> Self {
        let ports = live_ports(&config, Arc::new(InMemoryQuotaStore::new())).unwrap();
        Self::new(config, ports)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request(Method::GET, uri, token, None)).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request(Method::POST, uri, token, Some(body))).await;
        (status, body)
    }

    /// Sign up and return the access token.
    pub async fn sign_up(&self, email: &str, username: &str) -> String {
        let (status, session) = self
            .post(
                "/api/auth/signup",
                None,
                json!({"email": email, "password": "Passw0rd!", "username": username}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{session}");
        session["access_token"].as_str().unwrap().to_string()
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
