//! 测试公共模块
//! 在随机端口上运行一个最小化的后端桩服务，供集成测试使用

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use health_map_client::{
    auth::SessionProvider,
    client::ApiClient,
    config::ApiConfig,
    services::{AuthService, GamificationService, MapsService},
    store::{CredentialStore, MemoryStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY},
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StubUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

impl StubUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "date_joined": "2024-05-01T09:30:00Z",
            "last_login": null
        })
    }
}

/// 后端桩服务状态
#[derive(Default)]
pub struct BackendState {
    users: Mutex<HashMap<String, StubUser>>,
    access_tokens: Mutex<HashMap<String, String>>,
    refresh_tokens: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,

    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub authenticated_calls: AtomicUsize,
    pub unauthorized_calls: AtomicUsize,

    /// /auth/me/ 返回 500
    pub profile_unavailable: AtomicBool,
    /// 所有访问令牌都被拒绝（即使刚刚刷新）
    pub reject_all_access: AtomicBool,
    /// 刷新时轮换刷新令牌
    pub rotate_refresh: AtomicBool,
    /// 刷新接口的人为延迟
    pub refresh_delay_ms: AtomicU64,
    /// 登录请求在 release_login 通知前挂起
    pub hold_login: AtomicBool,
    pub release_login: Notify,

    /// 受保护接口最近一次收到的 Authorization 头
    pub last_authorization: Mutex<Option<String>>,
}

impl BackendState {
    pub fn add_user(&self, username: &str, password: &str, is_staff: bool) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.users.lock().unwrap().insert(
            username.to_string(),
            StubUser {
                id,
                username: username.to_string(),
                email: format!("{}@example.org", username),
                password: password.to_string(),
                first_name: String::new(),
                last_name: String::new(),
                is_staff,
            },
        );
    }

    pub fn issue_access(&self, username: &str) -> String {
        let token = format!("access-{}", Uuid::new_v4());
        self.access_tokens
            .lock()
            .unwrap()
            .insert(token.clone(), username.to_string());
        token
    }

    pub fn issue_refresh(&self, username: &str) -> String {
        let token = format!("refresh-{}", Uuid::new_v4());
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(token.clone(), username.to_string());
        token
    }

    /// 使访问令牌过期
    pub fn expire_access(&self, token: &str) {
        self.access_tokens.lock().unwrap().remove(token);
    }

    /// 吊销刷新令牌
    pub fn revoke_refresh(&self, token: &str) {
        self.refresh_tokens.lock().unwrap().remove(token);
    }

    pub fn is_valid_access(&self, token: &str) -> bool {
        self.access_tokens.lock().unwrap().contains_key(token)
    }

    fn user(&self, username: &str) -> Option<StubUser> {
        self.users.lock().unwrap().get(username).cloned()
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<StubUser, Response> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_authorization.lock().unwrap() = authorization.clone();

        let username = authorization
            .as_deref()
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|_| !self.reject_all_access.load(Ordering::SeqCst))
            .and_then(|token| self.access_tokens.lock().unwrap().get(token).cloned());

        match username.and_then(|u| self.user(&u)) {
            Some(user) => {
                self.authenticated_calls.fetch_add(1, Ordering::SeqCst);
                Ok(user)
            }
            None => {
                self.unauthorized_calls.fetch_add(1, Ordering::SeqCst);
                Err(error(
                    StatusCode::UNAUTHORIZED,
                    json!({
                        "detail": "Given token not valid for any token type",
                        "code": "token_not_valid"
                    }),
                ))
            }
        }
    }
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

macro_rules! authenticated {
    ($state:expr, $headers:expr) => {
        match $state.authenticate(&$headers) {
            Ok(user) => user,
            Err(response) => return response,
        }
    };
}

type SharedState = State<Arc<BackendState>>;

async fn login(State(state): SharedState, Json(body): Json<Value>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if state.hold_login.load(Ordering::SeqCst) {
        state.release_login.notified().await;
    }

    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    match state.user(username) {
        Some(user) if user.password == password => {
            let access = state.issue_access(username);
            let refresh = state.issue_refresh(username);
            Json(json!({
                "user": user.to_json(),
                "tokens": {"access": access, "refresh": refresh},
                "message": "Login successful"
            }))
            .into_response()
        }
        _ => error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "No active account found with the given credentials"}),
        ),
    }
}

async fn register(State(state): SharedState, Json(body): Json<Value>) -> Response {
    state.register_calls.fetch_add(1, Ordering::SeqCst);

    let username = body["username"].as_str().unwrap_or_default().to_string();
    if state.user(&username).is_some() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"username": ["A user with that username already exists."]}),
        );
    }

    state.add_user(&username, body["password"].as_str().unwrap_or_default(), false);
    let user = state.user(&username).unwrap();
    let access = state.issue_access(&username);
    let refresh = state.issue_refresh(&username);

    (
        StatusCode::CREATED,
        Json(json!({
            "user": user.to_json(),
            "tokens": {"access": access, "refresh": refresh},
            "message": "Registration successful"
        })),
    )
        .into_response()
}

async fn refresh_token(State(state): SharedState, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let refresh = body["refresh"].as_str().unwrap_or_default().to_string();
    let owner = state.refresh_tokens.lock().unwrap().get(&refresh).cloned();

    match owner {
        Some(username) => {
            let access = state.issue_access(&username);
            if state.rotate_refresh.load(Ordering::SeqCst) {
                state.revoke_refresh(&refresh);
                let rotated = state.issue_refresh(&username);
                Json(json!({"access": access, "refresh": rotated})).into_response()
            } else {
                Json(json!({"access": access})).into_response()
            }
        }
        None => error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        ),
    }
}

async fn me(State(state): SharedState, headers: HeaderMap) -> Response {
    let user = authenticated!(state, headers);
    if state.profile_unavailable.load(Ordering::SeqCst) {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "Profile service unavailable"}),
        );
    }
    Json(json!({"user": user.to_json(), "is_staff": user.is_staff})).into_response()
}

async fn get_profile(State(state): SharedState, headers: HeaderMap) -> Response {
    let user = authenticated!(state, headers);
    Json(user.to_json()).into_response()
}

async fn update_profile(
    State(state): SharedState,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = authenticated!(state, headers);
    let mut users = state.users.lock().unwrap();
    let stored = users.get_mut(&user.username).unwrap();
    if let Some(first) = body["first_name"].as_str() {
        stored.first_name = first.to_string();
    }
    if let Some(last) = body["last_name"].as_str() {
        stored.last_name = last.to_string();
    }
    if let Some(email) = body["email"].as_str() {
        stored.email = email.to_string();
    }
    Json(stored.to_json()).into_response()
}

async fn change_password(
    State(state): SharedState,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = authenticated!(state, headers);
    if body["old_password"].as_str() != Some(user.password.as_str()) {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"old_password": ["Wrong password."]}),
        );
    }
    let new_password = body["new_password"].as_str().unwrap_or_default().to_string();
    state
        .users
        .lock()
        .unwrap()
        .get_mut(&user.username)
        .unwrap()
        .password = new_password;
    Json(json!({"message": "Password updated successfully"})).into_response()
}

async fn categories(State(state): SharedState, headers: HeaderMap) -> Response {
    authenticated!(state, headers);
    Json(json!({
        "count": 2,
        "next": null,
        "previous": null,
        "results": [
            {"id": 1, "name": "Clinic", "description": "Primary care", "icon": "hospital"},
            {"id": 2, "name": "Pharmacy"}
        ]
    }))
    .into_response()
}

async fn submit_poi(
    State(state): SharedState,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = authenticated!(state, headers);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 42,
            "name": body["name"],
            "description": body["description"],
            "category": body["category"],
            "latitude": body["latitude"],
            "longitude": body["longitude"],
            "status": "pending",
            "submitted_by": user.username
        })),
    )
        .into_response()
}

async fn geocode(
    State(state): SharedState,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    authenticated!(state, headers);
    let address = params.get("address").cloned().unwrap_or_default();
    Json(json!([
        {"display_name": format!("{}, Amsterdam", address), "latitude": 52.37, "longitude": 4.89}
    ]))
    .into_response()
}

async fn bulk_upload(
    State(state): SharedState,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    authenticated!(state, headers);

    let mut rows = 0u32;
    let mut file_name = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        file_name = field.file_name().map(str::to_string);
        let text = field.text().await.unwrap_or_default();
        rows = text.lines().skip(1).filter(|l| !l.trim().is_empty()).count() as u32;
    }

    match file_name {
        Some(_) => Json(json!({"created": rows, "failed": 0, "errors": []})).into_response(),
        None => error(
            StatusCode::BAD_REQUEST,
            json!({"file": ["No file was submitted."]}),
        ),
    }
}

async fn pending_submissions(State(state): SharedState, headers: HeaderMap) -> Response {
    let user = authenticated!(state, headers);
    if !user.is_staff {
        return error(
            StatusCode::FORBIDDEN,
            json!({"detail": "You do not have permission to perform this action."}),
        );
    }
    Json(json!([
        {"id": 7, "name": "Night pharmacy", "latitude": 52.1, "longitude": 4.3, "status": "pending"}
    ]))
    .into_response()
}

async fn moderate(
    State(state): SharedState,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let user = authenticated!(state, headers);
    if !user.is_staff {
        return error(
            StatusCode::FORBIDDEN,
            json!({"detail": "You do not have permission to perform this action."}),
        );
    }
    let status = match body["decision"].as_str() {
        Some("approve") => "approved",
        Some("reject") => "rejected",
        _ => return error(StatusCode::BAD_REQUEST, json!({"decision": ["Invalid decision."]})),
    };
    Json(json!({
        "id": id,
        "name": "Night pharmacy",
        "latitude": 52.1,
        "longitude": 4.3,
        "status": status,
        "verdict": body["reason"]
    }))
    .into_response()
}

async fn leaderboard(
    State(state): SharedState,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    authenticated!(state, headers);
    let mut entries = vec![json!({"rank": 1, "username": "alice", "points": 120, "level": 3})];
    if params.get("period").map(String::as_str) != Some("weekly") {
        entries.push(json!({"rank": 2, "username": "bob", "points": 95}));
    }
    Json(Value::Array(entries)).into_response()
}

async fn gamification_profile(State(state): SharedState, headers: HeaderMap) -> Response {
    let user = authenticated!(state, headers);
    Json(json!({
        "username": user.username,
        "points": 120,
        "level": 3,
        "reputation": 17,
        "submissions_count": 4,
        "reviews_count": 9
    }))
    .into_response()
}

async fn public_profile(
    State(state): SharedState,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Response {
    authenticated!(state, headers);
    Json(json!({"username": username, "points": 15, "level": 1})).into_response()
}

async fn submit_review(
    State(state): SharedState,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let user = authenticated!(state, headers);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 5,
            "poi": body["poi"],
            "author": user.username,
            "rating": body["rating"],
            "comment": body["comment"]
        })),
    )
        .into_response()
}

async fn redeem_reward(
    State(state): SharedState,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    authenticated!(state, headers);
    Json(json!({"reward": id, "remaining_points": 80, "message": "Enjoy!"})).into_response()
}

async fn teapot() -> Response {
    error(
        StatusCode::IM_A_TEAPOT,
        json!({"error": "I'm a teapot", "detail": "ignored"}),
    )
}

async fn unavailable() -> Response {
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/auth/login/", post(login))
        .route("/auth/register/", post(register))
        .route("/auth/token/refresh/", post(refresh_token))
        .route("/auth/me/", get(me))
        .route("/auth/profile/", get(get_profile).put(update_profile))
        .route("/auth/change-password/", post(change_password))
        .route("/maps/categories/", get(categories))
        .route("/maps/pois/", post(submit_poi))
        .route("/maps/geocode/", get(geocode))
        .route("/maps/bulk-upload/", post(bulk_upload))
        .route("/maps/submissions/pending/", get(pending_submissions))
        .route("/maps/submissions/{id}/moderate/", post(moderate))
        .route("/gamification/profile/", get(gamification_profile))
        .route("/gamification/profiles/{username}/", get(public_profile))
        .route("/gamification/reviews/", post(submit_review))
        .route("/gamification/leaderboard/", get(leaderboard))
        .route("/gamification/rewards/{id}/redeem/", post(redeem_reward))
        .route("/diagnostics/teapot/", get(teapot))
        .route("/diagnostics/unavailable/", get(unavailable))
        .with_state(state)
}

/// 运行中的后端桩服务
pub struct TestBackend {
    pub url: String,
    pub state: Arc<BackendState>,
}

/// 启动后端桩服务，预置用户 alice（普通用户）和 moderator（审核员）
pub async fn spawn_backend() -> TestBackend {
    let state = Arc::new(BackendState::default());
    state.add_user("alice", "secret", false);
    state.add_user("moderator", "moderate-me", true);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test backend");
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test backend failed");
    });

    TestBackend {
        url: format!("http://{}", addr),
        state,
    }
}

/// 创建测试客户端（内存凭据存储）
pub fn create_client(url: &str) -> (Arc<MemoryStore>, ApiClient) {
    let store = Arc::new(MemoryStore::new());
    let session = Arc::new(SessionProvider::new(store.clone()));
    let mut config = ApiConfig::new(url);
    config.timeout_secs = Some(5);
    let client = ApiClient::new(&config, session).expect("Failed to create client");
    (store, client)
}

/// 创建认证服务
pub fn create_auth_service(url: &str) -> (Arc<MemoryStore>, Arc<AuthService>) {
    let (store, client) = create_client(url);
    (store, Arc::new(AuthService::new(client)))
}

pub fn create_services(url: &str) -> (Arc<MemoryStore>, Arc<AuthService>, MapsService, GamificationService) {
    let (store, client) = create_client(url);
    let auth = Arc::new(AuthService::new(client.clone()));
    (
        store,
        auth,
        MapsService::new(client.clone()),
        GamificationService::new(client),
    )
}

/// 直接写入存储的会话
pub fn seed_session(store: &MemoryStore, access: &str, refresh: Option<&str>) {
    store.set(ACCESS_TOKEN_KEY, access).unwrap();
    if let Some(refresh) = refresh {
        store.set(REFRESH_TOKEN_KEY, refresh).unwrap();
    }
}

pub fn stored_tokens(store: &MemoryStore) -> (Option<String>, Option<String>) {
    (store.get(ACCESS_TOKEN_KEY), store.get(REFRESH_TOKEN_KEY))
}
