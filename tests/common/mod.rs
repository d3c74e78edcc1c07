//! 模拟的游戏托管后端（axum），用于 HTTP 层的端到端测试

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Json;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use game_uploader::api::{ApiClient, StaticCredentials};
use game_uploader::config::UploadConfig;
use game_uploader::Navigator;

/// 收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Default)]
struct Backend {
    requests: Vec<RecordedRequest>,
    games: Vec<Value>,
    users: Vec<Value>,
    statuses: VecDeque<Value>,
    zip: Option<Value>,
    forced_status: Option<(StatusCode, String)>,
    storage_status: Option<StatusCode>,
    stored_objects: HashMap<String, Vec<u8>>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Backend>>,
    addr: Option<SocketAddr>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let mut backend = FakeBackend::default();
        backend.inner.lock().unwrap().next_id = 1;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        backend.addr = Some(listener.local_addr().unwrap());

        let app = router(backend.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        backend
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr.expect("backend not started"))
    }

    pub fn client(&self, token: &str) -> (ApiClient, Arc<StaticCredentials>, Arc<RecordingNavigator>) {
        let credentials = Arc::new(StaticCredentials::new(token));
        let navigator = Arc::new(RecordingNavigator::default());
        let client = ApiClient::new(&self.base_url(), credentials.clone(), navigator.clone()).unwrap();
        (client, credentials, navigator)
    }

    pub fn seed_games(&self, count: u64) {
        let mut backend = self.inner.lock().unwrap();
        for _ in 0..count {
            let id = backend.next_id;
            backend.next_id += 1;
            backend.games.push(game_json(id, &format!("Game {id}")));
        }
    }

    pub fn seed_user(&self, user: Value) {
        self.inner.lock().unwrap().users.push(user);
    }

    pub fn script_statuses(&self, statuses: Vec<Value>) {
        self.inner.lock().unwrap().statuses = statuses.into();
    }

    pub fn set_zip(&self, zip: Value) {
        self.inner.lock().unwrap().zip = Some(zip);
    }

    /// 所有 API 请求都返回指定状态码
    pub fn force_status(&self, status: StatusCode, body: &str) {
        self.inner.lock().unwrap().forced_status = Some((status, body.to_string()));
    }

    pub fn set_storage_status(&self, status: StatusCode) {
        self.inner.lock().unwrap().storage_status = Some(status);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && request.path == path)
            .collect()
    }

    pub fn stored_object(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().stored_objects.get(key).cloned()
    }
}

/// 记录跳转路径
#[derive(Default)]
pub struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str, _state: Option<Value>) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}

pub fn fast_config() -> UploadConfig {
    UploadConfig {
        poll_interval: Duration::from_millis(20),
        poll_backoff_max: Duration::from_millis(100),
        request_timeout: Duration::from_secs(5),
        transfer_timeout: Duration::from_secs(10),
        processing_timeout: Duration::from_secs(10),
        chunk_size: 16,
        ..Default::default()
    }
}

pub fn status_json(game_status: &str, game_url: Option<&str>, error_message: Option<&str>) -> Value {
    json!({
        "id": 1,
        "gameStatus": game_status,
        "gameUrl": game_url,
        "errorMessage": error_message,
    })
}

pub fn game_json(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": "",
        "gameUrl": null,
        "thumbnailUrl": null,
        "category": "Puzzle",
        "tags": ["retro"],
        "playCount": 0,
        "averageRating": 0.0,
        "createdAt": "2024-05-01T12:00:00",
        "status": "DRAFT",
    })
}

fn router(backend: FakeBackend) -> Router {
    Router::new()
        .route("/api/games", get(list_games).post(create_game))
        .route("/api/games/{id}", axum::routing::delete(delete_game))
        .route("/api/games/{id}/update", put(update_game))
        .route("/api/games/{id}/upload", post(presign))
        .route("/api/games/{id}/upload/complete", post(complete_upload))
        .route("/api/games/{id}/status", get(game_status))
        .route("/api/games/{id}/zip-status", get(zip_status))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", get(get_user).delete(delete_user))
        .route("/storage/{key}", put(put_object))
        .layer(middleware::from_fn_with_state(backend.clone(), record_request))
        .with_state(backend)
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

async fn record_request(State(backend): State<FakeBackend>, request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let forced = {
        let mut inner = backend.inner.lock().unwrap();
        inner.requests.push(RecordedRequest {
            method: request.method().to_string(),
            path: path.clone(),
            query: request.uri().query().map(String::from),
            authorization: header_value(request.headers(), header::AUTHORIZATION),
            content_type: header_value(request.headers(), header::CONTENT_TYPE),
        });
        inner.forced_status.clone()
    };

    match forced {
        Some((status, body)) if !path.starts_with("/storage") => (status, body).into_response(),
        _ => next.run(request).await,
    }
}

fn page(items: Vec<Value>, params: &HashMap<String, String>) -> Value {
    let page: usize = params.get("page").and_then(|value| value.parse().ok()).unwrap_or(0);
    let size: usize = params.get("size").and_then(|value| value.parse().ok()).unwrap_or(10);
    let total = items.len();
    let content: Vec<Value> = items.into_iter().skip(page * size).take(size).collect();

    json!({
        "content": content,
        "totalPages": total.div_ceil(size.max(1)),
        "totalElements": total,
        "number": page,
        "size": size,
    })
}

async fn list_games(State(backend): State<FakeBackend>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let games = backend.inner.lock().unwrap().games.clone();
    let games = match params.get("search") {
        Some(search) => games
            .into_iter()
            .filter(|game| game["name"].as_str().is_some_and(|name| name.contains(search.as_str())))
            .collect(),
        None => games,
    };
    Json(page(games, &params))
}

async fn create_game(State(backend): State<FakeBackend>, Json(body): Json<Value>) -> Json<Value> {
    let mut inner = backend.inner.lock().unwrap();
    let id = inner.next_id;
    inner.next_id += 1;

    let mut game = game_json(id, body["name"].as_str().unwrap_or_default());
    game["description"] = body["description"].clone();
    game["tags"] = body["tags"].clone();
    inner.games.push(game.clone());
    Json(game)
}

async fn update_game(Path(id): Path<u64>, Json(body): Json<Value>) -> Json<Value> {
    Json(game_json(id, body["name"].as_str().unwrap_or_default()))
}

async fn delete_game(State(backend): State<FakeBackend>, Path(id): Path<u64>) -> StatusCode {
    backend.inner.lock().unwrap().games.retain(|game| game["id"] != id);
    StatusCode::NO_CONTENT
}

async fn presign(State(backend): State<FakeBackend>, Path(id): Path<u64>) -> Json<Value> {
    Json(json!({ "uploadUrl": format!("{}/storage/{id}.zip?signature=test", backend.base_url()) }))
}

async fn complete_upload(Path(_id): Path<u64>) -> StatusCode {
    StatusCode::OK
}

async fn game_status(State(backend): State<FakeBackend>, Path(_id): Path<u64>) -> Json<Value> {
    let next = backend.inner.lock().unwrap().statuses.pop_front();
    Json(next.unwrap_or_else(|| status_json("PROCESSING", None, None)))
}

async fn zip_status(State(backend): State<FakeBackend>, Path(_id): Path<u64>) -> Json<Value> {
    let zip = backend.inner.lock().unwrap().zip.clone();
    Json(zip.unwrap_or_else(|| json!({ "exists": false })))
}

async fn put_object(State(backend): State<FakeBackend>, Path(key): Path<String>, body: Bytes) -> StatusCode {
    let mut inner = backend.inner.lock().unwrap();
    if let Some(status) = inner.storage_status {
        return status;
    }
    inner.stored_objects.insert(key, body.to_vec());
    StatusCode::OK
}

async fn list_users(State(backend): State<FakeBackend>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let users = backend.inner.lock().unwrap().users.clone();
    Json(page(users, &params))
}

async fn get_user(State(backend): State<FakeBackend>, Path(id): Path<u64>) -> Response {
    let user = backend
        .inner
        .lock()
        .unwrap()
        .users
        .iter()
        .find(|user| user["id"] == id)
        .cloned();

    match user {
        Some(user) => Json(user).into_response(),
        None => (StatusCode::NOT_FOUND, "User not found").into_response(),
    }
}

async fn delete_user(State(backend): State<FakeBackend>, Path(id): Path<u64>) -> StatusCode {
    backend.inner.lock().unwrap().users.retain(|user| user["id"] != id);
    StatusCode::NO_CONTENT
}
