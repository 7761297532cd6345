#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use rym_core::api::{ApiRequest, ApiResponse, Transport, TransportError};
use rym_core::auth::{AuthError, Navigator};
use rym_core::credentials::{Credential, KeyValueStorage, MemoryStorage};
use rym_core::{ConfigProvider, RuntimeConfig, Session};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_line_number(true)
        .with_target(false)
        .with_file(true)
        .try_init();
}

pub const API_BASE: &str = "http://api.test/";
pub const CONFIG_URL: &str = "http://app.test/config.json";

pub fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        api_base_url: API_BASE.to_string(),
        identity_domain: "http://auth.test".to_string(),
        client_id: "client-123".to_string(),
        redirect_uri: "http://app.test/callback".to_string(),
        logout_redirect_uri: "http://app.test/".to_string(),
    }
}

pub fn runtime_config_json() -> Value {
    json!({
        "apiBaseUrl": API_BASE,
        "cognitoDomain": "http://auth.test",
        "cognitoClientId": "client-123",
        "redirectUri": "http://app.test/callback",
        "logoutUri": "http://app.test/"
    })
}

pub fn album_json(id: &str, title: &str, artist: &str, year: i32) -> Value {
    json!({
        "album_id": id,
        "title": title,
        "artist": artist,
        "year": year as f64,
        "cover": format!("https://img.test/{id}.jpg"),
        "genres": ["Rock"],
        "tracks": ["One", "Two"]
    })
}

/// `reviews` are `(user_id, rating, like_count)`.
pub fn aggregate_json(average: f64, count: u32, reviews: &[(&str, u32, u32)]) -> Value {
    let reviews: Vec<Value> = reviews
        .iter()
        .enumerate()
        .map(|(i, (user, rating, likes))| {
            json!({
                "user_id": user,
                "rating": rating,
                "comment": "",
                "timestamp": 1_700_000_000 + i as i64,
                "like_count": likes
            })
        })
        .collect();
    json!({
        "average_rating": average,
        "ratings_count": count,
        "reviews": reviews,
        "ranks": [{"year": 1997.0, "rank": 1.0}]
    })
}

pub fn credential(tag: &str) -> Credential {
    Credential {
        id_token: Some(format!("id-{tag}")),
        access_token: Some(format!("access-{tag}")),
        refresh_token: Some(format!("refresh-{tag}")),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

enum Reply {
    Respond(StatusCode, String),
    Fail,
}

/// Scripted backend.
///
/// Routes are keyed by method and URL path (no leading slash, query
/// ignored). Replies for a route are used in order and the last one
/// repeats. Unrouted requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: impl Into<String>) {
        let status = StatusCode::from_u16(status).unwrap();
        self.push(method, path, Reply::Respond(status, body.into()));
    }

    pub fn get_json(&self, path: &str, body: Value) {
        self.respond(Method::GET, path, 200, body.to_string());
    }

    pub fn post_ok(&self, path: &str) {
        self.respond(Method::POST, path, 200, json!({"message": "ok"}).to_string());
    }

    /// Fail the next request to `path` at the transport level.
    pub fn fail(&self, method: Method, path: &str) {
        self.push(method, path, Reply::Fail);
    }

    /// Hold the next request to `path` until the returned sender fires.
    pub fn pause(&self, path: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(path.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self, method: &Method, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method.clone(), path.to_string())) {
            Some(replies) if replies.len() > 1 => replies.pop_front().unwrap(),
            Some(replies) => match replies.front() {
                Some(Reply::Respond(status, body)) => Reply::Respond(*status, body.clone()),
                Some(Reply::Fail) => Reply::Fail,
                None => Reply::Respond(StatusCode::NOT_FOUND, String::new()),
            },
            None => Reply::Respond(
                StatusCode::NOT_FOUND,
                json!({"error": "not found"}).to_string(),
            ),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = Url::parse(&request.url).unwrap();
        let path = url.path().trim_start_matches('/').to_string();

        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.clone(),
            path: path.clone(),
            query: url.query().map(String::from),
            bearer: request.bearer.clone(),
            body: request.body.clone(),
        });

        let gate = self.gates.lock().unwrap().remove(&path);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        match self.next_reply(&request.method, &path) {
            Reply::Respond(status, body) => Ok(ApiResponse::new(status, body)),
            Reply::Fail => Err(TransportError::Request("connection refused".to_string())),
        }
    }
}

/// Records every navigation instead of opening a browser.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) -> Result<(), AuthError> {
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub struct TestEnv {
    pub transport: Arc<MockTransport>,
    pub storage: Arc<MemoryStorage>,
    pub navigator: Arc<RecordingNavigator>,
    pub session: Session,
}

impl TestEnv {
    /// A session with the runtime configuration already loaded.
    pub fn new() -> Self {
        tracing_init();
        let transport = MockTransport::new();
        let config = Arc::new(ConfigProvider::preloaded(
            transport.clone(),
            runtime_config(),
        ));
        Self::with_config(transport, config)
    }

    pub fn with_config(transport: Arc<MockTransport>, config: Arc<ConfigProvider>) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let session = Session::new(
            transport.clone(),
            config,
            storage.clone() as Arc<dyn KeyValueStorage>,
            navigator.clone(),
        );
        Self {
            transport,
            storage,
            navigator,
            session,
        }
    }

    pub fn sign_in(&self) {
        self.session.credentials.set(&credential("user")).unwrap();
    }
}
