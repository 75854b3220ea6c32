//! Test fixtures: a recording stand-in for the upstream services and a
//! portal served on an ephemeral port.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::gateway::ApiClient;
use crate::models::{AppState, Role, UserProfile};
use crate::notify::{Toast, ToastHub};
use crate::session::{self, MemorySessionStore};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    /// Parsed JSON body, `Null` when empty or not JSON.
    pub body: Value,
    pub raw: String,
}

#[derive(Default)]
struct Replies {
    queue: VecDeque<(u16, Value)>,
    /// The only reply left has been served at least once.
    sticky: bool,
}

#[derive(Default)]
struct Inner {
    responses: HashMap<(Method, String), Replies>,
    requests: Vec<Recorded>,
}

#[derive(Clone)]
pub struct MockBackend {
    url: String,
    inner: Arc<Mutex<Inner>>,
}

async fn handle(
    State(inner): State<Arc<Mutex<Inner>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let recorded = Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        raw: String::from_utf8_lossy(&body).into_owned(),
    };

    let mut inner = inner.lock().unwrap();
    inner.requests.push(recorded);

    let key = (method, uri.path().to_string());
    let reply = inner.responses.get_mut(&key).and_then(|replies| {
        if replies.queue.len() > 1 {
            replies.queue.pop_front()
        } else {
            // the last queued reply keeps answering
            replies.sticky = true;
            replies.queue.front().cloned()
        }
    });

    match reply {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), Json(body)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("no mock for {} {}", key.0, key.1)})),
        )
            .into_response(),
    }
}

impl MockBackend {
    pub async fn start() -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let app = Router::new().fallback(handle).with_state(inner.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{addr}"),
            inner,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Queue a reply. Replies for the same route are served in order; one
    /// queued after the last reply was already served replaces it.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        let mut inner = self.inner.lock().unwrap();
        let replies = inner.responses.entry((method, path.to_string())).or_default();
        if replies.sticky {
            replies.queue.clear();
            replies.sticky = false;
        }
        replies.queue.push_back((status, body));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

/// A logged-in test user.
pub struct TestSession {
    pub token: String,
    pub session_id: Uuid,
}

pub struct TestApp {
    pub url: String,
    pub state: AppState,
    /// Does not follow redirects, so guard responses stay visible.
    pub http: reqwest::Client,
}

pub async fn spawn_app(mock: &MockBackend) -> TestApp {
    let state = AppState {
        sessions: Arc::new(MemorySessionStore::new()),
        toasts: Arc::new(ToastHub::new(Duration::from_secs(60))),
        backend: ApiClient::new(mock.url()),
        chatbot: ApiClient::new(mock.url()),
        session_ttl_hours: 24,
    };

    let app = crate::routes::router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        url: format!("http://{addr}"),
        state,
        http: reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// Open a session directly in the store, skipping the login round trip.
    pub async fn login_as(&self, role: Role) -> TestSession {
        let slug = role.as_str().to_lowercase();
        let user = UserProfile {
            id: format!("{slug}-1"),
            name: format!("Test {}", role.label()),
            email: format!("{slug}@clinic.test"),
            phone: None,
            role,
        };
        let (token, session) = session::open(
            self.state.sessions.as_ref(),
            self.state.session_ttl_hours,
            format!("upstream-{slug}"),
            user,
        )
        .await
        .unwrap();
        TestSession {
            token,
            session_id: session.session_id,
        }
    }

    pub fn get(&self, path: &str, s: &TestSession) -> reqwest::RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(&s.token)
    }

    pub fn post(&self, path: &str, s: &TestSession) -> reqwest::RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(&s.token)
    }

    pub fn toasts(&self, s: &TestSession) -> Vec<Toast> {
        self.state.toasts.for_session(s.session_id).list()
    }

    pub fn toast_messages(&self, s: &TestSession) -> Vec<String> {
        self.toasts(s).into_iter().map(|t| t.message).collect()
    }
}
