//!
//! nexus backend emulator
//! ----------------------
//! Axum server exposing a [`MemoryStore`] through the Firebase-compatible REST
//! surface the portal's [`crate::store::RestStore`] and
//! [`crate::identity::RestBackendAuth`] speak.
//!
//! Responsibilities:
//! - `POST /v1/accounts:signUp` issues anonymous identities.
//! - `GET|PUT|POST|PATCH|DELETE /{path}.json?auth=TOKEN` read and write the tree
//!   as the identity behind `TOKEN`, subject to the store's access rules.
//! - `GET` with `Accept: text/event-stream` streams a `put` event with the full
//!   value at the path on every change.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::stream;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::identity::mint_identity;
use crate::store::{DocPath, DocumentStore, IdToken, MemoryStore, Rules, StoreError};

/// Shared emulator state injected into all handlers.
#[derive(Clone)]
pub struct EmulatorState {
    store: MemoryStore,
    /// Issued token -> identity.
    tokens: Arc<RwLock<HashMap<String, IdToken>>>,
}

impl EmulatorState {
    pub fn new(store: MemoryStore) -> Self {
        Self { store, tokens: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn store(&self) -> &MemoryStore { &self.store }

    /// Client handle acting as the holder of `token`. Unknown tokens act signed out.
    fn client(&self, token: Option<&String>) -> MemoryStore {
        let handle = self.store.connect();
        let who = token.and_then(|t| self.tokens.read().get(t).cloned());
        handle.set_credentials(who);
        handle
    }
}

pub fn router(state: EmulatorState) -> Router {
    Router::new()
        .route("/v1/accounts:signUp", post(sign_up))
        .fallback(document)
        .with_state(state)
}

/// Bind `127.0.0.1:{port}` and serve until the process ends.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let rules = match &cfg.emulator_rules {
        Some(p) => {
            let text = std::fs::read_to_string(p).map_err(|e| anyhow::anyhow!("{}: {e}", p.display()))?;
            Rules::from_json(&text)?
        }
        None => Rules::default(),
    };
    let store = match &cfg.emulator_snapshot {
        Some(p) => MemoryStore::open(p, rules)?,
        None => MemoryStore::with_rules(rules),
    };
    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.emulator_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "startup", "nexus emulator listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(EmulatorState::new(store))).await?;
    Ok(())
}

/// Serve `state` on an already bound listener in the background.
pub fn spawn(listener: tokio::net::TcpListener, state: EmulatorState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            warn!("emulator stopped: {e}");
        }
    })
}

async fn sign_up(State(state): State<EmulatorState>) -> impl IntoResponse {
    let id = mint_identity();
    state.tokens.write().insert(id.token.clone(), id.clone());
    debug!(uid = %id.uid, "anonymous sign-up");
    Json(json!({
        "kind": "identitytoolkit#SignupNewUserResponse",
        "idToken": id.token,
        "localId": id.uid,
        "refreshToken": "",
        "expiresIn": "3600",
    }))
}

fn error_response(err: &StoreError) -> Response {
    let (status, msg) = match err {
        StoreError::PermissionDenied { .. } => (StatusCode::UNAUTHORIZED, "Permission denied".to_string()),
        StoreError::InvalidPath(_) | StoreError::Decode(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    (status, Json(json!({ "error": msg }))).into_response()
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

/// `/a/b%20c.json` -> `a/b c`.
fn doc_path_of(uri: &Uri) -> Result<DocPath, StoreError> {
    let raw = uri.path();
    let Some(stripped) = raw.strip_suffix(".json") else {
        return Err(StoreError::InvalidPath(format!("'{raw}' does not end in .json")));
    };
    let mut path = DocPath::root();
    for seg in stripped.split('/').filter(|s| !s.is_empty()) {
        let decoded = urlencoding::decode(seg).map_err(|e| StoreError::InvalidPath(e.to_string()))?;
        path = path.child(&decoded)?;
    }
    Ok(path)
}

fn wants_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

fn parse_body(body: &Bytes) -> Result<Value, StoreError> {
    if body.is_empty() { return Ok(Value::Null); }
    Ok(serde_json::from_slice(body)?)
}

async fn document(
    State(state): State<EmulatorState>,
    method: Method,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = match doc_path_of(&uri) {
        Ok(p) => p,
        Err(e) => return (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    };
    let client = state.client(params.get("auth"));
    debug!(%method, %path, signed_in = client.credentials().is_some(), "emulator request");

    let result = match method {
        Method::GET if wants_stream(&headers) => return stream_path(client, path).await,
        Method::GET => client.get(&path).await,
        Method::PUT => match parse_body(&body) {
            Ok(v) => client.set(&path, v.clone()).await.map(|_| v),
            Err(e) => Err(e),
        },
        Method::POST => match parse_body(&body) {
            Ok(v) => client.push(&path, v).await.map(|name| json!({ "name": name })),
            Err(e) => Err(e),
        },
        Method::PATCH => match parse_body(&body) {
            Ok(Value::Object(fields)) => {
                let echo = Value::Object(fields.clone());
                client.update(&path, fields).await.map(|_| echo)
            }
            Ok(_) => return bad_request("PATCH body must be an object"),
            Err(e) => Err(e),
        },
        Method::DELETE => client.remove(&path).await.map(|_| Value::Null),
        _ => return (StatusCode::METHOD_NOT_ALLOWED, Json(json!({ "error": "method not allowed" }))).into_response(),
    };
    match result {
        Ok(v) => Json(v).into_response(),
        Err(e) => error_response(&e),
    }
}

fn put_event(value: &Value) -> Event {
    Event::default().event("put").data(json!({ "path": "/", "data": value }).to_string())
}

async fn stream_path(client: MemoryStore, path: DocPath) -> Response {
    let sub = match client.subscribe(&path).await {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    let first = put_event(&sub.current());
    let events = stream::unfold((sub, Some(first)), |(mut sub, pending)| async move {
        if let Some(ev) = pending {
            return Some((Ok::<Event, Infallible>(ev), (sub, None)));
        }
        match sub.changed().await {
            Ok(v) => Some((Ok(put_event(&v)), (sub, None))),
            Err(_) => None,
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_decoded() {
        let uri: Uri = "/academyData/p1.json?auth=x".parse().unwrap();
        assert_eq!(doc_path_of(&uri).unwrap().to_string(), "academyData/p1");
        let root: Uri = "/.json".parse().unwrap();
        assert!(doc_path_of(&root).unwrap().is_root());
        let spaced: Uri = "/a/b%20c.json".parse().unwrap();
        assert_eq!(doc_path_of(&spaced).unwrap().segments()[1], "b c");
        let bad: Uri = "/academyData".parse().unwrap();
        assert!(doc_path_of(&bad).is_err());
    }

    #[test]
    fn unknown_tokens_act_signed_out() {
        let state = EmulatorState::new(MemoryStore::new());
        let id = mint_identity();
        state.tokens.write().insert(id.token.clone(), id.clone());
        assert_eq!(state.client(Some(&id.token)).credentials(), Some(id));
        assert_eq!(state.client(Some(&"forged".to_string())).credentials(), None);
        assert_eq!(state.client(None).credentials(), None);
    }
}
