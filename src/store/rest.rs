//! Client for a Firebase-compatible REST surface.
//!
//! Every node is addressable as `{base}/{path}.json`; the identity token travels in
//! the `auth` query parameter. Subscriptions open a `text/event-stream` response and
//! fold `put`/`patch` events into a local copy of the subtree.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::RwLock;
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{tree, DocPath, DocumentStore, IdToken, StoreError, StoreResult, Subscription};

#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base: String,
    credentials: Arc<RwLock<Option<IdToken>>>,
}

impl RestStore {
    pub fn new(base: &str) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base))
    }

    pub fn with_client(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            credentials: Arc::new(RwLock::new(None)),
        }
    }

    fn url(&self, path: &DocPath) -> String {
        let encoded: Vec<String> = path.segments().iter().map(|s| urlencoding::encode(s).into_owned()).collect();
        let mut url = format!("{}/{}.json", self.base, encoded.join("/"));
        if let Some(tok) = self.credentials.read().as_ref() {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(&tok.token));
        }
        url
    }

    async fn call(&self, method: Method, path: &DocPath, body: Option<Value>) -> StoreResult<Value> {
        let mut req = self.client.request(method.clone(), self.url(path));
        if let Some(b) = body { req = req.json(&b); }
        let resp = req.send().await.map_err(|e| StoreError::Network(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::denied(path));
        }
        let text = resp.text().await.map_err(|e| StoreError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Network(format!("{method} {path}: HTTP {status}: {text}")));
        }
        if text.trim().is_empty() { return Ok(Value::Null); }
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Deserialize)]
struct PushReply {
    name: String,
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Value> {
        self.call(Method::GET, path, None).await
    }

    async fn set(&self, path: &DocPath, value: Value) -> StoreResult<()> {
        if value.is_null() {
            self.call(Method::DELETE, path, None).await?;
        } else {
            self.call(Method::PUT, path, Some(value)).await?;
        }
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> StoreResult<()> {
        self.call(Method::PATCH, path, Some(Value::Object(fields))).await?;
        Ok(())
    }

    async fn push(&self, path: &DocPath, value: Value) -> StoreResult<String> {
        let reply = self.call(Method::POST, path, Some(value)).await?;
        let PushReply { name } = serde_json::from_value(reply)?;
        Ok(name)
    }

    async fn subscribe(&self, path: &DocPath) -> StoreResult<Subscription> {
        let resp = self
            .client
            .get(self.url(path))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::denied(path));
        }
        if !status.is_success() {
            return Err(StoreError::Network(format!("stream {path}: HTTP {status}")));
        }

        let mut body = Box::pin(resp.bytes_stream());
        let mut parser = SseParser::default();
        let mut current = Value::Null;

        // Seed with the first full `put` so callers start from real data.
        'seed: loop {
            let Some(chunk) = body.next().await else { return Err(StoreError::Closed); };
            let chunk = chunk.map_err(|e| StoreError::Network(e.to_string()))?;
            let mut seeded = false;
            for ev in parser.feed(&chunk) {
                match apply_event(&mut current, &ev)? {
                    Outcome::Changed => seeded = true,
                    Outcome::Ignored => {}
                    Outcome::Cancelled => return Err(StoreError::denied(path)),
                }
            }
            if seeded { break 'seed; }
        }

        let (tx, rx) = watch::channel(current.clone());
        let label = path.to_string();
        let feeder = tokio::spawn(async move {
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => { warn!("stream {label} interrupted: {e}"); break; }
                };
                for ev in parser.feed(&chunk) {
                    match apply_event(&mut current, &ev) {
                        Ok(Outcome::Changed) => { tx.send_replace(current.clone()); }
                        Ok(Outcome::Ignored) => {}
                        Ok(Outcome::Cancelled) => { warn!("stream {label} cancelled by server"); return; }
                        Err(e) => warn!("stream {label}: bad event: {e}"),
                    }
                }
            }
            debug!("stream {label} ended");
        });
        Ok(Subscription::with_feeder(path.clone(), rx, feeder))
    }

    fn set_credentials(&self, token: Option<IdToken>) {
        *self.credentials.write() = token;
    }

    fn credentials(&self) -> Option<IdToken> {
        self.credentials.read().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Events end at a blank line; comment
/// lines (leading `:`) are skipped.
#[derive(Default)]
pub(crate) struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            let Some((end, sep_len)) = find_event_end(&self.buf) else { break };
            let block: Vec<u8> = self.buf.drain(..end + sep_len).take(end).collect();
            let text = String::from_utf8_lossy(&block);
            let mut event = String::from("message");
            let mut data: Vec<&str> = Vec::new();
            for line in text.lines() {
                if line.starts_with(':') { continue; }
                let (field, val) = line.split_once(':').unwrap_or((line, ""));
                let val = val.strip_prefix(' ').unwrap_or(val);
                match field {
                    "event" => event = val.to_string(),
                    "data" => data.push(val),
                    _ => {}
                }
            }
            if !data.is_empty() {
                out.push(SseEvent { event, data: data.join("\n") });
            }
        }
        out
    }
}

fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Changed,
    Ignored,
    Cancelled,
}

#[derive(Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

pub(crate) fn apply_event(current: &mut Value, ev: &SseEvent) -> StoreResult<Outcome> {
    match ev.event.as_str() {
        "put" => {
            let p: StreamPayload = serde_json::from_str(&ev.data)?;
            let segs = tree::split_relative(&p.path)?;
            tree::set_at(current, &segs, p.data)?;
            Ok(Outcome::Changed)
        }
        "patch" => {
            let p: StreamPayload = serde_json::from_str(&ev.data)?;
            let segs = tree::split_relative(&p.path)?;
            let Value::Object(fields) = p.data else {
                return Err(StoreError::Decode("patch data must be an object".into()));
            };
            tree::update_at(current, &segs, &fields)?;
            Ok(Outcome::Changed)
        }
        "cancel" | "auth_revoked" => Ok(Outcome::Cancelled),
        _ => Ok(Outcome::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parser_handles_split_chunks_and_comments() {
        let mut p = SseParser::default();
        assert!(p.feed(b": keep\n\nevent: put\ndata: {\"path\":\"/\",").is_empty());
        let evs = p.feed(b"\"data\":{\"a\":1}}\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0].event, "put");
        assert_eq!(evs[1].event, "keep-alive");
    }

    #[test]
    fn put_and_patch_fold_into_value() {
        let mut v = Value::Null;
        let put = SseEvent { event: "put".into(), data: r#"{"path":"/","data":{"a":{"b":1}}}"#.into() };
        assert_eq!(apply_event(&mut v, &put).unwrap(), Outcome::Changed);
        let sub = SseEvent { event: "put".into(), data: r#"{"path":"/a/c","data":2}"#.into() };
        apply_event(&mut v, &sub).unwrap();
        let patch = SseEvent { event: "patch".into(), data: r#"{"path":"/a","data":{"b":null,"d":3}}"#.into() };
        apply_event(&mut v, &patch).unwrap();
        assert_eq!(v, json!({"a": {"c": 2, "d": 3}}));
    }

    #[test]
    fn cancel_and_keepalive_events() {
        let mut v = json!(1);
        let cancel = SseEvent { event: "cancel".into(), data: "null".into() };
        let keep = SseEvent { event: "keep-alive".into(), data: "null".into() };
        assert_eq!(apply_event(&mut v, &cancel).unwrap(), Outcome::Cancelled);
        assert_eq!(apply_event(&mut v, &keep).unwrap(), Outcome::Ignored);
        assert_eq!(v, json!(1));
    }

    #[test]
    fn urls_encode_segments_and_token() {
        let store = RestStore::with_client(reqwest::Client::new(), "http://localhost:9000/");
        store.set_credentials(Some(IdToken { uid: "u".into(), token: "a b".into() }));
        let url = store.url(&DocPath::parse("academyData/p1").unwrap());
        assert_eq!(url, "http://localhost:9000/academyData/p1.json?auth=a%20b");
        store.set_credentials(None);
        assert_eq!(store.url(&DocPath::root()), "http://localhost:9000/.json");
    }
}
