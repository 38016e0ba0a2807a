//! Hierarchical real-time document store.
//!
//! The portal never talks to a concrete database directly; it goes through the
//! [`DocumentStore`] trait. Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: in-process tree with push subscriptions, declarative access
//!   rules and optional JSON snapshot persistence. Backs tests and the emulator.
//! - [`RestStore`]: client for a Firebase-compatible REST surface, with
//!   server-sent-event streaming for subscriptions.
//!
//! Paths used by the portal:
//! - `academyData/{subject}`: chapters of a live subject
//! - `archiveData/{subject}`: archived chapters of a subject
//! - `access/students/{key}`, `access/admins/{key}`: login accounts
//! - `developerInfo`: singleton profile shown in the sidebar
//! - `activityLogs/{key}`: append-only activity records

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;

mod path;
pub mod tree;
pub mod rules;
pub mod memory;
pub mod rest;

pub use path::DocPath;
pub use rules::{Access, Rule, Rules};
pub use memory::MemoryStore;
pub use rest::RestStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied at '{path}'")]
    PermissionDenied { path: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed data: {0}")]
    Decode(String),

    #[error("storage i/o: {0}")]
    Io(String),

    #[error("subscription closed")]
    Closed,
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }

    pub fn denied(path: &DocPath) -> Self {
        StoreError::PermissionDenied { path: path.to_string() }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { StoreError::Decode(e.to_string()) }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identity presented to the store with every request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IdToken {
    pub uid: String,
    pub token: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Value at `path`, `Null` when absent.
    async fn get(&self, path: &DocPath) -> StoreResult<Value>;

    /// Replace the value at `path`. Writing `Null` deletes.
    async fn set(&self, path: &DocPath, value: Value) -> StoreResult<()>;

    /// Multi-path update below `path`; keys may contain `/`. Applied atomically.
    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> StoreResult<()>;

    /// Append `value` under a generated, time-ordered key and return the key.
    async fn push(&self, path: &DocPath, value: Value) -> StoreResult<String>;

    async fn remove(&self, path: &DocPath) -> StoreResult<()> {
        self.set(path, Value::Null).await
    }

    /// Live view of `path`. Dropping the subscription unsubscribes.
    async fn subscribe(&self, path: &DocPath) -> StoreResult<Subscription>;

    /// Credentials used for subsequent requests from this handle.
    fn set_credentials(&self, token: Option<IdToken>);

    fn credentials(&self) -> Option<IdToken>;
}

/// Push-based view of one path. Always holds the latest value observed.
#[derive(Debug)]
pub struct Subscription {
    path: DocPath,
    rx: watch::Receiver<Value>,
    feeder: Option<tokio::task::JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(path: DocPath, rx: watch::Receiver<Value>) -> Self {
        Self { path, rx, feeder: None }
    }

    /// Subscription fed by a background task; the task is aborted on drop.
    pub(crate) fn with_feeder(path: DocPath, rx: watch::Receiver<Value>, feeder: tokio::task::JoinHandle<()>) -> Self {
        Self { path, rx, feeder: Some(feeder) }
    }

    pub fn path(&self) -> &DocPath { &self.path }

    pub fn current(&self) -> Value { self.rx.borrow().clone() }

    /// Wait for the next change and return the new value.
    pub async fn changed(&mut self) -> StoreResult<Value> {
        self.rx.changed().await.map_err(|_| StoreError::Closed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(h) = self.feeder.take() { h.abort(); }
    }
}

const PUSH_CHARS: &[u8] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

static LAST_PUSH: Mutex<(i64, [u8; 12])> = Mutex::new((0, [0u8; 12]));

/// 20-character key: 8 characters of millisecond timestamp followed by 12 random
/// characters. Keys generated in the same millisecond increment the random part,
/// so keys sort in creation order.
pub fn push_key() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_PUSH.lock();
    if now == last.0 {
        for i in (0..12).rev() {
            if last.1[i] < 63 { last.1[i] += 1; break; }
            last.1[i] = 0;
        }
    } else {
        let mut buf = [0u8; 12];
        let _ = getrandom::getrandom(&mut buf);
        for (slot, b) in last.1.iter_mut().zip(buf.iter()) { *slot = b % 64; }
        last.0 = now;
    }
    let mut out = String::with_capacity(20);
    let mut ts = now;
    let mut head = [0u8; 8];
    for slot in head.iter_mut().rev() {
        *slot = PUSH_CHARS[(ts % 64) as usize];
        ts /= 64;
    }
    out.extend(head.iter().map(|&c| c as char));
    out.extend(last.1.iter().map(|&i| PUSH_CHARS[i as usize] as char));
    out
}

/// Random URL-safe token (hex encoded).
pub fn random_token(bytes: usize) -> String {
    use std::fmt::Write as _;
    let mut buf = vec![0u8; bytes];
    let _ = getrandom::getrandom(&mut buf);
    let mut out = String::with_capacity(bytes * 2);
    for b in &buf { let _ = write!(&mut out, "{:02x}", b); }
    out
}
