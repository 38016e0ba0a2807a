//! Best-effort activity log under `activityLogs`.
//!
//! Writing a record must never hold up or fail the action it describes: every
//! failure is reported on the `activity` tracing target and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{alerts, AppResult};
use crate::identity::{ensure_anonymous, Action, BackendAuth, SessionContext};
use crate::model::ActivityRecord;
use crate::store::{DocPath, DocumentStore};

pub const LOG_ROOT: &str = "activityLogs";
pub const UNKNOWN_IP: &str = "unknown";

pub mod actions {
    pub const LOGIN: &str = "LOGIN";
    pub const LOGOUT: &str = "LOGOUT";
    pub const WATCH_VIDEO: &str = "WATCH_VIDEO";
    pub const OPEN_DOCUMENT: &str = "OPEN_DOCUMENT";
    pub const SAVE_SUBJECT: &str = "SAVE_SUBJECT";
    pub const ADD_CHAPTER: &str = "ADD_CHAPTER";
    pub const EDIT_CHAPTER: &str = "EDIT_CHAPTER";
    pub const DELETE_CHAPTER: &str = "DELETE_CHAPTER";
    pub const ARCHIVE_CHAPTER: &str = "ARCHIVE_CHAPTER";
    pub const ADD_USER: &str = "ADD_USER";
    pub const REMOVE_USER: &str = "REMOVE_USER";
    pub const UPDATE_PROFILE: &str = "UPDATE_PROFILE";
    pub const CLEAR_LOGS: &str = "CLEAR_LOGS";
}

#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Public address of this client, or [`UNKNOWN_IP`].
    async fn public_ip(&self) -> String;
}

#[derive(Deserialize)]
struct IpReply {
    ip: String,
}

/// Looks the address up with a JSON `{"ip": ...}` service.
pub struct HttpIpResolver {
    client: reqwest::Client,
    url: String,
}

impl HttpIpResolver {
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url: url.to_string() }
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn public_ip(&self) -> String {
        let reply = match self.client.get(&self.url).send().await {
            Ok(r) if r.status().is_success() => r.json::<IpReply>().await,
            Ok(r) => {
                debug!(target: "activity", "ip lookup: HTTP {}", r.status());
                return UNKNOWN_IP.to_string();
            }
            Err(e) => {
                debug!(target: "activity", "ip lookup failed: {e}");
                return UNKNOWN_IP.to_string();
            }
        };
        match reply {
            Ok(r) if !r.ip.trim().is_empty() => r.ip,
            _ => UNKNOWN_IP.to_string(),
        }
    }
}

/// Fixed answer; for offline runs and tests.
pub struct StaticIp(pub String);

#[async_trait]
impl IpResolver for StaticIp {
    async fn public_ip(&self) -> String { self.0.clone() }
}

#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn BackendAuth>,
    ip: Arc<dyn IpResolver>,
    session: SessionContext,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl ActivityLogger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn BackendAuth>,
        ip: Arc<dyn IpResolver>,
        session: SessionContext,
    ) -> Self {
        Self { store, auth, ip, session, pending: Arc::new(Mutex::new(JoinSet::new())) }
    }

    fn root() -> DocPath { DocPath::from_segments(vec![LOG_ROOT.to_string()]) }

    /// Append one record. Returns the generated key, or `None` when the write did
    /// not happen.
    pub async fn log(&self, user: &str, action: &str, details: &str) -> Option<String> {
        if let Err(e) = ensure_anonymous(self.auth.as_ref(), self.store.as_ref()).await {
            warn!(target: "activity", "no backend identity for {action}: {e}");
            return None;
        }
        let record = ActivityRecord {
            user: user.to_string(),
            action: action.to_string(),
            details: details.to_string(),
            timestamp: chrono::Utc::now(),
            ip: self.ip.public_ip().await,
        };
        let value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "activity", "unencodable record: {e}");
                return None;
            }
        };
        match self.store.push(&Self::root(), value).await {
            Ok(key) => Some(key),
            Err(e) if e.is_permission_denied() => {
                warn!(target: "activity", "log write denied for {action}: {e}");
                None
            }
            Err(e) => {
                warn!(target: "activity", "log write failed for {action}: {e}");
                None
            }
        }
    }

    /// Detached [`ActivityLogger::log`]. [`ActivityLogger::flush`] waits for it.
    pub fn spawn_log(&self, user: &str, action: &str, details: &str) {
        let this = self.clone();
        let (user, action, details) = (user.to_string(), action.to_string(), details.to_string());
        let mut pending = self.pending.lock();
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            this.log(&user, &action, &details).await;
        });
    }

    /// Wait for every detached write started so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending.lock());
        while let Some(res) = pending.join_next().await {
            if let Err(e) = res {
                debug!(target: "activity", "log task ended early: {e}");
            }
        }
    }

    /// Newest first, at most `limit` entries. Owner only.
    pub async fn recent(&self, limit: usize) -> AppResult<Vec<(String, ActivityRecord)>> {
        self.session.require(Action::ViewActivity)?;
        let raw = self.store.get(&Self::root()).await?;
        let Value::Object(map) = raw else { return Ok(Vec::new()); };
        let mut out = Vec::with_capacity(map.len());
        for (key, v) in map {
            match serde_json::from_value::<ActivityRecord>(v) {
                Ok(rec) => out.push((key, rec)),
                Err(e) => debug!(target: "activity", "skipping malformed record {key}: {e}"),
            }
        }
        out.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then_with(|| b.0.cmp(&a.0)));
        out.truncate(limit);
        Ok(out)
    }

    /// Drop every record. Owner only.
    pub async fn clear(&self) -> AppResult<()> {
        let session = self.session.require(Action::ClearActivity)?;
        self.store.remove(&Self::root()).await.map_err(|e| alerts::delete_failed(&e))?;
        debug!(target: "activity", user = %session.identifier, "activity log cleared");
        Ok(())
    }
}
