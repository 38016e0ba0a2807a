//! Anonymous backend identity. The store only answers signed-in clients, so every
//! portal operation first makes sure an anonymous identity exists.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::store::{random_token, DocumentStore, IdToken, StoreError, StoreResult};

use super::persistence::LocalStorage;

#[async_trait]
pub trait BackendAuth: Send + Sync {
    async fn sign_in_anonymously(&self) -> StoreResult<IdToken>;

    /// Identity held right now, if any. After a restart this is whatever the
    /// provider restored from local storage.
    fn current(&self) -> Option<IdToken>;

    async fn sign_out(&self) -> StoreResult<()>;
}

/// Reuse the current identity or sign in, and present it to `store`.
pub async fn ensure_anonymous(auth: &dyn BackendAuth, store: &dyn DocumentStore) -> StoreResult<IdToken> {
    let id = match auth.current() {
        Some(id) => id,
        None => auth.sign_in_anonymously().await?,
    };
    store.set_credentials(Some(id.clone()));
    Ok(id)
}

/// Device-storage key holding the anonymous identity between runs.
pub const IDENTITY_KEY: &str = "nexus_backend_identity";

fn load_identity(storage: &dyn LocalStorage) -> Option<IdToken> {
    let id = storage
        .get(IDENTITY_KEY)
        .and_then(|text| serde_json::from_str::<IdToken>(&text).ok())?;
    info!(target: "startup", uid = %id.uid, "restored backend identity");
    Some(id)
}

fn keep_identity(storage: &dyn LocalStorage, id: &IdToken) {
    match serde_json::to_string(id) {
        Ok(text) => {
            if let Err(e) = storage.set(IDENTITY_KEY, &text) {
                warn!("could not persist backend identity: {e}");
            }
        }
        Err(e) => warn!("could not encode backend identity: {e}"),
    }
}

/// In-process provider: mints identities locally. With device storage attached the
/// identity outlives the process, like the hosted provider's.
#[derive(Default)]
pub struct LocalBackendAuth {
    current: RwLock<Option<IdToken>>,
    storage: Option<Arc<dyn LocalStorage>>,
}

impl LocalBackendAuth {
    pub fn new() -> Self { Self::default() }

    /// Provider that starts with `identity` already active, as after a reload.
    pub fn with_identity(identity: Option<IdToken>) -> Self {
        Self { current: RwLock::new(identity), storage: None }
    }

    /// Provider backed by `storage`, picking up the identity of an earlier run.
    pub fn persistent(storage: Arc<dyn LocalStorage>) -> Self {
        Self { current: RwLock::new(load_identity(storage.as_ref())), storage: Some(storage) }
    }
}

pub fn mint_identity() -> IdToken {
    IdToken { uid: format!("anon-{}", random_token(8)), token: random_token(24) }
}

#[async_trait]
impl BackendAuth for LocalBackendAuth {
    async fn sign_in_anonymously(&self) -> StoreResult<IdToken> {
        let id = mint_identity();
        if let Some(storage) = &self.storage {
            keep_identity(storage.as_ref(), &id);
        }
        *self.current.write() = Some(id.clone());
        debug!(uid = %id.uid, "anonymous identity issued");
        Ok(id)
    }

    fn current(&self) -> Option<IdToken> { self.current.read().clone() }

    async fn sign_out(&self) -> StoreResult<()> {
        *self.current.write() = None;
        if let Some(storage) = &self.storage {
            storage.remove(IDENTITY_KEY);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpReply {
    id_token: String,
    local_id: String,
}

/// Provider speaking the hosted `accounts:signUp` REST call. The identity is kept
/// in local storage so a restart can pick it up again.
pub struct RestBackendAuth {
    client: reqwest::Client,
    base: String,
    api_key: Option<String>,
    storage: Arc<dyn LocalStorage>,
    current: RwLock<Option<IdToken>>,
}

impl RestBackendAuth {
    pub const STORAGE_KEY: &'static str = IDENTITY_KEY;

    pub fn new(base: &str, api_key: Option<String>, storage: Arc<dyn LocalStorage>) -> Self {
        let restored = load_identity(storage.as_ref());
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            api_key,
            storage,
            current: RwLock::new(restored),
        }
    }

    fn sign_up_url(&self) -> String {
        let mut url = format!("{}/v1/accounts:signUp", self.base);
        if let Some(k) = &self.api_key {
            url.push_str("?key=");
            url.push_str(&urlencoding::encode(k));
        }
        url
    }
}

#[async_trait]
impl BackendAuth for RestBackendAuth {
    async fn sign_in_anonymously(&self) -> StoreResult<IdToken> {
        let resp = self
            .client
            .post(self.sign_up_url())
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Network(format!("sign-up failed: HTTP {status}: {body}")));
        }
        let reply: SignUpReply = resp.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;
        let id = IdToken { uid: reply.local_id, token: reply.id_token };
        keep_identity(self.storage.as_ref(), &id);
        *self.current.write() = Some(id.clone());
        Ok(id)
    }

    fn current(&self) -> Option<IdToken> { self.current.read().clone() }

    async fn sign_out(&self) -> StoreResult<()> {
        *self.current.write() = None;
        self.storage.remove(Self::STORAGE_KEY);
        Ok(())
    }
}
