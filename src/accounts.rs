//! Owner-side management of the `access` collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::activity::{actions, ActivityLogger};
use crate::error::{alerts, AppError, AppResult};
use crate::identity::{Action, SessionContext};
use crate::model::{AccessControl, AccountKind, UserAccount};
use crate::store::{DocPath, DocumentStore, Subscription};

pub struct AccessManager {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    logger: ActivityLogger,
}

fn collection_path(kind: AccountKind) -> DocPath {
    DocPath::from_segments(vec!["access".into(), kind.collection().into()])
}

/// Decode a collection node; entries that do not look like accounts are skipped.
pub fn decode_collection(value: &Value) -> BTreeMap<String, UserAccount> {
    let Value::Object(map) = value else { return BTreeMap::new(); };
    map.iter()
        .filter_map(|(k, v)| match serde_json::from_value::<UserAccount>(v.clone()) {
            Ok(acc) => Some((k.clone(), acc)),
            Err(e) => {
                debug!("skipping account {k}: {e}");
                None
            }
        })
        .collect()
}

impl AccessManager {
    pub fn new(store: Arc<dyn DocumentStore>, session: SessionContext, logger: ActivityLogger) -> Self {
        Self { store, session, logger }
    }

    pub async fn list(&self) -> AppResult<AccessControl> {
        self.session.require(Action::ManageAccounts)?;
        let raw = self.store.get(&DocPath::from_segments(vec!["access".into()])).await?;
        Ok(AccessControl {
            admins: decode_collection(&raw["admins"]),
            students: decode_collection(&raw["students"]),
        })
    }

    /// Live view of one collection; decode with [`decode_collection`].
    pub async fn subscribe(&self, kind: AccountKind) -> AppResult<Subscription> {
        self.session.require(Action::ManageAccounts)?;
        Ok(self.store.subscribe(&collection_path(kind)).await?)
    }

    /// Append an account under a generated key and return the key.
    pub async fn add(&self, kind: AccountKind, identifier: &str, secret: &str) -> AppResult<String> {
        let session = self.session.require(Action::ManageAccounts)?;
        if identifier.is_empty() || secret.is_empty() {
            return Err(alerts::missing_field("Fill all fields"));
        }
        let account = UserAccount { identifier: identifier.to_string(), secret: secret.to_string() };
        let value = serde_json::to_value(&account).map_err(|e| AppError::internal("encode_account", e.to_string()))?;
        let key = self
            .store
            .push(&collection_path(kind), value)
            .await
            .map_err(|e| AppError::io("add_user", format!("Error adding user ({e})")))?;
        info!(kind = kind.collection(), key = %key, "account added");
        self.logger.spawn_log(&session.identifier, actions::ADD_USER, &format!("{}: {identifier}", kind.collection()));
        Ok(key)
    }

    pub async fn remove(&self, kind: AccountKind, key: &str) -> AppResult<()> {
        let session = self.session.require(Action::ManageAccounts)?;
        let target = collection_path(kind).child(key)?;
        self.store
            .remove(&target)
            .await
            .map_err(|e| AppError::io("remove_user", format!("Error deleting user ({e})")))?;
        info!(kind = kind.collection(), key = %key, "account removed");
        self.logger.spawn_log(&session.identifier, actions::REMOVE_USER, &format!("{}: {key}", kind.collection()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::StaticIp;
    use crate::identity::{ensure_anonymous, LocalBackendAuth, Role, Session};
    use crate::store::MemoryStore;

    async fn manager(role: Role) -> (AccessManager, MemoryStore) {
        let store = MemoryStore::new();
        let auth = Arc::new(LocalBackendAuth::new());
        ensure_anonymous(auth.as_ref(), &store).await.unwrap();
        let (ctx, writer) = SessionContext::pair();
        writer.set(Session::new("owner", role));
        let logger = ActivityLogger::new(Arc::new(store.clone()), auth, Arc::new(StaticIp("unknown".into())), ctx.clone());
        (AccessManager::new(Arc::new(store.clone()), ctx, logger), store)
    }

    #[tokio::test]
    async fn owner_adds_lists_and_removes() {
        let (mgr, _store) = manager(Role::Owner).await;
        let k1 = mgr.add(AccountKind::Student, "01711111111", "pw").await.unwrap();
        mgr.add(AccountKind::Admin, "01722222222", "pw2").await.unwrap();
        let all = mgr.list().await.unwrap();
        assert_eq!(all.students[&k1].identifier, "01711111111");
        assert_eq!(all.admins.len(), 1);

        let sub = mgr.subscribe(AccountKind::Student).await.unwrap();
        assert_eq!(decode_collection(&sub.current()).len(), 1);

        mgr.remove(AccountKind::Student, &k1).await.unwrap();
        assert!(mgr.list().await.unwrap().students.is_empty());
    }

    #[tokio::test]
    async fn admins_cannot_manage_accounts() {
        let (mgr, _store) = manager(Role::Admin).await;
        assert!(mgr.list().await.unwrap_err().is_permission_denied());
        assert!(mgr.add(AccountKind::Student, "a", "b").await.unwrap_err().is_permission_denied());
    }

    #[tokio::test]
    async fn both_fields_are_required() {
        let (mgr, store) = manager(Role::Owner).await;
        let err = mgr.add(AccountKind::Student, "01711111111", "").await.unwrap_err();
        assert_eq!(err.message(), "Fill all fields");
        assert!(store.get(&collection_path(AccountKind::Student)).await.unwrap().is_null());
    }
}
