use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::accounts::decode_collection;
use crate::activity::{actions, ActivityLogger};
use crate::config::SeedAccount;
use crate::error::{alerts, AppResult};
use crate::model::AccessControl;
use crate::store::{DocPath, DocumentStore};

use super::backend::{ensure_anonymous, BackendAuth};
use super::credentials::CredentialTable;
use super::persistence::SessionStore;
use super::session::{Session, SessionContext, SessionWriter};

/// Turns submitted credentials into a session. Holds the only [`SessionWriter`].
pub struct SessionResolver {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn BackendAuth>,
    seeds: Vec<SeedAccount>,
    sessions: SessionStore,
    writer: SessionWriter,
    logger: ActivityLogger,
}

impl SessionResolver {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn BackendAuth>,
        seeds: Vec<SeedAccount>,
        sessions: SessionStore,
        writer: SessionWriter,
        logger: ActivityLogger,
    ) -> Self {
        Self { store, auth, seeds, sessions, writer, logger }
    }

    pub fn context(&self) -> SessionContext { self.writer.context() }

    async fn credential_table(&self) -> AppResult<CredentialTable> {
        ensure_anonymous(self.auth.as_ref(), self.store.as_ref())
            .await
            .map_err(alerts::connection)?;
        let raw = self
            .store
            .get(&DocPath::parse("access")?)
            .await
            .map_err(alerts::connection)?;
        let access = AccessControl {
            admins: decode_collection(&raw["admins"]),
            students: decode_collection(&raw["students"]),
        };
        Ok(CredentialTable::from_seeds(&self.seeds).with_access(&access))
    }

    /// Resolve `(identifier, secret)` to a role. A failed attempt changes nothing:
    /// an active session stays as it was, and without one the anonymous identity
    /// taken for the lookup is dropped again.
    pub async fn login(&self, identifier: &str, secret: &str) -> AppResult<Session> {
        if identifier.trim().is_empty() || secret.trim().is_empty() {
            return Err(alerts::missing_field("Fill all fields"));
        }
        let table = self.credential_table().await?;
        let Some(role) = table.resolve(identifier, secret) else {
            if !self.writer.context().is_signed_in() {
                if let Err(e) = self.auth.sign_out().await {
                    debug!("sign-out after failed login: {e}");
                }
                self.store.set_credentials(None);
            }
            return Err(alerts::invalid_credentials());
        };

        let session = Session::new(identifier, role);
        self.writer.set(session.clone());
        if let Err(e) = self.sessions.save(&session) {
            warn!("session not persisted: {e}");
        }
        info!(user = %identifier, role = %role, "login");
        self.logger.spawn_log(identifier, actions::LOGIN, &format!("role={role}"));
        Ok(session)
    }

    pub async fn logout(&self) -> AppResult<()> {
        if let Some(s) = self.writer.context().current() {
            self.logger.log(&s.identifier, actions::LOGOUT, "").await;
        }
        if let Err(e) = self.auth.sign_out().await {
            warn!("backend sign-out failed: {e}");
        }
        self.store.set_credentials(None);
        self.sessions.clear();
        self.writer.clear();
        Ok(())
    }

    /// Bring back the session of a previous run. Needs both a live backend identity
    /// and a readable session blob; anything else leaves the user signed out.
    pub fn restore(&self) -> Option<Session> {
        match (self.auth.current(), self.sessions.load()) {
            (Some(id), Some(session)) => {
                self.store.set_credentials(Some(id));
                self.writer.set(session.clone());
                info!(user = %session.identifier, role = %session.role, "session restored");
                Some(session)
            }
            _ => {
                self.sessions.clear();
                self.writer.clear();
                None
            }
        }
    }
}
