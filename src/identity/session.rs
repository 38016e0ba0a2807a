use std::fmt::{Display, Formatter};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{alerts, AppResult};

/// Role tiers, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ViewContent,
    EditContent,
    ManageAccounts,
    ViewActivity,
    ClearActivity,
    EditDeveloperInfo,
}

impl Action {
    fn refusal(self) -> &'static str {
        match self {
            Action::ViewContent => "Please log in to view content.",
            Action::EditContent => "Only admins can edit content.",
            Action::ManageAccounts => "Only the owner can manage accounts.",
            Action::ViewActivity | Action::ClearActivity => "Only the owner can see activity logs.",
            Action::EditDeveloperInfo => "Only the owner can change the developer profile.",
        }
    }
}

impl Role {
    pub fn allows(self, action: Action) -> bool {
        match action {
            Action::ViewContent => true,
            Action::EditContent => self >= Role::Admin,
            Action::ManageAccounts
            | Action::ViewActivity
            | Action::ClearActivity
            | Action::EditDeveloperInfo => self == Role::Owner,
        }
    }

    /// Flag pair persisted in the session blob: `(isAdmin, isMainAdmin)`.
    pub fn flags(self) -> (bool, bool) {
        match self {
            Role::Student => (false, false),
            Role::Admin => (true, false),
            Role::Owner => (true, true),
        }
    }

    pub fn from_flags(is_admin: bool, is_main_admin: bool) -> Role {
        match (is_admin, is_main_admin) {
            (_, true) => Role::Owner,
            (true, false) => Role::Admin,
            (false, false) => Role::Student,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identifier: String,
    pub role: Role,
}

impl Session {
    pub fn new(identifier: impl Into<String>, role: Role) -> Self {
        Self { identifier: identifier.into(), role }
    }
}

/// Read-only view of the signed-in session, handed to every component that
/// gates on role.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    /// Context and its single writer.
    pub fn pair() -> (SessionContext, SessionWriter) {
        let ctx = SessionContext::default();
        let writer = SessionWriter { inner: ctx.inner.clone() };
        (ctx, writer)
    }

    pub fn current(&self) -> Option<Session> { self.inner.read().clone() }

    pub fn role(&self) -> Option<Role> { self.inner.read().as_ref().map(|s| s.role) }

    pub fn identifier(&self) -> Option<String> {
        self.inner.read().as_ref().map(|s| s.identifier.clone())
    }

    pub fn is_signed_in(&self) -> bool { self.inner.read().is_some() }

    pub fn can(&self, action: Action) -> bool {
        self.role().map(|r| r.allows(action)).unwrap_or(false)
    }

    /// The current session if it may perform `action`.
    pub fn require(&self, action: Action) -> AppResult<Session> {
        let Some(session) = self.current() else { return Err(alerts::not_signed_in()); };
        if session.role.allows(action) {
            Ok(session)
        } else {
            Err(alerts::not_allowed(action.refusal()))
        }
    }
}

/// Sole mutator of a [`SessionContext`]; owned by the session resolver.
#[derive(Debug)]
pub struct SessionWriter {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionWriter {
    pub fn context(&self) -> SessionContext { SessionContext { inner: self.inner.clone() } }

    pub fn set(&self, session: Session) { *self.inner.write() = Some(session); }

    pub fn clear(&self) { *self.inner.write() = None; }
}
