//! Sign-in, roles and the session shared across the portal.
//! `SessionResolver` is the only writer of the session; everything else reads it
//! through a `SessionContext`.

mod backend;
mod credentials;
mod persistence;
mod resolver;
mod session;

pub use backend::{ensure_anonymous, mint_identity, BackendAuth, LocalBackendAuth, RestBackendAuth};
pub use credentials::{CredentialEntry, CredentialSource, CredentialTable};
pub use persistence::{FileStorage, LocalStorage, MemoryStorage, SessionStore};
pub use resolver::SessionResolver;
pub use session::{Action, Role, Session, SessionContext, SessionWriter};
