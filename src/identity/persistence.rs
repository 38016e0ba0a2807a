//! Local device storage: small string blobs keyed by name.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

use super::session::{Role, Session};

pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str);
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    fn file(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(self.file(key), value))
            .map_err(|e| AppError::io("local_storage", format!("{}: {e}", self.dir.display())))
    }

    fn remove(&self, key: &str) {
        let path = self.file(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove {}: {e}", path.display());
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> { self.items.lock().get(key).cloned() }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) { self.items.lock().remove(key); }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBlob {
    is_admin: bool,
    is_main_admin: bool,
    #[serde(default)]
    identifier: String,
}

/// Round-trips the resolved session through local storage under `nexus_session`.
/// The blob only restores the view; it grants nothing by itself.
#[derive(Clone)]
pub struct SessionStore {
    storage: std::sync::Arc<dyn LocalStorage>,
}

impl SessionStore {
    pub const KEY: &'static str = "nexus_session";

    pub fn new(storage: std::sync::Arc<dyn LocalStorage>) -> Self { Self { storage } }

    pub fn save(&self, session: &Session) -> AppResult<()> {
        let (is_admin, is_main_admin) = session.role.flags();
        let blob = SessionBlob { is_admin, is_main_admin, identifier: session.identifier.clone() };
        let text = serde_json::to_string(&blob)
            .map_err(|e| AppError::internal("session_encode", e.to_string()))?;
        self.storage.set(Self::KEY, &text)
    }

    /// `None` when absent or unparsable.
    pub fn load(&self) -> Option<Session> {
        let text = self.storage.get(Self::KEY)?;
        match serde_json::from_str::<SessionBlob>(&text) {
            Ok(b) => Some(Session::new(b.identifier, Role::from_flags(b.is_admin, b.is_main_admin))),
            Err(e) => {
                debug!("discarding malformed session blob: {e}");
                None
            }
        }
    }

    pub fn clear(&self) { self.storage.remove(Self::KEY); }
}
