use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{tree, push_key, DocPath, DocumentStore, IdToken, Rules, StoreError, StoreResult, Subscription};

struct Watcher {
    path: DocPath,
    tx: watch::Sender<Value>,
}

struct Shared {
    root: RwLock<Value>,
    watchers: Mutex<Vec<Watcher>>,
    rules: RwLock<Rules>,
    snapshot: Option<PathBuf>,
}

/// In-process document store. Clones share data and credentials; [`MemoryStore::connect`]
/// opens another client handle on the same data with its own credentials.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    credentials: Arc<RwLock<Option<IdToken>>>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::with_rules(Rules::default()) }
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_rules(rules: Rules) -> Self {
        Self::build(Value::Null, rules, None)
    }

    /// Open a store persisted as a JSON snapshot at `path`. A missing file starts empty;
    /// every mutation rewrites the snapshot.
    pub fn open(path: impl AsRef<Path>, rules: Rules) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let root = match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => Value::Null,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Null,
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", path.display()))),
        };
        debug!(snapshot = %path.display(), "memory store opened");
        Ok(Self::build(root, rules, Some(path)))
    }

    fn build(root: Value, rules: Rules, snapshot: Option<PathBuf>) -> Self {
        let shared = Shared {
            root: RwLock::new(root),
            watchers: Mutex::new(Vec::new()),
            rules: RwLock::new(rules),
            snapshot,
        };
        Self { shared: Arc::new(shared), credentials: Arc::new(RwLock::new(None)) }
    }

    /// Another client of the same data, starting signed out.
    pub fn connect(&self) -> Self {
        Self { shared: self.shared.clone(), credentials: Arc::new(RwLock::new(None)) }
    }

    pub fn set_rules(&self, rules: Rules) {
        *self.shared.rules.write() = rules;
    }

    /// Whole tree, bypassing rules. Used by the emulator and tests.
    pub fn dump(&self) -> Value {
        self.shared.root.read().clone()
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.shared.watchers.lock().len()
    }

    fn who(&self) -> Option<IdToken> {
        self.credentials.read().clone()
    }

    fn read_checked(&self, path: &DocPath) -> StoreResult<Value> {
        self.shared.rules.read().check_read(path, self.who().as_ref())?;
        Ok(tree::value_at(&self.shared.root.read(), path.segments()))
    }

    /// Apply `f` to the tree after checking write access on every touched path,
    /// then notify overlapping watchers and persist.
    fn mutate<F>(&self, touched: &[DocPath], f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Value) -> StoreResult<()>,
    {
        {
            let rules = self.shared.rules.read();
            let who = self.who();
            for p in touched {
                rules.check_write(p, who.as_ref())?;
            }
        }
        let mut guard = self.shared.root.write();
        let mut next = guard.clone();
        f(&mut next)?;
        *guard = next;
        let guard = RwLockWriteGuard::downgrade(guard);

        {
            let mut watchers = self.shared.watchers.lock();
            watchers.retain(|w| !w.tx.is_closed());
            for w in watchers.iter().filter(|w| touched.iter().any(|p| p.overlaps(&w.path))) {
                let fresh = tree::value_at(&guard, w.path.segments());
                w.tx.send_if_modified(|cur| {
                    if *cur == fresh { return false; }
                    *cur = fresh;
                    true
                });
            }
        }

        if let Some(snap) = &self.shared.snapshot {
            persist(snap, &guard)?;
        }
        Ok(())
    }
}

fn persist(path: &Path, root: &Value) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(root)?;
    if let Some(dir) = path.parent() { std::fs::create_dir_all(dir).ok(); }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &bytes)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| {
            warn!("snapshot write failed for {}: {e}", path.display());
            StoreError::Io(e.to_string())
        })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Value> {
        self.read_checked(path)
    }

    async fn set(&self, path: &DocPath, value: Value) -> StoreResult<()> {
        let segs = path.segments().to_vec();
        self.mutate(std::slice::from_ref(path), move |root| tree::set_at(root, &segs, value))
    }

    async fn update(&self, path: &DocPath, fields: Map<String, Value>) -> StoreResult<()> {
        let mut touched = Vec::with_capacity(fields.len());
        for key in fields.keys() {
            touched.push(path.child(key)?);
        }
        let base = path.segments().to_vec();
        self.mutate(&touched, move |root| tree::update_at(root, &base, &fields))
    }

    async fn push(&self, path: &DocPath, value: Value) -> StoreResult<String> {
        let key = push_key();
        let target = path.child(&key)?;
        self.set(&target, value).await?;
        Ok(key)
    }

    async fn subscribe(&self, path: &DocPath) -> StoreResult<Subscription> {
        self.shared.rules.read().check_read(path, self.who().as_ref())?;
        // Same lock order as `mutate` (tree, then watchers) so no change slips in
        // between reading the initial value and registering.
        let root = self.shared.root.read();
        let (tx, rx) = watch::channel(tree::value_at(&root, path.segments()));
        self.shared.watchers.lock().push(Watcher { path: path.clone(), tx });
        drop(root);
        Ok(Subscription::new(path.clone(), rx))
    }

    fn set_credentials(&self, token: Option<IdToken>) {
        *self.credentials.write() = token;
    }

    fn credentials(&self) -> Option<IdToken> {
        self.who()
    }
}
