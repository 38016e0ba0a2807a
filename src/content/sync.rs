use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::{actions, ActivityLogger};
use crate::error::{alerts, AppError, AppResult};
use crate::identity::{Action, Session, SessionContext};
use crate::model::{decode_chapters, encode_chapters, Chapter, Resource, StoredChapter};
use crate::store::{DocPath, DocumentStore, StoreError};

use super::{filter_chapters, validate_chapter, ContentPath, Shelf};

/// Ordered chapters with their stored `order` values.
type Listing = Vec<(Chapter, i64)>;

struct Feed {
    tx: watch::Sender<Listing>,
    task: Option<JoinHandle<()>>,
}

impl Drop for Feed {
    fn drop(&mut self) {
        if let Some(t) = self.task.take() { t.abort(); }
    }
}

fn now_ms() -> i64 { chrono::Utc::now().timestamp_millis() }

fn chapters_of(listing: &Listing) -> Vec<Chapter> {
    listing.iter().map(|(c, _)| c.clone()).collect()
}

fn next_order(listing: &Listing) -> i64 {
    listing.iter().map(|(_, o)| *o).max().map(|o| o + 1).unwrap_or(0)
}

fn decode(path: &ContentPath, value: &Value) -> Listing {
    match decode_chapters(value) {
        Ok(l) => l,
        Err(e) => {
            warn!("{path}: unreadable chapter data: {e}");
            Vec::new()
        }
    }
}

/// A single segment the store accepts as a child key of `doc`.
fn usable_key(doc: &DocPath, id: &str) -> bool {
    !id.trim().is_empty() && !id.contains('/') && doc.child(id).is_ok()
}

fn encode_stored(ch: &Chapter, order: i64) -> AppResult<Value> {
    serde_json::to_value(StoredChapter::from_chapter(ch, order))
        .map_err(|e| AppError::internal("encode_chapter", e.to_string()))
}

/// Live mirror of opened subjects plus the edit operations on them.
///
/// The mirror is overwritten wholesale whenever the store reports a change. Local
/// edits are applied to the mirror before the write and are not rolled back when
/// the write fails; the next remote notification brings the mirror back in line.
pub struct ContentSync {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    logger: ActivityLogger,
    feeds: Mutex<HashMap<ContentPath, Feed>>,
}

impl ContentSync {
    pub fn new(store: Arc<dyn DocumentStore>, session: SessionContext, logger: ActivityLogger) -> Self {
        Self { store, session, logger, feeds: Mutex::new(HashMap::new()) }
    }

    /// Subscribe to `path` and start mirroring it. Opening an open path is a no-op.
    pub async fn open(&self, path: ContentPath) -> AppResult<Vec<Chapter>> {
        self.session.require(Action::ViewContent)?;
        let already = self.feeds.lock().get(&path).map(|f| chapters_of(&f.tx.borrow()));
        if let Some(chapters) = already {
            return Ok(chapters);
        }
        let mut sub = self.store.subscribe(&path.doc_path()).await?;
        let initial = decode(&path, &sub.current());
        let chapters = chapters_of(&initial);
        let (tx, _) = watch::channel(initial);

        let feed_tx = tx.clone();
        let task = tokio::spawn(async move {
            loop {
                match sub.changed().await {
                    Ok(v) => {
                        feed_tx.send_replace(decode(&path, &v));
                    }
                    Err(e) => {
                        debug!("{path}: subscription ended: {e}");
                        break;
                    }
                }
            }
        });

        let mut feeds = self.feeds.lock();
        // Another open may have won the race; keep the first feed.
        if let Some(existing) = feeds.get(&path) {
            task.abort();
            return Ok(chapters_of(&existing.tx.borrow()));
        }
        feeds.insert(path, Feed { tx, task: Some(task) });
        debug!("{path}: opened with {} chapters", chapters.len());
        Ok(chapters)
    }

    /// Stop mirroring `path`.
    pub fn close(&self, path: ContentPath) {
        if self.feeds.lock().remove(&path).is_some() {
            debug!("{path}: closed");
        }
    }

    pub fn close_all(&self) {
        self.feeds.lock().clear();
    }

    pub fn is_open(&self, path: ContentPath) -> bool { self.feeds.lock().contains_key(&path) }

    /// Mirrored chapters in display order; empty when `path` is not open.
    pub fn read(&self, path: ContentPath) -> Vec<Chapter> {
        self.feeds.lock().get(&path).map(|f| chapters_of(&f.tx.borrow())).unwrap_or_default()
    }

    pub fn search(&self, path: ContentPath, needle: &str) -> Vec<(usize, Chapter)> {
        filter_chapters(&self.read(path), needle)
    }

    /// Receiver that fires whenever the mirror of `path` changes.
    pub fn changes(&self, path: ContentPath) -> Option<watch::Receiver<Vec<Chapter>>> {
        let feeds = self.feeds.lock();
        let feed = feeds.get(&path)?;
        let mut source = feed.tx.subscribe();
        let (tx, rx) = watch::channel(chapters_of(&source.borrow_and_update()));
        tokio::spawn(async move {
            while source.changed().await.is_ok() {
                let next = chapters_of(&source.borrow_and_update());
                if tx.send(next).is_err() { break; }
            }
        });
        Some(rx)
    }

    fn listing(&self, path: ContentPath) -> Listing {
        self.feeds.lock().get(&path).map(|f| f.tx.borrow().clone()).unwrap_or_default()
    }

    fn apply_local(&self, path: ContentPath, listing: Listing) {
        if let Some(feed) = self.feeds.lock().get(&path) {
            feed.tx.send_replace(listing);
        }
    }

    fn require_edit(&self) -> AppResult<Session> {
        self.session.require(Action::EditContent)
    }

    fn note(&self, session: &Session, action: &str, details: String) {
        self.logger.spawn_log(&session.identifier, action, &details);
    }

    /// Replace the whole subject with `chapters`, in the given order. Missing,
    /// repeated or unusable ids are replaced first, so reading back returns exactly
    /// what was stored.
    pub async fn save(&self, path: ContentPath, mut chapters: Vec<Chapter>) -> AppResult<Vec<Chapter>> {
        let session = self.require_edit()?;
        let doc = path.doc_path();
        let mut seen = HashSet::new();
        for ch in chapters.iter_mut() {
            validate_chapter(&ch.name, &ch.resources)?;
            if !usable_key(&doc, &ch.id) || !seen.insert(ch.id.clone()) {
                let fresh = uuid::Uuid::new_v4().to_string();
                debug!("{path}: chapter id '{}' replaced by {fresh}", ch.id);
                ch.id = fresh;
                seen.insert(ch.id.clone());
            }
            for r in ch.resources.iter_mut() {
                if r.id.trim().is_empty() { r.id = uuid::Uuid::new_v4().to_string(); }
            }
        }
        let listing: Listing = chapters.iter().cloned().enumerate().map(|(i, c)| (c, i as i64)).collect();
        self.apply_local(path, listing);
        self.store
            .set(&path.doc_path(), encode_chapters(&chapters))
            .await
            .map_err(|e| alerts::save_failed(&e))?;
        self.note(&session, actions::SAVE_SUBJECT, format!("{path}: {} chapters", chapters.len()));
        Ok(chapters)
    }

    /// Current remote listing. A subject still in the old array form is rewritten
    /// in keyed form first so single chapters can be addressed. Store failures are
    /// reported through `alert`, the message of the operation in progress.
    async fn remote_listing(&self, path: ContentPath, alert: fn(&StoreError) -> AppError) -> AppResult<Listing> {
        let doc = path.doc_path();
        let raw = self.store.get(&doc).await.map_err(|e| alert(&e))?;
        let listing = decode_chapters(&raw).map_err(|e| AppError::io("bad_content", e.to_string()))?;
        if raw.is_array() {
            let chapters = chapters_of(&listing);
            info!("{path}: converting list-form chapters to keyed form");
            self.store
                .set(&doc, encode_chapters(&chapters))
                .await
                .map_err(|e| alert(&e))?;
            return Ok(chapters.into_iter().enumerate().map(|(i, c)| (c, i as i64)).collect());
        }
        Ok(listing)
    }

    /// Reject when the remote copy of `local` moved on since the mirror saw it.
    fn check_fresh(remote: &Listing, local: &Chapter) -> AppResult<i64> {
        match remote.iter().find(|(c, _)| c.id == local.id) {
            Some((c, order)) if c.updated_at <= local.updated_at => Ok(*order),
            Some((c, _)) => {
                debug!(id = %local.id, remote = c.updated_at, local = local.updated_at, "stale chapter write");
                Err(alerts::conflict())
            }
            None => Err(alerts::conflict()),
        }
    }

    fn at(&self, path: ContentPath, index: usize) -> AppResult<(Listing, Chapter)> {
        let listing = self.listing(path);
        let Some((ch, _)) = listing.get(index) else {
            return Err(AppError::not_found("no_chapter", format!("No chapter #{} in {path}", index + 1)));
        };
        let ch = ch.clone();
        Ok((listing, ch))
    }

    pub async fn add_chapter(&self, path: ContentPath, name: &str, resources: Vec<Resource>) -> AppResult<Chapter> {
        let session = self.require_edit()?;
        validate_chapter(name, &resources)?;
        let mut ch = Chapter::new(name.trim(), resources);
        ch.updated_at = now_ms();

        let remote = self.remote_listing(path, alerts::save_failed).await?;
        let order = next_order(&remote).max(next_order(&self.listing(path)));
        let mut local = self.listing(path);
        local.push((ch.clone(), order));
        self.apply_local(path, local);

        let target = path.doc_path().child(&ch.id)?;
        self.store
            .set(&target, encode_stored(&ch, order)?)
            .await
            .map_err(|e| alerts::save_failed(&e))?;
        self.note(&session, actions::ADD_CHAPTER, format!("{path}: {}", ch.name));
        Ok(ch)
    }

    /// Replace name and resources of the chapter at display `index`.
    pub async fn edit_chapter(
        &self,
        path: ContentPath,
        index: usize,
        name: &str,
        resources: Vec<Resource>,
    ) -> AppResult<Chapter> {
        let session = self.require_edit()?;
        validate_chapter(name, &resources)?;
        let (mut local, current) = self.at(path, index)?;
        let remote = self.remote_listing(path, alerts::save_failed).await?;
        let order = Self::check_fresh(&remote, &current)?;

        let updated = Chapter {
            id: current.id.clone(),
            name: name.trim().to_string(),
            resources,
            updated_at: now_ms().max(current.updated_at + 1),
        };
        local[index] = (updated.clone(), order);
        self.apply_local(path, local);

        let target = path.doc_path().child(&updated.id)?;
        self.store
            .set(&target, encode_stored(&updated, order)?)
            .await
            .map_err(|e| alerts::save_failed(&e))?;
        self.note(&session, actions::EDIT_CHAPTER, format!("{path}: {}", updated.name));
        Ok(updated)
    }

    /// Remove the chapter at display `index`; later chapters move up by one.
    pub async fn delete_chapter(&self, path: ContentPath, index: usize) -> AppResult<Chapter> {
        let session = self.require_edit()?;
        let (mut local, current) = self.at(path, index)?;
        let remote = self.remote_listing(path, alerts::delete_failed).await?;
        Self::check_fresh(&remote, &current)?;

        local.remove(index);
        self.apply_local(path, local);

        let target = path.doc_path().child(&current.id)?;
        self.store.remove(&target).await.map_err(|e| alerts::delete_failed(&e))?;
        self.note(&session, actions::DELETE_CHAPTER, format!("{path}: {}", current.name));
        Ok(current)
    }

    /// Move the chapter at display `index` of a live subject into that subject's
    /// archive, in one multi-path write.
    pub async fn archive_chapter(&self, path: ContentPath, index: usize) -> AppResult<Chapter> {
        let session = self.require_edit()?;
        if path.shelf != Shelf::Academy {
            return Err(AppError::user("already_archived", "This chapter is already in the archive."));
        }
        let (mut local, current) = self.at(path, index)?;
        let remote = self.remote_listing(path, alerts::save_failed).await?;
        Self::check_fresh(&remote, &current)?;

        let shelf = path.counterpart();
        let archived = self.remote_listing(shelf, alerts::save_failed).await?;
        let order = next_order(&archived);
        let mut moved = current.clone();
        moved.updated_at = now_ms().max(current.updated_at + 1);

        let mut fields = Map::new();
        fields.insert(format!("{}/{}", path.doc_path(), current.id), Value::Null);
        fields.insert(format!("{}/{}", shelf.doc_path(), moved.id), encode_stored(&moved, order)?);

        local.remove(index);
        self.apply_local(path, local);
        if self.is_open(shelf) {
            let mut other = self.listing(shelf);
            other.push((moved.clone(), order));
            self.apply_local(shelf, other);
        }

        self.store
            .update(&DocPath::root(), fields)
            .await
            .map_err(|e: StoreError| alerts::save_failed(&e))?;
        self.note(&session, actions::ARCHIVE_CHAPTER, format!("{path}: {}", moved.name));
        Ok(moved)
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
