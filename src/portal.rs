//! Application root: wires the backends to the session, content, logging,
//! account, profile and assistant components.

use std::sync::Arc;

use tracing::info;

use crate::accounts::AccessManager;
use crate::activity::{actions, ActivityLogger, HttpIpResolver, IpResolver, StaticIp, UNKNOWN_IP};
use crate::assistant::{GeminiBackend, ModelBackend, StudyAssistant};
use crate::config::{Config, SeedAccount};
use crate::content::{ContentPath, ContentSync};
use crate::developer::DeveloperProfile;
use crate::error::{AppError, AppResult};
use crate::identity::{
    Action, BackendAuth, FileStorage, LocalBackendAuth, LocalStorage, MemoryStorage, RestBackendAuth, Session,
    SessionContext, SessionResolver, SessionStore,
};
use crate::media;
use crate::store::{DocumentStore, MemoryStore, RestStore, Rules};

/// External collaborators a portal runs against.
pub struct Backends {
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn BackendAuth>,
    pub storage: Arc<dyn LocalStorage>,
    pub ip: Arc<dyn IpResolver>,
    pub model: Arc<dyn ModelBackend>,
}

pub struct Portal {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    resolver: SessionResolver,
    content: ContentSync,
    logger: ActivityLogger,
    assistant: StudyAssistant,
    accounts: AccessManager,
    developer: DeveloperProfile,
}

impl Portal {
    pub fn assemble(backends: Backends, seeds: Vec<SeedAccount>) -> Self {
        let Backends { store, auth, storage, ip, model } = backends;
        let (session, writer) = SessionContext::pair();
        let logger = ActivityLogger::new(store.clone(), auth.clone(), ip, session.clone());
        let resolver = SessionResolver::new(
            store.clone(),
            auth,
            seeds,
            SessionStore::new(storage),
            writer,
            logger.clone(),
        );
        Self {
            content: ContentSync::new(store.clone(), session.clone(), logger.clone()),
            accounts: AccessManager::new(store.clone(), session.clone(), logger.clone()),
            developer: DeveloperProfile::new(store.clone(), session.clone(), logger.clone()),
            assistant: StudyAssistant::new(model),
            store,
            session,
            resolver,
            logger,
        }
    }

    /// Portal over a client handle of `store`, with in-memory device storage and no
    /// outbound HTTP. Each call is a separate "device".
    pub fn in_memory(store: &MemoryStore, seeds: Vec<SeedAccount>) -> Self {
        Self::assemble(
            Backends {
                store: Arc::new(store.connect()),
                auth: Arc::new(LocalBackendAuth::new()),
                storage: Arc::new(MemoryStorage::new()),
                ip: Arc::new(StaticIp(UNKNOWN_IP.to_string())),
                model: Arc::new(GeminiBackend::new(crate::config::DEFAULT_AI_URL, crate::config::DEFAULT_AI_MODEL, None)),
            },
            seeds,
        )
    }

    /// Portal as configured: the REST backend when `db_url` is set, otherwise a
    /// local store persisted under the state directory.
    pub fn from_config(cfg: &Config) -> AppResult<Self> {
        let seeds = cfg.load_seeds()?;
        let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::new(&cfg.state_dir));
        let (store, auth): (Arc<dyn DocumentStore>, Arc<dyn BackendAuth>) = match &cfg.db_url {
            Some(url) => {
                let auth_base = cfg.auth_base().unwrap_or_else(|| url.clone());
                info!(target: "startup", db = %url, auth = %auth_base, "using remote backend");
                let store: Arc<dyn DocumentStore> = Arc::new(RestStore::new(url)?);
                let auth: Arc<dyn BackendAuth> =
                    Arc::new(RestBackendAuth::new(&auth_base, cfg.api_key.clone(), storage.clone()));
                (store, auth)
            }
            None => {
                let file = cfg.state_dir.join("local_db.json");
                info!(target: "startup", snapshot = %file.display(), "using local backend");
                let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::open(&file, Rules::default())?);
                let auth: Arc<dyn BackendAuth> = Arc::new(LocalBackendAuth::persistent(storage.clone()));
                (store, auth)
            }
        };
        let backends = Backends {
            store,
            auth,
            storage,
            ip: Arc::new(HttpIpResolver::new(&cfg.ip_lookup_url)),
            model: Arc::new(GeminiBackend::new(&cfg.ai_url, &cfg.ai_model, cfg.ai_api_key.clone())),
        };
        Ok(Self::assemble(backends, seeds))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> { &self.store }
    pub fn session(&self) -> &SessionContext { &self.session }
    pub fn resolver(&self) -> &SessionResolver { &self.resolver }
    pub fn content(&self) -> &ContentSync { &self.content }
    pub fn activity(&self) -> &ActivityLogger { &self.logger }
    pub fn assistant(&self) -> &StudyAssistant { &self.assistant }
    pub fn accounts(&self) -> &AccessManager { &self.accounts }
    pub fn developer(&self) -> &DeveloperProfile { &self.developer }

    pub async fn login(&self, identifier: &str, secret: &str) -> AppResult<Session> {
        self.resolver.login(identifier, secret).await
    }

    pub async fn logout(&self) -> AppResult<()> {
        self.content.close_all();
        self.resolver.logout().await
    }

    pub fn restore(&self) -> Option<Session> { self.resolver.restore() }

    /// Embed URL for a resource video, logging the view.
    pub fn play(&self, path: ContentPath, chapter: usize, resource: usize) -> AppResult<String> {
        let session = self.session.require(Action::ViewContent)?;
        let chapters = self.content.read(path);
        let ch = chapters
            .get(chapter)
            .ok_or_else(|| AppError::not_found("no_chapter", format!("No chapter #{} in {path}", chapter + 1)))?;
        let res = ch
            .resources
            .get(resource)
            .ok_or_else(|| AppError::not_found("no_resource", format!("No item #{} in {}", resource + 1, ch.name)))?;
        let link = res
            .vid
            .as_deref()
            .ok_or_else(|| AppError::not_found("no_video", format!("'{}' has no video", res.label)))?;
        let embed = media::embed_for(link)
            .ok_or_else(|| AppError::user("bad_video_link", format!("Not a YouTube link: {link}")))?;
        self.logger.spawn_log(&session.identifier, actions::WATCH_VIDEO, &format!("Started watching: {}", ch.name));
        Ok(embed)
    }

    /// Document link of a resource, logging the open.
    pub fn document(&self, path: ContentPath, chapter: usize, resource: usize) -> AppResult<String> {
        let session = self.session.require(Action::ViewContent)?;
        let chapters = self.content.read(path);
        let res = chapters
            .get(chapter)
            .and_then(|c| c.resources.get(resource))
            .ok_or_else(|| AppError::not_found("no_resource", format!("No item #{} in chapter #{}", resource + 1, chapter + 1)))?;
        let link = res
            .pdf
            .clone()
            .ok_or_else(|| AppError::not_found("no_document", format!("'{}' has no document", res.label)))?;
        self.logger.spawn_log(&session.identifier, actions::OPEN_DOCUMENT, &res.label);
        Ok(link)
    }
}
