//! The developer profile shown in the sidebar (`developerInfo`).

use std::sync::Arc;

use base64::Engine;
use tracing::info;

use crate::activity::{actions, ActivityLogger};
use crate::error::{AppError, AppResult};
use crate::identity::{Action, SessionContext};
use crate::model::DeveloperInfo;
use crate::store::{DocPath, DocumentStore, Subscription};

/// Largest accepted photo, before encoding.
pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;

pub struct DeveloperProfile {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    logger: ActivityLogger,
}

fn info_path() -> DocPath { DocPath::from_segments(vec!["developerInfo".into()]) }

pub fn photo_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Decode a stored profile; `None` when nothing is stored.
pub fn decode_info(value: &serde_json::Value) -> AppResult<Option<DeveloperInfo>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| AppError::io("bad_profile", e.to_string()))
}

impl DeveloperProfile {
    pub fn new(store: Arc<dyn DocumentStore>, session: SessionContext, logger: ActivityLogger) -> Self {
        Self { store, session, logger }
    }

    pub async fn get(&self) -> AppResult<Option<DeveloperInfo>> {
        self.session.require(Action::ViewContent)?;
        let raw = self.store.get(&info_path()).await?;
        decode_info(&raw)
    }

    pub async fn subscribe(&self) -> AppResult<Subscription> {
        self.session.require(Action::ViewContent)?;
        Ok(self.store.subscribe(&info_path()).await?)
    }

    async fn write(&self, info: &DeveloperInfo) -> AppResult<()> {
        let value = serde_json::to_value(info).map_err(|e| AppError::internal("encode_profile", e.to_string()))?;
        self.store.set(&info_path(), value).await.map_err(|e| {
            AppError::io("profile_save", format!("Failed to save. Check your database permissions. ({e})"))
        })
    }

    pub async fn set_profile(&self, name: &str, subtitle: &str) -> AppResult<DeveloperInfo> {
        let session = self.session.require(Action::EditDeveloperInfo)?;
        let mut info = self.get().await?.unwrap_or_default();
        info.name = Some(name.trim().to_string()).filter(|s| !s.is_empty());
        info.subtitle = Some(subtitle.trim().to_string()).filter(|s| !s.is_empty());
        self.write(&info).await?;
        info!(user = %session.identifier, "developer profile updated");
        self.logger.spawn_log(&session.identifier, actions::UPDATE_PROFILE, "profile");
        Ok(info)
    }

    /// Store `bytes` as the profile photo; name and subtitle stay as they are.
    pub async fn set_photo(&self, bytes: &[u8], mime: &str) -> AppResult<DeveloperInfo> {
        let session = self.session.require(Action::EditDeveloperInfo)?;
        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(AppError::user("photo_too_large", "Image is too large. Please select an image under 1MB."));
        }
        if bytes.is_empty() {
            return Err(AppError::user("photo_empty", "The selected image is empty."));
        }
        let mut info = self.get().await?.unwrap_or_default();
        info.photo_url = Some(photo_data_url(bytes, mime));
        self.write(&info).await?;
        self.logger.spawn_log(&session.identifier, actions::UPDATE_PROFILE, "photo");
        Ok(info)
    }
}

/// Guess an image MIME type from a file extension.
pub fn mime_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::StaticIp;
    use crate::identity::{ensure_anonymous, LocalBackendAuth, Role, Session};
    use crate::store::MemoryStore;

    async fn profile(role: Role) -> DeveloperProfile {
        let store = MemoryStore::new();
        let auth = Arc::new(LocalBackendAuth::new());
        ensure_anonymous(auth.as_ref(), &store).await.unwrap();
        let (ctx, writer) = SessionContext::pair();
        writer.set(Session::new("someone", role));
        let logger = ActivityLogger::new(Arc::new(store.clone()), auth, Arc::new(StaticIp("unknown".into())), ctx.clone());
        DeveloperProfile::new(Arc::new(store), ctx, logger)
    }

    #[tokio::test]
    async fn photo_keeps_other_fields() {
        let dev = profile(Role::Owner).await;
        assert_eq!(dev.get().await.unwrap(), None);
        dev.set_profile("Dev Name", "HSC 26").await.unwrap();
        let info = dev.set_photo(&[0x89, 0x50, 0x4e, 0x47], "image/png").await.unwrap();
        assert_eq!(info.name.as_deref(), Some("Dev Name"));
        assert_eq!(info.photo_url.as_deref(), Some("data:image/png;base64,iVBORw=="));
        assert_eq!(dev.get().await.unwrap(), Some(info));
    }

    #[tokio::test]
    async fn oversized_photos_are_rejected() {
        let dev = profile(Role::Owner).await;
        let big = vec![0u8; MAX_PHOTO_BYTES + 1];
        assert_eq!(dev.set_photo(&big, "image/jpeg").await.unwrap_err().code_str(), "photo_too_large");
        assert!(dev.set_photo(&vec![0u8; MAX_PHOTO_BYTES], "image/jpeg").await.is_ok());
    }

    #[tokio::test]
    async fn only_owner_edits_but_everyone_reads() {
        let dev = profile(Role::Admin).await;
        assert!(dev.set_profile("x", "y").await.unwrap_err().is_permission_denied());
        assert!(dev.set_photo(&[1], "image/png").await.unwrap_err().is_permission_denied());
        assert!(dev.get().await.is_ok());
        assert!(dev.subscribe().await.is_ok());
    }

    #[test]
    fn mime_guess() {
        assert_eq!(mime_for(std::path::Path::new("me.PNG")), "image/png");
        assert_eq!(mime_for(std::path::Path::new("me")), "image/jpeg");
    }
}
