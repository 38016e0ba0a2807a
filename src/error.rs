//! Unified application error model and alert helpers.
//! Every user-visible failure in the portal is an `AppError`; its `message` is the
//! alert text shown to the user, its `code` is a stable machine-readable tag.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn io(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AppError::Forbidden { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied { path } => AppError::Forbidden {
                code: "permission_denied".into(),
                message: format!("Permission denied at {path}"),
            },
            StoreError::InvalidPath(p) => AppError::UserInput { code: "invalid_path".into(), message: p },
            StoreError::Network(m) => alerts::connection(m),
            other => AppError::Io { code: "store".into(), message: other.to_string() },
        }
    }
}

/// Alert texts shown by the portal. Bengali strings are the product's own wording.
pub mod alerts {
    use super::AppError;
    use crate::store::StoreError;
    use std::fmt::Display;

    pub const INVALID_CREDENTIALS: &str = "ভুল আইডি বা পাসওয়ার্ড!";
    pub const CONNECTION: &str = "কানেকশন এরর! ইন্টারনেট চেক করুন।";
    pub const SAVE_DENIED: &str = "ভুল (Error): ডেটাবেসে অনুমতি নেই (Permission Denied)!";
    pub const SAVE_FAILED: &str = "সেভ করতে সমস্যা হয়েছে। দয়া করে আপনার ইন্টারনেট কানেকশন চেক করুন।";
    pub const DELETE_DENIED: &str = "ভুল (Error): ডিলিট করার অনুমতি নেই।";
    pub const DELETE_FAILED: &str = "ডিলিট করতে সমস্যা হয়েছে।";
    pub const CONFLICT: &str = "This chapter was changed from another session. Reload and try again.";
    pub const NOT_SIGNED_IN: &str = "Please log in first.";

    pub fn invalid_credentials() -> AppError {
        AppError::auth("invalid_credentials", INVALID_CREDENTIALS)
    }

    pub fn connection(detail: impl Display) -> AppError {
        tracing::debug!("connection failure: {detail}");
        AppError::io("connection", CONNECTION)
    }

    pub fn missing_field(message: &str) -> AppError {
        AppError::user("missing_field", message)
    }

    pub fn not_signed_in() -> AppError {
        AppError::auth("not_signed_in", NOT_SIGNED_IN)
    }

    pub fn not_allowed(message: &str) -> AppError {
        AppError::forbidden("not_allowed", message)
    }

    pub fn conflict() -> AppError {
        AppError::conflict("stale_write", CONFLICT)
    }

    /// Save failure: permission rejections get their own text, everything else is
    /// reported as a connectivity problem.
    pub fn save_failed(err: &StoreError) -> AppError {
        tracing::error!("save error: {err}");
        if err.is_permission_denied() {
            AppError::forbidden("permission_denied", SAVE_DENIED)
        } else {
            AppError::io("save_failed", SAVE_FAILED)
        }
    }

    pub fn delete_failed(err: &StoreError) -> AppError {
        tracing::error!("delete error: {err}");
        if err.is_permission_denied() {
            AppError::forbidden("permission_denied", DELETE_DENIED)
        } else {
            AppError::io("delete_failed", DELETE_FAILED)
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
