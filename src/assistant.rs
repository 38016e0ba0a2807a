//! Study assistant: one question in, one answer (plus sources) out.
//!
//! `ask` never fails. Any problem with the model call degrades to a fixed apology
//! so callers only ever render what comes back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::model::Subject;

pub const NO_ANSWER: &str = "দুঃখিত, আমি এই মুহূর্তে উত্তর দিতে পারছি না।";
pub const APOLOGY: &str = "সার্ভারে সমস্যা হচ্ছে। অনুগ্রহ করে কিছুক্ষণ পর আবার চেষ্টা করুন।";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyHelp {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("no API key configured for the model endpoint")]
    MissingKey,
    #[error("model request failed: {0}")]
    Network(String),
    #[error("model endpoint answered HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("unreadable model reply: {0}")]
    Decode(String),
}

/// Raw model output before fallbacks are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub citations: Vec<Citation>,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, AssistantError>;
}

/// `models/{model}:generateContent` with Google Search grounding.
pub struct GeminiBackend {
    client: reqwest::Client,
    base: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(base: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Default)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Default)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Deserialize, Default)]
struct WebSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

impl GenerateResponse {
    fn into_reply(self) -> ModelReply {
        let Some(first) = self.candidates.into_iter().next() else { return ModelReply::default(); };
        let text: String = first
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        // Sources without a link are dropped; untitled ones are labelled "Source".
        let citations = first
            .grounding_metadata
            .map(|g| g.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.web)
            .filter_map(|w| {
                let uri = w.uri.filter(|u| !u.is_empty() && u != "#")?;
                Some(Citation { title: w.title.filter(|t| !t.is_empty()).unwrap_or_else(|| "Source".into()), uri })
            })
            .collect();
        ModelReply { text: Some(text).filter(|t| !t.trim().is_empty()), citations }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, AssistantError> {
        let key = self.api_key.as_deref().ok_or(AssistantError::MissingKey)?;
        let url = format!("{}/models/{}:generateContent?key={}", self.base, self.model, urlencoding::encode(key));
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }],
        });
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssistantError::Upstream { status: status.as_u16(), body });
        }
        let parsed: GenerateResponse = resp.json().await.map_err(|e| AssistantError::Decode(e.to_string()))?;
        Ok(parsed.into_reply())
    }
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert academic tutor for HSC (Higher Secondary Certificate) students in Bangladesh.\n\
         The student is currently studying: {context}.\n\
         \n\
         User's Question: {question}\n\
         \n\
         Instructions:\n\
         1. Provide a clear, step-by-step explanation.\n\
         2. If it's a math or science problem, show the formulas and logic.\n\
         3. Use a friendly, encouraging tone in a mix of Bengali and English (Banglish) where appropriate for a Bangladeshi student.\n\
         4. Use recent academic standards.\n\
         5. If you use external information, the search tool will provide grounding."
    )
}

#[derive(Clone)]
pub struct StudyAssistant {
    backend: Arc<dyn ModelBackend>,
}

impl StudyAssistant {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self { Self { backend } }

    /// Answer `question` in the context of a subject. Blank questions return an
    /// empty answer without calling the model.
    pub async fn ask(&self, question: &str, context: &str) -> StudyHelp {
        if question.trim().is_empty() {
            return StudyHelp::default();
        }
        let prompt = build_prompt(question.trim(), context);
        match self.backend.generate(&prompt).await {
            Ok(reply) => StudyHelp {
                text: reply.text.unwrap_or_else(|| NO_ANSWER.to_string()),
                citations: reply.citations,
            },
            Err(e) => {
                error!("assistant error: {e}");
                StudyHelp { text: APOLOGY.to_string(), citations: Vec::new() }
            }
        }
    }

    pub async fn ask_about(&self, question: &str, subject: Option<Subject>) -> StudyHelp {
        let context = subject.map(|s| s.assistant_context()).unwrap_or_else(|| "General HSC study".to_string());
        debug!(%context, "assistant question");
        self.ask(question, &context).await
    }
}
