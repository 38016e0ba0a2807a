//! Portal data model: subjects, chapters, resources, accounts, developer profile and
//! activity records, with the wire shapes used in the document store.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed top-level content categories. `Archive` is a namespace over the others
/// rather than a subject with chapters of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    P1,
    P2,
    C1,
    C2,
    B1,
    B2,
    M1,
    M2,
    Ict,
    Lan,
    Archive,
}

impl Subject {
    pub const ALL: [Subject; 11] = [
        Subject::P1, Subject::P2, Subject::C1, Subject::C2, Subject::B1, Subject::B2,
        Subject::M1, Subject::M2, Subject::Ict, Subject::Lan, Subject::Archive,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Subject::P1 => "p1",
            Subject::P2 => "p2",
            Subject::C1 => "c1",
            Subject::C2 => "c2",
            Subject::B1 => "b1",
            Subject::B2 => "b2",
            Subject::M1 => "m1",
            Subject::M2 => "m2",
            Subject::Ict => "ict",
            Subject::Lan => "lan",
            Subject::Archive => "archive",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Subject::P1 => "Physics 1st",
            Subject::P2 => "Physics 2nd",
            Subject::C1 => "Chemistry 1st",
            Subject::C2 => "Chemistry 2nd",
            Subject::B1 => "Biology 1st",
            Subject::B2 => "Biology 2nd",
            Subject::M1 => "Higher Math 1st",
            Subject::M2 => "Higher Math 2nd",
            Subject::Ict => "ICT",
            Subject::Lan => "Languages",
            Subject::Archive => "Resource Archive",
        }
    }

    pub fn is_archive(self) -> bool { self == Subject::Archive }

    /// Context line handed to the study assistant.
    pub fn assistant_context(self) -> String {
        format!("Subject: {}", self.display_name())
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.key()) }
}

impl FromStr for Subject {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let k = s.trim().to_ascii_lowercase();
        Subject::ALL
            .iter()
            .copied()
            .find(|sub| sub.key() == k)
            .ok_or_else(|| format!("unknown subject '{s}'"))
    }
}

/// One study link. Either link may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
}

impl Resource {
    pub fn new(label: impl Into<String>, vid: Option<String>, pdf: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            vid: vid.filter(|v| !v.trim().is_empty()),
            pdf: pdf.filter(|p| !p.trim().is_empty()),
        }
    }
}

/// A chapter as the portal sees it, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Milliseconds since the epoch of the last per-chapter write; 0 when unknown.
    #[serde(default)]
    pub updated_at: i64,
}

impl Chapter {
    pub fn new(name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), name: name.into(), resources, updated_at: 0 }
    }
}

/// Storage shape of a chapter: keyed by id under its subject, with an explicit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChapter {
    pub name: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Legacy array element shape (no ids, positional identity).
#[derive(Debug, Clone, Deserialize)]
struct LegacyChapter {
    name: String,
    #[serde(default)]
    resources: Vec<Resource>,
}

impl StoredChapter {
    pub fn from_chapter(ch: &Chapter, order: i64) -> Self {
        Self { name: ch.name.clone(), order, updated_at: ch.updated_at, resources: ch.resources.clone() }
    }

    pub fn into_chapter(self, id: String) -> Chapter {
        Chapter { id, name: self.name, resources: self.resources, updated_at: self.updated_at }
    }
}

/// Decode a subject node into display order. Accepts the keyed form and the legacy
/// array form; legacy entries get positional ids (`legacy-{index}`) and resources
/// without ids get `{chapter}-r{index}`.
pub fn decode_chapters(value: &serde_json::Value) -> Result<Vec<(Chapter, i64)>, serde_json::Error> {
    let mut out: Vec<(Chapter, i64)> = match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => {
            let mut v = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if item.is_null() { continue; }
                let legacy: LegacyChapter = serde_json::from_value(item.clone())?;
                let ch = Chapter { id: format!("legacy-{i}"), name: legacy.name, resources: legacy.resources, updated_at: 0 };
                v.push((ch, i as i64));
            }
            v
        }
        serde_json::Value::Object(map) => {
            let mut v = Vec::with_capacity(map.len());
            for (id, item) in map {
                let stored: StoredChapter = serde_json::from_value(item.clone())?;
                let order = stored.order;
                v.push((stored.into_chapter(id.clone()), order));
            }
            v
        }
        other => {
            return Err(serde::de::Error::custom(format!("unexpected subject node: {other}")));
        }
    };
    out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
    for (ch, _) in out.iter_mut() {
        for (i, r) in ch.resources.iter_mut().enumerate() {
            if r.id.is_empty() { r.id = format!("{}-r{i}", ch.id); }
        }
    }
    Ok(out)
}

/// Encode chapters in the given order as the keyed storage form.
pub fn encode_chapters(chapters: &[Chapter]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (i, ch) in chapters.iter().enumerate() {
        let stored = StoredChapter::from_chapter(ch, i as i64);
        map.insert(ch.id.clone(), serde_json::to_value(stored).unwrap_or(serde_json::Value::Null));
    }
    serde_json::Value::Object(map)
}

/// Login credential pair, compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(rename = "u")]
    pub identifier: String,
    #[serde(rename = "p")]
    pub secret: String,
}

/// The `access` document: generated key → account, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    #[serde(default)]
    pub admins: BTreeMap<String, UserAccount>,
    #[serde(default)]
    pub students: BTreeMap<String, UserAccount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Student,
    Admin,
}

impl AccountKind {
    pub fn collection(self) -> &'static str {
        match self {
            AccountKind::Student => "students",
            AccountKind::Admin => "admins",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" | "students" => Ok(AccountKind::Student),
            "admin" | "admins" => Ok(AccountKind::Admin),
            other => Err(format!("unknown account kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperInfo {
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

/// Append-only activity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user: String,
    pub action: String,
    #[serde(default)]
    pub details: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub ip: String,
}
