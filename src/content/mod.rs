//! Chapters and resources per subject, mirrored live from the document store.
//!
//! Each subject node holds its chapters keyed by a stable id with an explicit
//! `order` and an `updatedAt` stamp. Edits write one chapter at a time and refuse
//! to overwrite a chapter someone else changed since it was last seen.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{alerts, AppError, AppResult};
use crate::model::{Chapter, Resource, Subject};
use crate::store::DocPath;

mod sync;

pub use sync::ContentSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shelf {
    /// Content students see.
    Academy,
    /// Chapters moved out of the live list, per subject.
    Archive,
}

impl Shelf {
    pub fn root(self) -> &'static str {
        match self {
            Shelf::Academy => "academyData",
            Shelf::Archive => "archiveData",
        }
    }
}

/// Where one subject's chapter list lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentPath {
    pub shelf: Shelf,
    pub subject: Subject,
}

impl ContentPath {
    /// `Subject::Archive` is a namespace, never a chapter list.
    pub fn new(shelf: Shelf, subject: Subject) -> AppResult<Self> {
        if subject.is_archive() {
            return Err(AppError::user(
                "archive_is_namespace",
                "The archive holds other subjects; pick a subject inside it.",
            ));
        }
        Ok(Self { shelf, subject })
    }

    pub fn live(subject: Subject) -> AppResult<Self> { Self::new(Shelf::Academy, subject) }

    pub fn archived(subject: Subject) -> AppResult<Self> { Self::new(Shelf::Archive, subject) }

    pub fn doc_path(&self) -> DocPath {
        DocPath::from_segments(vec![self.shelf.root().to_string(), self.subject.key().to_string()])
    }

    /// Same subject on the other shelf.
    pub fn counterpart(&self) -> ContentPath {
        let shelf = match self.shelf {
            Shelf::Academy => Shelf::Archive,
            Shelf::Archive => Shelf::Academy,
        };
        ContentPath { shelf, subject: self.subject }
    }
}

impl Display for ContentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.shelf.root(), self.subject.key())
    }
}

/// Name and label checks shared by every edit path.
pub fn validate_chapter(name: &str, resources: &[Resource]) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(alerts::missing_field("Chapter name is required!"));
    }
    if resources.iter().any(|r| r.label.trim().is_empty()) {
        return Err(alerts::missing_field("Content title is required!"));
    }
    Ok(())
}

/// Case-insensitive substring match on chapter names, keeping display indices.
pub fn filter_chapters(chapters: &[Chapter], needle: &str) -> Vec<(usize, Chapter)> {
    let needle = needle.trim().to_lowercase();
    chapters
        .iter()
        .enumerate()
        .filter(|(_, c)| needle.is_empty() || c.name.to_lowercase().contains(&needle))
        .map(|(i, c)| (i, c.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_subject_is_not_a_list() {
        assert!(ContentPath::live(Subject::Archive).is_err());
        let p = ContentPath::archived(Subject::Ict).unwrap();
        assert_eq!(p.to_string(), "archiveData/ict");
        assert_eq!(p.doc_path().to_string(), "archiveData/ict");
        assert_eq!(p.counterpart(), ContentPath::live(Subject::Ict).unwrap());
    }

    #[test]
    fn names_and_labels_are_required() {
        assert!(validate_chapter("  ", &[]).is_err());
        let blank = Resource::new(" ", None, None);
        assert_eq!(validate_chapter("Vectors", &[blank]).unwrap_err().message(), "Content title is required!");
        assert!(validate_chapter("Vectors", &[Resource::new("Lecture 1", None, None)]).is_ok());
    }

    #[test]
    fn filter_is_case_insensitive() {
        let chapters = vec![Chapter::new("Vectors", vec![]), Chapter::new("Motion in a Plane", vec![])];
        let hits = filter_chapters(&chapters, "PLANE");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
        assert_eq!(filter_chapters(&chapters, "").len(), 2);
    }
}
