use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::StoreError;

const FORBIDDEN_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Slash-separated location inside the document tree. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn root() -> Self { Self { segments: Vec::new() } }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() { return Ok(Self::root()); }
        let mut segments = Vec::new();
        for seg in trimmed.split('/') {
            validate_segment(seg, raw)?;
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    /// Path from segments known to be valid (fixed keys, generated ids).
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        debug_assert!(segments.iter().all(|s| validate_segment(s, s).is_ok()));
        Self { segments }
    }

    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        let mut next = self.clone();
        for seg in segment.trim_matches('/').split('/') {
            validate_segment(seg, segment)?;
            next.segments.push(seg.to_string());
        }
        Ok(next)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() { return None; }
        let mut p = self.clone();
        p.segments.pop();
        Some(p)
    }

    pub fn segments(&self) -> &[String] { &self.segments }

    pub fn last(&self) -> Option<&str> { self.segments.last().map(|s| s.as_str()) }

    pub fn is_root(&self) -> bool { self.segments.is_empty() }

    /// True when `self` equals `other` or contains it.
    pub fn is_ancestor_of(&self, other: &DocPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a == b)
    }

    /// True when a write at one path can change the value observed at the other.
    pub fn overlaps(&self, other: &DocPath) -> bool {
        self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    /// Segments of `other` below `self`, when `self` is an ancestor.
    pub fn relative<'a>(&self, other: &'a DocPath) -> Option<&'a [String]> {
        if self.is_ancestor_of(other) { Some(&other.segments[self.segments.len()..]) } else { None }
    }
}

fn validate_segment(seg: &str, raw: &str) -> Result<(), StoreError> {
    if seg.is_empty() {
        return Err(StoreError::InvalidPath(format!("empty segment in '{raw}'")));
    }
    if seg.chars().any(|c| FORBIDDEN_CHARS.contains(&c) || c.is_control()) {
        return Err(StoreError::InvalidPath(format!("illegal character in '{raw}'")));
    }
    Ok(())
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl std::str::FromStr for DocPath {
    type Err = StoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { DocPath::parse(s) }
}

impl Serialize for DocPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DocPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let p = DocPath::parse("/academyData/p1/").unwrap();
        assert_eq!(p.segments(), &["academyData".to_string(), "p1".to_string()]);
        assert_eq!(p.to_string(), "academyData/p1");
        assert!(DocPath::parse("").unwrap().is_root());
    }

    #[test]
    fn rejects_reserved_characters() {
        assert!(DocPath::parse("a/b.c").is_err());
        assert!(DocPath::parse("a//b").is_err());
        assert!(DocPath::parse("a/$b").is_err());
        assert!(DocPath::root().child("x#").is_err());
    }

    #[test]
    fn ancestry_and_overlap() {
        let a = DocPath::parse("academyData").unwrap();
        let b = a.child("p1/0").unwrap();
        let c = DocPath::parse("archiveData/p1").unwrap();
        assert!(a.is_ancestor_of(&b));
        assert!(!b.is_ancestor_of(&a));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(DocPath::root().is_ancestor_of(&c));
        assert_eq!(a.relative(&b).unwrap(), &["p1".to_string(), "0".to_string()]);
        assert_eq!(b.parent().unwrap().to_string(), "academyData/p1");
    }
}
