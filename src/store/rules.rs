//! Declarative access rules evaluated by the store on every request.
//! A rule applies to its path prefix; the longest matching prefix wins.

use serde::{Deserialize, Serialize};

use super::{DocPath, IdToken, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Authenticated,
    Denied,
}

impl Access {
    fn permits(self, who: Option<&IdToken>) -> bool {
        match self {
            Access::Public => true,
            Access::Authenticated => who.is_some(),
            Access::Denied => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub path: DocPath,
    pub read: Access,
    pub write: Access,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default = "Rules::default_access")]
    pub default_read: Access,
    #[serde(default = "Rules::default_access")]
    pub default_write: Access,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for Rules {
    fn default() -> Self {
        Self { default_read: Access::Authenticated, default_write: Access::Authenticated, rules: Vec::new() }
    }
}

impl Rules {
    fn default_access() -> Access { Access::Authenticated }

    /// Everything open, no identity required.
    pub fn open() -> Self {
        Self { default_read: Access::Public, default_write: Access::Public, rules: Vec::new() }
    }

    pub fn with_rule(mut self, path: &str, read: Access, write: Access) -> Result<Self, StoreError> {
        self.rules.push(Rule { path: DocPath::parse(path)?, read, write });
        Ok(self)
    }

    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(text)?)
    }

    fn most_specific(&self, path: &DocPath) -> Option<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.path.is_ancestor_of(path))
            .max_by_key(|r| r.path.segments().len())
    }

    pub fn check_read(&self, path: &DocPath, who: Option<&IdToken>) -> Result<(), StoreError> {
        let access = self.most_specific(path).map(|r| r.read).unwrap_or(self.default_read);
        if access.permits(who) { Ok(()) } else { Err(StoreError::denied(path)) }
    }

    /// A write at `path` also rewrites everything below it, so any more specific
    /// rule underneath that forbids writing rejects the whole write.
    pub fn check_write(&self, path: &DocPath, who: Option<&IdToken>) -> Result<(), StoreError> {
        let access = self.most_specific(path).map(|r| r.write).unwrap_or(self.default_write);
        if !access.permits(who) { return Err(StoreError::denied(path)); }
        for r in self.rules.iter().filter(|r| path.is_ancestor_of(&r.path) && r.path != *path) {
            if !r.write.permits(who) { return Err(StoreError::denied(&r.path)); }
        }
        Ok(())
    }
}
