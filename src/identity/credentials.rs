use crate::config::SeedAccount;
use crate::model::AccessControl;

use super::session::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Deploy-time seed file.
    Seeded,
    Admins,
    Students,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub identifier: String,
    pub secret: String,
    pub role: Role,
    pub source: CredentialSource,
}

/// One table for every way of signing in. Identifiers are not unique; a pair that
/// matches several entries resolves to the highest role among them.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    entries: Vec<CredentialEntry>,
}

impl CredentialTable {
    pub fn from_seeds(seeds: &[SeedAccount]) -> Self {
        let entries = seeds
            .iter()
            .map(|s| CredentialEntry {
                identifier: s.identifier.clone(),
                secret: s.secret.clone(),
                role: s.role,
                source: CredentialSource::Seeded,
            })
            .collect();
        Self { entries }
    }

    pub fn with_access(mut self, access: &AccessControl) -> Self {
        for acc in access.admins.values() {
            self.entries.push(CredentialEntry {
                identifier: acc.identifier.clone(),
                secret: acc.secret.clone(),
                role: Role::Admin,
                source: CredentialSource::Admins,
            });
        }
        for acc in access.students.values() {
            self.entries.push(CredentialEntry {
                identifier: acc.identifier.clone(),
                secret: acc.secret.clone(),
                role: Role::Student,
                source: CredentialSource::Students,
            });
        }
        self
    }

    /// Verbatim comparison; no trimming or case folding.
    pub fn resolve(&self, identifier: &str, secret: &str) -> Option<Role> {
        self.entries
            .iter()
            .filter(|e| e.identifier == identifier && e.secret == secret)
            .map(|e| e.role)
            .max()
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserAccount;

    fn acct(u: &str, p: &str) -> UserAccount { UserAccount { identifier: u.into(), secret: p.into() } }

    fn table() -> CredentialTable {
        let seeds = vec![
            SeedAccount { identifier: "01700000000".into(), secret: "own".into(), role: Role::Owner },
            SeedAccount { identifier: "ops".into(), secret: "ops-pw".into(), role: Role::Admin },
        ];
        let mut access = AccessControl::default();
        access.students.insert("k1".into(), acct("01711111111", "s1"));
        access.students.insert("k2".into(), acct("ops", "ops-pw"));
        access.admins.insert("k3".into(), acct("01722222222", "a1"));
        access.admins.insert("k4".into(), acct("01700000000", "own"));
        CredentialTable::from_seeds(&seeds).with_access(&access)
    }

    #[test]
    fn highest_matching_role_wins() {
        let t = table();
        assert_eq!(t.len(), 6);
        assert_eq!(t.resolve("01711111111", "s1"), Some(Role::Student));
        assert_eq!(t.resolve("01722222222", "a1"), Some(Role::Admin));
        assert_eq!(t.resolve("ops", "ops-pw"), Some(Role::Admin));
        assert_eq!(t.resolve("01700000000", "own"), Some(Role::Owner));
    }

    #[test]
    fn comparison_is_verbatim() {
        let t = table();
        assert_eq!(t.resolve("01711111111", "S1"), None);
        assert_eq!(t.resolve(" 01711111111", "s1"), None);
        assert_eq!(t.resolve("01711111111", "a1"), None);
        assert_eq!(CredentialTable::default().resolve("", ""), None);
    }
}
