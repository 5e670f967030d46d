//! Old-to-new identifier mapping built during one clone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Substitute every occurrence of `old` in `name` with `new`.
///
/// Returns `None` when `old` does not occur, leaving the caller to decide
/// whether an unchanged name is acceptable.
pub fn rewrite_volume_name(name: &str, old: &str, new: &str) -> Option<String> {
    if old.is_empty() || !name.contains(old) {
        return None;
    }
    Some(name.replace(old, new))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMapping {
    pairs: BTreeMap<String, String>,
}

impl IdentifierMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.pairs.insert(old.into(), new.into());
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.pairs.get(old).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rewrite a volume name owned by `owner`, if the owner was remapped.
    pub fn rewrite(&self, name: &str, owner: &str) -> Option<String> {
        let new = self.get(owner)?;
        rewrite_volume_name(name, owner, new)
    }

    /// Rewrite every identifier of `lineage` that `name` embeds, owner first.
    ///
    /// `lineage` lists the owner's identifier followed by its ancestors', so a
    /// service member volume named after the service is still remapped.
    /// Returns `None` when none of them occurs.
    pub fn rewrite_any(&self, name: &str, lineage: &[&str]) -> Option<String> {
        let mut renamed: Option<String> = None;
        for old in lineage {
            let current = renamed.as_deref().unwrap_or(name);
            if let Some(next) = self.rewrite(current, old) {
                renamed = Some(next);
            }
        }
        renamed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_occurrence_and_nothing_else() {
        let renamed = rewrite_volume_name("abc_data_abc-backup", "abc", "xyz").unwrap();
        assert_eq!(renamed, "xyz_data_xyz-backup");
    }

    #[test]
    fn absent_identifier_yields_none() {
        assert_eq!(rewrite_volume_name("postgres-data", "abc", "xyz"), None);
    }

    #[test]
    fn empty_identifier_never_matches() {
        assert_eq!(rewrite_volume_name("data", "", "xyz"), None);
    }

    #[test]
    fn mapping_rewrites_by_owner() {
        let mut mapping = IdentifierMapping::new();
        mapping.insert("old1", "new1");
        assert_eq!(
            mapping.rewrite("old1-pgdata", "old1"),
            Some("new1-pgdata".to_string())
        );
        assert_eq!(mapping.rewrite("old2-pgdata", "old2"), None);
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn lineage_prefers_owner_then_ancestors() {
        let mut mapping = IdentifierMapping::new();
        mapping.insert("svc1", "new001");
        mapping.insert("app1", "new003");
        assert_eq!(
            mapping.rewrite_any("app1-content", &["app1", "svc1"]),
            Some("new003-content".to_string())
        );
        assert_eq!(
            mapping.rewrite_any("svc1_ghost-content", &["app1", "svc1"]),
            Some("new001_ghost-content".to_string())
        );
        assert_eq!(
            mapping.rewrite_any("svc1_app1-data", &["app1", "svc1"]),
            Some("new001_new003-data".to_string())
        );
        assert_eq!(mapping.rewrite_any("ghost-content", &["app1", "svc1"]), None);
    }
}
