//! Alias-map layer: `raw → canonical` lookup tables for place, publisher,
//! and agent normalization (spec §4.2, §6 "Alias maps").
//!
//! Production maps are built offline by [`crate::normalize::alias_builder`]
//! and persisted as a single JSON object per attribute; this module only
//! loads and queries them.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Sentinel canonical value marking an ambiguous raw entry (spec §4.2).
pub const AMBIGUOUS_SENTINEL: &str = "__ambiguous__";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AliasMap {
    entries: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasLookup {
    Canonical(String),
    Ambiguous,
    Miss,
}

impl AliasMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> anyhow::Result<Self> {
        let entries: HashMap<String, String> = serde_json::from_str(text)?;
        Ok(Self { entries })
    }

    pub fn lookup(&self, cleaned_key: &str) -> AliasLookup {
        match self.entries.get(cleaned_key) {
            Some(v) if v == AMBIGUOUS_SENTINEL => AliasLookup::Ambiguous,
            Some(v) => AliasLookup::Canonical(v.clone()),
            None => AliasLookup::Miss,
        }
    }

    pub fn insert(&mut self, raw_key: String, canonical: String) {
        self.entries.insert(raw_key, canonical);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_sentinel_is_detected() {
        let mut map = AliasMap::empty();
        map.insert("aldo manuzio".to_string(), AMBIGUOUS_SENTINEL.to_string());
        assert_eq!(map.lookup("aldo manuzio"), AliasLookup::Ambiguous);
    }

    #[test]
    fn canonical_hit() {
        let mut map = AliasMap::empty();
        map.insert("venegia".to_string(), "venice".to_string());
        assert_eq!(
            map.lookup("venegia"),
            AliasLookup::Canonical("venice".to_string())
        );
    }

    #[test]
    fn miss_for_unknown_key() {
        let map = AliasMap::empty();
        assert_eq!(map.lookup("nowhere"), AliasLookup::Miss);
    }
}
