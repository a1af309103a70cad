//! Place and publisher normalization (spec §4.2).
//!
//! Two layers, applied in order:
//! 1. `base_clean` — deterministic text cleanup, confidence 0.80.
//! 2. `alias_map` — lookup against an offline-built alias table, confidence
//!    0.95. A sentinel hit marks the value ambiguous: excluded from
//!    canonical indexing, but the raw text is always retained untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::normalize::alias_map::{AliasLookup, AliasMap};
use crate::record::PlaceMethod;

static SURROUNDING_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(.*)\]$").unwrap());
static COLLAPSE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceNorm {
    /// Canonical lookup key: lowercase ASCII-folded.
    pub norm: Option<String>,
    /// Human-readable cleaned form, original casing preserved.
    pub display: Option<String>,
    pub confidence: f32,
    pub method: Option<PlaceMethod>,
    /// True when the alias map resolved this value to the ambiguous
    /// sentinel: excluded from canonical indexing, raw is still kept.
    pub ambiguous: bool,
}

fn strip_brackets(s: &str) -> &str {
    match SURROUNDING_BRACKETS.captures(s) {
        Some(c) => c.get(1).unwrap().as_str(),
        None => s,
    }
}

fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(|c: char| ".,;:/ ".contains(c))
}

/// ASCII-fold via NFKD decomposition, dropping combining marks, then
/// lowercase. Used only for the canonical lookup key, never for display.
fn ascii_fold_lower(s: &str) -> String {
    s.nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Base clean: strip surrounding brackets, trim trailing punctuation,
/// NFKC-normalize, collapse internal whitespace. Case is preserved in the
/// display form; the norm key is additionally ASCII-folded and lowercased.
fn base_clean(raw: &str) -> (String, String) {
    let stripped = strip_brackets(raw.trim());
    let trimmed = trim_trailing_punctuation(stripped).trim();
    let nfkc: String = trimmed.nfkc().collect();
    let collapsed = COLLAPSE_WHITESPACE.replace_all(&nfkc, " ").to_string();
    let norm_key = ascii_fold_lower(&collapsed);
    (collapsed, norm_key)
}

/// Normalize a place or publisher raw value through base-clean and then the
/// alias-map layer. `alias` may be the empty map, in which case only
/// base-clean applies.
pub fn normalize_place_or_publisher(raw: &str, alias: &AliasMap) -> PlaceNorm {
    if raw.trim().is_empty() {
        return PlaceNorm {
            norm: None,
            display: None,
            confidence: 0.0,
            method: None,
            ambiguous: false,
        };
    }

    let (display, norm_key) = base_clean(raw);

    match alias.lookup(&norm_key) {
        AliasLookup::Canonical(canonical) => PlaceNorm {
            norm: Some(canonical),
            display: Some(display),
            confidence: 0.95,
            method: Some(PlaceMethod::AliasMap),
            ambiguous: false,
        },
        AliasLookup::Ambiguous => PlaceNorm {
            norm: Some("ambiguous".to_string()),
            display: Some(display),
            confidence: 0.0,
            method: Some(PlaceMethod::AliasMap),
            ambiguous: true,
        },
        AliasLookup::Miss => PlaceNorm {
            norm: Some(norm_key),
            display: Some(display),
            confidence: 0.80,
            method: Some(PlaceMethod::BaseClean),
            ambiguous: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn strips_brackets_and_trailing_punctuation() {
        let p = normalize_place_or_publisher("[Venetiis :]", &AliasMap::empty());
        assert_eq!(p.display.as_deref(), Some("Venetiis"));
        assert_eq!(p.confidence, 0.80);
        assert_eq!(p.method, Some(PlaceMethod::BaseClean));
    }

    #[test]
    fn collapses_internal_whitespace() {
        let p = normalize_place_or_publisher("Venetiis,   apud  Aldum", &AliasMap::empty());
        assert_eq!(p.display.as_deref(), Some("Venetiis, apud Aldum"));
    }

    #[test]
    fn norm_key_is_ascii_folded_and_lowercased() {
        let p = normalize_place_or_publisher("Venezia", &AliasMap::empty());
        assert_eq!(p.norm.as_deref(), Some("venezia"));
    }

    #[test]
    fn alias_hit_wins_over_base_clean() {
        let mut entries = HashMap::new();
        entries.insert("venegia".to_string(), "venice".to_string());
        let alias = AliasMap::from_entries(entries);
        let p = normalize_place_or_publisher("Venegia", &alias);
        assert_eq!(p.norm.as_deref(), Some("venice"));
        assert_eq!(p.confidence, 0.95);
        assert_eq!(p.method, Some(PlaceMethod::AliasMap));
        assert!(!p.ambiguous);
    }

    #[test]
    fn ambiguous_sentinel_is_excluded_but_raw_display_kept() {
        let mut entries = HashMap::new();
        entries.insert(
            "aldo manuzio".to_string(),
            crate::normalize::alias_map::AMBIGUOUS_SENTINEL.to_string(),
        );
        let alias = AliasMap::from_entries(entries);
        let p = normalize_place_or_publisher("Aldo Manuzio", &alias);
        assert!(p.ambiguous);
        assert_eq!(p.confidence, 0.0);
        assert_eq!(p.norm.as_deref(), Some("ambiguous"));
        assert_eq!(p.display.as_deref(), Some("Aldo Manuzio"));
    }

    #[test]
    fn empty_raw_yields_no_normalization() {
        let p = normalize_place_or_publisher("   ", &AliasMap::empty());
        assert_eq!(p.norm, None);
        assert_eq!(p.confidence, 0.0);
        assert_eq!(p.method, None);
    }
}
