//! Agent name and role normalization (spec §4.2).
//!
//! Agent *names* go through the same base-clean / alias-map pipeline as
//! places and publishers (see [`crate::normalize::place`]). Agent *roles*
//! are normalized separately against relator-code and relator-term tables,
//! with confidence keyed to how the raw role was recorded.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::normalize::alias_map::AliasMap;
use crate::normalize::place::{normalize_place_or_publisher, PlaceNorm};
use crate::record::{RoleMethod, RoleNorm, RoleSource};

/// Agent-name normalization reuses the place/publisher pipeline: same
/// base-clean rules, same alias-map semantics, same confidence tiers.
pub fn normalize_agent_name(raw: &str, alias: &AliasMap) -> PlaceNorm {
    normalize_place_or_publisher(raw, alias)
}

/// MARC relator codes ($4), e.g. "aut", "pbl". Grounded in the standard
/// MARC relator code list, trimmed to roles this corpus's vocabulary names.
static RELATOR_CODE_TABLE: Lazy<HashMap<&'static str, RoleNorm>> = Lazy::new(|| {
    HashMap::from([
        ("aut", RoleNorm::Author),
        ("prt", RoleNorm::Printer),
        ("pbl", RoleNorm::Publisher),
        ("trl", RoleNorm::Translator),
        ("edt", RoleNorm::Editor),
        ("ill", RoleNorm::Illustrator),
        ("cmm", RoleNorm::Commentator),
        ("scr", RoleNorm::Scribe),
        ("fmo", RoleNorm::FormerOwner),
        ("dte", RoleNorm::Dedicatee),
        ("bsl", RoleNorm::Bookseller),
        ("egr", RoleNorm::Engraver),
        ("bnd", RoleNorm::Binder),
        ("ann", RoleNorm::Annotator),
    ])
});

/// Free-text relator terms ($e), matched case-insensitively after the
/// caller lowercases the raw value.
static RELATOR_TERM_TABLE: Lazy<HashMap<&'static str, RoleNorm>> = Lazy::new(|| {
    HashMap::from([
        ("author", RoleNorm::Author),
        ("printer", RoleNorm::Printer),
        ("publisher", RoleNorm::Publisher),
        ("translator", RoleNorm::Translator),
        ("editor", RoleNorm::Editor),
        ("illustrator", RoleNorm::Illustrator),
        ("commentator", RoleNorm::Commentator),
        ("scribe", RoleNorm::Scribe),
        ("former owner", RoleNorm::FormerOwner),
        ("dedicatee", RoleNorm::Dedicatee),
        ("bookseller", RoleNorm::Bookseller),
        ("engraver", RoleNorm::Engraver),
        ("binder", RoleNorm::Binder),
        ("annotator", RoleNorm::Annotator),
    ])
});

#[derive(Debug, Clone, PartialEq)]
pub struct RoleNormResult {
    pub role_norm: Option<RoleNorm>,
    pub confidence: f32,
    pub method: RoleMethod,
}

/// Normalize an agent's role given its raw value and where that raw value
/// came from. Confidence is keyed to provenance (spec §4.2): a relator
/// code is the most trustworthy signal, a free-text term next, a
/// tag-based inference (e.g. assuming the 1xx main entry is the author)
/// weaker still, and an unmapped code/term or a missing role both fall
/// back to `RoleNorm::Other` at their respective fixed confidences.
pub fn normalize_role(role_raw: Option<&str>, role_source: RoleSource) -> RoleNormResult {
    match role_source {
        RoleSource::RelatorCode => match role_raw.and_then(|r| RELATOR_CODE_TABLE.get(r.trim())) {
            Some(role) => RoleNormResult {
                role_norm: Some(*role),
                confidence: 0.99,
                method: RoleMethod::RelatorCode,
            },
            None => RoleNormResult {
                role_norm: Some(RoleNorm::Other),
                confidence: 0.60,
                method: RoleMethod::Unmapped,
            },
        },
        RoleSource::RelatorTerm => {
            let key = role_raw.map(|r| r.trim().to_lowercase());
            match key.as_deref().and_then(|k| RELATOR_TERM_TABLE.get(k)) {
                Some(role) => RoleNormResult {
                    role_norm: Some(*role),
                    confidence: 0.95,
                    method: RoleMethod::RelatorTerm,
                },
                None => RoleNormResult {
                    role_norm: Some(RoleNorm::Other),
                    confidence: 0.60,
                    method: RoleMethod::Unmapped,
                },
            }
        }
        RoleSource::InferredFromTag => RoleNormResult {
            role_norm: Some(RoleNorm::Author),
            confidence: 0.60,
            method: RoleMethod::MissingRole,
        },
        RoleSource::Unknown => RoleNormResult {
            role_norm: Some(RoleNorm::Other),
            confidence: 0.50,
            method: RoleMethod::MissingRole,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relator_code_hit_is_high_confidence() {
        let r = normalize_role(Some("aut"), RoleSource::RelatorCode);
        assert_eq!(r.role_norm, Some(RoleNorm::Author));
        assert_eq!(r.confidence, 0.99);
        assert_eq!(r.method, RoleMethod::RelatorCode);
    }

    #[test]
    fn relator_code_miss_is_unmapped() {
        let r = normalize_role(Some("zzz"), RoleSource::RelatorCode);
        assert_eq!(r.role_norm, Some(RoleNorm::Other));
        assert_eq!(r.method, RoleMethod::Unmapped);
        assert_eq!(r.confidence, 0.60);
    }

    #[test]
    fn relator_term_is_case_insensitive() {
        let r = normalize_role(Some("Printer"), RoleSource::RelatorTerm);
        assert_eq!(r.role_norm, Some(RoleNorm::Printer));
        assert_eq!(r.confidence, 0.95);
        assert_eq!(r.method, RoleMethod::RelatorTerm);
    }

    #[test]
    fn inferred_from_tag_assumes_author_at_moderate_confidence() {
        let r = normalize_role(None, RoleSource::InferredFromTag);
        assert_eq!(r.role_norm, Some(RoleNorm::Author));
        assert_eq!(r.confidence, 0.60);
    }

    #[test]
    fn unknown_source_yields_other_role_at_missing_role_confidence() {
        let r = normalize_role(None, RoleSource::Unknown);
        assert_eq!(r.role_norm, Some(RoleNorm::Other));
        assert_eq!(r.confidence, 0.50);
        assert_eq!(r.method, RoleMethod::MissingRole);
    }

    #[test]
    fn agent_name_reuses_place_pipeline() {
        let n = normalize_agent_name("[Manutius, Aldus]", &AliasMap::empty());
        assert_eq!(n.display.as_deref(), Some("Manutius, Aldus"));
    }
}
