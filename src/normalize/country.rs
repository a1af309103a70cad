//! Country-code to country-name resolution (spec §3.2: `country_name` is
//! "derived from `country_code` via static map; null if unmapped").
//!
//! Codes follow the MARC country code list (field 008/15-17 and the 044
//! imprint country code), not ISO 3166 — hence entries like `"it "` for
//! Italy rather than `"it"`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static COUNTRY_NAME_TABLE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("it", "Italy"),
        ("fr", "France"),
        ("gw", "Germany"),
        ("xxu", "United Kingdom"),
        ("enk", "England"),
        ("sz", "Switzerland"),
        ("ne", "Netherlands"),
        ("sp", "Spain"),
        ("bl", "Belgium"),
        ("au", "Austria"),
        ("pl", "Poland"),
        ("po", "Portugal"),
    ])
});

/// Resolve a country code to its display name, trimming and case-folding
/// first since raw codes are sometimes padded to a fixed width in MARC
/// source records. Returns `None` for an unmapped or absent code.
pub fn country_name(country_code: Option<&str>) -> Option<String> {
    let code = country_code?.trim().to_lowercase();
    COUNTRY_NAME_TABLE.get(code.as_str()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_resolves_to_name() {
        assert_eq!(country_name(Some("it")), Some("Italy".to_string()));
    }

    #[test]
    fn padded_code_is_trimmed_and_folded() {
        assert_eq!(country_name(Some(" IT  ")), Some("Italy".to_string()));
    }

    #[test]
    fn unmapped_code_is_none() {
        assert_eq!(country_name(Some("zz")), None);
    }

    #[test]
    fn absent_code_is_none() {
        assert_eq!(country_name(None), None);
    }
}
