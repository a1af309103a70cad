//! Shared filter-value normalization (spec §4.4): EQUALS and CONTAINS
//! must fold case the same way so a title match found one way is never
//! lost to the other, but they quote differently for full-text search.
//! Spec flags this area explicitly as one where past implementations have
//! drifted apart and introduced bugs, so it gets direct tests.

/// Case-fold a value the same way regardless of which operator will use
/// it, so `EQUALS "Aldus"` and `CONTAINS "aldus"` compare against the
/// same normalized column.
pub fn fold_case(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Escape a value for use inside a `tsquery` phrase: double quotes are
/// doubled, and the result is always wrapped in quotes so the FTS parser
/// treats it as a single phrase rather than tokenizing on whitespace.
pub fn quote_for_fts(value: &str) -> String {
    let escaped = fold_case(value).replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Escape a value for a plain `=` / `LIKE` comparison: no FTS quoting,
/// but `%` and `_` are escaped since EQUALS never does wildcard matching.
pub fn escape_for_equals(value: &str) -> String {
    fold_case(value).replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Escape a value for the body of an `ILIKE '%...%'` substring match: the
/// fallback CONTAINS path for fields with no FTS shadow table (spec §8
/// edge case). Wildcards are escaped the same way EQUALS escapes them, so
/// only the surrounding `%` wrapping added by the caller is literal.
pub fn escape_for_substring(value: &str) -> String {
    escape_for_equals(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_case_is_consistent_across_equals_and_contains() {
        assert_eq!(fold_case("Aldus"), fold_case("aldus"));
    }

    #[test]
    fn quote_for_fts_wraps_and_escapes_quotes() {
        assert_eq!(quote_for_fts(r#"the "aldine" press"#), "\"the \"\"aldine\"\" press\"");
    }

    #[test]
    fn escape_for_equals_neutralizes_wildcards() {
        assert_eq!(escape_for_equals("100%_match"), "100\\%\\_match");
    }

    #[test]
    fn equals_and_contains_never_share_the_raw_quoting_path() {
        let v = "Aldus Manutius";
        assert_ne!(quote_for_fts(v), escape_for_equals(v));
    }
}
