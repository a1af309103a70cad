//! Turn-intent classification (spec §4.5): before compiling a new plan,
//! decide whether the turn is actually asking to look around inside the
//! session's current active subgroup. Grounded in the teacher's
//! `agentic::intent_classifier` pattern-matching phase, without its
//! semantic re-ranking stage (a closed, small taxonomy doesn't need it).

use once_cell::sync::Lazy;
use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Compile and run a new plan against the whole corpus.
    NewQuery,
    /// Summarize the current active subgroup (spec §4.5 overview turns).
    Overview,
    /// Ask about one or more specific records already in the active
    /// subgroup, without re-querying.
    Detail,
}

/// Phrases that signal the user means the current result set, not the
/// whole corpus. Matched case-insensitively against the whole turn.
static OVERVIEW_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)^(give|provide)\s+(me\s+)?an?\s+overview",
        r"(?i)\bsummari[sz]e\s+(these|this|them|the results)\b",
        r"(?i)\bhow many\b.*\b(are there|of these|of them)\b",
        r"(?i)\bwhat do (these|they) have in common\b",
    ])
    .unwrap()
});

static DETAIL_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)\btell me (more|about) (this one|that one|#?\d+)\b",
        r"(?i)\bshow (me )?(the )?(evidence|details) for\b",
        r"(?i)\bwhy (does|did) (this|that|#?\d+) match\b",
    ])
    .unwrap()
});

/// Classify `turn_text` given whether the session currently has an
/// active subgroup at all. Without one, every turn is necessarily a new
/// query: there is nothing yet to summarize or drill into.
pub fn classify(turn_text: &str, has_active_subgroup: bool) -> Intent {
    if !has_active_subgroup {
        return Intent::NewQuery;
    }

    if OVERVIEW_PATTERNS.is_match(turn_text) {
        Intent::Overview
    } else if DETAIL_PATTERNS.is_match(turn_text) {
        Intent::Detail
    } else {
        Intent::NewQuery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_a_subgroup_everything_is_a_new_query() {
        assert_eq!(classify("give me an overview", false), Intent::NewQuery);
    }

    #[test]
    fn overview_phrase_is_detected() {
        assert_eq!(classify("give me an overview", true), Intent::Overview);
        assert_eq!(classify("summarize these results", true), Intent::Overview);
        assert_eq!(classify("how many of these are from Venice?", true), Intent::Overview);
    }

    #[test]
    fn detail_phrase_is_detected() {
        assert_eq!(classify("tell me more about this one", true), Intent::Detail);
        assert_eq!(classify("show me the evidence for #3", true), Intent::Detail);
    }

    #[test]
    fn unrelated_phrase_is_a_new_query() {
        assert_eq!(classify("now show me books printed in Rome", true), Intent::NewQuery);
    }
}
