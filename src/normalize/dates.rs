//! Date normalization (spec §4.2).
//!
//! Deterministic, no network. Recognizes exact years, explicit ranges,
//! decades, centuries, and bracketed/uncertain forms; anything else is
//! reported as unparsed rather than failing the record.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::DateMethod;

static EXACT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").unwrap());
static BRACKETED_UNCERTAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[?\s*(?:ca\.?\s*)?(\d{4})\s*\??\s*\]?$").unwrap());
static HAS_UNCERTAINTY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[\]?]|(?i:ca\.)").unwrap());
static EXPLICIT_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})\s*[-/]\s*(\d{4})$").unwrap());
static DECADE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3})[-?uUxX]$").unwrap());
static CENTURY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{2})[-?uUxX]{2}$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct DateNorm {
    pub date_start: Option<i32>,
    pub date_end: Option<i32>,
    pub label: String,
    pub confidence: f32,
    pub method: DateMethod,
    /// Set when a range's endpoints were swapped (spec §8 boundary behavior).
    pub swapped: bool,
}

fn candidate(
    start: i32,
    end: i32,
    label: String,
    confidence: f32,
    method: DateMethod,
) -> DateNorm {
    let (start, end, swapped) = if start > end {
        (end, start, true)
    } else {
        (start, end, false)
    };
    DateNorm {
        date_start: Some(start),
        date_end: Some(end),
        label,
        confidence,
        method,
        swapped,
    }
}

/// Normalize a free-text (or 008-derived) date string.
///
/// When a string matches more than one recognized pattern, the narrowest
/// span wins (spec §4.2 tie-break rule).
pub fn normalize_date(raw: &str) -> DateNorm {
    let trimmed = raw.trim().trim_end_matches('.').trim();

    let mut candidates: Vec<DateNorm> = Vec::new();

    if let Some(m) = EXACT_YEAR.captures(trimmed) {
        let y: i32 = m[1].parse().unwrap();
        candidates.push(candidate(y, y, trimmed.to_string(), 0.99, DateMethod::ExactYear));
    }

    if let Some(m) = EXPLICIT_RANGE.captures(trimmed) {
        let start: i32 = m[1].parse().unwrap();
        let end: i32 = m[2].parse().unwrap();
        candidates.push(candidate(
            start,
            end,
            trimmed.to_string(),
            0.95,
            DateMethod::ExplicitRange,
        ));
    }

    if let Some(m) = DECADE.captures(trimmed) {
        let decade: i32 = m[1].parse().unwrap();
        let start = decade * 10;
        candidates.push(candidate(
            start,
            start + 9,
            trimmed.to_string(),
            0.85,
            DateMethod::CenturyOrDecade,
        ));
    }

    if let Some(m) = CENTURY.captures(trimmed) {
        let century: i32 = m[1].parse().unwrap();
        let start = century * 100;
        candidates.push(candidate(
            start,
            start + 99,
            trimmed.to_string(),
            0.85,
            DateMethod::CenturyOrDecade,
        ));
    }

    if HAS_UNCERTAINTY_MARKER.is_match(trimmed) {
        if let Some(m) = BRACKETED_UNCERTAIN.captures(trimmed) {
            let y: i32 = m[1].parse().unwrap();
            candidates.push(candidate(
                y,
                y,
                trimmed.to_string(),
                0.80,
                DateMethod::UncertainBracketed,
            ));
        }
    }

    candidates.sort_by_key(|c| c.date_end.unwrap_or(0) - c.date_start.unwrap_or(0));

    candidates.into_iter().next().unwrap_or(DateNorm {
        date_start: None,
        date_end: None,
        label: raw.to_string(),
        confidence: 0.0,
        method: DateMethod::Unparsed,
        swapped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_year() {
        let d = normalize_date("1502.");
        assert_eq!(d.date_start, Some(1502));
        assert_eq!(d.date_end, Some(1502));
        assert_eq!(d.confidence, 0.99);
        assert_eq!(d.method, DateMethod::ExactYear);
    }

    #[test]
    fn explicit_range() {
        let d = normalize_date("1500-1520");
        assert_eq!(d.date_start, Some(1500));
        assert_eq!(d.date_end, Some(1520));
        assert_eq!(d.confidence, 0.95);
    }

    #[test]
    fn range_with_swapped_endpoints_is_normalized() {
        let d = normalize_date("1520-1500");
        assert_eq!(d.date_start, Some(1500));
        assert_eq!(d.date_end, Some(1520));
        assert!(d.swapped);
    }

    #[test]
    fn decade() {
        let d = normalize_date("153-");
        assert_eq!(d.date_start, Some(1530));
        assert_eq!(d.date_end, Some(1539));
        assert_eq!(d.confidence, 0.85);
    }

    #[test]
    fn century() {
        let d = normalize_date("15--");
        assert_eq!(d.date_start, Some(1500));
        assert_eq!(d.date_end, Some(1599));
    }

    #[test]
    fn bracketed_uncertain() {
        let d = normalize_date("[1502?]");
        assert_eq!(d.date_start, Some(1502));
        assert_eq!(d.date_end, Some(1502));
        assert_eq!(d.confidence, 0.80);
        assert_eq!(d.method, DateMethod::UncertainBracketed);
    }

    #[test]
    fn ca_prefix_is_uncertain() {
        let d = normalize_date("ca. 1502");
        assert_eq!(d.date_start, Some(1502));
        assert_eq!(d.confidence, 0.80);
    }

    #[test]
    fn unparsed_falls_back_to_zero_confidence() {
        let d = normalize_date("s.n.");
        assert_eq!(d.date_start, None);
        assert_eq!(d.date_end, None);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.method, DateMethod::Unparsed);
        assert_eq!(d.label, "s.n.");
    }

    #[test]
    fn narrowest_span_wins_when_ambiguous() {
        // An exact year also satisfies no other pattern here, but this
        // documents the tie-break: exact (width 0) beats century (width 99).
        let d = normalize_date("1502");
        assert_eq!(d.date_end.unwrap() - d.date_start.unwrap(), 0);
    }
}
