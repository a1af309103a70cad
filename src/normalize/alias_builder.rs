//! Offline, oracle-assisted construction of [`AliasMap`]s (spec §4.2,
//! §6 "Alias maps").
//!
//! This is a batch tool, not part of the online conversation path: given a
//! set of distinct raw keys (already base-cleaned), it asks an oracle to
//! classify each one as KEEP (the raw form is already canonical), MAP (fold
//! into a named canonical form), or AMBIGUOUS (no safe canonical choice),
//! then assembles the resulting table.

use async_trait::async_trait;

use crate::normalize::alias_map::{AliasMap, AMBIGUOUS_SENTINEL};

#[derive(Debug, Clone, PartialEq)]
pub enum AliasDecision {
    Keep,
    Map(String),
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleVerdict {
    pub decision: AliasDecision,
    pub confidence: f32,
}

/// Classifies a single raw key. Implemented against whatever oracle client
/// the calling binary wires up; kept independent of the plan compiler's
/// oracle trait since this is an offline, non-conversational use.
#[async_trait]
pub trait AliasOracle: Send + Sync {
    async fn decide(&self, raw_key: &str) -> anyhow::Result<OracleVerdict>;
}

/// Minimum confidence for a KEEP/MAP verdict to be trusted; anything below
/// this is folded into AMBIGUOUS regardless of what the oracle proposed.
pub const CONFIDENCE_THRESHOLD: f32 = 0.70;

fn is_lowercase_ascii(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii() && !c.is_ascii_uppercase())
}

/// Build an [`AliasMap`] from a set of raw keys, consulting `oracle` once
/// per key with one retry on failure; a key that fails twice is recorded
/// as ambiguous rather than dropped, so every raw key has an entry in the
/// map once built.
pub async fn build_alias_map(
    raw_keys: impl IntoIterator<Item = String>,
    oracle: &dyn AliasOracle,
) -> AliasMap {
    let mut map = AliasMap::empty();

    for raw_key in raw_keys {
        if !is_lowercase_ascii(&raw_key) {
            tracing::warn!(raw_key, "alias key is not lowercase ASCII, skipping");
            continue;
        }

        let verdict = match oracle.decide(&raw_key).await {
            Ok(v) => v,
            Err(first_err) => {
                tracing::warn!(raw_key, error = %first_err, "alias oracle call failed, retrying once");
                match oracle.decide(&raw_key).await {
                    Ok(v) => v,
                    Err(second_err) => {
                        tracing::warn!(raw_key, error = %second_err, "alias oracle failed twice, marking ambiguous");
                        OracleVerdict {
                            decision: AliasDecision::Ambiguous,
                            confidence: 0.0,
                        }
                    }
                }
            }
        };

        let effective_decision = if verdict.confidence < CONFIDENCE_THRESHOLD {
            AliasDecision::Ambiguous
        } else {
            verdict.decision
        };

        match effective_decision {
            AliasDecision::Keep => map.insert(raw_key.clone(), raw_key),
            AliasDecision::Map(canonical) => {
                if is_lowercase_ascii(&canonical) {
                    map.insert(raw_key, canonical);
                } else {
                    tracing::warn!(raw_key, canonical, "canonical form is not lowercase ASCII, marking ambiguous");
                    map.insert(raw_key, AMBIGUOUS_SENTINEL.to_string());
                }
            }
            AliasDecision::Ambiguous => map.insert(raw_key, AMBIGUOUS_SENTINEL.to_string()),
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::alias_map::AliasLookup;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOracle(AliasDecision, f32);

    #[async_trait]
    impl AliasOracle for FixedOracle {
        async fn decide(&self, _raw_key: &str) -> anyhow::Result<OracleVerdict> {
            Ok(OracleVerdict {
                decision: self.0.clone(),
                confidence: self.1,
            })
        }
    }

    struct FailTwiceOracle(AtomicUsize);

    #[async_trait]
    impl AliasOracle for FailTwiceOracle {
        async fn decide(&self, _raw_key: &str) -> anyhow::Result<OracleVerdict> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                anyhow::bail!("transient failure")
            }
            Ok(OracleVerdict {
                decision: AliasDecision::Keep,
                confidence: 0.9,
            })
        }
    }

    #[tokio::test]
    async fn keep_maps_to_identity() {
        let oracle = FixedOracle(AliasDecision::Keep, 0.9);
        let map = build_alias_map(vec!["venezia".to_string()], &oracle).await;
        assert_eq!(
            map.lookup("venezia"),
            AliasLookup::Canonical("venezia".to_string())
        );
    }

    #[tokio::test]
    async fn map_decision_sets_canonical() {
        let oracle = FixedOracle(AliasDecision::Map("venice".to_string()), 0.9);
        let map = build_alias_map(vec!["venegia".to_string()], &oracle).await;
        assert_eq!(
            map.lookup("venegia"),
            AliasLookup::Canonical("venice".to_string())
        );
    }

    #[tokio::test]
    async fn low_confidence_is_downgraded_to_ambiguous() {
        let oracle = FixedOracle(AliasDecision::Map("venice".to_string()), 0.1);
        let map = build_alias_map(vec!["venegia".to_string()], &oracle).await;
        assert_eq!(map.lookup("venegia"), AliasLookup::Ambiguous);
    }

    #[tokio::test]
    async fn uppercase_canonical_is_rejected_as_ambiguous() {
        let oracle = FixedOracle(AliasDecision::Map("Venice".to_string()), 0.9);
        let map = build_alias_map(vec!["venegia".to_string()], &oracle).await;
        assert_eq!(map.lookup("venegia"), AliasLookup::Ambiguous);
    }

    #[tokio::test]
    async fn two_failures_then_retry_budget_exhausted_marks_ambiguous() {
        let oracle = FailTwiceOracle(AtomicUsize::new(0));
        let map = build_alias_map(vec!["venegia".to_string()], &oracle).await;
        assert_eq!(map.lookup("venegia"), AliasLookup::Ambiguous);
    }

    #[tokio::test]
    async fn non_ascii_raw_key_is_skipped_entirely() {
        let oracle = FixedOracle(AliasDecision::Keep, 0.9);
        let map = build_alias_map(vec!["venézia".to_string()], &oracle).await;
        assert_eq!(map.lookup("venézia"), AliasLookup::Miss);
    }
}
