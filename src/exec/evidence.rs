//! Evidence and candidate-set types (spec §3.4): every candidate record
//! carries, for each filter that matched it, a pointer back to the source
//! subfield(s) responsible, plus enough of the record itself (title,
//! imprint summary) that a user can tell which book is which.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{Field, Op};
use crate::record::Source;

/// One row of evidence for one filter on one candidate (spec §3.4
/// `Evidence`). `confidence`/`raw_value` are `None` for FTS-matched
/// CONTAINS filters (spec §4.6 step 4): a full-text match records the
/// matched token and its source row rather than a per-row confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEvidence {
    pub field: Field,
    pub operator: Op,
    /// The normalized value on the record that satisfied the predicate.
    pub matched_value: String,
    /// The filter value (or matched FTS token) it was tested against.
    pub matched_against: String,
    pub raw_value: Option<String>,
    pub confidence: Option<f32>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub record_id: String,
    pub title: Option<String>,
    pub imprints_summary: Option<String>,
    pub evidence: Vec<FilterEvidence>,
}

/// The full result of running a plan (spec §3.4 `CandidateSet`):
/// everything downstream needs to render results and to audit how they
/// were produced, without re-running the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub query_text: String,
    pub plan_hash: String,
    pub sql: String,
    pub timestamp: DateTime<Utc>,
    pub total_count: usize,
    pub candidates: Vec<Candidate>,
}
