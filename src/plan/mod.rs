//! Plan compiler: natural language → structured [`QueryPlan`] (spec §3.3, §4.3).

pub mod cache;
pub mod compiler;
pub mod oracle;
pub mod schema_validate;

use serde::{Deserialize, Serialize};

/// The closed field vocabulary a plan may filter on (spec §3.3). Agent role
/// and agent type are first-class fields, not a side-channel on agent name,
/// so a "printer named Aldus" query is two filters over the same joined
/// `agents` row rather than one filter carrying an extra attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Subject,
    Place,
    Publisher,
    Language,
    Date,
    AgentName,
    AgentRole,
    AgentType,
    Country,
}

/// The closed operator vocabulary (spec §3.3, §9 "dynamic mappings →
/// enumerated configuration"). `Range` and `Overlaps` both render the
/// overlap predicate described in §4.5; they are kept as distinct
/// enumerated ops because the oracle's prompt distinguishes a filter
/// naming a closed span (`RANGE`) from one naming an open-ended span that
/// happens to overlap a point (`OVERLAPS`), even though the SQL rendered
/// today is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Equals,
    Contains,
    In,
    Range,
    Overlaps,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Year(i32),
    YearRange(i32, i32),
    TextList(Vec<String>),
}

/// One filter over the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: Field,
    pub op: Op,
    pub value: FilterValue,
    /// Free-text annotation from the oracle explaining why it chose this
    /// filter; never consumed by the builder, carried for debugging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_version() -> u32 {
    1
}

/// A compiled, executable query (spec §3.3, §4.3). The oracle only ever
/// produces `filters`/`soft_filters`/`limit`/`clarification`/`debug`;
/// `version` and `query_text` are metadata the compiler stamps onto the
/// plan after validation, not judgment calls delegated to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub query_text: String,
    pub filters: Vec<Filter>,
    /// Declared but not acted on (spec §9 open question): soft filters are
    /// carried through to the executor for future score-based re-ranking
    /// and currently ignored, with a note left in `debug`.
    #[serde(default)]
    pub soft_filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub debug: serde_json::Map<String, serde_json::Value>,
    /// Free-text clarification the oracle wants surfaced to the user
    /// instead of (or alongside) running the plan, when it judges the
    /// turn underspecified (spec §4.4 clarification flow).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.clarification.is_none()
    }
}
