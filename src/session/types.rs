//! Session domain types (spec §3.5, §4.5 conversation controller).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exec::CandidateSet;
use crate::plan::QueryPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The user is still narrowing down a query; turns compile and run
    /// plans against the whole corpus.
    QueryDefinition,
    /// A plan has been run and the user is now exploring its result set
    /// (the "active subgroup") without re-querying the whole corpus.
    CorpusExploration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The result set a `corpus_exploration` turn reasons over, plus the plan
/// that produced it (spec §3.5, §4.5). `defining_query`/`filter_summary`
/// are the human-readable anchors a session's UI shows for "what am I
/// currently looking at"; `plan` is what the executor re-runs for detail
/// turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSubgroup {
    pub defining_query: String,
    pub filter_summary: String,
    pub record_ids: Vec<String>,
    pub candidate_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_set: Option<CandidateSet>,
    pub plan: QueryPlan,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub active_subgroup: Option<ActiveSubgroup>,
    #[serde(default)]
    pub user_goals: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    pub fn new(session_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            user_id: None,
            phase: Phase::QueryDefinition,
            messages: Vec::new(),
            active_subgroup: None,
            user_goals: Vec::new(),
            context: Default::default(),
            created_at: now,
            updated_at: now,
            expired_at: None,
        }
    }

    /// Enter (or re-enter) corpus exploration over a freshly executed
    /// plan's results (spec §4.5 phase transition).
    pub fn enter_exploration(&mut self, subgroup: ActiveSubgroup, now: DateTime<Utc>) {
        self.active_subgroup = Some(subgroup);
        self.phase = Phase::CorpusExploration;
        self.updated_at = now;
    }

    /// Return to query definition, discarding the active subgroup (spec
    /// §4.5: a new, unrelated query leaves exploration behind).
    pub fn return_to_query_definition(&mut self, now: DateTime<Utc>) {
        self.active_subgroup = None;
        self.phase = Phase::QueryDefinition;
        self.updated_at = now;
    }

    pub fn push_message(&mut self, role: MessageRole, content: String, now: DateTime<Utc>) {
        self.messages.push(Message {
            role,
            content,
            created_at: now,
        });
        self.updated_at = now;
    }
}
