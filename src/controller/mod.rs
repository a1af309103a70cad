//! Conversation controller (spec §4.5): routes a turn to plan compilation
//! or to an analysis of the session's active subgroup, threading the
//! phase state machine, clarification flow, and cancellation through.

pub mod intent;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{CompilerConfig, TimeoutConfig};
use crate::error::EngineError;
use crate::exec::{analyze_subgroup, CandidateSet, Executor, SubgroupOverview};
use crate::plan::cache::PlanCache;
use crate::plan::compiler::PlanCompiler;
use crate::plan::oracle::LlmClient;
use crate::plan::{Field, Filter, FilterValue, Op};
use crate::session::{ActiveSubgroup, MessageRole, Phase, SessionStore};
use chrono::Utc;

pub struct TurnResponse {
    pub phase: Phase,
    pub message: String,
    pub candidates: Option<CandidateSet>,
    pub overview: Option<SubgroupOverview>,
}

pub struct Controller {
    sessions: SessionStore,
    oracle: Box<dyn LlmClient>,
    plan_cache: PlanCache,
    timeouts: TimeoutConfig,
    compiler_config: CompilerConfig,
}

impl Controller {
    pub fn new(
        sessions: SessionStore,
        oracle: Box<dyn LlmClient>,
        plan_cache: PlanCache,
        timeouts: TimeoutConfig,
        compiler_config: CompilerConfig,
    ) -> Self {
        Self {
            sessions,
            oracle,
            plan_cache,
            timeouts,
            compiler_config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one conversation turn. Acquires the session's exclusive
    /// lock for the duration (spec §5): a second turn for the same
    /// session arriving concurrently fails fast with `ConcurrentUpdate`.
    pub async fn handle_turn(
        &self,
        session_id: Uuid,
        turn_text: &str,
        pool: &sqlx::PgPool,
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, EngineError> {
        let store_timeout = self.timeouts.store;
        let result = self
            .sessions
            .with_lock(session_id, store_timeout, || {
                self.run_turn(session_id, turn_text, pool, cancel)
            })
            .await
            .map_err(EngineError::Session)?;
        result
    }

    async fn run_turn(
        &self,
        session_id: Uuid,
        turn_text: &str,
        pool: &sqlx::PgPool,
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, EngineError> {
        let mut session = self.sessions.load(session_id).await.map_err(EngineError::Session)?;
        let now = Utc::now();
        session.push_message(MessageRole::User, turn_text.to_string(), now);

        let has_subgroup = session.active_subgroup.is_some();
        let intent = intent::classify(turn_text, has_subgroup);

        let response = match intent {
            intent::Intent::Overview => {
                let subgroup = session.active_subgroup.as_ref().expect("classified with a subgroup");
                let overview = analyze_subgroup(pool, &subgroup.record_ids, self.timeouts.store)
                    .await
                    .map_err(EngineError::Execution)?;
                let message = render_overview(&overview);
                session.push_message(MessageRole::Assistant, message.clone(), Utc::now());
                TurnResponse {
                    phase: session.phase,
                    message,
                    candidates: None,
                    overview: Some(overview),
                }
            }
            intent::Intent::Detail => {
                let subgroup = session.active_subgroup.as_ref().expect("classified with a subgroup");
                let executor = Executor::new(pool);
                let candidates = executor
                    .execute(&subgroup.plan, self.timeouts.store, cancel)
                    .await
                    .map_err(EngineError::Execution)?;
                let message = format!(
                    "Evidence for the {} record(s) currently in view.",
                    candidates.candidates.len()
                );
                session.push_message(MessageRole::Assistant, message.clone(), Utc::now());
                TurnResponse {
                    phase: session.phase,
                    message,
                    candidates: Some(candidates),
                    overview: None,
                }
            }
            intent::Intent::NewQuery => {
                let mut compiler = PlanCompiler::new(self.oracle.as_ref(), &self.plan_cache);
                if self.compiler_config.subject_hints_retry {
                    compiler = compiler.with_subject_hints(pool, self.compiler_config);
                }
                let plan = compiler.compile(turn_text).await.map_err(EngineError::Compilation)?;

                if let Some(question) = &plan.clarification {
                    session.push_message(MessageRole::Assistant, question.clone(), Utc::now());
                    TurnResponse {
                        phase: session.phase,
                        message: question.clone(),
                        candidates: None,
                        overview: None,
                    }
                } else {
                    let executor = Executor::new(pool);
                    let candidate_set = executor
                        .execute(&plan, self.timeouts.store, cancel)
                        .await
                        .map_err(EngineError::Execution)?;
                    let record_ids: Vec<String> =
                        candidate_set.candidates.iter().map(|c| c.record_id.clone()).collect();
                    let message = format!("Found {} matching record(s).", candidate_set.total_count);

                    session.enter_exploration(
                        ActiveSubgroup {
                            defining_query: plan.query_text.clone(),
                            filter_summary: summarize_filters(&plan.filters),
                            candidate_count: record_ids.len(),
                            record_ids,
                            candidate_set: Some(candidate_set.clone()),
                            plan,
                            created_at: Utc::now(),
                        },
                        Utc::now(),
                    );
                    session.push_message(MessageRole::Assistant, message.clone(), Utc::now());

                    TurnResponse {
                        phase: session.phase,
                        message,
                        candidates: Some(candidate_set),
                        overview: None,
                    }
                }
            }
        };

        self.sessions.save(&session).await.map_err(EngineError::Session)?;
        Ok(response)
    }
}

/// Human-readable summary of a plan's filters, stored alongside the
/// active subgroup so a session's UI can show "what am I looking at"
/// without re-parsing the plan (spec §3.5 `filter_summary`).
fn summarize_filters(filters: &[Filter]) -> String {
    if filters.is_empty() {
        return "no filters".to_string();
    }
    filters
        .iter()
        .map(describe_filter)
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn describe_filter(filter: &Filter) -> String {
    let field = match filter.field {
        Field::Title => "title",
        Field::Subject => "subject",
        Field::Place => "place",
        Field::Publisher => "publisher",
        Field::Language => "language",
        Field::Date => "date",
        Field::AgentName => "agent_name",
        Field::AgentRole => "agent_role",
        Field::AgentType => "agent_type",
        Field::Country => "country",
    };
    let op = match filter.op {
        Op::Equals => "=",
        Op::Contains => "CONTAINS",
        Op::In => "IN",
        Op::Range => "RANGE",
        Op::Overlaps => "OVERLAPS",
        Op::Gte => ">=",
        Op::Lte => "<=",
    };
    let value = match &filter.value {
        FilterValue::Text(t) => t.clone(),
        FilterValue::Year(y) => y.to_string(),
        FilterValue::YearRange(start, end) => format!("{start}-{end}"),
        FilterValue::TextList(items) => items.join("/"),
    };
    format!("{field} {op} {value}")
}

fn render_overview(overview: &SubgroupOverview) -> String {
    let places = join_counts(&overview.top_places);
    let publishers = join_counts(&overview.top_publishers);
    let subjects = join_counts(&overview.top_subjects);
    let centuries = overview
        .date_centuries
        .iter()
        .map(|(century, n)| format!("{}s ({n})", century))
        .collect::<Vec<_>>()
        .join(", ");
    let range = overview
        .date_range
        .map(|(lo, hi)| format!("{lo}-{hi}"))
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "{} record(s) in view, spanning {} ({}). Most common places: {}. Most common publishers: {}. Top subjects: {}.",
        overview.count,
        range,
        if centuries.is_empty() { "no dated imprints".to_string() } else { centuries },
        if places.is_empty() { "none recorded".to_string() } else { places },
        if publishers.is_empty() { "none recorded".to_string() } else { publishers },
        if subjects.is_empty() { "none recorded".to_string() } else { subjects },
    )
}

fn join_counts(counts: &[(String, i64)]) -> String {
    counts.iter().map(|(v, n)| format!("{v} ({n})")).collect::<Vec<_>>().join(", ")
}
