//! Compiles a natural-language turn into a [`QueryPlan`] (spec §4.3):
//! cache lookup, then oracle call, schema validation, one retry on an
//! invalid response, an optional subject-hints retry on an empty plan,
//! and finally a hard compilation failure.

use sqlx::{PgPool, Row};
use tracing::warn;

use crate::config::CompilerConfig;
use crate::error::CompilationError;
use crate::plan::cache::{PlanCache, SCHEMA_VERSION};
use crate::plan::oracle::LlmClient;
use crate::plan::schema_validate;
use crate::plan::QueryPlan;

const SYSTEM_PROMPT: &str = "You compile a user's request about a closed rare-book catalog \
into a JSON query plan with a `filters` array (and, optionally, \
`soft_filters`, `limit`, `debug`). Each filter has a `field` (title, \
subject, place, publisher, language, date, agent_name, agent_role, \
agent_type, country), an `op` (equals, contains, in, range, overlaps, \
gte, lte), and a `value`. A query naming both an agent's name and their \
relationship to the work (e.g. \"printed by\") should emit two filters \
over agent_name and agent_role rather than combining them into one. If \
the request is too vague to compile, return `{\"filters\": [], \
\"clarification\": \"<question to ask the user>\"}` instead.";

pub struct PlanCompiler<'a> {
    oracle: &'a dyn LlmClient,
    cache: &'a PlanCache,
    config: CompilerConfig,
    hint_pool: Option<&'a PgPool>,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(oracle: &'a dyn LlmClient, cache: &'a PlanCache) -> Self {
        Self {
            oracle,
            cache,
            config: CompilerConfig::default(),
            hint_pool: None,
        }
    }

    /// Enable the subject-hints retry (spec §4.4 step 4) against `pool`,
    /// per `config.subject_hints_retry`. A no-op when the switch is off.
    pub fn with_subject_hints(mut self, pool: &'a PgPool, config: CompilerConfig) -> Self {
        self.hint_pool = Some(pool);
        self.config = config;
        self
    }

    /// Compile `turn_text` into a plan. A cache hit short-circuits the
    /// oracle entirely, so repeated identical turns are both free and
    /// deterministic (spec §8, cache-hit determinism property).
    pub async fn compile(&self, turn_text: &str) -> Result<QueryPlan, CompilationError> {
        if let Some(plan) = self.cache.get(turn_text) {
            return Ok(plan);
        }

        let mut plan = match self.call_and_validate(SYSTEM_PROMPT, turn_text).await {
            Ok(plan) => plan,
            Err(first_err) => {
                warn!(error = %first_err, "oracle output failed validation, retrying once");
                let repair_prompt = format!(
                    "{SYSTEM_PROMPT}\n\nYour previous response was rejected: {first_err}. \
                     Respond again with JSON that matches the schema exactly."
                );
                self.call_and_validate(&repair_prompt, turn_text)
                    .await
                    .map_err(CompilationError::SchemaViolation)?
            }
        };

        if plan.filters.is_empty() && plan.clarification.is_none() && self.should_try_subject_hints(turn_text) {
            if let Some(retried) = self.retry_with_subject_hints(turn_text).await {
                plan = retried;
            }
        }

        if plan.filters.is_empty() && plan.clarification.is_none() {
            return Err(CompilationError::EmptyPlan);
        }

        plan.version = SCHEMA_VERSION;
        plan.query_text = turn_text.to_string();

        if let Err(e) = self.cache.put(turn_text, &plan) {
            warn!(error = %e, "failed to persist plan cache entry");
        }

        Ok(plan)
    }

    /// Spec §4.4 step 4: only worth trying on a zero-filter result for a
    /// turn with more than a few tokens, and only when the switch (§9
    /// open question) is enabled with a pool to draw hints from.
    fn should_try_subject_hints(&self, turn_text: &str) -> bool {
        self.config.subject_hints_retry
            && self.hint_pool.is_some()
            && turn_text.split_whitespace().count() > 4
    }

    /// Re-invoke the oracle with the corpus's most common subject values
    /// as context, in an attempt to recover plausible SUBJECT filters for
    /// domain vocabulary the first pass missed (spec §4.4 step 4). Any
    /// failure here is swallowed: this is a best-effort recovery, not a
    /// required step, so it never turns a clean `EmptyPlan` failure into
    /// something worse.
    async fn retry_with_subject_hints(&self, turn_text: &str) -> Option<QueryPlan> {
        let pool = self.hint_pool?;
        let hints = fetch_subject_hints(pool, self.config.subject_hints_limit).await.ok()?;
        if hints.is_empty() {
            return None;
        }

        let prompt = format!(
            "{SYSTEM_PROMPT}\n\nThe first pass produced no filters. Here are the most common \
             subject headings in this corpus; if one plausibly matches the user's request, \
             emit a SUBJECT filter for it: {}",
            hints.join(", ")
        );

        self.call_and_validate(&prompt, turn_text)
            .await
            .ok()
            .filter(|plan| !plan.filters.is_empty())
    }

    async fn call_and_validate(&self, system_prompt: &str, turn_text: &str) -> Result<QueryPlan, String> {
        let raw = self
            .oracle
            .chat_json(system_prompt, turn_text)
            .await
            .map_err(|e| e.to_string())?;

        let value = schema_validate::validate(&raw)?;
        serde_json::from_value(value).map_err(|e| format!("plan did not match expected shape: {e}"))
    }
}

async fn fetch_subject_hints(pool: &PgPool, limit: i64) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT value, COUNT(*) AS n FROM subjects GROUP BY value ORDER BY n DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get::<String, _>("value")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedOracle {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedOracle {
        async fn chat_json(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("oracle exhausted");
            }
            Ok(responses.remove(0))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn valid_first_response_compiles_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec![
                r#"{"filters":[{"field":"title","op":"contains","value":"aldine"}]}"#.to_string(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let compiler = PlanCompiler::new(&oracle, &cache);

        let plan = compiler.compile("aldine editions").await.unwrap();
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(plan.query_text, "aldine editions");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        // Second call is served from cache, no further oracle call.
        let plan2 = compiler.compile("aldine editions").await.unwrap();
        assert_eq!(plan2, plan);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_then_valid_retries_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec![
                "not json".to_string(),
                r#"{"filters":[{"field":"subject","op":"equals","value":"botany"}]}"#.to_string(),
            ]),
            calls: AtomicUsize::new(0),
        };
        let compiler = PlanCompiler::new(&oracle, &cache);

        let plan = compiler.compile("books about botany").await.unwrap();
        assert_eq!(plan.filters.len(), 1);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn two_invalid_responses_is_a_compilation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec!["not json".to_string(), "still not json".to_string()]),
            calls: AtomicUsize::new(0),
        };
        let compiler = PlanCompiler::new(&oracle, &cache);

        let err = compiler.compile("??").await.unwrap_err();
        assert_eq!(err.kind(), "schema_violation");
    }

    #[tokio::test]
    async fn empty_plan_with_no_clarification_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec![r#"{"filters":[]}"#.to_string(), r#"{"filters":[]}"#.to_string()]),
            calls: AtomicUsize::new(0),
        };
        let compiler = PlanCompiler::new(&oracle, &cache);

        let err = compiler.compile("asdkjf").await.unwrap_err();
        assert_eq!(err.kind(), "empty_plan");
    }

    #[tokio::test]
    async fn subject_hints_retry_is_skipped_when_switch_is_off() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlanCache::open(dir.path().join("cache.jsonl")).unwrap();
        let oracle = ScriptedOracle {
            responses: Mutex::new(vec![r#"{"filters":[]}"#.to_string()]),
            calls: AtomicUsize::new(0),
        };
        // No `with_subject_hints` call: default config has the switch off,
        // so an empty first pass goes straight to `EmptyPlan` without a
        // second oracle call attempting subject recovery.
        let compiler = PlanCompiler::new(&oracle, &cache);

        let err = compiler
            .compile("tell me about books on the history of early modern astronomy")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "empty_plan");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }
}
