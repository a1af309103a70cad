//! Session persistence and the per-session exclusive lock (spec §3.5, §4.7,
//! §5 "Concurrency and resource model"): one turn holds a session's lock
//! at a time; a second turn arriving before the first releases it fails
//! fast rather than queuing indefinitely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::SessionError;
use crate::exec::CandidateSet;
use crate::plan::QueryPlan;
use crate::session::types::{ActiveSubgroup, ChatSession, Message, MessageRole, Phase};

pub struct SessionStore {
    pool: PgPool,
    locks: StdMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn create(&self, user_id: Option<&str>) -> Result<ChatSession, SessionError> {
        let now = Utc::now();
        let session_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO chat_sessions (session_id, user_id, phase, created_at, updated_at) \
             VALUES ($1, $2, 'query_definition', $3, $3)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let mut session = ChatSession::new(session_id, now);
        session.user_id = user_id.map(str::to_string);
        Ok(session)
    }

    /// Load a session, excluding one that has been expired unless
    /// explicitly asked for (spec §4.7: "a session with `expired_at !=
    /// null` is excluded from `load_session` unless explicitly
    /// requested").
    pub async fn load(&self, session_id: Uuid) -> Result<ChatSession, SessionError> {
        self.load_impl(session_id, false).await
    }

    /// Load a session even if it has been expired, for administrative or
    /// audit access.
    pub async fn load_including_expired(&self, session_id: Uuid) -> Result<ChatSession, SessionError> {
        self.load_impl(session_id, true).await
    }

    async fn load_impl(&self, session_id: Uuid, include_expired: bool) -> Result<ChatSession, SessionError> {
        let sql = if include_expired {
            "SELECT user_id, phase, context, created_at, updated_at, expired_at \
             FROM chat_sessions WHERE session_id = $1"
        } else {
            "SELECT user_id, phase, context, created_at, updated_at, expired_at \
             FROM chat_sessions WHERE session_id = $1 AND expired_at IS NULL"
        };

        let row = sqlx::query(sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SessionError::InvalidSession(session_id))?;

        let phase = match row.get::<String, _>("phase").as_str() {
            "corpus_exploration" => Phase::CorpusExploration,
            _ => Phase::QueryDefinition,
        };
        let context_json: serde_json::Value = row.get("context");
        let context = match context_json {
            serde_json::Value::Object(map) => map,
            _ => Default::default(),
        };

        let message_rows = sqlx::query("SELECT role, content, created_at FROM messages WHERE session_id = $1 ORDER BY created_at ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        let messages = message_rows
            .into_iter()
            .map(|r| Message {
                role: match r.get::<String, _>("role").as_str() {
                    "assistant" => MessageRole::Assistant,
                    "system" => MessageRole::System,
                    _ => MessageRole::User,
                },
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect();

        let active_subgroup = sqlx::query(
            "SELECT defining_query, filter_summary, record_ids, candidate_count, candidate_set, plan, created_at \
             FROM active_subgroups WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|r| -> Result<ActiveSubgroup, SessionError> {
            let plan_json: serde_json::Value = r.get("plan");
            let plan: QueryPlan = serde_json::from_value(plan_json)
                .map_err(|_| SessionError::InvalidSession(session_id))?;
            let candidate_set_json: Option<serde_json::Value> = r.get("candidate_set");
            let candidate_set: Option<CandidateSet> = candidate_set_json
                .map(serde_json::from_value)
                .transpose()
                .map_err(|_| SessionError::InvalidSession(session_id))?;
            Ok(ActiveSubgroup {
                defining_query: r.get("defining_query"),
                filter_summary: r.get("filter_summary"),
                record_ids: r.get("record_ids"),
                candidate_count: r.get::<i32, _>("candidate_count") as usize,
                candidate_set,
                plan,
                created_at: r.get("created_at"),
            })
        })
        .transpose()?;

        let user_goals = sqlx::query("SELECT goal FROM user_goals WHERE session_id = $1 ORDER BY created_at ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.get::<String, _>("goal"))
            .collect();

        Ok(ChatSession {
            session_id,
            user_id: row.get("user_id"),
            phase,
            messages,
            active_subgroup,
            user_goals,
            context,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            expired_at: row.get("expired_at"),
        })
    }

    /// Persist the full session state: phase, every message, the active
    /// subgroup (or its absence), and user goals. Cheaper incremental
    /// saves are left for a later optimization; sessions are small.
    pub async fn save(&self, session: &ChatSession) -> Result<(), SessionError> {
        let phase_str = match session.phase {
            Phase::QueryDefinition => "query_definition",
            Phase::CorpusExploration => "corpus_exploration",
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE chat_sessions SET user_id = $2, phase = $3, context = $4, updated_at = $5 \
             WHERE session_id = $1",
        )
        .bind(session.session_id)
        .bind(&session.user_id)
        .bind(phase_str)
        .bind(serde_json::Value::Object(session.context.clone()))
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE session_id = $1")
            .bind(session.session_id)
            .execute(&mut *tx)
            .await?;
        for message in &session.messages {
            let role_str = match message.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            };
            sqlx::query("INSERT INTO messages (session_id, role, content, created_at) VALUES ($1, $2, $3, $4)")
                .bind(session.session_id)
                .bind(role_str)
                .bind(&message.content)
                .bind(message.created_at)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM active_subgroups WHERE session_id = $1")
            .bind(session.session_id)
            .execute(&mut *tx)
            .await?;
        if let Some(subgroup) = &session.active_subgroup {
            let plan_json = serde_json::to_value(&subgroup.plan)
                .map_err(|_| SessionError::InvalidSession(session.session_id))?;
            let candidate_set_json = subgroup
                .candidate_set
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|_| SessionError::InvalidSession(session.session_id))?;
            sqlx::query(
                "INSERT INTO active_subgroups \
                 (session_id, defining_query, filter_summary, record_ids, candidate_count, candidate_set, plan, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(session.session_id)
            .bind(&subgroup.defining_query)
            .bind(&subgroup.filter_summary)
            .bind(&subgroup.record_ids)
            .bind(subgroup.candidate_count as i32)
            .bind(candidate_set_json)
            .bind(plan_json)
            .bind(subgroup.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM user_goals WHERE session_id = $1")
            .bind(session.session_id)
            .execute(&mut *tx)
            .await?;
        for goal in &session.user_goals {
            sqlx::query("INSERT INTO user_goals (session_id, goal) VALUES ($1, $2)")
                .bind(session.session_id)
                .bind(goal)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Soft-delete: marks the session expired rather than removing it
    /// (spec §4.7 `expire_session`). Messages, the active subgroup, and
    /// user goals are left in place; `load` simply stops returning them.
    pub async fn expire_session(&self, session_id: Uuid) -> Result<(), SessionError> {
        let now: DateTime<Utc> = Utc::now();
        let result = sqlx::query("UPDATE chat_sessions SET expired_at = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SessionError::InvalidSession(session_id));
        }
        self.locks.lock().unwrap().remove(&session_id);
        Ok(())
    }

    /// Hard-delete a session and, via `ON DELETE CASCADE`, its messages,
    /// active subgroup, and user goals (spec §4.7 cascade).
    pub async fn delete(&self, session_id: Uuid) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM chat_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        self.locks.lock().unwrap().remove(&session_id);
        Ok(())
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(session_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Run `f` while holding `session_id`'s exclusive lock. If another
    /// turn is already holding it when `timeout` elapses, fails with
    /// `ConcurrentUpdate` rather than queuing (spec §5).
    pub async fn with_lock<F, Fut, T>(
        &self,
        session_id: Uuid,
        timeout: Duration,
        f: F,
    ) -> Result<T, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.lock_for(session_id);
        let guard = tokio::time::timeout(timeout, lock.lock())
            .await
            .map_err(|_| SessionError::ConcurrentUpdate(session_id))?;
        let result = f().await;
        drop(guard);
        Ok(result)
    }
}
