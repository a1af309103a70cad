//! Runs a compiled plan against the store and attaches evidence to each
//! candidate (spec §4.4, §4.5, §4.6, §5 per-operation timeouts and
//! cancellation).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

use crate::error::ExecutionError;
use crate::exec::evidence::{Candidate, CandidateSet, FilterEvidence};
use crate::plan::{Field, Filter, FilterValue, Op, QueryPlan};
use crate::record::Source;
use crate::sql::builder::{build, SqlParam};
use crate::sql::value_norm::fold_case;

pub struct Executor<'a> {
    pool: &'a PgPool,
}

/// A fetched row carrying everything needed to decide whether it
/// satisfies a filter's predicate and, if so, to report it as evidence.
struct EvidenceRow {
    matched_value: String,
    raw_value: Option<String>,
    confidence: Option<f32>,
    sources: Vec<Source>,
    date_span: Option<(i32, i32)>,
}

#[derive(Serialize)]
struct PlanHashInput<'a> {
    filters: &'a [Filter],
    soft_filters: &'a [Filter],
    limit: Option<u32>,
}

fn plan_hash(plan: &QueryPlan) -> String {
    let input = PlanHashInput {
        filters: &plan.filters,
        soft_filters: &plan.soft_filters,
        limit: plan.limit,
    };
    let bytes = serde_json::to_vec(&input).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

impl<'a> Executor<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Execute `plan`, returning every matching record with per-filter
    /// evidence attached, its title, and an imprint summary (spec §3.4).
    /// Bounded by `timeout` and cooperatively cancellable via `cancel`
    /// (spec §5). `total_count` reflects the pre-limit result; `limit` is
    /// applied only after evidence has been attached to every candidate.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CandidateSet, ExecutionError> {
        let built = build(plan)?;

        let record_ids = tokio::select! {
            result = self.run_candidate_query(&built.sql, &built.params, timeout) => result?,
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        };

        let total_count = record_ids.len();

        if record_ids.is_empty() {
            return Ok(CandidateSet {
                query_text: plan.query_text.clone(),
                plan_hash: plan_hash(plan),
                sql: built.sql,
                timestamp: Utc::now(),
                total_count,
                candidates: vec![],
            });
        }

        let mut evidence_by_record: HashMap<String, Vec<FilterEvidence>> =
            record_ids.iter().map(|id| (id.clone(), Vec::new())).collect();

        for filter in &plan.filters {
            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            let matches = self.fetch_filter_evidence(filter, &record_ids, timeout).await?;
            for (record_id, evidence) in matches {
                if let Some(entries) = evidence_by_record.get_mut(&record_id) {
                    entries.push(evidence);
                }
            }
        }

        let titles = self.fetch_titles(&record_ids, timeout).await?;
        let summaries = self.fetch_imprint_summaries(&record_ids, timeout).await?;

        let mut candidates: Vec<Candidate> = record_ids
            .into_iter()
            .map(|record_id| {
                let evidence = evidence_by_record.remove(&record_id).unwrap_or_default();
                Candidate {
                    title: titles.get(&record_id).cloned(),
                    imprints_summary: summaries.get(&record_id).cloned(),
                    record_id,
                    evidence,
                }
            })
            .collect();

        if let Some(limit) = plan.limit {
            candidates.truncate(limit as usize);
        }

        Ok(CandidateSet {
            query_text: plan.query_text.clone(),
            plan_hash: plan_hash(plan),
            sql: built.sql,
            timestamp: Utc::now(),
            total_count,
            candidates,
        })
    }

    async fn run_candidate_query(
        &self,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> Result<Vec<String>, ExecutionError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                SqlParam::Text(t) => query.bind(t),
                SqlParam::Int(i) => query.bind(i),
                SqlParam::TextList(list) => query.bind(list),
            };
        }

        let rows = tokio::time::timeout(timeout, query.fetch_all(self.pool))
            .await
            .map_err(|_| ExecutionError::Timeout(timeout))??;

        Ok(rows.into_iter().map(|r| r.get("record_id")).collect())
    }

    async fn fetch_titles(
        &self,
        record_ids: &[String],
        timeout: Duration,
    ) -> Result<HashMap<String, String>, ExecutionError> {
        let rows = tokio::time::timeout(
            timeout,
            sqlx::query(
                "SELECT DISTINCT ON (record_id) record_id, value FROM titles \
                 WHERE record_id = ANY($1) \
                 ORDER BY record_id, (title_type = 'main') DESC, id ASC",
            )
            .bind(record_ids)
            .fetch_all(self.pool),
        )
        .await
        .map_err(|_| ExecutionError::Timeout(timeout))??;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("record_id"), r.get::<String, _>("value")))
            .collect())
    }

    async fn fetch_imprint_summaries(
        &self,
        record_ids: &[String],
        timeout: Duration,
    ) -> Result<HashMap<String, String>, ExecutionError> {
        let rows = tokio::time::timeout(
            timeout,
            sqlx::query(
                "SELECT DISTINCT ON (record_id) record_id, place_display, publisher_display, date_label \
                 FROM imprints WHERE record_id = ANY($1) ORDER BY record_id, occurrence ASC",
            )
            .bind(record_ids)
            .fetch_all(self.pool),
        )
        .await
        .map_err(|_| ExecutionError::Timeout(timeout))??;

        Ok(rows
            .into_iter()
            .map(|r| {
                let record_id: String = r.get("record_id");
                let place: Option<String> = r.get("place_display");
                let publisher: Option<String> = r.get("publisher_display");
                let date: Option<String> = r.get("date_label");
                (record_id, format_imprint_summary(place, publisher, date))
            })
            .collect())
    }

    /// Fetch the candidate rows for one filter's field, then keep only the
    /// ones whose value actually satisfies the filter's operator and
    /// value (spec §4.6 step 3) instead of attaching every row for the
    /// field unconditionally.
    async fn fetch_filter_evidence(
        &self,
        filter: &Filter,
        record_ids: &[String],
        timeout: Duration,
    ) -> Result<Vec<(String, FilterEvidence)>, ExecutionError> {
        let rows = self.fetch_rows_for_field(filter.field, record_ids, timeout).await?;

        let matched_against = describe_filter_value(&filter.value);
        let mut out = Vec::new();
        for (record_id, row) in rows {
            if !satisfies(filter.field, filter.op, &filter.value, &row) {
                continue;
            }
            out.push((
                record_id,
                FilterEvidence {
                    field: filter.field,
                    operator: filter.op,
                    matched_value: row.matched_value,
                    matched_against: matched_against.clone(),
                    raw_value: row.raw_value,
                    confidence: row.confidence,
                    sources: row.sources,
                },
            ));
        }
        Ok(out)
    }

    async fn fetch_rows_for_field(
        &self,
        field: Field,
        record_ids: &[String],
        timeout: Duration,
    ) -> Result<Vec<(String, EvidenceRow)>, ExecutionError> {
        let sql = match field {
            Field::Title => "SELECT record_id, value AS matched, value AS raw, NULL::REAL AS confidence, sources FROM titles WHERE record_id = ANY($1)",
            Field::Subject => "SELECT record_id, value AS matched, value AS raw, NULL::REAL AS confidence, sources FROM subjects WHERE record_id = ANY($1)",
            Field::Place => "SELECT record_id, place_norm AS matched, place_raw AS raw, place_confidence AS confidence, sources FROM imprints WHERE record_id = ANY($1) AND place_norm IS NOT NULL",
            Field::Publisher => "SELECT record_id, publisher_norm AS matched, publisher_raw AS raw, publisher_confidence AS confidence, sources FROM imprints WHERE record_id = ANY($1) AND publisher_norm IS NOT NULL",
            Field::Country => "SELECT record_id, COALESCE(country_name, country_code) AS matched, country_code AS raw, NULL::REAL AS confidence, sources FROM imprints WHERE record_id = ANY($1) AND (country_code IS NOT NULL OR country_name IS NOT NULL)",
            Field::Date => "SELECT record_id, date_label AS matched, date_raw AS raw, date_confidence AS confidence, sources, date_start, date_end FROM imprints WHERE record_id = ANY($1)",
            Field::Language => "SELECT record_id, code AS matched, NULL::TEXT AS raw, NULL::REAL AS confidence, '[]'::jsonb AS sources FROM languages WHERE record_id = ANY($1)",
            Field::AgentName => "SELECT record_id, agent_norm AS matched, value AS raw, agent_confidence AS confidence, sources FROM agents WHERE record_id = ANY($1) AND agent_norm IS NOT NULL",
            Field::AgentRole => "SELECT record_id, role_norm AS matched, role_raw AS raw, role_confidence AS confidence, sources FROM agents WHERE record_id = ANY($1) AND role_norm IS NOT NULL",
            Field::AgentType => "SELECT record_id, agent_type AS matched, NULL::TEXT AS raw, NULL::REAL AS confidence, sources FROM agents WHERE record_id = ANY($1)",
        };

        let raw_rows = tokio::time::timeout(timeout, sqlx::query(sql).bind(record_ids).fetch_all(self.pool))
            .await
            .map_err(|_| ExecutionError::Timeout(timeout))??;

        Ok(raw_rows
            .into_iter()
            .map(|r| {
                let record_id: String = r.get("record_id");
                let matched_value: String = r.get("matched");
                let raw_value: Option<String> = r.get("raw");
                let confidence: Option<f32> = r.get("confidence");
                let sources_json: serde_json::Value = r.get("sources");
                let sources: Vec<Source> = serde_json::from_value(sources_json).unwrap_or_default();

                let date_span = if field == Field::Date {
                    let start: Option<i32> = r.try_get("date_start").ok();
                    let end: Option<i32> = r.try_get("date_end").ok();
                    start.zip(end)
                } else {
                    None
                };

                (
                    record_id,
                    EvidenceRow {
                        matched_value,
                        raw_value,
                        confidence,
                        sources,
                        date_span,
                    },
                )
            })
            .collect())
    }
}

fn format_imprint_summary(place: Option<String>, publisher: Option<String>, date: Option<String>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(place) = place.filter(|p| !p.is_empty()) {
        parts.push(place);
    }
    if let Some(publisher) = publisher.filter(|p| !p.is_empty()) {
        parts.push(publisher);
    }
    let head = if parts.is_empty() { None } else { Some(parts.join(" : ")) };

    match (head, date.filter(|d| !d.is_empty())) {
        (Some(h), Some(d)) => Some(format!("{h}, {d}")),
        (Some(h), None) => Some(h),
        (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}

fn describe_filter_value(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(t) => t.clone(),
        FilterValue::Year(y) => y.to_string(),
        FilterValue::YearRange(start, end) => format!("{start}-{end}"),
        FilterValue::TextList(items) => items.join(", "),
    }
}

/// Mirrors the normalization the SQL builder applies, so a row reported
/// here as evidence is guaranteed to be one the builder's WHERE clause
/// would also have matched (spec §4.6 step 3).
fn satisfies(field: Field, op: Op, value: &FilterValue, row: &EvidenceRow) -> bool {
    match field {
        Field::Date => satisfies_date(op, value, row.date_span),
        _ => satisfies_text(op, value, &row.matched_value),
    }
}

fn satisfies_text(op: Op, value: &FilterValue, matched_value: &str) -> bool {
    let candidate = fold_case(matched_value);
    match (op, value) {
        (Op::Equals, FilterValue::Text(v)) => candidate == fold_case(v),
        (Op::Contains, FilterValue::Text(v)) => candidate.contains(&fold_case(v)),
        (Op::In, FilterValue::TextList(items)) => items.iter().any(|v| fold_case(v) == candidate),
        _ => false,
    }
}

fn satisfies_date(op: Op, value: &FilterValue, span: Option<(i32, i32)>) -> bool {
    let Some((date_start, date_end)) = span else {
        return false;
    };
    match (op, value) {
        (Op::Range, FilterValue::YearRange(start, end)) | (Op::Overlaps, FilterValue::YearRange(start, end)) => {
            date_start <= *end && date_end >= *start
        }
        (Op::Gte, FilterValue::Year(y)) => date_end >= *y,
        (Op::Lte, FilterValue::Year(y)) => date_start <= *y,
        (Op::Equals, FilterValue::Year(y)) => date_start <= *y && date_end >= *y,
        _ => false,
    }
}
