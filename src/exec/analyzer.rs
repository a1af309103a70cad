//! Aggregate analysis over an active subgroup (spec §4.5): "give me an
//! overview of these" turns don't re-run the plan, they summarize the
//! subgroup already in view.

use std::time::Duration;

use serde::Serialize;
use sqlx::{PgPool, Row};

use crate::error::ExecutionError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgroupOverview {
    pub count: usize,
    pub top_places: Vec<(String, i64)>,
    pub top_publishers: Vec<(String, i64)>,
    pub top_languages: Vec<(String, i64)>,
    pub top_subjects: Vec<(String, i64)>,
    /// Century buckets (e.g. `1500` for 1500-1599) with record counts,
    /// ordered earliest first (spec §4.6 "grouping by date-century").
    pub date_centuries: Vec<(i32, i64)>,
    pub date_range: Option<(i32, i32)>,
}

const TOP_N: i64 = 5;

/// Summarize `record_ids` (an active subgroup): most common places,
/// publishers, languages, and subjects, a date-century breakdown, and the
/// overall date span.
pub async fn analyze_subgroup(
    pool: &PgPool,
    record_ids: &[String],
    timeout: Duration,
) -> Result<SubgroupOverview, ExecutionError> {
    let top_places = top_counts(pool, "imprints", "place_norm", record_ids, timeout).await?;
    let top_publishers = top_counts(pool, "imprints", "publisher_norm", record_ids, timeout).await?;
    let top_languages = top_counts(pool, "languages", "code", record_ids, timeout).await?;
    let top_subjects = top_counts(pool, "subjects", "value", record_ids, timeout).await?;
    let date_centuries = fetch_date_centuries(pool, record_ids, timeout).await?;
    let date_range = fetch_date_range(pool, record_ids, timeout).await?;

    Ok(SubgroupOverview {
        count: record_ids.len(),
        top_places,
        top_publishers,
        top_languages,
        top_subjects,
        date_centuries,
        date_range,
    })
}

async fn top_counts(
    pool: &PgPool,
    table: &str,
    column: &str,
    record_ids: &[String],
    timeout: Duration,
) -> Result<Vec<(String, i64)>, ExecutionError> {
    let sql = format!(
        "SELECT {column} AS value, COUNT(DISTINCT record_id) AS n \
         FROM {table} \
         WHERE record_id = ANY($1) AND {column} IS NOT NULL \
         GROUP BY {column} \
         ORDER BY n DESC, value ASC \
         LIMIT $2"
    );

    let rows = tokio::time::timeout(
        timeout,
        sqlx::query(&sql).bind(record_ids).bind(TOP_N).fetch_all(pool),
    )
    .await
    .map_err(|_| ExecutionError::Timeout(timeout))??;

    Ok(rows
        .into_iter()
        .map(|r| (r.get::<String, _>("value"), r.get::<i64, _>("n")))
        .collect())
}

/// Bucket each record's earliest imprint date to the century it falls in
/// (1500-1599 buckets to `1500`) and count records per bucket.
async fn fetch_date_centuries(
    pool: &PgPool,
    record_ids: &[String],
    timeout: Duration,
) -> Result<Vec<(i32, i64)>, ExecutionError> {
    let rows = tokio::time::timeout(
        timeout,
        sqlx::query(
            "SELECT (date_start / 100) * 100 AS century, COUNT(DISTINCT record_id) AS n \
             FROM imprints \
             WHERE record_id = ANY($1) AND date_start IS NOT NULL \
             GROUP BY century \
             ORDER BY century ASC",
        )
        .bind(record_ids)
        .fetch_all(pool),
    )
    .await
    .map_err(|_| ExecutionError::Timeout(timeout))??;

    Ok(rows
        .into_iter()
        .map(|r| (r.get::<i32, _>("century"), r.get::<i64, _>("n")))
        .collect())
}

async fn fetch_date_range(
    pool: &PgPool,
    record_ids: &[String],
    timeout: Duration,
) -> Result<Option<(i32, i32)>, ExecutionError> {
    let row = tokio::time::timeout(
        timeout,
        sqlx::query(
            "SELECT MIN(date_start) AS lo, MAX(date_end) AS hi FROM imprints WHERE record_id = ANY($1)",
        )
        .bind(record_ids)
        .fetch_one(pool),
    )
    .await
    .map_err(|_| ExecutionError::Timeout(timeout))??;

    let lo: Option<i32> = row.get("lo");
    let hi: Option<i32> = row.get("hi");
    Ok(lo.zip(hi))
}
