//! Pure, deterministic compiler from a [`QueryPlan`] to executable SQL
//! (spec §4.4). Never touches the database; joins are added only for the
//! tables a given plan's filters actually need.

use crate::error::SqlBuildError;
use crate::plan::{Field, FilterValue, Op, QueryPlan};
use crate::sql::value_norm::{escape_for_equals, escape_for_substring, quote_for_fts};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i32),
    TextList(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

#[derive(Default)]
struct JoinSet {
    titles: bool,
    imprints: bool,
    agents: bool,
    subjects: bool,
    languages: bool,
}

/// Render `plan` to a parameterized `SELECT` over `records`, joining only
/// the tables its filters reference. Placeholders are `$1`, `$2`, ... in
/// the order filters appear in the plan.
pub fn build(plan: &QueryPlan) -> Result<BuiltQuery, SqlBuildError> {
    let mut joins = JoinSet::default();
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for filter in &plan.filters {
        let next_placeholder = params.len() + 1;
        match filter.field {
            Field::Title => {
                joins.titles = true;
                render_text_filter(
                    Field::Title,
                    Some("titles_fts.value"),
                    "t.value",
                    filter.op,
                    &filter.value,
                    next_placeholder,
                    &mut conditions,
                    &mut params,
                )?;
            }
            Field::Subject => {
                joins.subjects = true;
                render_text_filter(
                    Field::Subject,
                    Some("subjects_fts.value"),
                    "s.value",
                    filter.op,
                    &filter.value,
                    next_placeholder,
                    &mut conditions,
                    &mut params,
                )?;
            }
            Field::Place => {
                joins.imprints = true;
                render_text_filter(
                    Field::Place,
                    None,
                    "i.place_norm",
                    filter.op,
                    &filter.value,
                    next_placeholder,
                    &mut conditions,
                    &mut params,
                )?;
            }
            Field::Publisher => {
                joins.imprints = true;
                render_text_filter(
                    Field::Publisher,
                    None,
                    "i.publisher_norm",
                    filter.op,
                    &filter.value,
                    next_placeholder,
                    &mut conditions,
                    &mut params,
                )?;
            }
            Field::Country => {
                joins.imprints = true;
                render_country_filter(filter.op, &filter.value, &mut conditions, &mut params)?;
            }
            Field::Language => {
                joins.languages = true;
                match (&filter.op, &filter.value) {
                    (Op::Equals, FilterValue::Text(v)) => {
                        conditions.push(format!("l.code = ${next_placeholder}"));
                        params.push(SqlParam::Text(escape_for_equals(v)));
                    }
                    (Op::In, FilterValue::TextList(vs)) => {
                        conditions.push(format!("l.code = ANY(${next_placeholder})"));
                        params.push(SqlParam::TextList(
                            vs.iter().map(|v| escape_for_equals(v)).collect(),
                        ));
                    }
                    _ => return Err(SqlBuildError::UnsupportedOp(filter.op, filter.field)),
                }
            }
            Field::AgentName => {
                joins.agents = true;
                render_text_filter(
                    Field::AgentName,
                    None,
                    "a.agent_norm",
                    filter.op,
                    &filter.value,
                    next_placeholder,
                    &mut conditions,
                    &mut params,
                )?;
            }
            Field::AgentRole => {
                joins.agents = true;
                match (&filter.op, &filter.value) {
                    (Op::Equals, FilterValue::Text(v)) => {
                        conditions.push(format!("a.role_norm = ${next_placeholder}"));
                        params.push(SqlParam::Text(escape_for_equals(v)));
                    }
                    _ => return Err(SqlBuildError::UnsupportedOp(filter.op, filter.field)),
                }
            }
            Field::AgentType => {
                joins.agents = true;
                match (&filter.op, &filter.value) {
                    (Op::Equals, FilterValue::Text(v)) => {
                        conditions.push(format!("a.agent_type = ${next_placeholder}"));
                        params.push(SqlParam::Text(escape_for_equals(v)));
                    }
                    _ => return Err(SqlBuildError::UnsupportedOp(filter.op, filter.field)),
                }
            }
            Field::Date => {
                joins.imprints = true;
                render_date_filter(filter.op, &filter.value, &mut conditions, &mut params)?;
            }
        }
    }

    let sql = render_sql(&joins, &conditions);
    Ok(BuiltQuery { sql, params })
}

/// `fts_column` is `Some` only for fields with a `_fts` shadow table
/// (title, subject). Fields without one fall back to a case-folded
/// `ILIKE` substring match on `equals_column` for CONTAINS (spec §8 edge
/// case: "CONTAINS on a field that has no FTS shadow falls back to
/// case-folded substring match on the base column").
fn render_text_filter(
    field: Field,
    fts_column: Option<&str>,
    equals_column: &str,
    op: Op,
    value: &FilterValue,
    placeholder: usize,
    conditions: &mut Vec<String>,
    params: &mut Vec<SqlParam>,
) -> Result<(), SqlBuildError> {
    let FilterValue::Text(raw) = value else {
        return Err(SqlBuildError::InvalidValue(format!(
            "expected text value, got {value:?}"
        )));
    };

    match op {
        Op::Equals => {
            conditions.push(format!("{equals_column} = ${placeholder}"));
            params.push(SqlParam::Text(escape_for_equals(raw)));
        }
        Op::Contains => match fts_column {
            Some(fts_column) => {
                conditions.push(format!("{fts_column} @@ plainto_tsquery('simple', ${placeholder})"));
                params.push(SqlParam::Text(quote_for_fts(raw)));
            }
            None => {
                conditions.push(format!("{equals_column} ILIKE ${placeholder}"));
                params.push(SqlParam::Text(format!("%{}%", escape_for_substring(raw))));
            }
        },
        other => return Err(SqlBuildError::UnsupportedOp(other, field)),
    }
    Ok(())
}

/// COUNTRY matches either the two-letter code or the resolved name (spec
/// §4.5), since the oracle may hand back either depending on how the user
/// phrased the turn ("Italy" vs "it").
fn render_country_filter(
    op: Op,
    value: &FilterValue,
    conditions: &mut Vec<String>,
    params: &mut Vec<SqlParam>,
) -> Result<(), SqlBuildError> {
    let FilterValue::Text(raw) = value else {
        return Err(SqlBuildError::InvalidValue(format!(
            "expected text value, got {value:?}"
        )));
    };

    match op {
        Op::Equals => {
            let p = params.len() + 1;
            conditions.push(format!("(i.country_code = ${p} OR i.country_name = ${p})"));
            params.push(SqlParam::Text(escape_for_equals(raw)));
        }
        other => return Err(SqlBuildError::UnsupportedOp(other, Field::Country)),
    }
    Ok(())
}

/// YEAR filters render an overlap predicate (spec §4.5): a record's
/// imprint date span `[date_start, date_end]` matches a `RANGE`/`OVERLAPS`
/// query span `[start, end]` whenever the spans intersect at all, not only
/// when the imprint span is wholly contained in the query span. `GTE`/`LTE`
/// are the half-open variants of the same idea.
fn render_date_filter(
    op: Op,
    value: &FilterValue,
    conditions: &mut Vec<String>,
    params: &mut Vec<SqlParam>,
) -> Result<(), SqlBuildError> {
    match (op, value) {
        (Op::Range, FilterValue::YearRange(start, end)) | (Op::Overlaps, FilterValue::YearRange(start, end)) => {
            let p1 = params.len() + 1;
            let p2 = params.len() + 2;
            conditions.push(format!("i.date_start <= ${p2} AND i.date_end >= ${p1}"));
            params.push(SqlParam::Int(*start));
            params.push(SqlParam::Int(*end));
        }
        (Op::Gte, FilterValue::Year(y)) => {
            conditions.push(format!("i.date_end >= ${}", params.len() + 1));
            params.push(SqlParam::Int(*y));
        }
        (Op::Lte, FilterValue::Year(y)) => {
            conditions.push(format!("i.date_start <= ${}", params.len() + 1));
            params.push(SqlParam::Int(*y));
        }
        (Op::Equals, FilterValue::Year(y)) => {
            let p1 = params.len() + 1;
            conditions.push(format!("i.date_start <= ${p1} AND i.date_end >= ${p1}"));
            params.push(SqlParam::Int(*y));
        }
        (bad_op, _) => return Err(SqlBuildError::UnsupportedOp(bad_op, Field::Date)),
    }
    Ok(())
}

fn render_sql(joins: &JoinSet, conditions: &[String]) -> String {
    let mut sql = String::from("SELECT DISTINCT r.record_id FROM records r");

    if joins.titles {
        sql.push_str(
            " JOIN titles t ON t.record_id = r.record_id \
             LEFT JOIN titles_fts ON titles_fts.record_id = r.record_id",
        );
    }
    if joins.imprints {
        sql.push_str(" JOIN imprints i ON i.record_id = r.record_id");
    }
    if joins.agents {
        sql.push_str(" JOIN agents a ON a.record_id = r.record_id");
    }
    if joins.subjects {
        sql.push_str(
            " JOIN subjects s ON s.record_id = r.record_id \
             LEFT JOIN subjects_fts ON subjects_fts.record_id = r.record_id",
        );
    }
    if joins.languages {
        sql.push_str(" JOIN languages l ON l.record_id = r.record_id");
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql
}
