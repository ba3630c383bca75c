//! SQL generation for source reads
//!
//! Rows are fetched as `to_jsonb(t)` documents so any table or computed query
//! maps onto a [`SourceRow`](crate::domain::SourceRow) without per-table code.
//! Identifiers are validated before they reach SQL text; values always travel
//! as bind parameters.

use crate::adapters::database::traits::{RecordFilter, RecordQuery};
use crate::adapters::postgresql::client::SqlParam;
use crate::domain::ids::is_valid_identifier;
use crate::domain::{DataSource, HarvestError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// SQL text with its owned bind parameters
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("placeholder pattern compiles"))
}

fn checked_identifier(name: &str) -> Result<&str> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(HarvestError::Validation(format!("Invalid SQL identifier: '{name}'")))
    }
}

/// Prefixed, quoted table name
pub fn table_name(prefix: &str, table: &str) -> Result<String> {
    Ok(format!("\"{}{}\"", prefix, checked_identifier(table)?))
}

/// Replaces `{table}` placeholders in a computed query with prefixed names
///
/// ```rust
/// use harvest::adapters::postgresql::sql::expand_placeholders;
///
/// let sql = expand_placeholders("SELECT id FROM {logstore_standard_log} l", "mdl_");
/// assert_eq!(sql, "SELECT id FROM \"mdl_logstore_standard_log\" l");
/// ```
pub fn expand_placeholders(sql: &str, prefix: &str) -> String {
    placeholder_pattern()
        .replace_all(sql, |caps: &regex::Captures<'_>| format!("\"{}{}\"", prefix, &caps[1]))
        .into_owned()
}

fn from_clause(source: &DataSource, prefix: &str) -> Result<String> {
    match source {
        DataSource::Table(table) => table_name(prefix, table),
        DataSource::Query(sql) => Ok(format!("({})", expand_placeholders(sql, prefix))),
    }
}

fn push_param(params: &mut Vec<SqlParam>, value: SqlParam) -> usize {
    params.push(value);
    params.len()
}

fn where_clause(
    query: &RecordQuery,
    include_keyset: bool,
    params: &mut Vec<SqlParam>,
) -> Result<String> {
    let mut predicates = Vec::new();

    for condition in &query.conditions {
        let column = checked_identifier(&condition.column)?;
        let n = push_param(params, Box::new(condition.values.clone()));
        predicates.push(format!("t.\"{column}\"::text = ANY(${n})"));
    }

    match &query.filter {
        RecordFilter::None => {}
        RecordFilter::ModifiedAfter { column, since } => {
            let column = checked_identifier(column)?;
            let n = push_param(params, Box::new(*since));
            predicates.push(format!("t.\"{column}\"::bigint > ${n}"));
        }
        RecordFilter::IdAfter(id) => {
            let n = push_param(params, Box::new(*id));
            predicates.push(format!("t.id::bigint > ${n}"));
        }
    }

    if include_keyset {
        if let Some(after_id) = query.after_id {
            let n = push_param(params, Box::new(after_id));
            predicates.push(format!("t.id::bigint > ${n}"));
        }
    }

    if let Some(up_to_id) = query.up_to_id {
        let n = push_param(params, Box::new(up_to_id));
        predicates.push(format!("t.id::bigint <= ${n}"));
    }

    if predicates.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" WHERE {}", predicates.join(" AND ")))
    }
}

/// `SELECT to_jsonb(t) ... ORDER BY t.id LIMIT .. OFFSET ..`
pub fn select_rows(query: &RecordQuery, prefix: &str) -> Result<Statement> {
    let mut params = Vec::new();
    let from = from_clause(&query.source, prefix)?;
    let filter = where_clause(query, true, &mut params)?;

    let mut sql = format!("SELECT to_jsonb(t) AS doc FROM {from} t{filter} ORDER BY t.id");
    if let Some(limit) = query.limit {
        let n = push_param(&mut params, Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ${n}"));
    }
    if query.offset > 0 {
        let n = push_param(&mut params, Box::new(query.offset as i64));
        sql.push_str(&format!(" OFFSET ${n}"));
    }

    Ok(Statement { sql, params })
}

/// `SELECT COUNT(*)` over the filtered source, ignoring paging
pub fn count_rows(query: &RecordQuery, prefix: &str) -> Result<Statement> {
    let mut params = Vec::new();
    let from = from_clause(&query.source, prefix)?;
    let filter = where_clause(query, false, &mut params)?;

    Ok(Statement {
        sql: format!("SELECT COUNT(*)::bigint AS n FROM {from} t{filter}"),
        params,
    })
}

/// Every id of a table, ascending
pub fn select_ids(table: &str, prefix: &str) -> Result<Statement> {
    Ok(Statement {
        sql: format!(
            "SELECT t.id::bigint AS id FROM {} t ORDER BY t.id",
            table_name(prefix, table)?
        ),
        params: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RowFilter;

    fn table(name: &str) -> DataSource {
        DataSource::Table(name.to_string())
    }

    #[test]
    fn test_plain_select() {
        let stmt = select_rows(&RecordQuery::new(table("user")), "mdl_").unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT to_jsonb(t) AS doc FROM \"mdl_user\" t ORDER BY t.id"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_timestamp_window_select() {
        let query = RecordQuery::new(table("course"))
            .with_filter(RecordFilter::ModifiedAfter {
                column: "timemodified".to_string(),
                since: 100,
            })
            .with_after_id(40)
            .with_limit(500)
            .with_offset(1000);
        let stmt = select_rows(&query, "mdl_").unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT to_jsonb(t) AS doc FROM \"mdl_course\" t \
             WHERE t.\"timemodified\"::bigint > $1 AND t.id::bigint > $2 \
             ORDER BY t.id LIMIT $3 OFFSET $4"
        );
        assert_eq!(stmt.params.len(), 4);
    }

    #[test]
    fn test_conditions_and_count_ignore_keyset() {
        let query = RecordQuery {
            conditions: vec![RowFilter {
                column: "eventname".to_string(),
                values: vec!["\\core\\event\\course_viewed".to_string()],
            }],
            ..RecordQuery::new(table("logstore_standard_log"))
        }
        .with_filter(RecordFilter::IdAfter(9))
        .with_after_id(20)
        .with_up_to_id(50)
        .with_limit(10);

        let stmt = count_rows(&query, "").unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*)::bigint AS n FROM \"logstore_standard_log\" t \
             WHERE t.\"eventname\"::text = ANY($1) AND t.id::bigint > $2 AND t.id::bigint <= $3"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_computed_query_source() {
        let query = RecordQuery::new(DataSource::Query(
            "SELECT l.id, l.userid FROM {logstore_standard_log} l".to_string(),
        ));
        let stmt = select_rows(&query, "mdl_").unwrap();
        assert!(stmt
            .sql
            .starts_with("SELECT to_jsonb(t) AS doc FROM (SELECT l.id, l.userid FROM \"mdl_logstore_standard_log\" l) t"));
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(select_rows(&RecordQuery::new(table("user; drop")), "mdl_").is_err());

        let query = RecordQuery::new(table("user")).with_filter(RecordFilter::ModifiedAfter {
            column: "x\" OR 1=1".to_string(),
            since: 0,
        });
        assert!(select_rows(&query, "mdl_").is_err());
        assert!(select_ids("bad name", "mdl_").is_err());
    }
}
