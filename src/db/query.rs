// Query Execution Engine
// Runs ad-hoc SQL against the current session, with optional count + offset/fetch paging

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::connection::ConnectionManager;
use crate::db::sanitize::{sanitize_rows, JsonRow};
use crate::db::traits::{NamedBind, RowSet};
use crate::error::{Result, StudioError};

/// Words that mean the query already limits its own rows
const ROW_LIMIT_TOKENS: [&str; 4] = ["rownum", "row_number", "offset", "fetch"];

/// Accept a JSON number or a numeric string; anything else counts as absent
fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Body of an execute request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page_size: Option<i64>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            page: None,
            page_size: None,
        }
    }

    pub fn paged(query: impl Into<String>, page: i64, page_size: i64) -> Self {
        Self {
            query: Some(query.into()),
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Page number, 1-based; zero, negative or missing means the first page
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    /// Rows per page; zero or less disables paging
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(0).max(0)
    }
}

/// Rows plus paging details, ready to serialize
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub results: Vec<JsonRow>,
    pub columns: Vec<String>,
    pub total_count: Option<i64>,
    pub page: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

/// Trim whitespace and one trailing `;`
pub fn normalize_sql(sql: &str) -> Result<String> {
    let trimmed = sql.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return Err(StudioError::InputValidation("SQL query is required".to_string()));
    }
    Ok(trimmed.to_string())
}

/// True when the query already pages itself (ROWNUM, ROW_NUMBER(), OFFSET, FETCH)
pub fn has_row_limit(sql: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .any(|word| {
            ROW_LIMIT_TOKENS
                .iter()
                .any(|token| word.eq_ignore_ascii_case(token))
        })
}

pub fn count_sql(sql: &str) -> String {
    format!("SELECT COUNT(*) AS CNT FROM ({})", sql)
}

pub fn paginated_sql(sql: &str) -> String {
    format!(
        "SELECT * FROM ({}) t OFFSET :offset ROWS FETCH NEXT :limit ROWS ONLY",
        sql
    )
}

/// Query execution engine
pub struct QueryEngine {
    connection_manager: Arc<ConnectionManager>,
}

impl QueryEngine {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// Execute a query, paging it when asked to and when it doesn't page itself
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryOutput> {
        let session = self.connection_manager.current().await?;
        let sql = normalize_sql(request.query.as_deref().unwrap_or_default())?;
        let page = request.page();
        let page_size = request.page_size();
        let conn = session.connection();
        let start = std::time::Instant::now();

        debug!(session_id = %session.id, page, page_size, %sql, "Executing query");

        let mut total_count = None;
        let outcome = if page_size > 0 && !has_row_limit(&sql) {
            total_count = match conn.query(&count_sql(&sql), &[]).await {
                Ok(count) => Some(count.scalar().and_then(|c| c.as_i64()).unwrap_or(0)),
                Err(e) => {
                    warn!("Could not compute total count: {}", e);
                    None
                }
            };

            let offset = (page - 1).saturating_mul(page_size);
            let binds = [NamedBind::int("offset", offset), NamedBind::int("limit", page_size)];
            conn.query(&paginated_sql(&sql), &binds).await
        } else {
            conn.query(&sql, &[]).await
        };
        let rows = outcome.map_err(|e| StudioError::QueryExecution(e.to_string()))?;

        let RowSet {
            columns,
            rows,
            rows_affected,
        } = rows;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        info!(rows = rows.len(), execution_time_ms, "Query executed");

        Ok(QueryOutput {
            results: sanitize_rows(&columns, &rows),
            columns,
            total_count,
            page,
            page_size,
            rows_affected,
        })
    }
}
