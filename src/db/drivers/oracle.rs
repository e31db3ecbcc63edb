// Oracle Driver
// Implements DatabaseDriver for Oracle using the `oracle` crate (ODPI-C).
// The client library is blocking, so every call runs on tokio's blocking pool.

use crate::db::traits::{
    BindValue, CellValue, Connection, Credentials, DatabaseDriver, DatabaseError, NamedBind,
    RowSet,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use oracle::sql_type::{FromSql, OracleType, ToSql};
use oracle::Row;
use std::sync::Arc;
use tracing::debug;

impl From<oracle::Error> for DatabaseError {
    fn from(err: oracle::Error) -> Self {
        let code = err.db_error().map(|db| db.code()).filter(|code| *code != 0);
        DatabaseError::Driver {
            code,
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for DatabaseError {
    fn from(err: tokio::task::JoinError) -> Self {
        DatabaseError::TaskFailed(err.to_string())
    }
}

/// Oracle specific connection wrapper
pub struct OracleConnection {
    pub id: String,
    conn: Arc<oracle::Connection>,
}

#[async_trait::async_trait]
impl Connection for OracleConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn query(&self, sql: &str, binds: &[NamedBind]) -> Result<RowSet, DatabaseError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let binds = binds.to_vec();
        tokio::task::spawn_blocking(move || run_statement(&conn, &sql, &binds)).await?
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || conn.close()).await??;
        Ok(())
    }
}

/// Oracle driver implementation
pub struct OracleDriver;

impl OracleDriver {
    /// Create a new Oracle driver
    pub fn new() -> Self {
        Self
    }
}

impl Default for OracleDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DatabaseDriver for OracleDriver {
    fn driver_name(&self) -> &'static str {
        "Oracle Database"
    }

    async fn connect(
        &self,
        credentials: &Credentials,
        connect_string: &str,
    ) -> Result<Box<dyn Connection>, DatabaseError> {
        let username = credentials.username.clone();
        let password = credentials.password.clone();
        let connect_string = connect_string.to_string();

        let conn = tokio::task::spawn_blocking(move || {
            oracle::Connection::connect(&username, &password, &connect_string)
        })
        .await??;

        Ok(Box::new(OracleConnection {
            id: uuid::Uuid::new_v4().to_string(),
            conn: Arc::new(conn),
        }))
    }
}

fn bind_ref(value: &BindValue) -> &dyn ToSql {
    match value {
        BindValue::Int(v) => v,
        BindValue::Text(v) => v,
    }
}

/// Execute one statement; queries return rows, everything else returns the affected count
fn run_statement(
    conn: &oracle::Connection,
    sql: &str,
    binds: &[NamedBind],
) -> Result<RowSet, DatabaseError> {
    let named: Vec<(&str, &dyn ToSql)> = binds
        .iter()
        .map(|b| (b.name.as_str(), bind_ref(&b.value)))
        .collect();

    let mut stmt = conn.statement(sql).build()?;

    if !stmt.is_query() {
        stmt.execute_named(&named)?;
        let affected = stmt.row_count()?;
        debug!(affected, "Statement executed");
        return Ok(RowSet::affected(affected));
    }

    let result_set = stmt.query_named(&named)?;
    let columns: Vec<String> = result_set
        .column_info()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let types: Vec<OracleType> = result_set
        .column_info()
        .iter()
        .map(|c| c.oracle_type().clone())
        .collect();

    let mut rows = Vec::new();
    for row in result_set {
        let row = row?;
        let cells = types
            .iter()
            .enumerate()
            .map(|(idx, oracle_type)| cell_from_row(&row, idx, oracle_type))
            .collect();
        rows.push(cells);
    }

    Ok(RowSet::new(columns, rows))
}

fn get<T: FromSql>(row: &Row, idx: usize) -> Result<Option<T>, oracle::Error> {
    row.get::<usize, Option<T>>(idx)
}

fn map_cell<T: FromSql>(
    row: &Row,
    idx: usize,
    oracle_type: &OracleType,
    f: impl FnOnce(T) -> CellValue,
) -> CellValue {
    match get::<T>(row, idx) {
        Ok(Some(v)) => f(v),
        Ok(None) => CellValue::Null,
        Err(_) => opaque(row, idx, oracle_type),
    }
}

/// Fallback for values that couldn't be read as their natural type
fn opaque(row: &Row, idx: usize, oracle_type: &OracleType) -> CellValue {
    CellValue::Opaque {
        type_name: oracle_type.to_string(),
        text: get::<String>(row, idx).ok().flatten(),
    }
}

/// NUMBER keeps full precision as text; narrow it to i64/f64 when that is lossless enough
fn number_cell(text: String) -> CellValue {
    if let Ok(v) = text.parse::<i64>() {
        return CellValue::Int(v);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => CellValue::Float(v),
        _ => CellValue::String(text),
    }
}

/// Convert an Oracle column value to CellValue
fn cell_from_row(row: &Row, idx: usize, oracle_type: &OracleType) -> CellValue {
    match oracle_type {
        OracleType::Number(_, _)
        | OracleType::Float(_)
        | OracleType::Int64
        | OracleType::UInt64 => map_cell::<String>(row, idx, oracle_type, number_cell),
        OracleType::BinaryFloat | OracleType::BinaryDouble => {
            map_cell::<f64>(row, idx, oracle_type, CellValue::Float)
        }
        OracleType::Varchar2(_)
        | OracleType::NVarchar2(_)
        | OracleType::Char(_)
        | OracleType::NChar(_)
        | OracleType::Long
        | OracleType::CLOB
        | OracleType::NCLOB
        | OracleType::Rowid => map_cell::<String>(row, idx, oracle_type, CellValue::String),
        OracleType::Date | OracleType::Timestamp(_) => {
            map_cell::<NaiveDateTime>(row, idx, oracle_type, CellValue::DateTime)
        }
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            map_cell::<DateTime<FixedOffset>>(row, idx, oracle_type, CellValue::TimestampTz)
        }
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => {
            map_cell::<Vec<u8>>(row, idx, oracle_type, CellValue::Binary)
        }
        OracleType::Boolean => map_cell::<bool>(row, idx, oracle_type, CellValue::Bool),
        _ => match get::<String>(row, idx) {
            Ok(None) => CellValue::Null,
            _ => opaque(row, idx, oracle_type),
        },
    }
}
