// Database Driver Traits
// Defines the seam between the session/query layers and a concrete client library

use chrono::{DateTime, FixedOffset, NaiveDateTime};

/// Errors raised by a driver or by a live connection
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatabaseError {
    /// Error reported by the database client; `code` is the ORA-nnnnn number when known
    #[error("{message}")]
    Driver { code: Option<i32>, message: String },

    #[error("Driver task failed: {0}")]
    TaskFailed(String),
}

impl DatabaseError {
    pub fn driver(code: Option<i32>, message: impl Into<String>) -> Self {
        DatabaseError::Driver {
            code,
            message: message.into(),
        }
    }

    /// Structured Oracle error code, if the driver reported one
    pub fn oracle_code(&self) -> Option<i32> {
        match self {
            DatabaseError::Driver { code, .. } => *code,
            _ => None,
        }
    }
}

/// Cell value in a result set, before it is made JSON-safe
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// DATE and TIMESTAMP columns (no time zone)
    DateTime(NaiveDateTime),
    /// TIMESTAMP WITH [LOCAL] TIME ZONE columns
    TimestampTz(DateTime<FixedOffset>),
    Binary(Vec<u8>),
    /// Anything the driver can't map to a primitive (intervals, objects, JSON, XML...)
    Opaque {
        type_name: String,
        text: Option<String>,
    },
}

impl CellValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(v) => Some(v.to_string()),
            CellValue::Int(v) => Some(v.to_string()),
            CellValue::Float(v) => Some(v.to_string()),
            CellValue::String(s) => Some(s.clone()),
            CellValue::DateTime(dt) => Some(dt.to_string()),
            CellValue::TimestampTz(dt) => Some(dt.to_rfc3339()),
            CellValue::Binary(_) => None,
            CellValue::Opaque { text, .. } => text.clone(),
        }
    }
}

/// Value bound to a named placeholder (`:name`)
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Int(i64),
    Text(String),
}

/// A named bind, e.g. `("offset", BindValue::Int(20))` for `:offset`
#[derive(Debug, Clone, PartialEq)]
pub struct NamedBind {
    pub name: String,
    pub value: BindValue,
}

impl NamedBind {
    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: BindValue::Int(value),
        }
    }

    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: BindValue::Text(value.into()),
        }
    }
}

/// Rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Set for DML/DDL statements instead of rows
    pub rows_affected: Option<u64>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(count),
        }
    }

    /// First cell of the first row, the usual shape of scalar catalog queries
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Credentials passed through to the database untouched
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connection trait - all live sessions must implement this
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection ID
    fn connection_id(&self) -> &str;

    /// Execute one statement with named binds
    async fn query(&self, sql: &str, binds: &[NamedBind]) -> Result<RowSet, DatabaseError>;

    /// Release the session on the server
    async fn close(&self) -> Result<(), DatabaseError>;
}

/// Database driver trait - opens sessions from a connect string
#[async_trait::async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Get the display name for this driver
    fn driver_name(&self) -> &'static str;

    /// Open a new session
    async fn connect(
        &self,
        credentials: &Credentials,
        connect_string: &str,
    ) -> Result<Box<dyn Connection>, DatabaseError>;
}
