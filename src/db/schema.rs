// Schema Introspection
// Lists user tables and describes table columns from the Oracle catalog views

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::db::connection::{ConnectionManager, Session};
use crate::db::traits::{CellValue, NamedBind, RowSet};
use crate::error::{Result, StudioError};

/// Owners whose tables are never listed
pub const EXCLUDED_OWNERS: [&str; 7] = [
    "SYS", "SYSTEM", "SYS$UMF", "OUTLN", "APPQOSSYS", "DBSNMP", "WMSYS",
];

const RECYCLE_BIN_PREFIX: &str = "BIN$";

const LIST_TABLES_SQL: &str = "SELECT owner, table_name FROM all_tables \
     WHERE owner NOT IN ('SYS', 'SYSTEM', 'SYS$UMF', 'OUTLN', 'APPQOSSYS', 'DBSNMP', 'WMSYS') \
     AND table_name NOT LIKE 'BIN$%' \
     ORDER BY owner, table_name";

const CURRENT_USER_SQL: &str = "SELECT USER FROM DUAL";

const DESCRIBE_SQL: &str = "SELECT column_name, data_type, data_length, data_precision, \
     data_scale, nullable FROM all_tab_columns \
     WHERE owner = :p_owner AND table_name = :p_table \
     ORDER BY column_id";

/// Column information
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: bool,
}

/// A table and its columns, in catalog order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    pub owner: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Trim, drop one pair of surrounding quotes, upper-case
pub fn normalize_identifier(part: &str) -> String {
    let trimmed = part.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_uppercase()
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | '$' | '#'))
}

fn checked_identifier(part: &str, what: &str) -> Result<String> {
    let name = normalize_identifier(part);
    if is_valid_identifier(&name) {
        Ok(name)
    } else {
        Err(StudioError::InputValidation(format!(
            "Invalid {} name: {}",
            what,
            part.trim()
        )))
    }
}

/// Split `OWNER.TABLE` at the first dot and validate each part; issues no SQL
pub fn parse_table_identifier(identifier: &str) -> Result<(Option<String>, String)> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(StudioError::InputValidation("Table name is required".to_string()));
    }

    match identifier.split_once('.') {
        Some((owner, table)) => {
            let table = checked_identifier(table, "table")?;
            let owner = checked_identifier(owner, "owner")?;
            Ok((Some(owner), table))
        }
        None => Ok((None, checked_identifier(identifier, "table")?)),
    }
}

fn is_listed(owner: &str, table: &str) -> bool {
    !EXCLUDED_OWNERS.contains(&owner) && !table.starts_with(RECYCLE_BIN_PREFIX)
}

fn text_at(row: &[CellValue], idx: usize) -> Option<String> {
    row.get(idx).and_then(CellValue::as_text)
}

fn int_at(row: &[CellValue], idx: usize) -> Option<i64> {
    row.get(idx).and_then(CellValue::as_i64)
}

fn column_from_row(row: &[CellValue]) -> ColumnDescriptor {
    ColumnDescriptor {
        name: text_at(row, 0).unwrap_or_default(),
        data_type: text_at(row, 1).unwrap_or_default(),
        length: int_at(row, 2),
        precision: int_at(row, 3),
        scale: int_at(row, 4),
        nullable: text_at(row, 5).as_deref() == Some("Y"),
    }
}

/// Catalog reader for the current session
pub struct MetadataReader {
    connection_manager: Arc<ConnectionManager>,
}

impl MetadataReader {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    async fn run(&self, session: &Session, sql: &str, binds: &[NamedBind]) -> Result<RowSet> {
        session
            .connection()
            .query(sql, binds)
            .await
            .map_err(|e| StudioError::Metadata(e.to_string()))
    }

    /// `OWNER.TABLE` for every visible user table
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let session = self.connection_manager.current().await?;
        let rows = self.run(&session, LIST_TABLES_SQL, &[]).await?;

        let tables: Vec<String> = rows
            .rows
            .iter()
            .filter_map(|row| Some((text_at(row, 0)?, text_at(row, 1)?)))
            .filter(|(owner, table)| is_listed(owner, table))
            .map(|(owner, table)| format!("{}.{}", owner, table))
            .collect();

        debug!(count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// Columns of `OWNER.TABLE` or of a table in the session user's schema
    pub async fn describe(&self, identifier: &str) -> Result<TableDescriptor> {
        let session = self.connection_manager.current().await?;
        let (owner, table) = parse_table_identifier(identifier)?;

        let owner = match owner {
            Some(owner) => owner,
            None => {
                let user = self.run(&session, CURRENT_USER_SQL, &[]).await?;
                let name = user.scalar().and_then(CellValue::as_text).ok_or_else(|| {
                    StudioError::Metadata("Could not resolve current user".to_string())
                })?;
                checked_identifier(&name, "owner")?
            }
        };

        let binds = [
            NamedBind::text("p_owner", owner.as_str()),
            NamedBind::text("p_table", table.as_str()),
        ];
        let rows = self.run(&session, DESCRIBE_SQL, &binds).await?;
        let columns = rows.rows.iter().map(|row| column_from_row(row)).collect();

        Ok(TableDescriptor {
            owner,
            table,
            columns,
        })
    }
}
