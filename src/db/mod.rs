// Database Module
// Session handling, query execution, result sanitizing and catalog metadata

pub mod connection;
pub mod drivers;
pub mod query;
pub mod sanitize;
pub mod schema;
pub mod traits;

pub use connection::{
    ConnectFailure, ConnectFailureKind, ConnectStringFormat, ConnectionConfig, ConnectionManager,
    ConnectionStatus, Session, SessionInfo,
};
pub use drivers::{InMemoryDriver, OracleDriver};
pub use query::{QueryEngine, QueryOutput, QueryRequest};
pub use schema::{ColumnDescriptor, MetadataReader, TableDescriptor};
pub use traits::{CellValue, Connection, DatabaseDriver, DatabaseError, NamedBind, RowSet};
