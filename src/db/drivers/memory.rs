// In-Memory Driver
// Scripted DatabaseDriver used by tests and local UI work without an Oracle instance

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::db::traits::{
    Connection, Credentials, DatabaseDriver, DatabaseError, NamedBind, RowSet,
};

/// Answers one statement; receives the SQL text and its binds
pub type QueryHandler = dyn Fn(&str, &[NamedBind]) -> Result<RowSet, DatabaseError> + Send + Sync;

/// A recorded statement execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub connection_id: String,
    pub sql: String,
    pub binds: Vec<NamedBind>,
}

/// Connects and closes in the order the driver saw them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A connect attempt with its connect string
    Connect(String),
    /// A close of the connection with this id
    Close(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Journal {
    connect_attempts: Mutex<Vec<String>>,
    queries: Mutex<Vec<RecordedQuery>>,
    closed: Mutex<Vec<String>>,
    events: Mutex<Vec<DriverEvent>>,
}

/// An in-memory database driver.
///
/// Connect attempts consume queued failures in FIFO order and succeed once
/// the queue is empty. Every statement goes to the configured handler.
///
/// ```
/// use ora_query_studio::db::drivers::InMemoryDriver;
/// use ora_query_studio::db::traits::{CellValue, RowSet};
///
/// let driver = InMemoryDriver::new().with_handler(|_sql, _binds| {
///     Ok(RowSet::new(vec!["X".into()], vec![vec![CellValue::Int(1)]]))
/// });
/// assert!(driver.connect_attempts().is_empty());
/// ```
pub struct InMemoryDriver {
    connect_failures: Mutex<VecDeque<DatabaseError>>,
    close_failure: Option<DatabaseError>,
    handler: Arc<QueryHandler>,
    journal: Arc<Journal>,
    next_id: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl InMemoryDriver {
    /// Create a driver whose connects succeed and whose queries return no rows.
    pub fn new() -> Self {
        Self {
            connect_failures: Mutex::new(VecDeque::new()),
            close_failure: None,
            handler: Arc::new(|_, _| Ok(RowSet::default())),
            journal: Arc::new(Journal::default()),
            next_id: AtomicUsize::new(1),
            connect_delay: None,
        }
    }

    /// Fail the next connect attempt with `err`.
    pub fn with_connect_failure(self, err: DatabaseError) -> Self {
        self.push_connect_failure(err);
        self
    }

    /// Every `close` on connections from this driver fails with `err`.
    pub fn with_close_failure(mut self, err: DatabaseError) -> Self {
        self.close_failure = Some(err);
        self
    }

    /// Sleep before answering each connect attempt.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Route all statements to `handler`.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &[NamedBind]) -> Result<RowSet, DatabaseError> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Queue a connect failure on a driver that is already shared.
    pub fn push_connect_failure(&self, err: DatabaseError) {
        lock(&self.connect_failures).push_back(err);
    }

    /// Connect strings seen so far, in order.
    pub fn connect_attempts(&self) -> Vec<String> {
        lock(&self.journal.connect_attempts).clone()
    }

    /// All statements executed so far, in order.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        lock(&self.journal.queries).clone()
    }

    /// SQL text of all statements executed so far.
    pub fn recorded_sql(&self) -> Vec<String> {
        self.recorded_queries().into_iter().map(|q| q.sql).collect()
    }

    /// IDs of connections whose `close` was called.
    pub fn closed_connections(&self) -> Vec<String> {
        lock(&self.journal.closed).clone()
    }

    /// Connect attempts and closes, interleaved in call order.
    pub fn events(&self) -> Vec<DriverEvent> {
        lock(&self.journal.events).clone()
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection handed out by [`InMemoryDriver`]
pub struct InMemoryConnection {
    id: String,
    handler: Arc<QueryHandler>,
    journal: Arc<Journal>,
    close_failure: Option<DatabaseError>,
}

#[async_trait::async_trait]
impl Connection for InMemoryConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn query(&self, sql: &str, binds: &[NamedBind]) -> Result<RowSet, DatabaseError> {
        lock(&self.journal.queries).push(RecordedQuery {
            connection_id: self.id.clone(),
            sql: sql.to_string(),
            binds: binds.to_vec(),
        });
        (self.handler)(sql, binds)
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        lock(&self.journal.closed).push(self.id.clone());
        lock(&self.journal.events).push(DriverEvent::Close(self.id.clone()));
        match &self.close_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseDriver for InMemoryDriver {
    fn driver_name(&self) -> &'static str {
        "In-memory"
    }

    async fn connect(
        &self,
        _credentials: &Credentials,
        connect_string: &str,
    ) -> Result<Box<dyn Connection>, DatabaseError> {
        lock(&self.journal.connect_attempts).push(connect_string.to_string());
        lock(&self.journal.events).push(DriverEvent::Connect(connect_string.to_string()));

        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = lock(&self.connect_failures).pop_front() {
            return Err(err);
        }

        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(Box::new(InMemoryConnection {
            id,
            handler: Arc::clone(&self.handler),
            journal: Arc::clone(&self.journal),
            close_failure: self.close_failure.clone(),
        }))
    }
}
