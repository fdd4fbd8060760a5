//! Embedded SQLite transport built on `rusqlite`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use super::{QueryOutput, SqlTransport, TransportError, TransportResult};
use crate::sql::Dialect;

/// SQLite transport. Statements run on the blocking pool, one at a time.
#[derive(Clone)]
pub struct SqliteTransport {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransport").finish_non_exhaustive()
    }
}

impl SqliteTransport {
    pub fn open<P: AsRef<Path>>(path: P) -> TransportResult<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn open_in_memory() -> TransportResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a multi-statement script (schema and fixtures).
    pub fn execute_batch(&self, sql: &str) -> TransportResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> TransportResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TransportError::Connection("connection mutex poisoned".into()))
    }

    async fn run_blocking<T, F>(&self, f: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> TransportResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| TransportError::Connection("connection mutex poisoned".into()))?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl SqlTransport for SqliteTransport {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query(&self, sql: &str) -> TransportResult<QueryOutput> {
        let sql = sql.to_string();
        self.run_blocking(move |conn| run_query(conn, &sql)).await
    }

    async fn execute(&self, sql: &str) -> TransportResult<()> {
        let sql = sql.to_string();
        self.run_blocking(move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }
}

fn run_query(conn: &Connection, sql: &str) -> TransportResult<QueryOutput> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut result_rows = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(cell_text(row.get_ref(i)?));
        }
        result_rows.push(cells);
    }

    Ok(QueryOutput {
        columns,
        rows: result_rows,
        warnings: Vec::new(),
    })
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
