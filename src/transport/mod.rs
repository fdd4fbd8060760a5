//! SQL execution transport.
//!
//! The search engine never talks to a database directly; it hands finished
//! SQL strings to a [`SqlTransport`] and reads back untyped text cells. The
//! transport reports server warnings so the driver can detect truncated
//! group concatenations.

mod sqlite;

pub use sqlite::SqliteTransport;

use async_trait::async_trait;

use crate::sql::Dialect;

/// MySQL warning code for `Row N was cut by GROUP_CONCAT()`.
pub const WARN_CONCAT_TRUNCATED: u32 = 1260;

/// MySQL error code for "Too many tables; MySQL can only use 61 tables in a join".
pub const ERR_TOO_MANY_TABLES: u32 = 1116;

/// Errors surfaced by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("SQL error {code:?}: {message}")]
    Sql { code: Option<u32>, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Execution task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// Whether the statement joined more tables than the server allows.
    pub fn is_too_many_tables(&self) -> bool {
        match self {
            TransportError::Sql { code, message } => {
                *code == Some(ERR_TOO_MANY_TABLES) || mentions_table_limit(message)
            }
            TransportError::Sqlite(e) => mentions_table_limit(&e.to_string()),
            _ => false,
        }
    }
}

fn mentions_table_limit(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("too many tables") || message.contains("tables in a join")
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A warning raised by the server while running a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportWarning {
    pub code: u32,
    pub message: String,
}

impl TransportWarning {
    pub fn is_concat_truncation(&self) -> bool {
        self.code == WARN_CONCAT_TRUNCATED
    }
}

/// Rows returned by a query, every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub warnings: Vec<TransportWarning>,
}

impl QueryOutput {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_concat_truncation(&self) -> bool {
        self.warnings.iter().any(TransportWarning::is_concat_truncation)
    }
}

/// Executes SQL on behalf of the search engine.
#[async_trait]
pub trait SqlTransport: Send + Sync {
    /// Dialect the server speaks.
    fn dialect(&self) -> Dialect;

    /// Run a statement returning rows.
    async fn query(&self, sql: &str) -> TransportResult<QueryOutput>;

    /// Run a statement without a result set (session settings).
    async fn execute(&self, sql: &str) -> TransportResult<()>;
}
