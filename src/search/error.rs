//! Search error types.
//!
//! Plan-time problems ([`PlanError`]) never abort a search: the offending
//! criterion or column is dropped and the error is kept as a warning.
//! [`SearchError`] ends a search; the driver turns it into a [`Diagnostic`]
//! attached to an empty result.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, Comparator, DataType, FieldId};
use crate::transport::TransportError;

/// Malformed join chain in the catalog.
#[derive(Debug, thiserror::Error)]
pub enum JoinPathError {
    #[error("invalid identifier {0:?} in join path")]
    InvalidIdentifier(String),

    #[error("hop to {table} needs an explicit itemtype")]
    MissingItemtype { table: String },

    #[error("many-to-many hop to {table} needs a pivot table")]
    MissingPivot { table: String },

    #[error("join path ends at {found} but the field lives in {expected}")]
    TableMismatch { expected: String, found: String },

    #[error("failed to hash join key: {0}")]
    Hash(#[from] serde_json::Error),
}

/// Recoverable problem found while compiling a search.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("unknown field {field} for {itemtype}")]
    CatalogLookup { itemtype: String, field: String },

    #[error("join path of {itemtype} field {field}: {source}")]
    JoinPath {
        itemtype: String,
        field: FieldId,
        #[source]
        source: JoinPathError,
    },

    #[error("{comparator} is not allowed on {itemtype} field {field}")]
    UnsupportedComparator {
        itemtype: String,
        field: FieldId,
        comparator: Comparator,
    },

    #[error("invalid value {value:?} for {itemtype} field {field} ({datatype:?})")]
    InvalidValue {
        itemtype: String,
        field: FieldId,
        datatype: DataType,
        value: String,
    },
}

impl PlanError {
    pub(crate) fn lookup(itemtype: &str, field: impl ToString) -> Self {
        PlanError::CatalogLookup {
            itemtype: itemtype.to_string(),
            field: field.to_string(),
        }
    }
}

/// Error that ends a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("query execution failed: {0}")]
    Transport(#[from] TransportError),

    #[error("grouped values exceed the concatenation limit of {limit} bytes")]
    EncodingOverflow { limit: u64 },

    #[error("malformed result set: {0}")]
    Decode(String),
}

/// Kind of failure reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    CatalogLookup,
    QueryExecution,
    EncodingOverflow,
    Decode,
}

/// Structured error descriptor attached to a failed search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&SearchError> for Diagnostic {
    fn from(err: &SearchError) -> Self {
        let (kind, hint) = match err {
            SearchError::Catalog(_) => (DiagnosticKind::CatalogLookup, None),
            SearchError::Transport(e) if e.is_too_many_tables() => (
                DiagnosticKind::QueryExecution,
                Some(
                    "The search joins too many tables. Narrow an \"all fields\" criterion \
                     to a specific field."
                        .to_string(),
                ),
            ),
            SearchError::Transport(_) => (DiagnosticKind::QueryExecution, None),
            SearchError::EncodingOverflow { .. } => (
                DiagnosticKind::EncodingOverflow,
                Some("Display fewer multi-valued columns or narrow the search.".to_string()),
            ),
            SearchError::Decode(_) => (DiagnosticKind::Decode, None),
        };
        Diagnostic {
            kind,
            message: err.to_string(),
            hint,
        }
    }
}
