use async_trait::async_trait;
use serde_json::Value;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Remote tables the board reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Table {
    Tasks,
    Subtasks,
    Comments,
    Profiles,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum GatewayOp {
    Select,
    Insert,
    Update,
    Delete,
}

/// Equality filter applied to a select, e.g. `task_id = <id>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<String>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(self.column)
            .and_then(Value::as_str)
            .is_some_and(|value| value == self.value)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid remote url: {0}")]
    Url(#[from] url::ParseError),
    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
    #[error("{table} row {id} not found")]
    NotFound { table: Table, id: String },
    #[error("remote returned no row for {0} insert")]
    EmptyResult(Table),
    #[error("{op} on {table} was rejected")]
    Rejected { table: Table, op: GatewayOp },
}

/// Request/response access to the hosted table store.
///
/// Rows travel as JSON objects with snake_case keys. Every call is independent:
/// there are no transactions and no retries, a failed call simply returns an
/// error and leaves remote state untouched.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns all rows of `table` (optionally filtered), oldest first.
    async fn select(&self, table: Table, filter: Option<&Filter>)
    -> Result<Vec<Value>, GatewayError>;

    /// Inserts one row. The row may carry its own `id`; otherwise the remote
    /// assigns one. Returns the stored row.
    async fn insert(&self, table: Table, row: Value) -> Result<Value, GatewayError>;

    /// Applies a partial field set to the row with the given id.
    async fn update(&self, table: Table, id: &str, fields: Value) -> Result<(), GatewayError>;

    async fn delete(&self, table: Table, id: &str) -> Result<(), GatewayError>;
}
