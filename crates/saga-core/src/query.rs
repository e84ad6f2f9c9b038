//!
//! # Query-executor port
//!
//! The engine does not own persistence. Callers lend a query-execution
//! capability to each saga; action modules use it to insert identifier
//! and link rows.
//!

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named statement parameters, passed as a JSON object.
pub type QueryParameters = serde_json::Value;

/// Rows returned from a statement, each as a JSON object.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub rows: Vec<serde_json::Value>,
}

impl RowSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<serde_json::Value>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First row, if any.
    pub fn row(&self) -> Option<&serde_json::Value> {
        self.rows.first()
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("query {metric_name} failed: {message}")]
pub struct QueryError {
    pub metric_name: String,
    pub message: String,
}

impl QueryError {
    pub fn new(metric_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            message: message.into(),
        }
    }
}

/// Persistence capability owned by the caller and borrowed by one saga
/// at a time for its whole duration.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        statement: &str,
        parameters: QueryParameters,
        metric_name: &str,
    ) -> Result<RowSet, QueryError>;
}
