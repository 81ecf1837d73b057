//! In-memory executor for exercising templated queries without a database.

use crate::executor::{SqlError, SqlExecutor};
use may_postgres::types::ToSql;
use std::cell::RefCell;

/// A query the [`RecordingExecutor`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub sql: String,
    pub param_count: usize,
}

/// Records every query and answers with canned rows.
///
/// Rows are plain strings. `failing` makes every call return
/// `SqlError::QueryError`.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    rows: Vec<String>,
    count: i64,
    failure: Option<String>,
    recorded: RefCell<Vec<RecordedQuery>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<String>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Everything received so far, oldest first.
    pub fn recorded(&self) -> Vec<RecordedQuery> {
        self.recorded.borrow().clone()
    }

    fn record(&self, query: &str, params: &[&dyn ToSql]) -> Result<(), SqlError> {
        self.recorded.borrow_mut().push(RecordedQuery {
            sql: query.to_string(),
            param_count: params.len(),
        });
        match &self.failure {
            Some(message) => Err(SqlError::QueryError(message.clone())),
            None => Ok(()),
        }
    }
}

impl SqlExecutor for RecordingExecutor {
    type Row = String;

    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, SqlError> {
        self.record(query, params)?;
        Ok(self.rows.len() as u64)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<String, SqlError> {
        self.record(query, params)?;
        match self.rows.as_slice() {
            [row] => Ok(row.clone()),
            rows => Err(SqlError::QueryError(format!(
                "expected one row, found {}",
                rows.len()
            ))),
        }
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<String>, SqlError> {
        self.record(query, params)?;
        Ok(self.rows.clone())
    }

    fn query_count(&self, query: &str, params: &[&dyn ToSql]) -> Result<i64, SqlError> {
        self.record(query, params)?;
        Ok(self.count)
    }
}
