//! Data-side collaborator seams: query execution, schema inspection, fuzzy
//! value lookup, and document retrieval.
//!
//! The orchestrator never owns a database or vector store; it drives these
//! traits. Tests script them with canned rows and passages.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::QueryKind;

/// One result row as ordered `(column, value)` pairs. Order is preserved so
/// formatted output reads the way the query projected it.
pub type Row = Vec<(String, String)>;

/// A column in a table's catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// A fuzzy value match ranked by similarity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    /// Column the value was found in.
    pub column: String,
    /// The stored value that matched.
    pub value: String,
    /// Similarity score, higher is closer.
    pub score: f64,
}

/// Retrieved document content relevant to a question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// The passage text itself.
    pub text: String,
}

/// Errors from the data-side collaborators.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query execution failed: {message}")]
    #[diagnostic(
        code(colloquy::tools::execution),
        help("The generated query did not run; the failure is surfaced to the user verbatim.")
    )]
    Execution { message: String },

    #[error("unknown table `{table}`")]
    #[diagnostic(code(colloquy::tools::unknown_table))]
    UnknownTable { table: String },

    #[error("unknown document `{document}`")]
    #[diagnostic(code(colloquy::tools::unknown_document))]
    UnknownDocument { document: String },

    #[error("retrieval backend error: {message}")]
    #[diagnostic(code(colloquy::tools::backend))]
    Backend { message: String },
}

impl QueryError {
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        QueryError::Execution {
            message: message.into(),
        }
    }
}

/// Executes model-generated queries against the active table and answers
/// schema/value questions about it.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `query` against `table`. Retrieval queries return rows;
    /// manipulation queries return an empty row set on success.
    async fn execute(
        &self,
        table: &str,
        query: &str,
        kind: QueryKind,
    ) -> Result<Vec<Row>, QueryError>;

    /// Column names and types for `table`.
    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnInfo>, QueryError>;

    /// Fuzzy-matches `terms` against stored values in `table`, ranked by
    /// similarity.
    async fn fuzzy_search(&self, table: &str, terms: &str) -> Result<Vec<RankedMatch>, QueryError>;
}

/// Retrieves question-relevant passages from the active document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn retrieve(&self, document: &str, question: &str) -> Result<Passage, QueryError>;
}

/// Internal bookkeeping columns that never belong in user-facing output.
const HIDDEN_COLUMNS: [&str; 1] = ["ctid"];

/// Formats result rows for display: `column: value` pairs joined with HTML
/// line breaks, rows separated by a blank line, bookkeeping columns skipped.
#[must_use]
pub fn format_rows(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .filter(|(column, _)| !HIDDEN_COLUMNS.contains(&column.as_str()))
                .map(|(column, value)| format!("{column}: {value}<br/>"))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("<br/>")
}
