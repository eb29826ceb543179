//! Narrow persistent-store interface consumed by the ingestion engine.
//!
//! The engine only needs batch upsert-by-key, append-only batch insert and a
//! filtered read. [`PostgrestStore`] talks to the Supabase REST endpoint;
//! [`InMemoryStore`] backs tests and dry runs.

pub mod catalog;
pub mod in_memory;
pub mod postgrest;

pub use catalog::Catalog;
pub use in_memory::InMemoryStore;
pub use postgrest::PostgrestStore;

use crate::common::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A JSON object row.
pub type Row = Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: String },
    /// Case-insensitive substring match.
    ILike { column: String, pattern: String },
    In { column: String, values: Vec<String> },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::ILike { column, .. } | Filter::In { column, .. } => {
                column
            }
        }
    }

    /// Evaluate the filter against a row. Used by in-process stores.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(self.column()).and_then(cell_text) else {
            return false;
        };
        match self {
            Filter::Eq { value, .. } => &cell == value,
            Filter::ILike { pattern, .. } => cell.to_lowercase().contains(&pattern.to_lowercase()),
            Filter::In { values, .. } => values.iter().any(|v| v == &cell),
        }
    }
}

/// Render a scalar cell the way it would be compared in a query string.
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Projection, predicates, ordering and paging for [`CatalogStore::select`].
///
/// Paged reads must set `order`; without it the store may return rows in a
/// different order on every page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    /// Ascending sort columns, most significant first.
    pub order: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn ilike(mut self, column: &str, pattern: impl Into<String>) -> Self {
        self.filters.push(Filter::ILike {
            column: column.to_string(),
            pattern: pattern.into(),
        });
        self
    }

    pub fn in_list<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn order_by(mut self, columns: &[&str]) -> Self {
        self.order = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Sort key for in-process stores: the `order` columns rendered as text.
    pub fn sort_key(&self, row: &Row) -> Vec<Option<String>> {
        self.order
            .iter()
            .map(|column| row.get(column).and_then(cell_text))
            .collect()
    }

    /// Keep only the projected columns of a row.
    pub fn project(&self, row: &Row) -> Row {
        if self.columns.is_empty() {
            return row.clone();
        }
        let mut out = serde_json::Map::new();
        for column in &self.columns {
            if let Some(v) = row.get(column) {
                out.insert(column.clone(), v.clone());
            }
        }
        Value::Object(out)
    }
}

/// Persistent store collaborator.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert-or-update by `conflict_key`. The batch is atomic and must not
    /// contain two rows with the same key.
    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<Vec<Row>>;

    /// Append-only batch insert. Atomic per call.
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>>;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>>;
}
