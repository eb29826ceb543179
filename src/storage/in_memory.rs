use super::{cell_text, CatalogStore, Query, Row};
use crate::common::error::{IngestError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// In-memory store for development and testing.
///
/// Mirrors the store semantics the engine relies on: ids are assigned on
/// insert, upserts merge by key, and a batch that repeats a conflict key is
/// rejected as a whole.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    rejections: Mutex<Vec<(String, String, String)>>,
    max_rows: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every read at `max_rows`, like a PostgREST `max-rows` setting.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Make any write to `table` containing a row with `column == value` fail.
    pub async fn reject_rows_where(&self, table: &str, column: &str, value: &str) {
        self.rejections
            .lock()
            .await
            .push((table.to_string(), column.to_string(), value.to_string()));
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    async fn check_rejections(&self, table: &str, rows: &[Row]) -> Result<()> {
        let rejections = self.rejections.lock().await;
        for (t, column, value) in rejections.iter().filter(|(t, _, _)| t == table) {
            let hit = rows
                .iter()
                .any(|r| r.get(column).and_then(cell_text).as_deref() == Some(value.as_str()));
            if hit {
                return Err(IngestError::WriteFailed {
                    table: t.clone(),
                    context: format!("{} rows", rows.len()),
                    message: format!("rejected row with {column} = {value}"),
                });
            }
        }
        Ok(())
    }
}

fn with_id(row: &Row) -> Result<Row> {
    let mut row = row.clone();
    let obj = row.as_object_mut().ok_or_else(|| IngestError::WriteFailed {
        table: String::new(),
        context: "row shape".into(),
        message: "rows must be JSON objects".into(),
    })?;
    if obj.get("id").map_or(true, Value::is_null) {
        obj.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    Ok(row)
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<Vec<Row>> {
        self.check_rejections(table, rows).await?;

        let fail = |message: String| IngestError::WriteFailed {
            table: table.to_string(),
            context: format!("{} rows", rows.len()),
            message,
        };

        let mut batch_keys = HashSet::new();
        for row in rows {
            let key = row
                .get(conflict_key)
                .and_then(cell_text)
                .ok_or_else(|| fail(format!("row missing conflict key '{conflict_key}'")))?;
            if !batch_keys.insert(key.clone()) {
                return Err(fail(format!(
                    "ON CONFLICT cannot affect row a second time ({conflict_key} = {key})"
                )));
            }
        }

        let mut tables = self.tables.lock().await;
        let stored = tables.entry(table.to_string()).or_default();
        let mut written = Vec::with_capacity(rows.len());

        for row in rows {
            let key = row.get(conflict_key).and_then(cell_text);
            let existing = stored
                .iter_mut()
                .find(|r| r.get(conflict_key).and_then(cell_text) == key);

            match existing {
                Some(current) => {
                    if let (Some(target), Some(incoming)) = (current.as_object_mut(), row.as_object()) {
                        for (k, v) in incoming {
                            if k != "id" {
                                target.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    written.push(current.clone());
                }
                None => {
                    let row = with_id(row)?;
                    stored.push(row.clone());
                    written.push(row);
                }
            }
        }

        debug!("Upserted {} rows into {}", written.len(), table);
        Ok(written)
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
        self.check_rejections(table, rows).await?;

        let prepared = rows.iter().map(with_id).collect::<Result<Vec<_>>>()?;
        let mut tables = self.tables.lock().await;
        tables
            .entry(table.to_string())
            .or_default()
            .extend(prepared.iter().cloned());

        debug!("Inserted {} rows into {}", prepared.len(), table);
        Ok(prepared)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let tables = self.tables.lock().await;
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let offset = query.offset.unwrap_or(0);
        let limit = query
            .limit
            .unwrap_or(usize::MAX)
            .min(self.max_rows.unwrap_or(usize::MAX));

        let mut matched: Vec<&Row> = rows.iter().filter(|r| query.matches(r)).collect();
        if !query.order.is_empty() {
            matched.sort_by_cached_key(|r| query.sort_key(r));
        }

        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| query.project(r))
            .collect())
    }
}
