use super::{CatalogStore, Filter, Query, Row};
use crate::common::error::{IngestError, Result};
use crate::config::StoreConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, instrument};

/// Supabase / PostgREST backed store.
///
/// Writes ask for `return=representation` so callers get store-assigned ids
/// back. Upserts use `resolution=merge-duplicates` with `on_conflict`.
pub struct PostgrestStore {
    client: reqwest::Client,
    rest_url: String,
}

impl PostgrestStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|_| IngestError::Config("store key contains invalid characters".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| IngestError::Config("store key contains invalid characters".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    async fn write(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: Option<&str>,
    ) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.table_url(table));
        request = match conflict_key {
            Some(key) => request
                .query(&[("on_conflict", key)])
                .header("Prefer", "resolution=merge-duplicates,return=representation"),
            None => request.header("Prefer", "return=representation"),
        };

        let context = format!("{} rows", rows.len());
        let resp = request
            .json(rows)
            .send()
            .await
            .map_err(|e| write_failed(table, &context, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(write_failed(
                table,
                &context,
                format!("status {}: {}", status.as_u16(), body),
            ));
        }

        let written: Vec<Row> = resp
            .json()
            .await
            .map_err(|e| write_failed(table, &context, format!("unreadable response: {e}")))?;
        debug!("Wrote {} rows to {}", written.len(), table);
        Ok(written)
    }
}

fn write_failed(table: &str, context: &str, message: String) -> IngestError {
    IngestError::WriteFailed {
        table: table.to_string(),
        context: context.to_string(),
        message,
    }
}

/// Quote a value for use inside a PostgREST `in.(...)` list.
fn quote_list_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Translate a [`Query`] into PostgREST query-string pairs.
pub fn query_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let select = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    };
    pairs.push(("select".to_string(), select));

    for filter in &query.filters {
        let expr = match filter {
            Filter::Eq { value, .. } => format!("eq.{value}"),
            Filter::ILike { pattern, .. } => format!("ilike.*{pattern}*"),
            Filter::In { values, .. } => {
                let list = values
                    .iter()
                    .map(|v| quote_list_value(v))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("in.({list})")
            }
        };
        pairs.push((filter.column().to_string(), expr));
    }

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|c| format!("{c}.asc"))
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".to_string(), order));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        pairs.push(("offset".to_string(), offset.to_string()));
    }
    pairs
}

#[async_trait]
impl CatalogStore for PostgrestStore {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<Vec<Row>> {
        self.write(table, rows, Some(conflict_key)).await
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
        self.write(table, rows, None).await
    }

    #[instrument(skip(self, query))]
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let read_failed = |message: String| IngestError::ReadFailed {
            table: table.to_string(),
            message,
        };

        let resp = self
            .client
            .get(self.table_url(table))
            .query(&query_pairs(query))
            .send()
            .await
            .map_err(|e| read_failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(read_failed(format!("status {}: {}", status.as_u16(), body)));
        }

        resp.json()
            .await
            .map_err(|e| read_failed(format!("unreadable response: {e}")))
    }
}
