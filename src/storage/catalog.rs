use super::{cell_text, CatalogStore, Query, Row};
use crate::common::constants::{CLUBS_TABLE, SCHOOLS_TABLE, SCHOOL_CONFLICT_KEY};
use crate::common::error::{IngestError, Result};
use crate::common::types::{Club, School};
use crate::pipeline::dedupe::dedupe;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Parent ids per `in.(...)` filter. 100 quoted UUIDs encode to about 4.5 KB
/// of query string, under the 8 KB request-line limit of common proxies.
const ID_CHUNK: usize = 100;
/// Rows requested per page. The server may return fewer (`max-rows`), so
/// paged reads continue until a page comes back empty.
const READ_PAGE: usize = 1000;

/// Typed catalog operations on top of a [`CatalogStore`].
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Upsert schools on `slug`, returning the stored rows with ids.
    ///
    /// The batch is deduplicated by slug first; the store rejects a batch that
    /// would touch the same key twice.
    pub async fn upsert_schools(&self, schools: Vec<School>) -> Result<Vec<School>> {
        let before = schools.len();
        let unique = dedupe(schools, |s: &School| s.slug.clone());
        if unique.len() < before {
            info!("Collapsed {} duplicate schools before upsert", before - unique.len());
        }
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let rows = to_rows(SCHOOLS_TABLE, &unique)?;
        let written = self
            .store
            .upsert(SCHOOLS_TABLE, &rows, SCHOOL_CONFLICT_KEY)
            .await?;
        from_rows(SCHOOLS_TABLE, written)
    }

    pub async fn select_schools(&self, query: &Query) -> Result<Vec<School>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let mut page_query = query.clone();
            if page_query.order.is_empty() {
                page_query = page_query.order_by(&["id"]);
            }
            page_query.offset = Some(offset);
            page_query.limit = Some(READ_PAGE);
            let rows = self.store.select(SCHOOLS_TABLE, &page_query).await?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len();
            all.extend(from_rows::<School>(SCHOOLS_TABLE, rows)?);
        }
        debug!("Selected {} schools", all.len());
        Ok(all)
    }

    /// Append clubs in a single batch write. Returns the number of rows written.
    pub async fn insert_clubs(&self, clubs: &[Club]) -> Result<usize> {
        if clubs.is_empty() {
            return Ok(0);
        }
        let rows = to_rows(CLUBS_TABLE, clubs)?;
        let written = self.store.insert(CLUBS_TABLE, &rows).await?;
        Ok(written.len())
    }

    /// Which of `school_ids` already have at least one club.
    pub async fn completed_school_ids(&self, school_ids: &[String]) -> Result<HashSet<String>> {
        let mut completed = HashSet::new();
        for chunk in school_ids.chunks(ID_CHUNK) {
            let mut offset = 0;
            loop {
                let query = Query::new()
                    .columns(&["school_id"])
                    .in_list("school_id", chunk.iter().cloned())
                    .order_by(&["school_id", "id"])
                    .page(offset, READ_PAGE);
                let rows = self.store.select(CLUBS_TABLE, &query).await?;
                if rows.is_empty() {
                    break;
                }
                offset += rows.len();
                completed.extend(
                    rows.iter()
                        .filter_map(|r| r.get("school_id").and_then(cell_text)),
                );
            }
        }
        debug!(
            "{} of {} candidate schools already have clubs",
            completed.len(),
            school_ids.len()
        );
        Ok(completed)
    }

    pub async fn has_clubs(&self, school_id: &str) -> Result<bool> {
        let query = Query::new()
            .columns(&["school_id"])
            .eq("school_id", school_id)
            .page(0, 1);
        Ok(!self.store.select(CLUBS_TABLE, &query).await?.is_empty())
    }
}

fn to_rows<T: Serialize>(table: &str, items: &[T]) -> Result<Vec<Row>> {
    items
        .iter()
        .map(|item| {
            serde_json::to_value(item).map_err(|e| IngestError::WriteFailed {
                table: table.to_string(),
                context: "serialize".into(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn from_rows<T: DeserializeOwned>(table: &str, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| IngestError::ReadFailed {
                table: table.to_string(),
                message: format!("unexpected row shape: {e}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Pillar;
    use crate::storage::{Filter, InMemoryStore};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records every query before delegating to an in-memory store.
    struct RecordingStore {
        inner: InMemoryStore,
        queries: Mutex<Vec<Query>>,
    }

    #[async_trait]
    impl CatalogStore for RecordingStore {
        async fn upsert(&self, table: &str, rows: &[Row], key: &str) -> Result<Vec<Row>> {
            self.inner.upsert(table, rows, key).await
        }

        async fn insert(&self, table: &str, rows: &[Row]) -> Result<Vec<Row>> {
            self.inner.insert(table, rows).await
        }

        async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
            self.queries.lock().await.push(query.clone());
            self.inner.select(table, query).await
        }
    }

    fn school(name: &str, slug: &str, zip: &str) -> School {
        School {
            id: None,
            name: name.into(),
            slug: slug.into(),
            kind: "Public".into(),
            address: None,
            city: Some("Oakland".into()),
            state: Some("CA".into()),
            zip_code: Some(zip.into()),
        }
    }

    fn club(school_id: &str, name: &str) -> Club {
        Club {
            school_id: school_id.into(),
            pillar: Pillar::Stem,
            name: name.into(),
            kind: "Local Provider".into(),
            age_range: "All Ages".into(),
            meeting_time: "Check provider for times".into(),
        }
    }

    #[tokio::test]
    async fn upsert_collapses_duplicate_slugs_and_returns_ids() {
        let catalog = Catalog::new(Arc::new(InMemoryStore::new()));
        let stored = catalog
            .upsert_schools(vec![
                school("Oak High", "oak-high-oakland-ca", "94601"),
                school("Oak High", "oak-high-oakland-ca", "94601"),
                school("Elm Middle", "elm-middle-oakland-ca", "94602"),
            ])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|s| s.id.is_some()));
    }

    #[tokio::test]
    async fn completed_ids_only_report_schools_with_clubs() {
        let catalog = Catalog::new(Arc::new(InMemoryStore::new()));
        catalog
            .insert_clubs(&[club("s1", "Chess Club"), club("s1", "Lego League"), club("s3", "Swim")])
            .await
            .unwrap();

        let ids: Vec<String> = ["s1", "s2"].iter().map(|s| s.to_string()).collect();
        let done = catalog.completed_school_ids(&ids).await.unwrap();
        assert_eq!(done, HashSet::from(["s1".to_string()]));
        assert!(catalog.has_clubs("s3").await.unwrap());
        assert!(!catalog.has_clubs("s2").await.unwrap());
    }

    #[tokio::test]
    async fn select_schools_applies_filters() {
        let catalog = Catalog::new(Arc::new(InMemoryStore::new()));
        let mut elsewhere = school("Pine High", "pine-high-reno-nv", "89501");
        elsewhere.state = Some("NV".into());
        catalog
            .upsert_schools(vec![school("Oak High", "oak-high-oakland-ca", "94601"), elsewhere])
            .await
            .unwrap();

        let ca = catalog
            .select_schools(&Query::new().eq("state", "CA"))
            .await
            .unwrap();
        assert_eq!(ca.len(), 1);
        assert_eq!(ca[0].name, "Oak High");
    }

    #[tokio::test]
    async fn completion_reads_survive_a_server_row_cap() {
        let catalog = Catalog::new(Arc::new(InMemoryStore::new().with_max_rows(2)));
        let ids: Vec<String> = (0..5).map(|i| format!("s{i}")).collect();
        let clubs: Vec<Club> = ids
            .iter()
            .flat_map(|id| [club(id, "Chess Club"), club(id, "Lego League")])
            .collect();
        catalog.insert_clubs(&clubs).await.unwrap();

        let done = catalog.completed_school_ids(&ids).await.unwrap();
        assert_eq!(done, ids.iter().cloned().collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn school_reads_survive_a_server_row_cap() {
        let catalog = Catalog::new(Arc::new(InMemoryStore::new().with_max_rows(2)));
        let schools: Vec<School> = (0..5)
            .map(|i| school(&format!("School {i}"), &format!("school-{i}"), "94601"))
            .collect();
        catalog.upsert_schools(schools).await.unwrap();

        let all = catalog.select_schools(&Query::new().eq("state", "CA")).await.unwrap();
        let slugs: HashSet<_> = all.iter().map(|s| s.slug.clone()).collect();
        assert_eq!(slugs.len(), 5);
    }

    #[tokio::test]
    async fn completion_reads_are_ordered_and_chunked() {
        let store = Arc::new(RecordingStore {
            inner: InMemoryStore::new(),
            queries: Mutex::new(Vec::new()),
        });
        let catalog = Catalog::new(store.clone());
        let ids: Vec<String> = (0..250).map(|i| format!("{i:08}-0000-4000-8000-000000000000")).collect();

        catalog.completed_school_ids(&ids).await.unwrap();

        let queries = store.queries.lock().await;
        let sizes: Vec<usize> = queries
            .iter()
            .flat_map(|q| q.filters.iter())
            .filter_map(|f| match f {
                Filter::In { values, .. } => Some(values.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert!(queries.iter().all(|q| q.order == vec!["school_id", "id"]));
    }
}
