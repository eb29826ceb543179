use crate::apis::{DirectoryFilter, StructuredSource};
use crate::common::constants::{
    DEFAULT_MAX_PAGES, NCES_BASE_URL, NCES_DIRECTORY_YEAR, NCES_SOURCE, PUBLIC_SCHOOL_TYPE,
};
use crate::common::error::{IngestError, Result};
use crate::common::types::{School, SchoolRecord};
use crate::normalize::{generate_key, is_valid_key};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Client for the Common Core of Data school directory (Urban Institute API).
pub struct NcesDirectory {
    client: reqwest::Client,
    base_url: String,
    year: u16,
    max_pages: usize,
}

impl Default for NcesDirectory {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl NcesDirectory {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: NCES_BASE_URL.to_string(),
            year: NCES_DIRECTORY_YEAR,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = year;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn partition_url(&self, fips: &str, city: Option<&str>) -> Result<Url> {
        let raw = format!(
            "{}/schools/ccd/directory/{}/",
            self.base_url.trim_end_matches('/'),
            self.year
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| IngestError::Config(format!("Invalid directory URL '{raw}': {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("fips", fips);
            if let Some(city) = city {
                query.append_pair("city_location", &city.to_uppercase());
            }
        }
        Ok(url)
    }

    async fn get_envelope(&self, url: &str) -> Result<(Vec<SchoolRecord>, Option<String>)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::source_unavailable(NCES_SOURCE, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::source_unavailable(
                NCES_SOURCE,
                format!("{url} answered with status {}", status.as_u16()),
            ));
        }

        let body: Value = resp.json().await.map_err(|e| {
            IngestError::source_unavailable(NCES_SOURCE, format!("unreadable body from {url}: {e}"))
        })?;
        parse_envelope(body)
    }

    /// Fetch one partition, following `next` links up to `max_pages`.
    async fn fetch_partition(&self, first: Url) -> Result<Vec<SchoolRecord>> {
        let mut records = Vec::new();
        let mut next = Some(first.to_string());
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages >= self.max_pages {
                warn!(
                    "Stopping pagination after {} pages; remaining pages not fetched",
                    self.max_pages
                );
                break;
            }
            let (mut page, following) = self.get_envelope(&url).await?;
            pages += 1;
            debug!("Fetched {} rows from {}", page.len(), url);
            records.append(&mut page);
            next = following;
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl StructuredSource for NcesDirectory {
    fn source_name(&self) -> &'static str {
        NCES_SOURCE
    }

    #[instrument(skip(self), fields(fips = %filter.fips))]
    async fn fetch_page(&self, filter: &DirectoryFilter) -> Result<Vec<SchoolRecord>> {
        let partitions: Vec<Option<&str>> = if filter.cities.is_empty() {
            vec![None]
        } else {
            filter.cities.iter().map(|c| Some(c.as_str())).collect()
        };

        let mut all = Vec::new();
        for city in partitions {
            let url = self.partition_url(&filter.fips, city)?;
            info!("Fetching schools for {}", city.unwrap_or("whole region"));
            let mut rows = self.fetch_partition(url).await?;
            all.append(&mut rows);
        }

        info!("Fetched {} raw school rows", all.len());
        Ok(all)
    }
}

/// Validate the `{ "results": [...], "next": ... }` envelope.
fn parse_envelope(body: Value) -> Result<(Vec<SchoolRecord>, Option<String>)> {
    let results = match body.get("results") {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(IngestError::source_unavailable(
                NCES_SOURCE,
                "`results` is not an array",
            ))
        }
        None => {
            return Err(IngestError::source_unavailable(
                NCES_SOURCE,
                "response has no `results` field",
            ))
        }
    };

    let records: Vec<SchoolRecord> = serde_json::from_value(Value::Array(results))
        .map_err(|e| IngestError::source_unavailable(NCES_SOURCE, format!("bad row shape: {e}")))?;

    let next = body
        .get("next")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    Ok((records, next))
}

/// Map a directory row onto the catalog schema. Rows without a name are dropped.
pub fn normalize_school(record: &SchoolRecord) -> Option<School> {
    let name = record.school_name.as_deref()?.trim();
    if name.is_empty() {
        return None;
    }
    let city = record.city_location.as_deref().unwrap_or("");
    let state = record.state_location.as_deref().unwrap_or("");
    let slug = generate_key(name, city, state);
    if !is_valid_key(&slug) {
        return None;
    }

    Some(School {
        id: None,
        name: name.to_string(),
        slug,
        kind: PUBLIC_SCHOOL_TYPE.to_string(),
        address: record.street_location.clone(),
        city: record.city_location.clone(),
        state: record.state_location.clone(),
        zip_code: record.zip_location.clone(),
    })
}

pub fn normalize_schools(records: &[SchoolRecord]) -> Vec<School> {
    records.iter().filter_map(normalize_school).collect()
}
