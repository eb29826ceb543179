//! External listing sources.
//!
//! `nces` is the paged JSON school directory; `activity_hero` is the
//! script-rendered activity search page consumed through the extractor.

pub mod activity_hero;
pub mod nces;

use crate::common::error::Result;
use crate::common::types::SchoolRecord;

/// Partition filter for directory fetches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryFilter {
    /// Two-digit state FIPS code, e.g. "06" for California
    pub fips: String,
    /// One request is issued per city. Empty means one region-wide request.
    pub cities: Vec<String>,
}

impl DirectoryFilter {
    pub fn region(fips: impl Into<String>) -> Self {
        Self {
            fips: fips.into(),
            cities: Vec::new(),
        }
    }

    pub fn with_cities<I, S>(mut self, cities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cities = cities.into_iter().map(Into::into).collect();
        self
    }
}

/// A structured source of parent entities.
#[async_trait::async_trait]
pub trait StructuredSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Fetch every partition described by `filter` and concatenate the rows.
    /// Any unreachable partition or malformed envelope fails the whole call.
    async fn fetch_page(&self, filter: &DirectoryFilter) -> Result<Vec<SchoolRecord>>;
}
