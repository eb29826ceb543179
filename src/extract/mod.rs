//! Rendered-source extraction.
//!
//! The [`RenderedExtractor`] owns the bounded, best-effort part of scraping a
//! rendered search page: render through the shared [`BrowserSession`], let a
//! [`ListingStrategy`] map markup to records, collapse structural duplicates,
//! then cap the result.

use crate::browser::{BrowserSession, RenderOptions};
use crate::common::constants::DEFAULT_MAX_LISTINGS_PER_UNIT;
use crate::common::error::{IngestError, Result};
use crate::common::types::ActivityRecord;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{info, instrument};

/// Site-specific selectors and field mapping for one rendered source.
pub trait ListingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deterministic search URL for a work unit key.
    fn search_url(&self, unit_key: &str) -> Result<String>;

    /// Scan rendered markup for listings. Never fails; unknown markup yields nothing.
    fn extract_listings(&self, html: &str) -> Vec<ActivityRecord>;
}

pub struct RenderedExtractor {
    strategy: Arc<dyn ListingStrategy>,
    render: RenderOptions,
    max_per_unit: usize,
}

impl RenderedExtractor {
    pub fn new(strategy: Arc<dyn ListingStrategy>, render: RenderOptions) -> Self {
        Self {
            strategy,
            render,
            max_per_unit: DEFAULT_MAX_LISTINGS_PER_UNIT,
        }
    }

    pub fn with_max_per_unit(mut self, max_per_unit: usize) -> Self {
        self.max_per_unit = max_per_unit;
        self
    }

    pub fn max_per_unit(&self) -> usize {
        self.max_per_unit
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Extract at most `max_per_unit` distinct listings for one unit.
    ///
    /// Any render problem (timeout, crash, closed tab) is reported as
    /// `UnitExtractionFailed` for this unit only.
    #[instrument(skip(self, session), fields(strategy = self.strategy.name()))]
    pub async fn extract(
        &self,
        session: &mut dyn BrowserSession,
        unit_key: &str,
    ) -> Result<Vec<ActivityRecord>> {
        let url = self.strategy.search_url(unit_key)?;
        info!("Navigating to {}", url);

        let html = session
            .render(&url, &self.render)
            .await
            .map_err(|e| IngestError::unit_failed(unit_key, e.to_string()))?;

        let raw = self.strategy.extract_listings(&html);
        let scanned = raw.len();
        let listings = bound_listings(raw, self.max_per_unit);
        info!(
            "Extracted {} unique listings ({} candidates scanned)",
            listings.len(),
            scanned
        );
        Ok(listings)
    }
}

/// Drop exact duplicates (first occurrence wins), then keep the first `cap`.
pub fn bound_listings<T: Clone + Eq + Hash>(records: Vec<T>, cap: usize) -> Vec<T> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn activity(name: &str) -> ActivityRecord {
        ActivityRecord {
            name: name.to_string(),
            age_range: "All Ages".into(),
            meeting_time: "TBD".into(),
            kind: "Local Provider".into(),
        }
    }

    struct NumberedStrategy(usize);

    impl ListingStrategy for NumberedStrategy {
        fn name(&self) -> &'static str {
            "numbered"
        }
        fn search_url(&self, unit_key: &str) -> Result<String> {
            Ok(format!("https://listings.test/?location={unit_key}"))
        }
        fn extract_listings(&self, _html: &str) -> Vec<ActivityRecord> {
            (0..self.0).map(|i| activity(&format!("Listing {i}"))).collect()
        }
    }

    struct StaticSession {
        fail: bool,
    }

    #[async_trait]
    impl BrowserSession for StaticSession {
        async fn render(&mut self, url: &str, _options: &RenderOptions) -> Result<String> {
            if self.fail {
                Err(IngestError::Browser(format!("timed out loading {url}")))
            } else {
                Ok("<html></html>".into())
            }
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn quick_render() -> RenderOptions {
        RenderOptions {
            settle: crate::pipeline::pacing::Pacing::Immediate,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn duplicates_collapse_before_truncation() {
        let records = vec![
            activity("Chess Club"),
            activity("Chess Club"),
            activity("Lego League"),
            activity("Chess Club"),
            activity("Swim Team"),
        ];
        let bounded = bound_listings(records, 2);
        assert_eq!(bounded, vec![activity("Chess Club"), activity("Lego League")]);
    }

    #[test]
    fn same_name_different_time_is_kept() {
        let mut evening = activity("Chess Club");
        evening.meeting_time = "Evenings".into();
        let bounded = bound_listings(vec![activity("Chess Club"), evening.clone()], 15);
        assert_eq!(bounded.len(), 2);
    }

    #[tokio::test]
    async fn output_never_exceeds_cap() {
        for (candidates, cap) in [(0, 15), (7, 15), (40, 15), (40, 10)] {
            let extractor =
                RenderedExtractor::new(Arc::new(NumberedStrategy(candidates)), quick_render())
                    .with_max_per_unit(cap);
            assert_eq!(extractor.max_per_unit(), cap);
            assert_eq!(extractor.strategy_name(), "numbered");
            let mut session = StaticSession { fail: false };
            let out = extractor.extract(&mut session, "94110").await.unwrap();
            assert!(out.len() <= cap);
            assert_eq!(out.len(), candidates.min(cap));
        }
    }

    #[tokio::test]
    async fn render_failure_is_scoped_to_unit() {
        let extractor = RenderedExtractor::new(Arc::new(NumberedStrategy(3)), quick_render());
        let mut session = StaticSession { fail: true };
        let err = extractor.extract(&mut session, "94110").await.unwrap_err();
        match err {
            IngestError::UnitExtractionFailed { unit, .. } => assert_eq!(unit, "94110"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
