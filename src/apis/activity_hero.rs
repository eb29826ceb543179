use crate::common::constants::{
    ACTIVITY_HERO_SEARCH_URL, ACTIVITY_HERO_SOURCE, DEFAULT_AGE_RANGE, DEFAULT_MEETING_TIME,
    LISTING_FIELD_MAX_CHARS, LOCAL_PROVIDER_KIND, MIN_TITLE_CHARS,
};
use crate::common::error::{IngestError, Result};
use crate::common::types::ActivityRecord;
use crate::extract::ListingStrategy;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[class*="activity"], div[class*="Card"], li"#).expect("card selector")
});
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"h2, h3, h4, [class*="title"], [class*="Name"]"#).expect("title selector")
});
static AGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="age"], [class*="Age"]"#).expect("age selector"));
static TIME_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[class*="date"], [class*="time"], [class*="Schedule"]"#)
        .expect("time selector")
});

/// Listing strategy for the ActivityHero location search page.
///
/// The site exposes no API and no stable markup, so cards are found through
/// class-name hints and generic list items. Anything that does not yield a
/// title of at least four characters is treated as decoration.
#[derive(Debug, Clone)]
pub struct ActivityHeroStrategy {
    search_url: String,
}

impl Default for ActivityHeroStrategy {
    fn default() -> Self {
        Self::new(ACTIVITY_HERO_SEARCH_URL)
    }
}

impl ActivityHeroStrategy {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    fn parse_card(&self, card: &ElementRef) -> Option<ActivityRecord> {
        let title = card.select(&TITLE_SELECTOR).next().map(element_text)?;
        if title.chars().count() < MIN_TITLE_CHARS {
            return None;
        }

        let age_range = card
            .select(&AGE_SELECTOR)
            .next()
            .map(|el| clip(&element_text(el)))
            .unwrap_or_else(|| DEFAULT_AGE_RANGE.to_string());
        let meeting_time = card
            .select(&TIME_SELECTOR)
            .next()
            .map(|el| clip(&element_text(el)))
            .unwrap_or_else(|| DEFAULT_MEETING_TIME.to_string());

        Some(ActivityRecord {
            name: title,
            age_range,
            meeting_time,
            kind: LOCAL_PROVIDER_KIND.to_string(),
        })
    }
}

impl ListingStrategy for ActivityHeroStrategy {
    fn name(&self) -> &'static str {
        ACTIVITY_HERO_SOURCE
    }

    fn search_url(&self, unit_key: &str) -> Result<String> {
        let mut url = Url::parse(&self.search_url).map_err(|e| {
            IngestError::Config(format!("Invalid search URL '{}': {e}", self.search_url))
        })?;
        url.query_pairs_mut().append_pair("location", unit_key);
        Ok(url.into())
    }

    fn extract_listings(&self, html: &str) -> Vec<ActivityRecord> {
        let document = Html::parse_document(html);
        let listings: Vec<ActivityRecord> = document
            .select(&CARD_SELECTOR)
            .filter_map(|card| self.parse_card(&card))
            .collect();
        debug!("Found {} candidate listings", listings.len());
        listings
    }
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn clip(text: &str) -> String {
    text.chars().take(LISTING_FIELD_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="ActivityCard">
            <h3>Junior Robotics Lab</h3>
            <span class="ageRange">Ages 8-12</span>
            <span class="Schedule">Saturdays 10am</span>
          </div>
          <div class="activity-tile">
            <div class="provider-title">Pottery for Kids</div>
          </div>
          <ul>
            <li><span class="icon">★</span></li>
            <li><h4>Art</h4></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn search_url_carries_location() {
        let strategy = ActivityHeroStrategy::default();
        assert_eq!(
            strategy.search_url("94110").unwrap(),
            "https://www.activityhero.com/search?location=94110"
        );
    }

    #[test]
    fn cards_yield_titles_and_defaults() {
        let listings = ActivityHeroStrategy::default().extract_listings(PAGE);

        let robotics = listings
            .iter()
            .find(|l| l.name == "Junior Robotics Lab")
            .expect("robotics card");
        assert_eq!(robotics.age_range, "Ages 8-12");
        assert_eq!(robotics.meeting_time, "Saturdays 10am");
        assert_eq!(robotics.kind, "Local Provider");

        let pottery = listings
            .iter()
            .find(|l| l.name == "Pottery for Kids")
            .expect("pottery card");
        assert_eq!(pottery.age_range, "All Ages");
        assert_eq!(pottery.meeting_time, "Check provider for times");
    }

    #[test]
    fn short_titles_are_discarded() {
        let listings = ActivityHeroStrategy::default().extract_listings(PAGE);
        assert!(listings.iter().all(|l| l.name != "Art"));
        assert!(listings.iter().all(|l| l.name.chars().count() >= 4));
    }

    #[test]
    fn metadata_is_clipped_to_forty_chars() {
        let html = format!(
            r#"<div class="activityCard"><h2>Chess Club</h2><p class="age">{}</p></div>"#,
            "x".repeat(90)
        );
        let listings = ActivityHeroStrategy::default().extract_listings(&html);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].age_range.chars().count(), 40);
    }
}
