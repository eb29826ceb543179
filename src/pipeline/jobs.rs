//! Concrete ingestion pathways, one per CLI subcommand.

use crate::apis::nces::normalize_schools;
use crate::apis::{DirectoryFilter, StructuredSource};
use crate::browser::SessionFactory;
use crate::common::constants::{CLUBS_TABLE, SCHOOLS_TABLE};
use crate::common::error::{IngestError, Result};
use crate::common::types::{Club, Pillar, School};
use crate::metrics;
use crate::pipeline::orchestrator::{Orchestrator, RunSummary};
use crate::storage::{Catalog, Query};
use tracing::{info, instrument};

/// Which stored schools a club run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchoolSelection {
    State(String),
    Cities(Vec<String>),
}

impl SchoolSelection {
    fn query(&self) -> Query {
        let query = Query::new().columns(&["id", "name", "slug", "type", "city", "state", "zip_code"]);
        match self {
            SchoolSelection::State(state) => query.eq("state", state.clone()),
            SchoolSelection::Cities(cities) => {
                query.in_list("city", cities.iter().flat_map(|c| city_spellings(c)))
            }
        }
    }
}

/// The directory stores city names as it returns them, usually upper-case.
/// Match the name as typed plus its upper-case and title-case forms.
fn city_spellings(city: &str) -> Vec<String> {
    let typed = city.trim().to_string();
    let title = typed
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");
    let mut spellings = vec![typed.clone()];
    for variant in [typed.to_uppercase(), title] {
        if !spellings.contains(&variant) {
            spellings.push(variant);
        }
    }
    spellings
}

/// Fetch schools from the directory, normalize, dedupe by slug and upsert.
#[instrument(skip(catalog, source), fields(source = source.source_name()))]
pub async fn refresh_schools(
    catalog: &Catalog,
    source: &dyn StructuredSource,
    filter: &DirectoryFilter,
) -> Result<Vec<School>> {
    metrics::record_run("schools");
    let raw = source.fetch_page(filter).await?;
    let schools = normalize_schools(&raw);
    info!(
        "🏫 Normalized {} of {} directory rows",
        schools.len(),
        raw.len()
    );

    let stored = catalog.upsert_schools(schools).await?;
    metrics::record_rows_written(SCHOOLS_TABLE, stored.len());
    info!("💾 Upserted {} schools", stored.len());
    Ok(stored)
}

/// Run club ingestion over already-stored parents. The browser is only
/// launched when at least one unit is pending.
pub async fn ingest_for_parents(
    orchestrator: &Orchestrator,
    parents: &[School],
    sessions: &dyn SessionFactory,
) -> Result<RunSummary> {
    let plan = orchestrator.plan(parents).await?;
    if plan.is_empty() {
        info!("Nothing to do: every unit already has clubs");
        return Ok(plan.summary());
    }
    let session = sessions.open().await?;
    orchestrator.execute(plan, session).await
}

/// Club ingestion for schools already in the catalog.
#[instrument(skip(catalog, orchestrator, sessions))]
pub async fn ingest_clubs(
    catalog: &Catalog,
    orchestrator: &Orchestrator,
    selection: &SchoolSelection,
    sessions: &dyn SessionFactory,
) -> Result<RunSummary> {
    metrics::record_run("clubs");
    let parents = catalog.select_schools(&selection.query()).await?;
    info!("Selected {} schools", parents.len());
    ingest_for_parents(orchestrator, &parents, sessions).await
}

/// Refresh schools for a region, then ingest clubs over the fresh rows.
#[instrument(skip(catalog, source, orchestrator, sessions))]
pub async fn regional(
    catalog: &Catalog,
    source: &dyn StructuredSource,
    filter: &DirectoryFilter,
    orchestrator: &Orchestrator,
    sessions: &dyn SessionFactory,
) -> Result<RunSummary> {
    metrics::record_run("regional");
    let parents = refresh_schools(catalog, source, filter).await?;
    let mut summary = ingest_for_parents(orchestrator, &parents, sessions).await?;
    summary.parents_upserted = parents.len();
    Ok(summary)
}

pub fn demo_school() -> School {
    School {
        id: None,
        name: "Lincoln High School".into(),
        slug: "lincoln-high-school".into(),
        kind: "Public".into(),
        address: Some("123 Education Way".into()),
        city: Some("Springfield".into()),
        state: Some("IL".into()),
        zip_code: Some("62701".into()),
    }
}

pub fn demo_clubs(school_id: &str) -> Vec<Club> {
    let rows: [(Pillar, &str, &str, &str, &str); 10] = [
        (Pillar::Stem, "Robotics & Coding", "Public", "10-14", "Tue 4 PM"),
        (Pillar::Stem, "Math Olympiad", "Public", "12-16", "Thu 3:30 PM"),
        (Pillar::Stem, "Science Fair Prep", "Public", "11-15", "Wed 4:30 PM"),
        (Pillar::Art, "Painting Studio", "Homeschool", "8-12", "Wed 10 AM"),
        (Pillar::Art, "Digital Design", "Public", "13-18", "Mon 4 PM"),
        (Pillar::Art, "Pottery & Clay", "Public", "10-14", "Fri 3:30 PM"),
        (Pillar::Drama, "Shakespeare Troupe", "Public", "14-18", "Fri 5 PM"),
        (Pillar::Drama, "Improv Comedy", "Public", "11-15", "Tue 3:30 PM"),
        (Pillar::Sport, "Outdoor Explorers", "Homeschool", "6-10", "Thu 10 AM"),
        (Pillar::Sport, "Varsity Track Prep", "Public", "14-18", "Mon-Wed 4 PM"),
    ];
    rows.iter()
        .map(|(pillar, name, kind, age, time)| Club {
            school_id: school_id.to_string(),
            pillar: *pillar,
            name: name.to_string(),
            kind: kind.to_string(),
            age_range: age.to_string(),
            meeting_time: time.to_string(),
        })
        .collect()
}

/// Upsert the demo school and give it demo clubs if it has none yet.
#[instrument(skip(catalog))]
pub async fn seed(catalog: &Catalog) -> Result<RunSummary> {
    metrics::record_run("seed");
    info!("🌱 Seeding demo data");
    let stored = catalog.upsert_schools(vec![demo_school()]).await?;
    let school_id = stored
        .first()
        .and_then(|s| s.id.clone())
        .ok_or_else(|| IngestError::WriteFailed {
            table: SCHOOLS_TABLE.to_string(),
            context: "seed".into(),
            message: "store returned no id for the demo school".into(),
        })?;

    let mut summary = RunSummary {
        parents_upserted: stored.len(),
        ..RunSummary::default()
    };
    if catalog.has_clubs(&school_id).await? {
        info!("Demo school {} already has clubs; leaving them alone", school_id);
        return Ok(summary);
    }

    summary.rows_written = catalog.insert_clubs(&demo_clubs(&school_id)).await?;
    metrics::record_rows_written(CLUBS_TABLE, summary.rows_written);
    info!("✨ Seeded {} clubs for school {}", summary.rows_written, school_id);
    Ok(summary)
}
