use crate::browser::BrowserSession;
use crate::common::constants::{CLUBS_TABLE, DEFAULT_BATCH_SIZE, DEFAULT_PACING_MS};
use crate::common::error::{IngestError, Result};
use crate::common::types::{ActivityRecord, Club, School};
use crate::extract::RenderedExtractor;
use crate::metrics;
use crate::normalize::PillarRules;
use crate::pipeline::dedupe::dedupe;
use crate::pipeline::pacing::Pacing;
use crate::pipeline::resume::{group_into_units, pending_units, WorkUnit};
use crate::storage::Catalog;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Counters reported at the end of every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub parents_upserted: usize,
    pub units_total: usize,
    pub units_already_done: usize,
    pub units_deferred: usize,
    pub processed: usize,
    pub empty: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub rows_written: usize,
}

impl RunSummary {
    pub fn units_attempted(&self) -> usize {
        self.processed + self.empty + self.failed
    }
}

/// Output of the planning step: which units run now and how the rest split up.
#[derive(Debug, Clone, Default)]
pub struct UnitPlan {
    pub batch: Vec<WorkUnit>,
    pub units_total: usize,
    pub units_already_done: usize,
    pub units_deferred: usize,
}

impl UnitPlan {
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            units_total: self.units_total,
            units_already_done: self.units_already_done,
            units_deferred: self.units_deferred,
            ..RunSummary::default()
        }
    }
}

enum UnitOutcome {
    Processed { rows: usize },
    Empty,
}

/// Drives club ingestion over a list of parent schools: plan units with
/// resume, then extract, classify and write one unit at a time.
pub struct Orchestrator {
    catalog: Catalog,
    extractor: RenderedExtractor,
    classifier: PillarRules,
    pacing: Pacing,
    batch_size: usize,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(catalog: Catalog, extractor: RenderedExtractor, classifier: PillarRules) -> Self {
        Self {
            catalog,
            extractor,
            classifier,
            pacing: Pacing::Fixed {
                millis: DEFAULT_PACING_MS,
            },
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Group parents into units, drop units that already have clubs and cap
    /// the remainder to the batch size.
    #[instrument(skip(self, parents), fields(parents = parents.len()))]
    pub async fn plan(&self, parents: &[School]) -> Result<UnitPlan> {
        let units = group_into_units(parents);
        let candidate_ids: Vec<String> = units
            .iter()
            .flat_map(|u| u.parent_ids.iter().cloned())
            .collect();
        let completed = self.catalog.completed_school_ids(&candidate_ids).await?;

        let pending: HashSet<String> = pending_units(&units, &completed).into_iter().collect();
        let pending_count = pending.len();
        let batch: Vec<WorkUnit> = units
            .iter()
            .filter(|u| pending.contains(&u.key))
            .take(self.batch_size)
            .cloned()
            .collect();

        let plan = UnitPlan {
            units_total: units.len(),
            units_already_done: units.len() - pending_count,
            units_deferred: pending_count - batch.len(),
            batch,
        };
        info!(
            "📋 {} units total, {} already done, {} in this batch, {} deferred",
            plan.units_total,
            plan.units_already_done,
            plan.batch.len(),
            plan.units_deferred
        );
        Ok(plan)
    }

    /// Run every unit in `plan` through `session`, which is closed exactly
    /// once before returning, including when a unit panics.
    pub async fn execute(
        &self,
        plan: UnitPlan,
        mut session: Box<dyn BrowserSession>,
    ) -> Result<RunSummary> {
        let outcome = AssertUnwindSafe(self.run_units(&plan, session.as_mut()))
            .catch_unwind()
            .await;

        if let Err(e) = session.close().await {
            warn!("Browser session did not close cleanly: {}", e);
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                error!("Unit loop panicked; browser session released");
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn run_units(
        &self,
        plan: &UnitPlan,
        session: &mut dyn BrowserSession,
    ) -> Result<RunSummary> {
        let mut summary = plan.summary();
        let total = plan.batch.len();
        info!(
            "Extracting with {} (max {} per unit), classifying with {} rules",
            self.extractor.strategy_name(),
            self.extractor.max_per_unit(),
            self.classifier.name()
        );

        for (index, unit) in plan.batch.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = total - index;
                metrics::record_units_cancelled(summary.cancelled);
                warn!("Run cancelled; {} units left for the next run", summary.cancelled);
                break;
            }

            info!("🔎 [{}/{}] Unit {}", index + 1, total, unit.key);
            let started = Instant::now();
            let outcome = self.process_unit(session, unit).await;
            let seconds = started.elapsed().as_secs_f64();

            match outcome {
                Ok(UnitOutcome::Processed { rows }) => {
                    summary.processed += 1;
                    summary.rows_written += rows;
                    metrics::record_unit("processed", seconds);
                    metrics::record_rows_written(CLUBS_TABLE, rows);
                    info!("✅ Unit {}: wrote {} clubs", unit.key, rows);
                }
                Ok(UnitOutcome::Empty) => {
                    summary.empty += 1;
                    metrics::record_unit("empty", seconds);
                    info!("Unit {}: no listings found", unit.key);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.failed += 1;
                    metrics::record_unit("failed", seconds);
                    error!("❌ Unit {} failed: {}", unit.key, e);
                }
            }

            if index + 1 < total {
                tokio::select! {
                    _ = self.pacing.wait(index) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        info!(
            "🏁 Run finished: {} processed, {} empty, {} failed, {} cancelled, {} rows",
            summary.processed, summary.empty, summary.failed, summary.cancelled, summary.rows_written
        );
        Ok(summary)
    }

    #[instrument(skip(self, session, unit), fields(unit = %unit.key, parents = unit.parent_ids.len()))]
    async fn process_unit(
        &self,
        session: &mut dyn BrowserSession,
        unit: &WorkUnit,
    ) -> Result<UnitOutcome> {
        let activities = self.extractor.extract(session, &unit.key).await?;
        if activities.is_empty() {
            return Ok(UnitOutcome::Empty);
        }

        let clubs = build_clubs(&unit.parent_ids, &activities, &self.classifier);
        let row_count = clubs.len();
        let rows = self
            .catalog
            .insert_clubs(&clubs)
            .await
            .map_err(|e| match e {
                IngestError::WriteFailed { table, message, .. } => IngestError::WriteFailed {
                    table,
                    context: format!("unit {}, {} rows", unit.key, row_count),
                    message,
                },
                other => other,
            })?;
        Ok(UnitOutcome::Processed { rows })
    }
}

/// Cross every school in a unit with every activity found for it.
pub fn build_clubs(
    school_ids: &[String],
    activities: &[ActivityRecord],
    classifier: &PillarRules,
) -> Vec<Club> {
    let clubs: Vec<Club> = school_ids
        .iter()
        .flat_map(|school_id| {
            activities.iter().map(move |activity| Club {
                school_id: school_id.clone(),
                pillar: classifier.classify(&activity.name),
                name: activity.name.clone(),
                kind: activity.kind.clone(),
                age_range: activity.age_range.clone(),
                meeting_time: activity.meeting_time.clone(),
            })
        })
        .collect();

    dedupe(clubs, |c: &Club| {
        format!(
            "{}|{}|{}|{}",
            c.school_id, c.name, c.age_range, c.meeting_time
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Pillar;

    fn activity(name: &str) -> ActivityRecord {
        ActivityRecord {
            name: name.into(),
            age_range: "All Ages".into(),
            meeting_time: "Check provider for times".into(),
            kind: "Local Provider".into(),
        }
    }

    #[test]
    fn clubs_cover_every_school_and_activity() {
        let ids = vec!["s1".to_string(), "s2".to_string()];
        let activities = vec![activity("Robotics Club"), activity("Pottery Studio")];
        let clubs = build_clubs(&ids, &activities, &PillarRules::standard());

        assert_eq!(clubs.len(), 4);
        assert_eq!(clubs[0].school_id, "s1");
        assert_eq!(clubs[0].pillar, Pillar::Stem);
        assert_eq!(clubs[1].pillar, Pillar::Art);
        assert_eq!(clubs[3].school_id, "s2");
    }

    #[test]
    fn compact_rules_drive_classification() {
        let ids = vec!["s1".to_string()];
        let activities = vec![activity("Robotics Club")];
        let rules = PillarRules::compact();
        assert_eq!(rules.name(), "compact");
        assert_eq!(PillarRules::standard().name(), "standard");

        // "robotics" is only a keyword in the standard set
        let clubs = build_clubs(&ids, &activities, &rules);
        assert_eq!(clubs[0].pillar, Pillar::Other);
    }

    #[test]
    fn plan_summary_carries_counts() {
        let plan = UnitPlan {
            batch: vec![WorkUnit::new("94110", vec!["a".into()])],
            units_total: 4,
            units_already_done: 2,
            units_deferred: 1,
        };
        let summary = plan.summary();
        assert_eq!(summary.units_total, 4);
        assert_eq!(summary.units_already_done, 2);
        assert_eq!(summary.units_deferred, 1);
        assert_eq!(summary.units_attempted(), 0);
    }
}
