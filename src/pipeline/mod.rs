//! The ingestion engine: batch dedupe, resume planning, the per-unit
//! orchestrator and the job pathways built on top of it.

pub mod dedupe;
pub mod jobs;
pub mod orchestrator;
pub mod pacing;
pub mod resume;

pub use orchestrator::{Orchestrator, RunSummary, UnitPlan};
pub use resume::WorkUnit;
