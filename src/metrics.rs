//! Prometheus metrics for ingestion runs.
//!
//! Runs are short-lived batch jobs, so there is no scrape endpoint. The
//! recorder is installed in-process and, when `INGEST_PUSHGATEWAY_URL` is set,
//! the rendered text is pushed to a Pushgateway at the end of the run.

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub const UNITS_TOTAL: &str = "ingest_units_total";
pub const ROWS_WRITTEN_TOTAL: &str = "ingest_rows_written_total";
pub const UNIT_DURATION_SECONDS: &str = "ingest_unit_duration_seconds";
pub const RUNS_TOTAL: &str = "ingest_runs_total";
pub const LAST_RUN_TIMESTAMP: &str = "ingest_last_run_timestamp_seconds";

/// Install the global recorder. Safe to call more than once.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Prometheus recorder install failed (possibly already installed): {}", e),
    }
}

pub fn get_handle() -> Option<&'static PrometheusHandle> {
    HANDLE.get()
}

pub fn record_run(pathway: &str) {
    counter!(RUNS_TOTAL, "pathway" => pathway.to_string()).increment(1);
}

/// One finished unit. `outcome` is `processed`, `empty` or `failed`.
pub fn record_unit(outcome: &'static str, seconds: f64) {
    counter!(UNITS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(UNIT_DURATION_SECONDS, "outcome" => outcome).record(seconds);
}

/// Units a cancelled run left for the next run. No duration is recorded.
pub fn record_units_cancelled(units: usize) {
    if units > 0 {
        counter!(UNITS_TOTAL, "outcome" => "cancelled").increment(units as u64);
    }
}

pub fn record_rows_written(table: &'static str, rows: usize) {
    counter!(ROWS_WRITTEN_TOTAL, "table" => table).increment(rows as u64);
}

/// Push everything recorded so far to the Pushgateway, if one is configured.
/// Failures are logged and otherwise ignored.
pub async fn push_to_gateway(job: &str) {
    let base = match std::env::var("INGEST_PUSHGATEWAY_URL") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return,
    };
    let Some(handle) = get_handle() else {
        warn!("INGEST_PUSHGATEWAY_URL is set but no metrics recorder is installed");
        return;
    };

    let push_url = format!(
        "{}/metrics/job/catalog_ingest/instance/{}",
        base.trim_end_matches('/'),
        job
    );
    gauge!(LAST_RUN_TIMESTAMP, "job" => job.to_string()).set(Utc::now().timestamp() as f64);
    let body = handle.render();

    let result = reqwest::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await;

    match result {
        Ok(r) if r.status().is_success() => info!("Pushed metrics to Pushgateway for job={}", job),
        Ok(r) => warn!(
            "Pushgateway push responded with status {} for job={}",
            r.status().as_u16(),
            job
        ),
        Err(e) => warn!("Failed to push metrics to Pushgateway for job={}: {}", job, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_outcomes_are_labelled() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_unit("processed", 1.5);
            record_unit("failed", 0.2);
            record_units_cancelled(3);
            record_units_cancelled(0);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"ingest_units_total{outcome="processed"} 1"#));
        assert!(rendered.contains(r#"ingest_units_total{outcome="failed"} 1"#));
        assert!(rendered.contains(r#"ingest_units_total{outcome="cancelled"} 3"#));
        assert!(!rendered.contains(r#"ingest_unit_duration_seconds_count{outcome="cancelled"}"#));
    }
}
