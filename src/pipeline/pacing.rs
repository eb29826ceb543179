use serde::Deserialize;
use std::time::Duration;

/// Delay policy used for inter-unit pacing and render settling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pacing {
    /// No waiting at all. Used by tests and dry runs.
    Immediate,
    Fixed {
        millis: u64,
    },
    /// `base * factor^step`, capped at `max`.
    Backoff {
        base_millis: u64,
        factor: f64,
        max_millis: u64,
    },
}

impl Pacing {
    pub fn fixed(duration: Duration) -> Self {
        Pacing::Fixed {
            millis: duration.as_millis() as u64,
        }
    }

    /// Delay before the step following `step` (0-based).
    pub fn delay_for(&self, step: usize) -> Duration {
        match self {
            Pacing::Immediate => Duration::ZERO,
            Pacing::Fixed { millis } => Duration::from_millis(*millis),
            Pacing::Backoff {
                base_millis,
                factor,
                max_millis,
            } => {
                let exp = i32::try_from(step).unwrap_or(i32::MAX);
                let scaled = (*base_millis as f64) * factor.max(1.0).powi(exp);
                let capped = scaled.min(*max_millis as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }

    pub async fn wait(&self, step: usize) {
        let delay = self.delay_for(step);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
