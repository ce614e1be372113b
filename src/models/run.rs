use serde::{Deserialize, Serialize};

use super::{PriceObservation, Stage};

/// Outcome of one product pipeline within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOutcome {
    pub observation: PriceObservation,
    pub alert_sent: bool,
    pub degraded_alert_sent: bool,
    pub elapsed_ms: u64,
}

impl ProductOutcome {
    pub fn success(&self) -> bool {
        self.observation.is_ok()
    }
}

/// Per-product error summary, detailed enough to diagnose a failure
/// without going back to the raw logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub product: String,
    pub stage: Stage,
    pub detail: String,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.product, self.stage, self.detail)
    }
}

/// Aggregate of one monitoring run. Built by the monitor and returned to
/// the caller; not persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringResult {
    pub total_products: usize,
    pub successful: usize,
    pub failed: usize,
    pub alerts_sent: usize,
    pub elapsed_ms: u64,
    pub errors: Vec<RunError>,
    pub outcomes: Vec<ProductOutcome>,
}

impl MonitoringResult {
    pub fn from_outcomes(
        outcomes: Vec<ProductOutcome>,
        errors: Vec<RunError>,
        elapsed_ms: u64,
    ) -> Self {
        let successful = outcomes.iter().filter(|o| o.success()).count();
        let failed = outcomes.len() - successful;
        let alerts_sent = outcomes
            .iter()
            .filter(|o| o.alert_sent || o.degraded_alert_sent)
            .count();
        Self {
            total_products: outcomes.len(),
            successful,
            failed,
            alerts_sent,
            elapsed_ms,
            errors,
            outcomes,
        }
    }
}
