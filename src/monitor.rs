use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::alerts::AlertDispatcher;
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::models::{
    FailureKind, MonitoringResult, PriceObservation, ProductConfig, ProductOutcome, RunError,
    Stage,
};
use crate::store::PriceStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("no active products to monitor")]
    NoProducts,

    #[error("invalid product configuration: {0}")]
    InvalidProduct(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Consecutive failures before a product is reported as degraded.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
    /// Default wall-clock cap for one run, handed to `run_once` by the
    /// binary. Pipelines still in flight at the deadline are aborted.
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_degraded_threshold() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            degraded_threshold: default_degraded_threshold(),
            run_deadline_secs: None,
        }
    }
}

/// Orchestrates one monitoring run: fetch, extract, persist and alert for
/// every active product, with bounded concurrency and per-product failure
/// isolation.
///
/// The only state carried between runs is the consecutive-failure count per
/// product, which drives degradation alerts.
pub struct Monitor {
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    store: PriceStore,
    dispatcher: Arc<AlertDispatcher>,
    config: MonitorConfig,
    failure_counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl Monitor {
    pub fn new(
        fetcher: Fetcher,
        extractor: Extractor,
        store: PriceStore,
        dispatcher: AlertDispatcher,
        config: MonitorConfig,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(extractor),
            store,
            dispatcher: Arc::new(dispatcher),
            config,
            failure_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run one pass over the product list. Inactive products are skipped;
    /// every product that runs to completion produces exactly one outcome,
    /// failed or not. Pipelines still in flight at the deadline are
    /// abandoned and leave no trace in the aggregate.
    pub async fn run_once(
        &self,
        products: &[ProductConfig],
        deadline: Option<Duration>,
    ) -> Result<MonitoringResult, MonitorError> {
        for product in products {
            product
                .validate()
                .map_err(|e| MonitorError::InvalidProduct(format!("{}: {e}", product.name)))?;
        }

        let active: Vec<ProductConfig> = products.iter().filter(|p| p.active).cloned().collect();
        if active.is_empty() {
            return Err(MonitorError::NoProducts);
        }

        info!(
            products = active.len(),
            max_concurrency = self.config.max_concurrency,
            "monitoring run started"
        );
        let started = tokio::time::Instant::now();
        let deadline = deadline.map(|limit| started + limit);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        for product in &active {
            let ctx = self.pipeline_context();
            let product = product.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                // Closed only when the set itself is dropped.
                let _permit = semaphore.acquire_owned().await;
                check_product(ctx, product).await
            });
        }

        let mut outcomes = Vec::with_capacity(active.len());
        let mut errors = Vec::new();

        while !set.is_empty() {
            let joined = match deadline {
                Some(at) => tokio::select! {
                    res = set.join_next() => res,
                    _ = tokio::time::sleep_until(at) => {
                        warn!(
                            in_flight = set.len(),
                            "run deadline reached, abandoning remaining pipelines"
                        );
                        set.abort_all();
                        // Drain; a task may still finish between the
                        // deadline and the abort taking effect.
                        while let Some(res) = set.join_next().await {
                            if let Ok(checked) = res {
                                record(checked, &mut outcomes, &mut errors);
                            }
                        }
                        break;
                    }
                },
                None => set.join_next().await,
            };

            match joined {
                Some(Ok(checked)) => record(checked, &mut outcomes, &mut errors),
                Some(Err(join_err)) => {
                    // A panicked pipeline must not take the run down.
                    error!(error = %join_err, "product pipeline panicked");
                }
                None => break,
            }
        }

        let result =
            MonitoringResult::from_outcomes(outcomes, errors, started.elapsed().as_millis() as u64);
        info!(
            total = result.total_products,
            successful = result.successful,
            failed = result.failed,
            alerts = result.alerts_sent,
            elapsed_ms = result.elapsed_ms,
            "monitoring run finished"
        );
        Ok(result)
    }

    fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
            degraded_threshold: self.config.degraded_threshold,
            failure_counts: self.failure_counts.clone(),
        }
    }
}

// What one product pipeline hands back to the run loop.
struct ProductCheck {
    outcome: ProductOutcome,
    errors: Vec<RunError>,
}

struct PipelineContext {
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    store: PriceStore,
    dispatcher: Arc<AlertDispatcher>,
    degraded_threshold: u32,
    failure_counts: Arc<Mutex<HashMap<String, u32>>>,
}

fn record(checked: ProductCheck, outcomes: &mut Vec<ProductOutcome>, errors: &mut Vec<RunError>) {
    errors.extend(checked.errors);
    outcomes.push(checked.outcome);
}

/// The per-product pipeline. Every path through it, success or failure,
/// yields exactly one observation so run totals always add up.
async fn check_product(ctx: PipelineContext, product: ProductConfig) -> ProductCheck {
    let started = tokio::time::Instant::now();
    let mut errors = Vec::new();

    let outcome = match fetch_and_extract(&ctx, &product, &mut errors).await {
        Ok(observation) => {
            clear_failures(&ctx, &product.name);
            persist(&ctx, &observation, &mut errors).await;

            let alert_sent = match ctx.dispatcher.dispatch(&product, &observation).await {
                Some(result) => {
                    if result.failed() > 0 {
                        errors.push(RunError {
                            product: product.name.clone(),
                            stage: Stage::Alert,
                            detail: format!(
                                "{} of {} channels failed",
                                result.failed(),
                                result.outcomes.len()
                            ),
                        });
                    }
                    true
                }
                None => false,
            };

            ProductOutcome {
                observation,
                alert_sent,
                degraded_alert_sent: false,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }
        Err(observation) => {
            persist(&ctx, &observation, &mut errors).await;

            let consecutive = bump_failures(&ctx, &product.name);
            // Fires exactly at the crossing, not on every later failure.
            let degraded_alert_sent = consecutive == ctx.degraded_threshold;
            if degraded_alert_sent {
                ctx.dispatcher
                    .raise_degraded(&product, &observation, consecutive)
                    .await;
            }

            ProductOutcome {
                observation,
                alert_sent: false,
                degraded_alert_sent,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }
        }
    };

    ProductCheck { outcome, errors }
}

async fn fetch_and_extract(
    ctx: &PipelineContext,
    product: &ProductConfig,
    errors: &mut Vec<RunError>,
) -> Result<PriceObservation, PriceObservation> {
    let content = match ctx.fetcher.fetch(&product.url).await {
        Ok(content) => content,
        Err(err) => {
            warn!(product = product.name.as_str(), error = %err, "fetch failed");
            errors.push(RunError {
                product: product.name.clone(),
                stage: Stage::Fetch,
                detail: err.to_string(),
            });
            return Err(PriceObservation::failed(
                product.name.clone(),
                product.url.clone(),
                product.target_price,
                FailureKind::Fetch,
                err.to_string(),
            ));
        }
    };

    let rules = ctx
        .extractor
        .rules_for(&product.url, product.custom_selectors.as_ref());
    match ctx.extractor.extract(&content, rules) {
        Ok(fields) => {
            match PriceObservation::ok(
                product.name.clone(),
                product.url.clone(),
                fields.price,
                product.target_price,
            ) {
                Ok(observation) => Ok(observation),
                Err(detail) => {
                    errors.push(RunError {
                        product: product.name.clone(),
                        stage: Stage::Extract,
                        detail: detail.clone(),
                    });
                    Err(PriceObservation::failed(
                        product.name.clone(),
                        product.url.clone(),
                        product.target_price,
                        FailureKind::Parse,
                        detail,
                    ))
                }
            }
        }
        Err(err) => {
            warn!(product = product.name.as_str(), error = %err, "extraction failed");
            errors.push(RunError {
                product: product.name.clone(),
                stage: Stage::Extract,
                detail: err.to_string(),
            });
            Err(PriceObservation::failed(
                product.name.clone(),
                product.url.clone(),
                product.target_price,
                FailureKind::Parse,
                err.to_string(),
            ))
        }
    }
}

async fn persist(
    ctx: &PipelineContext,
    observation: &PriceObservation,
    errors: &mut Vec<RunError>,
) {
    if let Err(err) = ctx.store.insert(observation).await {
        error!(
            product = observation.product_name.as_str(),
            error = %err,
            "failed to store observation"
        );
        errors.push(RunError {
            product: observation.product_name.clone(),
            stage: Stage::Persist,
            detail: err.to_string(),
        });
    }
}

fn bump_failures(ctx: &PipelineContext, product_name: &str) -> u32 {
    let mut counts = ctx
        .failure_counts
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let count = counts.entry(product_name.to_string()).or_insert(0);
    *count += 1;
    *count
}

fn clear_failures(ctx: &PipelineContext, product_name: &str) {
    let mut counts = ctx
        .failure_counts
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    counts.remove(product_name);
}
