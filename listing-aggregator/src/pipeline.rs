use crate::extractor::AnnouncementExtractor;
use crate::fetcher::random_pause;
use crate::normalizer::ContentNormalizer;
use crate::store::ArtifactStore;
use crate::traits::SiteAdapter;
use crate::types::{AggregatorError, CrawlTarget, Result, RunConfig};
use crate::utils::time::is_stale;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one exchange during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExchangeOutcome {
    pub exchange: String,
    pub listed: usize,
    pub skipped_existing: usize,
    pub placeholders: usize,
    pub extracted: usize,
    pub records: usize,
    pub failed_targets: Vec<String>,
    pub adapter_error: Option<String>,
}

impl ExchangeOutcome {
    fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            ..Default::default()
        }
    }

    pub fn new_artifacts(&self) -> usize {
        self.placeholders + self.extracted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ExchangeOutcome>,
}

impl RunReport {
    pub fn new_artifacts(&self) -> usize {
        self.outcomes.iter().map(ExchangeOutcome::new_artifacts).sum()
    }

    pub fn extracted(&self) -> usize {
        self.outcomes.iter().map(|o| o.extracted).sum()
    }

    pub fn failed_exchanges(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.adapter_error.is_some())
            .map(|o| o.exchange.as_str())
            .collect()
    }

    pub fn outcome(&self, exchange: &str) -> Option<&ExchangeOutcome> {
        self.outcomes.iter().find(|o| o.exchange == exchange)
    }
}

enum TargetOutcome {
    AlreadyProcessed,
    Placeholder,
    Extracted { records: usize },
}

/// Drives every site adapter through list, freshness check, detail, normalize,
/// extract and store.
///
/// Each adapter runs as its own task so a failing or panicking site never stops
/// the others. Targets within one adapter are handled sequentially with a
/// randomized pause between network calls.
pub struct Orchestrator {
    adapters: Vec<Arc<dyn SiteAdapter>>,
    worker: Worker,
}

#[derive(Clone)]
struct Worker {
    extractor: Arc<AnnouncementExtractor>,
    normalizer: ContentNormalizer,
    store: ArtifactStore,
    config: Arc<RunConfig>,
}

impl Orchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn SiteAdapter>>,
        extractor: Arc<AnnouncementExtractor>,
        store: ArtifactStore,
        config: RunConfig,
    ) -> Self {
        Self {
            adapters,
            worker: Worker {
                extractor,
                normalizer: ContentNormalizer::new(),
                store,
                config: Arc::new(config),
            },
        }
    }

    /// Add another site adapter to the run
    pub fn add_adapter(&mut self, adapter: Arc<dyn SiteAdapter>) {
        info!("Adding adapter to orchestrator: {}", adapter.exchange());
        self.adapters.push(adapter);
    }

    pub fn exchanges(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.exchange()).collect()
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// Run every adapter once, measuring freshness against `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        let started_at = Utc::now();
        info!("Starting crawl of {} exchanges", self.adapters.len());

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let worker = self.worker.clone();
                let adapter = Arc::clone(adapter);
                tokio::spawn(async move { worker.crawl_exchange(adapter, now).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        let outcomes: Vec<ExchangeOutcome> = results
            .into_iter()
            .zip(self.adapters.iter())
            .map(|(result, adapter)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Crawl task for {} aborted: {}", adapter.exchange(), e);
                    ExchangeOutcome {
                        adapter_error: Some(format!("task aborted: {}", e)),
                        ..ExchangeOutcome::new(adapter.exchange())
                    }
                }
            })
            .collect();

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            "Crawl finished: {} new artifacts ({} extracted) across {} exchanges, {} exchanges failed",
            report.new_artifacts(),
            report.extracted(),
            report.outcomes.len(),
            report.failed_exchanges().len()
        );
        report
    }
}

impl Worker {
    async fn crawl_exchange(self, adapter: Arc<dyn SiteAdapter>, now: DateTime<Utc>) -> ExchangeOutcome {
        let exchange = adapter.exchange().to_string();
        let mut outcome = ExchangeOutcome::new(&exchange);

        let mut targets = match adapter.list().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(exchange = %exchange, "Failed to list announcements: {}", e);
                outcome.adapter_error = Some(e.to_string());
                return outcome;
            }
        };

        if let Some(max) = self.config.max_items_per_exchange {
            if targets.len() > max {
                debug!("Capping {} targets for {} at {}", targets.len(), exchange, max);
                targets.truncate(max);
            }
        }
        outcome.listed = targets.len();
        info!("Found {} announcements for {}", targets.len(), exchange);

        let mut needs_pause = false;
        for target in &targets {
            if needs_pause {
                random_pause(self.config.min_item_delay_ms, self.config.max_item_delay_ms).await;
            }

            match self.process_target(adapter.as_ref(), target, now).await {
                Ok(TargetOutcome::AlreadyProcessed) => {
                    outcome.skipped_existing += 1;
                    needs_pause = false;
                }
                Ok(TargetOutcome::Placeholder) => {
                    outcome.placeholders += 1;
                    needs_pause = false;
                }
                Ok(TargetOutcome::Extracted { records }) => {
                    outcome.extracted += 1;
                    outcome.records += records;
                    needs_pause = true;
                }
                Err(e) => {
                    error!(exchange = %exchange, key = %target.key, "Failed to process {}: {}", target.title, e);
                    outcome.failed_targets.push(target.key.clone());
                    needs_pause = true;
                }
            }
        }

        info!(
            "{}: {} extracted, {} placeholders, {} already processed, {} failed",
            exchange,
            outcome.extracted,
            outcome.placeholders,
            outcome.skipped_existing,
            outcome.failed_targets.len()
        );
        outcome
    }

    async fn process_target(
        &self,
        adapter: &dyn SiteAdapter,
        target: &CrawlTarget,
        now: DateTime<Utc>,
    ) -> Result<TargetOutcome> {
        let Some(claim) = self.store.claim(&target.exchange, &target.key) else {
            debug!("Skipping {}/{}: already processed", target.exchange, target.key);
            return Ok(TargetOutcome::AlreadyProcessed);
        };

        let days = self.config.freshness_days;
        if is_stale(target.release_hint, now, days) {
            debug!("{}/{} is older than {} days, storing placeholder", target.exchange, target.key, days);
            self.store.write_placeholder(&claim, target.meta(None, String::new())).await?;
            return Ok(TargetOutcome::Placeholder);
        }

        let timeout = self.config.detail_timeout();
        let detail = tokio::time::timeout(timeout, adapter.detail(target))
            .await
            .map_err(|_| AggregatorError::Timeout {
                what: format!("detail {}/{}", target.exchange, target.key),
                seconds: timeout.as_secs(),
            })??;

        let release_time = detail.release_time.or(target.release_hint);
        if is_stale(release_time, now, days) {
            debug!("{}/{} release time is outside the window, storing placeholder", target.exchange, target.key);
            self.store.write_placeholder(&claim, target.meta(release_time, String::new())).await?;
            return Ok(TargetOutcome::Placeholder);
        }

        let text = self.normalizer.normalize(&detail);
        if text.is_empty() {
            warn!("{}/{} normalized to empty text", target.exchange, target.key);
            return Err(AggregatorError::Parse("announcement body is empty".to_string()));
        }

        let extraction = self.extractor.extract_detailed(&text).await;
        debug!(
            "{}/{} extracted via {} tier",
            target.exchange, target.key, extraction.tier
        );

        let meta = target.meta(release_time, text);
        let records = extraction.result.into_records(&meta);
        let count = records.len();
        self.store.write_records(&claim, records).await?;

        Ok(TargetOutcome::Extracted { records: count })
    }
}
