//! Report service
//!
//! Drives one report request end to end:
//!
//! 1. Normalize the request and fingerprint it (tenant database included)
//! 2. Serve a cached payload if present
//! 3. Build the filter; unsatisfiable input yields an empty report
//! 4. Run the pipeline on the blocking pool
//! 5. Fill in missing ratios, roll up, render
//! 6. Cache the payload, last, and only if it holds records

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{fingerprint, ResultCache};
use crate::formula;
use crate::query::{Filter, Pipeline, ReportQuery, ReportRequest, Stage};
use crate::render::{self, RenderError};
use crate::rollup::{self, RollupPolicy};
use crate::storage::{PipelineExecutor, StoreError};
use crate::types::{AggregationResult, Granularity, Level, OutputFormat, ResultTree, TimestampFormat};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A rendered report ready to send.
#[derive(Debug, Clone)]
pub struct Report {
    pub payload: Arc<[u8]>,
    pub format: OutputFormat,
    /// Served from the cache without touching the store
    pub cached: bool,
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn PipelineExecutor>,
    cache: Option<Arc<ResultCache>>,
    collection: String,
    policy: RollupPolicy,
}

impl ReportService {
    pub fn new(store: Arc<dyn PipelineExecutor>, collection: impl Into<String>) -> Self {
        Self {
            store,
            cache: None,
            collection: collection.into(),
            policy: RollupPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: RollupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Produce the `level` report for `request` against tenant `database`.
    pub async fn report(
        &self,
        level: Level,
        database: &str,
        request: &ReportRequest,
    ) -> Result<Report, ServiceError> {
        let query = ReportQuery::normalize(request);
        let format = query.format;
        let endpoint = level.endpoint_name();

        let key = self
            .cache
            .as_ref()
            .and_then(|_| fingerprint(endpoint, &(database, &query)));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(payload) = cache.lookup(key) {
                return Ok(Report {
                    payload,
                    format,
                    cached: true,
                });
            }
        }

        let filter = Filter::build(&query, level);
        let (tree, timestamps) = match filter.granularity() {
            Some(granularity) if !filter.is_unsatisfiable() => {
                let pipeline = Pipeline::build(&filter, granularity);
                let timestamps = pipeline.timestamp_format();
                let rows = self.execute(database, pipeline.stages).await?;
                let rows = complete_ratios(rows);
                (rollup::build_tree(&rows, level, self.policy), timestamps)
            }
            _ => {
                debug!(endpoint, database, "Filter is unsatisfiable, returning empty report");
                let granularity = query.granularity.unwrap_or(Granularity::Daily);
                (ResultTree::empty(level), TimestampFormat::for_granularity(granularity))
            }
        };

        let payload: Arc<[u8]> = render::render(&tree, timestamps, format)?.into();

        info!(
            endpoint,
            database,
            records = tree.record_count(),
            bytes = payload.len(),
            "Report computed"
        );

        if !tree.is_empty() {
            if let (Some(cache), Some(key)) = (&self.cache, key) {
                cache.store(key, Arc::clone(&payload));
            }
        }

        Ok(Report {
            payload,
            format,
            cached: false,
        })
    }

    async fn execute(
        &self,
        database: &str,
        stages: Vec<Stage>,
    ) -> Result<Vec<AggregationResult>, ServiceError> {
        let store = Arc::clone(&self.store);
        let database = database.to_string();
        let collection = self.collection.clone();
        let rows = tokio::task::spawn_blocking(move || {
            store.execute_pipeline(&database, &collection, &stages)
        })
        .await??;
        debug!(rows = rows.len(), backend = self.store.backend_name(), "Pipeline executed");
        Ok(rows)
    }
}

/// Compute ratios for rows the store returned without them. Rows whose
/// ratios cannot be computed are dropped.
fn complete_ratios(rows: Vec<AggregationResult>) -> Vec<AggregationResult> {
    rows.into_iter()
        .filter_map(|mut row| {
            if row.availability.is_some() && row.reliability.is_some() {
                return Some(row);
            }
            match formula::compute(row.uptime, row.unknown, row.downtime) {
                Ok(ratios) => {
                    row.availability.get_or_insert(ratios.availability);
                    row.reliability.get_or_insert(ratios.reliability);
                    Some(row)
                }
                Err(e) => {
                    warn!(site = %row.identity.site, bucket = %row.bucket, "Dropping record: {}", e);
                    None
                }
            }
        })
        .collect()
}
