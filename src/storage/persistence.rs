//! PipelineExecutor trait — pluggable backing store
//!
//! The report service only ever talks to the store through
//! `execute_pipeline`, so backends can be swapped without touching the
//! aggregation code:
//! - `InMemoryStore`: in-memory samples for tests and demos
//! - `SledStore`: embedded sled document store

use std::collections::HashMap;

use crate::query::Stage;
use crate::types::{AggregationResult, MetricSample};

use super::eval::run_pipeline;

/// Trait for backing stores that execute aggregation pipelines.
///
/// Implementations must be thread-safe (Send + Sync); calls are made from
/// the blocking pool, one per request.
pub trait PipelineExecutor: Send + Sync {
    /// Execute `stages` against `collection` in `database`.
    ///
    /// Rows come back in the order the pipeline's sort stage defines. An
    /// unknown database or collection yields no rows.
    fn execute_pipeline(
        &self,
        database: &str,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<AggregationResult>, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

type CollectionKey = (String, String);

/// In-memory store for testing and minimal deployments
///
/// Thread-safe via `RwLock`. Not durable — data lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    collections: std::sync::RwLock<HashMap<CollectionKey, Vec<MetricSample>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples to a collection, creating it if needed.
    pub fn insert_samples(
        &self,
        database: &str,
        collection: &str,
        samples: impl IntoIterator<Item = MetricSample>,
    ) -> Result<(), StoreError> {
        let mut store = self
            .collections
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        store
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .extend(samples);
        Ok(())
    }

    /// Drop every sample in a collection.
    pub fn clear(&self, database: &str, collection: &str) -> Result<(), StoreError> {
        let mut store = self
            .collections
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        store.remove(&(database.to_string(), collection.to_string()));
        Ok(())
    }
}

impl PipelineExecutor for InMemoryStore {
    fn execute_pipeline(
        &self,
        database: &str,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<AggregationResult>, StoreError> {
        let samples = {
            let store = self
                .collections
                .read()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            store
                .get(&(database.to_string(), collection.to_string()))
                .cloned()
                .unwrap_or_default()
        };
        run_pipeline(samples, stages)
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
