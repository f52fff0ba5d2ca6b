//! AR Metrics: availability and reliability reporting
//!
//! Aggregates per-site daily service samples into site, group and
//! supergroup reports at daily or monthly granularity.
//!
//! ## Architecture
//!
//! - **Query**: request normalization, store-agnostic filters, typed pipelines
//! - **Storage**: pipeline executors (in-memory, sled) and a JSON wire adapter
//! - **Formula**: availability / reliability from averaged fractions
//! - **Rollup**: weighted means up the site → group → supergroup hierarchy
//! - **Cache**: sharded, byte-bounded LRU of rendered payloads
//! - **API**: axum routes with API-key tenant selection

pub mod api;
pub mod cache;
pub mod config;
pub mod formula;
pub mod import;
pub mod query;
pub mod render;
pub mod rollup;
pub mod service;
pub mod storage;
pub mod tenant;
pub mod types;

pub use config::AppConfig;
pub use service::{Report, ReportService, ServiceError};
pub use storage::{InMemoryStore, PipelineExecutor, SledStore, StoreError};
pub use types::{
    AggregationResult, Bucket, Granularity, Identity, Level, MetricSample, OutputFormat,
    ResultTree,
};
