//! Backing Store
//!
//! The aggregation core reaches its samples only through
//! [`PipelineExecutor::execute_pipeline`]. Two local backends evaluate the
//! typed stages in-process; `wire` lowers the same stages for stores that
//! run JSON aggregation pipelines natively.

mod eval;
pub mod persistence;
pub mod sled_store;
pub mod wire;

pub use eval::run_pipeline;
pub use persistence::{InMemoryStore, PipelineExecutor, StoreError};
pub use sled_store::SledStore;
