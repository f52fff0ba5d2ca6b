//! Query construction: request normalization, filters and aggregation pipelines

pub mod filter;
pub mod pipeline;

pub use filter::{BucketRange, Filter, ReportQuery, ReportRequest, ZULU_FORM};
pub use pipeline::{Dimension, Grouping, Metric, Pipeline, Projection, SortKey, Stage};
