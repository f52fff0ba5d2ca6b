//! JSON-lines sample import
//!
//! One `MetricSample` object per line; blank lines and `#` comments are
//! skipped.

use std::io::BufRead;

use tracing::info;

use crate::storage::{SledStore, StoreError};
use crate::types::MetricSample;

/// Samples written per sled batch.
pub const BATCH_SIZE: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn parse_json_lines<R: BufRead>(reader: R) -> Result<Vec<MetricSample>, ImportError> {
    let mut samples = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let sample = serde_json::from_str(trimmed)
            .map_err(|source| ImportError::Parse { line: i + 1, source })?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Parse `reader` and write every sample into `database`/`collection`.
pub fn import_json_lines<R: BufRead>(
    store: &SledStore,
    database: &str,
    collection: &str,
    reader: R,
) -> Result<usize, ImportError> {
    let samples = parse_json_lines(reader)?;
    let mut written = 0;
    for chunk in samples.chunks(BATCH_SIZE) {
        written += store.insert_samples(database, collection, chunk)?;
    }
    info!(database, collection, written, "Import complete");
    Ok(written)
}
