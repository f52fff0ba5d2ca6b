//! Sled-backed sample store
//!
//! One sled tree per (database, collection). Key format: the eight ASCII
//! digits of the date, then every identity dimension as a big-endian `u32`
//! length followed by its bytes, then the production and monitored flags.
//! A day range therefore maps onto a contiguous key range, and two samples
//! share a key only when date and identity are equal.
//! Value: JSON-serialized `MetricSample`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::eval::run_pipeline;
use super::{PipelineExecutor, StoreError};
use crate::query::{BucketRange, Stage};
use crate::types::{AggregationResult, Granularity, MetricSample};

/// Embedded document store for metric samples
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
}

impl SledStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        info!("Sample store opened at {:?}", path_ref);
        Ok(Self { db: Arc::new(db) })
    }

    /// Open a temporary store that is removed on drop
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    fn tree_name(database: &str, collection: &str) -> String {
        format!("{database}/{collection}")
    }

    fn build_key(sample: &MetricSample) -> Vec<u8> {
        let id = &sample.identity;
        let mut key = format!("{:08}", sample.date).into_bytes();
        for part in [
            &id.namespace,
            &id.profile,
            &id.supergroup,
            &id.group,
            &id.site,
            &id.infrastructure,
            &id.certification,
        ] {
            let len = u32::try_from(part.len()).unwrap_or(u32::MAX);
            key.extend_from_slice(&len.to_be_bytes());
            key.extend_from_slice(part.as_bytes());
        }
        key.extend_from_slice(id.production.as_str().as_bytes());
        key.extend_from_slice(id.monitored.as_str().as_bytes());
        key
    }

    /// Insert samples; a sample with the same date and identity replaces the
    /// stored one.
    pub fn insert_samples<'a>(
        &self,
        database: &str,
        collection: &str,
        samples: impl IntoIterator<Item = &'a MetricSample>,
    ) -> Result<usize, StoreError> {
        let tree = self.db.open_tree(Self::tree_name(database, collection))?;
        let mut batch = sled::Batch::default();
        let mut count = 0;
        for sample in samples {
            batch.insert(Self::build_key(sample), serde_json::to_vec(sample)?);
            count += 1;
        }
        tree.apply_batch(batch)?;
        tree.flush()?;

        debug!(database, collection, count, "Stored samples");
        Ok(count)
    }

    /// Number of samples in a collection
    pub fn count(&self, database: &str, collection: &str) -> Result<usize, StoreError> {
        Ok(self.db.open_tree(Self::tree_name(database, collection))?.len())
    }

    /// Half-open key bounds covering every day of `range`
    fn key_bounds(range: BucketRange) -> (String, String) {
        match range.granularity {
            Granularity::Daily => (format!("{:08}", range.start), format!("{:08}", range.end + 1)),
            Granularity::Monthly => (format!("{:06}00", range.start), format!("{:06}00", range.end + 1)),
        }
    }

    fn load(
        &self,
        database: &str,
        collection: &str,
        range: Option<BucketRange>,
    ) -> Result<Vec<MetricSample>, StoreError> {
        let tree_name = Self::tree_name(database, collection);
        if !self.db.tree_names().iter().any(|n| &n[..] == tree_name.as_bytes()) {
            return Ok(Vec::new());
        }
        let tree = self.db.open_tree(tree_name)?;

        let iter = match range {
            Some(range) => {
                let (lo, hi) = Self::key_bounds(range);
                tree.range(lo.into_bytes()..hi.into_bytes())
            }
            None => tree.iter(),
        };

        let mut samples = Vec::new();
        for item in iter {
            let (_key, value) = item?;
            match serde_json::from_slice::<MetricSample>(&value) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    warn!("Failed to deserialize stored sample: {}", e);
                    continue;
                }
            }
        }
        Ok(samples)
    }
}

impl PipelineExecutor for SledStore {
    fn execute_pipeline(
        &self,
        database: &str,
        collection: &str,
        stages: &[Stage],
    ) -> Result<Vec<AggregationResult>, StoreError> {
        // A leading match narrows the scan; it is still evaluated in full.
        let range = match stages.first() {
            Some(Stage::Match(filter)) => {
                if filter.is_unsatisfiable() {
                    return Ok(Vec::new());
                }
                filter.range
            }
            _ => None,
        };

        let samples = self.load(database, collection, range)?;
        debug!(database, collection, scanned = samples.len(), "Executing pipeline");
        run_pipeline(samples, stages)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Pipeline, ReportQuery, ReportRequest};
    use crate::types::{Flag, Identity, Level};

    fn sample(site: &str, date: u32, up: f64) -> MetricSample {
        MetricSample {
            identity: Identity {
                site: site.to_string(),
                group: "NGI_A".to_string(),
                profile: "ap1".to_string(),
                infrastructure: "Production".to_string(),
                certification: "Certified".to_string(),
                ..Identity::default()
            },
            date,
            uptime: up,
            downtime: 1.0 - up,
            unknown: 0.0,
            weight: 1.0,
            availability: None,
            reliability: None,
        }
    }

    fn pipeline(start: &str, end: &str, granularity: Granularity) -> Pipeline {
        let request = ReportRequest {
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            profile: Some("ap1".to_string()),
            granularity: Some(format!("{granularity:?}")),
            ..ReportRequest::default()
        };
        let filter = Filter::build(&ReportQuery::normalize(&request), Level::Site);
        Pipeline::build(&filter, granularity)
    }

    #[test]
    fn test_store_and_query_day_range() {
        let store = SledStore::open_temp().unwrap();
        let samples = vec![
            sample("ST01", 20_150_531, 1.0),
            sample("ST01", 20_150_601, 1.0),
            sample("ST02", 20_150_615, 0.5),
            sample("ST01", 20_150_701, 1.0),
        ];
        store.insert_samples("tenant", "sites", &samples).unwrap();
        assert_eq!(store.count("tenant", "sites").unwrap(), 4);

        let p = pipeline("2015-06-01T00:00:00Z", "2015-06-30T00:00:00Z", Granularity::Daily);
        let rows = store.execute_pipeline("tenant", "sites", &p.stages).unwrap();
        let dates: Vec<_> = rows.iter().map(|r| r.bucket.value).collect();
        assert_eq!(dates, vec![20_150_601, 20_150_615]);
    }

    #[test]
    fn test_monthly_scan_covers_whole_month() {
        let store = SledStore::open_temp().unwrap();
        let samples = vec![
            sample("ST01", 20_150_601, 1.0),
            sample("ST01", 20_150_630, 0.0),
            sample("ST01", 20_150_701, 1.0),
        ];
        store.insert_samples("tenant", "sites", &samples).unwrap();

        let p = pipeline("2015-06-15T00:00:00Z", "2015-06-16T00:00:00Z", Granularity::Monthly);
        let rows = store.execute_pipeline("tenant", "sites", &p.stages).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket.value, 201_506);
        assert!((rows[0].uptime - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_same_key_replaces_sample() {
        let store = SledStore::open_temp().unwrap();
        store
            .insert_samples("tenant", "sites", &[sample("ST01", 20_150_601, 1.0)])
            .unwrap();
        store
            .insert_samples("tenant", "sites", &[sample("ST01", 20_150_601, 0.0)])
            .unwrap();
        assert_eq!(store.count("tenant", "sites").unwrap(), 1);
    }

    #[test]
    fn test_samples_differing_in_any_dimension_coexist() {
        let store = SledStore::open_temp().unwrap();
        let base = sample("ST01", 20_150_601, 1.0);
        let mut variants = vec![base.clone()];
        let mut test_infra = base.clone();
        test_infra.identity.infrastructure = "Test".to_string();
        variants.push(test_infra);
        let mut other_group = base.clone();
        other_group.identity.group = "NGI_B".to_string();
        variants.push(other_group);
        let mut other_super = base.clone();
        other_super.identity.supergroup = "EU".to_string();
        variants.push(other_super);
        let mut uncertified = base.clone();
        uncertified.identity.certification = "Uncertified".to_string();
        variants.push(uncertified);
        let mut not_monitored = base.clone();
        not_monitored.identity.monitored = Flag::N;
        variants.push(not_monitored);
        let mut not_production = base;
        not_production.identity.production = Flag::N;
        variants.push(not_production);

        store.insert_samples("tenant", "sites", &variants).unwrap();
        assert_eq!(store.count("tenant", "sites").unwrap(), variants.len());
    }

    #[test]
    fn test_separator_in_names_does_not_collide() {
        let store = SledStore::open_temp().unwrap();
        let mut a = sample("B/C", 20_150_601, 1.0);
        a.identity.group = "A".to_string();
        let mut b = sample("C", 20_150_601, 1.0);
        b.identity.group = "A/B".to_string();
        store.insert_samples("tenant", "sites", &[a, b]).unwrap();
        assert_eq!(store.count("tenant", "sites").unwrap(), 2);
    }

    #[test]
    fn test_range_end_is_inclusive() {
        let store = SledStore::open_temp().unwrap();
        let samples = vec![sample("ST01", 20_150_630, 1.0), sample("ST01", 20_150_701, 1.0)];
        store.insert_samples("tenant", "sites", &samples).unwrap();
        let p = pipeline("2015-06-30T00:00:00Z", "2015-06-30T23:00:00Z", Granularity::Daily);
        let rows = store.execute_pipeline("tenant", "sites", &p.stages).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket.value, 20_150_630);
    }

    #[test]
    fn test_missing_tree_yields_no_rows() {
        let store = SledStore::open_temp().unwrap();
        let p = pipeline("2015-06-01T00:00:00Z", "2015-06-30T00:00:00Z", Granularity::Daily);
        assert!(store.execute_pipeline("other", "sites", &p.stages).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_persists_samples() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store
                .insert_samples("tenant", "sites", &[sample("ST01", 20_150_601, 1.0)])
                .unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.count("tenant", "sites").unwrap(), 1);
    }
}
