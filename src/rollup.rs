//! Weighted rollup of per-site rows into group and supergroup results
//!
//! For each (parent, bucket) pair:
//!
//! ```text
//! rolled = Σ((weight_i + 1) × value_i) / Σ(weight_i + 1)
//! ```
//!
//! computed separately for availability and reliability over the
//! constituents actually present in that bucket. Every kept site weight is
//! offset by one before it enters the sums, which is what reproduces the
//! published report values. Constituents without a positive finite weight
//! are left out of both sums; a pair whose constituents all drop out is not
//! emitted. Missing buckets are never imputed.
//!
//! Parents are keyed by name only. A report over several profiles therefore
//! counts each profile's row for a site as its own constituent of the same
//! parent mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{AggregationResult, Bucket, GroupNode, Identity, Level, ResultRecord, ResultTree};

/// How supergroup results are weighted when groups sit in between.
///
/// Both policies give the same numbers when every group keeps the summed
/// weight of its sites; they differ only in floating-point rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupPolicy {
    /// Roll sites straight up to the target level using site weights.
    #[default]
    FlatSiteWeights,
    /// Roll sites into groups, then groups into supergroups weighted by the
    /// sum of their sites' weights.
    RegeneratedWeights,
}

/// One rolled-up point with the total weight behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedPoint {
    pub bucket: Bucket,
    pub availability: f64,
    pub reliability: f64,
    pub weight: f64,
}

/// Rolled-up points for one parent entity, ascending by bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub parent: Option<String>,
    pub points: Vec<WeightedPoint>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    availability: f64,
    reliability: f64,
    weight: f64,
}

impl Accumulator {
    fn add(&mut self, weight: f64, availability: f64, reliability: f64) {
        self.availability += weight * availability;
        self.reliability += weight * reliability;
        self.weight += weight;
    }

    fn finish(self, bucket: Bucket) -> Option<WeightedPoint> {
        (self.weight > 0.0).then(|| WeightedPoint {
            bucket,
            availability: self.availability / self.weight,
            reliability: self.reliability / self.weight,
            weight: self.weight,
        })
    }
}

/// Added to every kept site weight before averaging.
pub const WEIGHT_OFFSET: f64 = 1.0;

fn usable_weight(weight: f64) -> Option<f64> {
    (weight.is_finite() && weight > 0.0).then_some(weight)
}

/// Weight a site row carries into a rollup, or `None` when it is excluded.
pub fn site_weight(weight: f64) -> Option<f64> {
    usable_weight(weight).map(|w| w + WEIGHT_OFFSET)
}

type Buckets = BTreeMap<Bucket, Accumulator>;

fn into_series(parents: BTreeMap<(String, Option<String>), Buckets>) -> Vec<Series> {
    parents
        .into_iter()
        .filter_map(|((name, parent), buckets)| {
            let points: Vec<_> = buckets
                .into_iter()
                .filter_map(|(bucket, acc)| acc.finish(bucket))
                .collect();
            (!points.is_empty()).then_some(Series {
                name,
                parent,
                points,
            })
        })
        .collect()
}

/// Roll rows up to the parent chosen by `key`, which returns the parent's
/// name and, optionally, the name of the level above it. Points carry the
/// summed offset weights of their constituents.
pub fn rollup_rows<F>(rows: &[AggregationResult], key: F) -> Vec<Series>
where
    F: Fn(&Identity) -> (String, Option<String>),
{
    let mut parents: BTreeMap<(String, Option<String>), Buckets> = BTreeMap::new();

    for row in rows {
        let (Some(availability), Some(reliability)) = (row.availability, row.reliability) else {
            continue;
        };
        let Some(weight) = site_weight(row.weight) else {
            debug!(site = %row.identity.site, bucket = %row.bucket, weight = row.weight, "Excluded from rollup");
            continue;
        };
        parents
            .entry(key(&row.identity))
            .or_default()
            .entry(row.bucket)
            .or_default()
            .add(weight, availability, reliability);
    }

    into_series(parents)
}

/// Roll child series up to their `parent`, weighting each point by the
/// total weight it already carries. No further offset is applied.
pub fn rollup_series(children: &[Series]) -> Vec<Series> {
    let mut parents: BTreeMap<(String, Option<String>), Buckets> = BTreeMap::new();

    for child in children {
        let Some(parent) = &child.parent else {
            continue;
        };
        let buckets = parents.entry((parent.clone(), None)).or_default();
        for point in &child.points {
            if let Some(weight) = usable_weight(point.weight) {
                buckets
                    .entry(point.bucket)
                    .or_default()
                    .add(weight, point.availability, point.reliability);
            }
        }
    }

    into_series(parents)
}

/// Roll `rows` up to `level` under `policy`.
///
/// Site level reports each (site, group) as stored, one point per row.
pub fn rollup(rows: &[AggregationResult], level: Level, policy: RollupPolicy) -> Vec<Series> {
    match (level, policy) {
        (Level::Site, _) => site_series(rows),
        (Level::Group, _) => rollup_rows(rows, |id| (id.group.clone(), None)),
        (Level::Supergroup, RollupPolicy::FlatSiteWeights) => {
            rollup_rows(rows, |id| (id.supergroup.clone(), None))
        }
        (Level::Supergroup, RollupPolicy::RegeneratedWeights) => {
            let groups = rollup_rows(rows, |id| (id.group.clone(), Some(id.supergroup.clone())));
            rollup_series(&groups)
        }
    }
}

fn site_series(rows: &[AggregationResult]) -> Vec<Series> {
    let mut sites: BTreeMap<(String, String), Vec<WeightedPoint>> = BTreeMap::new();
    for row in rows {
        let (Some(availability), Some(reliability)) = (row.availability, row.reliability) else {
            continue;
        };
        sites
            .entry((row.identity.site.clone(), row.identity.group.clone()))
            .or_default()
            .push(WeightedPoint {
                bucket: row.bucket,
                availability,
                reliability,
                weight: row.weight,
            });
    }
    sites
        .into_iter()
        .map(|((site, group), mut points)| {
            points.sort_by_key(|p| p.bucket);
            Series {
                name: site,
                parent: Some(group),
                points,
            }
        })
        .collect()
}

/// Build the output tree for `level`.
pub fn build_tree(rows: &[AggregationResult], level: Level, policy: RollupPolicy) -> ResultTree {
    let groups = rollup(rows, level, policy)
        .into_iter()
        .map(|series| GroupNode {
            name: series.name,
            parent: series.parent,
            results: series
                .points
                .into_iter()
                .map(|p| ResultRecord {
                    bucket: p.bucket,
                    availability: p.availability,
                    reliability: p.reliability,
                })
                .collect(),
        })
        .collect();
    ResultTree { level, groups }
}
