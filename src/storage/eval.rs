//! In-process evaluation of typed pipeline stages
//!
//! Used by the stores that keep samples locally. Stages run in order over a
//! working set of rows; the last stage's output is returned as
//! `AggregationResult`s.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use super::StoreError;
use crate::formula;
use crate::query::{Dimension, Grouping, Metric, Projection, SortKey, Stage};
use crate::types::{AggregationResult, Bucket, Granularity, Identity, MetricSample};

/// Working row between stages.
#[derive(Debug, Clone)]
struct Row {
    identity: Identity,
    date: u64,
    bucket: Option<Bucket>,
    uptime: f64,
    downtime: f64,
    unknown: f64,
    weight: f64,
    availability: Option<f64>,
    reliability: Option<f64>,
}

impl From<MetricSample> for Row {
    fn from(sample: MetricSample) -> Self {
        Self {
            identity: sample.identity,
            date: u64::from(sample.date),
            bucket: None,
            uptime: sample.uptime,
            downtime: sample.downtime,
            unknown: sample.unknown,
            weight: sample.weight,
            availability: sample.availability,
            reliability: sample.reliability,
        }
    }
}

impl Row {
    fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Uptime => self.uptime,
            Metric::Downtime => self.downtime,
            Metric::Unknown => self.unknown,
            Metric::Weight => self.weight,
        }
    }

    fn text(&self, dimension: Dimension) -> &str {
        let id = &self.identity;
        match dimension {
            Dimension::Namespace => &id.namespace,
            Dimension::Profile => &id.profile,
            Dimension::Supergroup => &id.supergroup,
            Dimension::Group => &id.group,
            Dimension::Site => &id.site,
            Dimension::Infrastructure => &id.infrastructure,
            Dimension::Certification => &id.certification,
            Dimension::Production => id.production.as_str(),
            Dimension::Monitored => id.monitored.as_str(),
            Dimension::Bucket => "",
        }
    }

    fn bucket_value(&self) -> u64 {
        self.bucket.map_or(self.date, |b| u64::from(b.value))
    }

    fn compare(&self, other: &Self, dimension: Dimension) -> Ordering {
        match dimension {
            Dimension::Bucket => self.bucket_value().cmp(&other.bucket_value()),
            _ => self.text(dimension).cmp(other.text(dimension)),
        }
    }

    fn into_result(self) -> AggregationResult {
        let bucket = self.bucket.unwrap_or_else(|| Granularity::Daily.bucket(self.date));
        AggregationResult {
            identity: self.identity,
            bucket,
            uptime: self.uptime,
            downtime: self.downtime,
            unknown: self.unknown,
            weight: self.weight,
            availability: self.availability,
            reliability: self.reliability,
        }
    }
}

/// Run `stages` over `samples` and materialize the result rows.
pub fn run_pipeline<I>(samples: I, stages: &[Stage]) -> Result<Vec<AggregationResult>, StoreError>
where
    I: IntoIterator<Item = MetricSample>,
{
    let mut rows: Vec<Row> = samples.into_iter().map(Row::from).collect();

    for stage in stages {
        rows = match stage {
            Stage::Match(filter) => rows
                .into_iter()
                .filter(|row| filter.matches(&row.identity, row.date))
                .collect(),
            Stage::Project(projection) => project(rows, projection)?,
            Stage::Group(grouping) => group(rows, grouping)?,
            Stage::Sort(keys) => {
                sort(&mut rows, keys);
                rows
            }
        };
    }

    Ok(rows.into_iter().map(Row::into_result).collect())
}

fn granularity_for(digits: u8) -> Result<Granularity, StoreError> {
    match digits {
        8 => Ok(Granularity::Daily),
        6 => Ok(Granularity::Monthly),
        other => Err(StoreError::InvalidPipeline(format!(
            "unsupported bucket width: {other} digits"
        ))),
    }
}

fn project(mut rows: Vec<Row>, projection: &Projection) -> Result<Vec<Row>, StoreError> {
    match *projection {
        Projection::TruncateDate { digits } => {
            let granularity = granularity_for(digits)?;
            for row in &mut rows {
                row.bucket = Some(granularity.bucket(row.date));
            }
        }
        Projection::Ratios => {
            for row in &mut rows {
                match formula::compute(row.uptime, row.unknown, row.downtime) {
                    Ok(ratios) => {
                        row.availability = Some(ratios.availability);
                        row.reliability = Some(ratios.reliability);
                    }
                    Err(e) => {
                        debug!(site = %row.identity.site, error = %e, "Ratio projection left empty");
                        row.availability = None;
                        row.reliability = None;
                    }
                }
            }
        }
    }
    Ok(rows)
}

#[derive(Default)]
struct Averages {
    count: u32,
    sums: [f64; 4],
}

fn metric_slot(metric: Metric) -> usize {
    match metric {
        Metric::Uptime => 0,
        Metric::Downtime => 1,
        Metric::Unknown => 2,
        Metric::Weight => 3,
    }
}

fn group(rows: Vec<Row>, grouping: &Grouping) -> Result<Vec<Row>, StoreError> {
    let granularity = granularity_for(grouping.bucket_digits)?;

    // Key: bucket + the selected dimension values, in key order
    let mut groups: BTreeMap<(u32, Vec<String>), (Row, Averages)> = BTreeMap::new();

    for row in rows {
        let bucket = granularity.bucket(row.date);
        let key_values = grouping
            .keys
            .iter()
            .map(|d| row.text(*d).to_string())
            .collect();
        let entry = groups
            .entry((bucket.value, key_values))
            .or_insert_with(|| {
                let mut template = row.clone();
                template.bucket = Some(bucket);
                (template, Averages::default())
            });
        entry.1.count += 1;
        for metric in &grouping.averages {
            entry.1.sums[metric_slot(*metric)] += row.metric(*metric);
        }
    }

    Ok(groups
        .into_values()
        .map(|(mut row, averages)| {
            let n = f64::from(averages.count);
            for metric in &grouping.averages {
                let mean = averages.sums[metric_slot(*metric)] / n;
                match metric {
                    Metric::Uptime => row.uptime = mean,
                    Metric::Downtime => row.downtime = mean,
                    Metric::Unknown => row.unknown = mean,
                    Metric::Weight => row.weight = mean,
                }
            }
            // Per-day values do not survive grouping
            row.availability = None;
            row.reliability = None;
            row
        })
        .collect())
}

fn sort(rows: &mut [Row], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ord = a.compare(b, key.dimension);
                if key.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}
