//! Aggregation pipeline construction
//!
//! Pipelines are built from typed stages; a store adapter either evaluates
//! them directly or lowers them into its own wire format.
//!
//! Row order out of a pipeline is a contract: rows arrive grouped by entity
//! hierarchy, then ascending by bucket.

use crate::query::filter::Filter;
use crate::types::{Granularity, TimestampFormat};

/// Identifying dimension of a row, usable as a group or sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Namespace,
    Profile,
    Supergroup,
    Group,
    Site,
    Infrastructure,
    Certification,
    Production,
    Monitored,
    Bucket,
}

impl Dimension {
    /// Field name used by the wire adapter.
    pub fn field(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Profile => "profile",
            Self::Supergroup => "supergroup",
            Self::Group => "group",
            Self::Site => "site",
            Self::Infrastructure => "infrastructure",
            Self::Certification => "certification",
            Self::Production => "production",
            Self::Monitored => "monitored",
            Self::Bucket => "date",
        }
    }
}

/// Numeric field averaged by a group stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Uptime,
    Downtime,
    Unknown,
    Weight,
}

impl Metric {
    pub fn field(self) -> &'static str {
        match self {
            Self::Uptime => "uptime",
            Self::Downtime => "downtime",
            Self::Unknown => "unknown",
            Self::Weight => "weight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep the first `digits` digits of the date; pass everything else through.
    TruncateDate { digits: u8 },
    /// Compute availability and reliability from the averaged fractions.
    Ratios,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub bucket_digits: u8,
    pub keys: Vec<Dimension>,
    pub averages: Vec<Metric>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub dimension: Dimension,
    pub ascending: bool,
}

impl SortKey {
    pub const fn asc(dimension: Dimension) -> Self {
        Self {
            dimension,
            ascending: true,
        }
    }
}

/// One typed aggregation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Match(Filter),
    Project(Projection),
    Group(Grouping),
    Sort(Vec<SortKey>),
}

/// Every identifying dimension, in the order a group stage keys on them.
pub const IDENTITY_DIMENSIONS: [Dimension; 9] = [
    Dimension::Infrastructure,
    Dimension::Certification,
    Dimension::Production,
    Dimension::Monitored,
    Dimension::Namespace,
    Dimension::Site,
    Dimension::Profile,
    Dimension::Group,
    Dimension::Supergroup,
];

/// A built pipeline together with the timestamp format its buckets use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub granularity: Granularity,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn build(filter: &Filter, granularity: Granularity) -> Self {
        let stages = match granularity {
            Granularity::Daily => daily(filter),
            Granularity::Monthly => monthly(filter),
        };
        Self {
            granularity,
            stages,
        }
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::for_granularity(self.granularity)
    }
}

/// Match, truncate dates to the day, sort by profile → group chain → site → day.
pub fn daily(filter: &Filter) -> Vec<Stage> {
    vec![
        Stage::Match(filter.clone()),
        Stage::Project(Projection::TruncateDate {
            digits: Granularity::Daily.digits(),
        }),
        Stage::Sort(vec![
            SortKey::asc(Dimension::Profile),
            SortKey::asc(Dimension::Supergroup),
            SortKey::asc(Dimension::Group),
            SortKey::asc(Dimension::Site),
            SortKey::asc(Dimension::Bucket),
        ]),
    ]
}

/// Match, average per month and identity, compute ratios, sort by
/// namespace → profile → group chain → site → month.
pub fn monthly(filter: &Filter) -> Vec<Stage> {
    vec![
        Stage::Match(filter.clone()),
        Stage::Group(Grouping {
            bucket_digits: Granularity::Monthly.digits(),
            keys: IDENTITY_DIMENSIONS.to_vec(),
            averages: vec![Metric::Uptime, Metric::Unknown, Metric::Downtime, Metric::Weight],
        }),
        Stage::Project(Projection::Ratios),
        Stage::Sort(vec![
            SortKey::asc(Dimension::Namespace),
            SortKey::asc(Dimension::Profile),
            SortKey::asc(Dimension::Supergroup),
            SortKey::asc(Dimension::Group),
            SortKey::asc(Dimension::Site),
            SortKey::asc(Dimension::Bucket),
        ]),
    ]
}
