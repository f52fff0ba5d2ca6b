//! Core data types for availability/reliability reporting
//!
//! - `MetricSample`: one daily observation for a site, as written by ingestion
//! - `Bucket` / `Granularity`: time-grouping keys (day or month)
//! - `AggregationResult`: one row per (entity, bucket) out of a pipeline
//! - `ResultTree`: the ordered shape handed to the response formatter

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Flags & Identity
// ============================================================================

/// Y/N flag as stored on samples (`production`, `monitored`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Flag {
    #[default]
    Y,
    N,
}

impl Flag {
    /// Map a request parameter onto a flag.
    ///
    /// Absent, empty, or the literal `"true"` map to `Y`; anything else maps to `N`.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            None | Some("" | "true") => Self::Y,
            Some(_) => Self::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Y => "Y",
            Self::N => "N",
        }
    }
}

/// Identifying dimensions of a sample or an aggregated row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub site: String,
    /// NGI / group the site belongs to
    pub group: String,
    #[serde(default)]
    pub supergroup: String,
    pub profile: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_infrastructure")]
    pub infrastructure: String,
    #[serde(default = "default_certification")]
    pub certification: String,
    #[serde(default)]
    pub production: Flag,
    #[serde(default)]
    pub monitored: Flag,
}

pub const DEFAULT_INFRASTRUCTURE: &str = "Production";
pub const DEFAULT_CERTIFICATION: &str = "Certified";

fn default_infrastructure() -> String {
    DEFAULT_INFRASTRUCTURE.to_string()
}

fn default_certification() -> String {
    DEFAULT_CERTIFICATION.to_string()
}

impl Default for Identity {
    /// Same defaults as deserializing a sample that omits the optional fields.
    fn default() -> Self {
        Self {
            site: String::new(),
            group: String::new(),
            supergroup: String::new(),
            profile: String::new(),
            namespace: String::new(),
            infrastructure: default_infrastructure(),
            certification: default_certification(),
            production: Flag::default(),
            monitored: Flag::default(),
        }
    }
}

// ============================================================================
// Samples
// ============================================================================

/// One observation for a single site on a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(flatten)]
    pub identity: Identity,
    /// `YYYYMMDD`
    pub date: u32,
    pub uptime: f64,
    pub downtime: f64,
    pub unknown: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,
}

// ============================================================================
// Time Buckets
// ============================================================================

/// Temporal grouping granularity of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    /// Parse the `granularity` parameter. Absent or empty means daily;
    /// an unrecognized value returns `None`.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None | Some("") => Some(Self::Daily),
            Some(v) if v.eq_ignore_ascii_case("daily") => Some(Self::Daily),
            Some(v) if v.eq_ignore_ascii_case("monthly") => Some(Self::Monthly),
            Some(_) => None,
        }
    }

    /// Number of leading date digits kept in a bucket.
    pub fn digits(self) -> u8 {
        match self {
            Self::Daily => 8,
            Self::Monthly => 6,
        }
    }

    /// Truncate a date integer to this granularity's leading digits.
    pub fn truncate(self, date: u64) -> u32 {
        let keep = u32::from(self.digits());
        let mut value = date;
        while digit_count(value) > keep {
            value /= 10;
        }
        u32::try_from(value).unwrap_or(u32::MAX)
    }

    pub fn bucket(self, date: u64) -> Bucket {
        Bucket {
            value: self.truncate(date),
            granularity: self,
        }
    }
}

fn digit_count(mut value: u64) -> u32 {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

/// A date truncated to day (`YYYYMMDD`) or month (`YYYYMM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket {
    pub value: u32,
    pub granularity: Granularity,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Timestamp patterns for one request, chosen from its granularity.
///
/// Passed by value from pipeline selection down to rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampFormat {
    pub granularity: Granularity,
    /// Compact pattern (`%Y%m%d` / `%Y%m`)
    pub compact: &'static str,
    /// Dashed pattern used in rendered output (`%Y-%m-%d` / `%Y-%m`)
    pub dashed: &'static str,
}

impl TimestampFormat {
    pub const fn for_granularity(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Daily => Self {
                granularity,
                compact: "%Y%m%d",
                dashed: "%Y-%m-%d",
            },
            Granularity::Monthly => Self {
                granularity,
                compact: "%Y%m",
                dashed: "%Y-%m",
            },
        }
    }

    /// Render a bucket with the dashed pattern. Buckets that do not form a
    /// calendar date fall back to their raw digits.
    pub fn render(&self, bucket: Bucket) -> String {
        debug_assert_eq!(bucket.granularity, self.granularity);
        let (year, month, day) = match self.granularity {
            Granularity::Daily => (bucket.value / 10_000, bucket.value / 100 % 100, bucket.value % 100),
            Granularity::Monthly => (bucket.value / 100, bucket.value % 100, 1),
        };
        let Ok(year) = i32::try_from(year) else {
            return bucket.value.to_string();
        };
        NaiveDate::from_ymd_opt(year, month, day).map_or_else(
            || bucket.value.to_string(),
            |date| date.format(self.dashed).to_string(),
        )
    }
}

// ============================================================================
// Hierarchy Levels
// ============================================================================

/// Level of the monitoring hierarchy a report is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Site,
    Group,
    Supergroup,
}

impl Level {
    /// Logical endpoint name, used as the cache namespace.
    pub fn endpoint_name(self) -> &'static str {
        match self {
            Self::Site => "sites",
            Self::Group => "groups",
            Self::Supergroup => "supergroups",
        }
    }

    /// Node type label in rendered output.
    pub fn type_label(self) -> &'static str {
        match self {
            Self::Site => "SITE",
            Self::Group => "NGI",
            Self::Supergroup => "GROUP",
        }
    }
}

// ============================================================================
// Output Format
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Xml,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
        }
    }
}

// ============================================================================
// Aggregation Output
// ============================================================================

/// One row per (entity, bucket) after pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    #[serde(flatten)]
    pub identity: Identity,
    pub bucket: Bucket,
    /// Up fraction (averaged over the bucket in monthly mode)
    pub uptime: f64,
    pub downtime: f64,
    pub unknown: f64,
    pub weight: f64,
    pub availability: Option<f64>,
    pub reliability: Option<f64>,
}

/// One timestamped record in the result tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultRecord {
    pub bucket: Bucket,
    pub availability: f64,
    pub reliability: f64,
}

/// A top-level node of the result tree.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub name: String,
    /// Enclosing group, set for site-level nodes only
    pub parent: Option<String>,
    pub results: Vec<ResultRecord>,
}

/// Output shape: groups sorted by name, records by ascending bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTree {
    pub level: Level,
    pub groups: Vec<GroupNode>,
}

impl ResultTree {
    pub fn empty(level: Level) -> Self {
        Self {
            level,
            groups: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.results.is_empty())
    }

    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }
}
