//! Request normalization and filter construction
//!
//! `ReportRequest` holds the raw query parameters as received. It is
//! normalized into a `ReportQuery` (defaults applied, lists sorted) which
//! doubles as the canonical cache input, and from there into a `Filter`.

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::{
    Flag, Granularity, Identity, Level, OutputFormat, DEFAULT_CERTIFICATION,
    DEFAULT_INFRASTRUCTURE,
};

/// W3C / Zulu timestamp form accepted for `start_time` and `end_time`.
pub const ZULU_FORM: &str = "%Y-%m-%dT%H:%M:%SZ";

// ============================================================================
// Raw Request
// ============================================================================

/// Query parameters as parsed by the HTTP layer.
///
/// List-valued parameters (`profile`, `namespace`, `group_name`) are
/// comma-separated.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub granularity: Option<String>,
    pub profile: Option<String>,
    pub namespace: Option<String>,
    pub group_name: Option<String>,
    pub infrastructure: Option<String>,
    pub production: Option<String>,
    pub monitored: Option<String>,
    pub certification: Option<String>,
    pub format: Option<String>,
}

impl ReportRequest {
    /// Build a request from decoded query pairs in arrival order.
    ///
    /// List parameters may repeat (`group_name=A&group_name=B`) and each
    /// occurrence may itself be comma-separated. Other parameters keep their
    /// first occurrence. Unknown names are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut request = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "profile" | "availability_profile" => {
                    append_list(&mut request.profile, value);
                    continue;
                }
                "namespace" => {
                    append_list(&mut request.namespace, value);
                    continue;
                }
                "group_name" => {
                    append_list(&mut request.group_name, value);
                    continue;
                }
                "start_time" => &mut request.start_time,
                "end_time" => &mut request.end_time,
                "granularity" => &mut request.granularity,
                "infrastructure" => &mut request.infrastructure,
                "production" => &mut request.production,
                "monitored" => &mut request.monitored,
                "certification" => &mut request.certification,
                "format" => &mut request.format,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        request
    }
}

fn append_list(slot: &mut Option<String>, value: String) {
    match slot {
        Some(existing) => {
            existing.push(',');
            existing.push_str(&value);
        }
        None => *slot = Some(value),
    }
}

// ============================================================================
// Normalized Query
// ============================================================================

/// Normalized request: the canonical input for both filtering and caching.
///
/// Requests that differ only in parameter order or in default-equivalent
/// values normalize to equal queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportQuery {
    pub start_time: String,
    pub end_time: String,
    /// `None` when the granularity parameter was not recognized
    pub granularity: Option<Granularity>,
    pub profiles: BTreeSet<String>,
    pub namespaces: BTreeSet<String>,
    pub group_names: BTreeSet<String>,
    pub infrastructure: String,
    pub certification: String,
    pub production: Flag,
    pub monitored: Flag,
    pub format: OutputFormat,
}

impl ReportQuery {
    pub fn normalize(request: &ReportRequest) -> Self {
        Self {
            start_time: request.start_time.as_deref().unwrap_or_default().trim().to_string(),
            end_time: request.end_time.as_deref().unwrap_or_default().trim().to_string(),
            granularity: Granularity::parse(request.granularity.as_deref()),
            profiles: split_list(request.profile.as_deref()),
            namespaces: split_list(request.namespace.as_deref()),
            group_names: split_list(request.group_name.as_deref()),
            infrastructure: or_default(request.infrastructure.as_deref(), DEFAULT_INFRASTRUCTURE),
            certification: or_default(request.certification.as_deref(), DEFAULT_CERTIFICATION),
            production: Flag::from_param(request.production.as_deref()),
            monitored: Flag::from_param(request.monitored.as_deref()),
            format: OutputFormat::parse(request.format.as_deref()),
        }
    }
}

fn split_list(value: Option<&str>) -> BTreeSet<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Inclusive bucket range at one granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub start: u32,
    pub end: u32,
    pub granularity: Granularity,
}

impl BucketRange {
    pub fn contains(&self, date: u64) -> bool {
        let bucket = self.granularity.truncate(date);
        bucket >= self.start && bucket <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Store-agnostic predicate over samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// `None` when the time range or granularity could not be parsed
    pub range: Option<BucketRange>,
    pub profiles: BTreeSet<String>,
    pub namespaces: Option<BTreeSet<String>>,
    pub groups: Option<BTreeSet<String>>,
    pub supergroups: Option<BTreeSet<String>>,
    pub infrastructure: String,
    pub certification: String,
    pub production: Flag,
    pub monitored: Flag,
}

impl Filter {
    /// Build the filter for a normalized query at the given level.
    ///
    /// Group names constrain the NGI group for site and group reports and
    /// the supergroup for supergroup reports.
    pub fn build(query: &ReportQuery, level: Level) -> Self {
        let range = query.granularity.and_then(|granularity| {
            let start = parse_zulu_bucket(&query.start_time, granularity)?;
            let end = parse_zulu_bucket(&query.end_time, granularity)?;
            Some(BucketRange {
                start,
                end,
                granularity,
            })
        });

        if range.is_none() {
            tracing::debug!(
                start = %query.start_time,
                end = %query.end_time,
                granularity = ?query.granularity,
                "Unparsable time range, filter matches nothing"
            );
        }

        let names = non_empty(&query.group_names);
        let (groups, supergroups) = match level {
            Level::Site | Level::Group => (names, None),
            Level::Supergroup => (None, names),
        };

        Self {
            range,
            profiles: query.profiles.clone(),
            namespaces: non_empty(&query.namespaces),
            groups,
            supergroups,
            infrastructure: query.infrastructure.clone(),
            certification: query.certification.clone(),
            production: query.production,
            monitored: query.monitored,
        }
    }

    /// True when no sample can match: bad range, inverted range, or no profile.
    pub fn is_unsatisfiable(&self) -> bool {
        match self.range {
            None => true,
            Some(range) => range.is_empty() || self.profiles.is_empty(),
        }
    }

    pub fn granularity(&self) -> Option<Granularity> {
        self.range.map(|r| r.granularity)
    }

    /// Evaluate the predicate against one sample's identity and date.
    pub fn matches(&self, identity: &Identity, date: u64) -> bool {
        let Some(range) = self.range else {
            return false;
        };
        range.contains(date)
            && self.profiles.contains(&identity.profile)
            && in_optional(self.namespaces.as_ref(), &identity.namespace)
            && in_optional(self.groups.as_ref(), &identity.group)
            && in_optional(self.supergroups.as_ref(), &identity.supergroup)
            && identity.infrastructure == self.infrastructure
            && identity.certification == self.certification
            && identity.production == self.production
            && identity.monitored == self.monitored
    }
}

fn non_empty(set: &BTreeSet<String>) -> Option<BTreeSet<String>> {
    (!set.is_empty()).then(|| set.clone())
}

fn in_optional(set: Option<&BTreeSet<String>>, value: &str) -> bool {
    set.map_or(true, |s| s.contains(value))
}

/// Parse a Zulu timestamp and truncate it to a bucket integer.
fn parse_zulu_bucket(value: &str, granularity: Granularity) -> Option<u32> {
    let instant = NaiveDateTime::parse_from_str(value, ZULU_FORM).ok()?;
    let date = instant.date();
    let year = u32::try_from(date.year()).ok()?;
    let ymd = u64::from(year) * 10_000 + u64::from(date.month()) * 100 + u64::from(date.day());
    Some(granularity.truncate(ymd))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ReportRequest {
        ReportRequest {
            start_time: Some("2015-06-20T12:00:00Z".to_string()),
            end_time: Some("2015-06-26T23:00:00Z".to_string()),
            profile: Some("ap1".to_string()),
            ..ReportRequest::default()
        }
    }

    fn identity(site: &str, group: &str) -> Identity {
        Identity {
            site: site.to_string(),
            group: group.to_string(),
            supergroup: "GROUP_A".to_string(),
            profile: "ap1".to_string(),
            namespace: "ops".to_string(),
            infrastructure: DEFAULT_INFRASTRUCTURE.to_string(),
            certification: DEFAULT_CERTIFICATION.to_string(),
            production: Flag::Y,
            monitored: Flag::Y,
        }
    }

    #[test]
    fn daily_range_is_inclusive() {
        let query = ReportQuery::normalize(&request());
        let filter = Filter::build(&query, Level::Site);
        let range = filter.range.unwrap();
        assert_eq!(range.start, 20_150_620);
        assert_eq!(range.end, 20_150_626);

        let id = identity("ST01", "NGI_A");
        assert!(filter.matches(&id, 20_150_620));
        assert!(filter.matches(&id, 20_150_626));
        assert!(!filter.matches(&id, 20_150_627));
        assert!(!filter.matches(&id, 20_150_619));
    }

    #[test]
    fn monthly_range_truncates_to_month() {
        let mut req = request();
        req.granularity = Some("monthly".to_string());
        let filter = Filter::build(&ReportQuery::normalize(&req), Level::Site);
        let range = filter.range.unwrap();
        assert_eq!((range.start, range.end), (201_506, 201_506));

        let id = identity("ST01", "NGI_A");
        assert!(filter.matches(&id, 20_150_601));
        assert!(filter.matches(&id, 20_150_630));
        assert!(!filter.matches(&id, 20_150_701));
    }

    #[test]
    fn unparsable_time_is_unsatisfiable_not_error() {
        let mut req = request();
        req.start_time = Some("2015-06-20 12:00".to_string());
        let filter = Filter::build(&ReportQuery::normalize(&req), Level::Site);
        assert!(filter.is_unsatisfiable());
        assert!(!filter.matches(&identity("ST01", "NGI_A"), 20_150_622));
    }

    #[test]
    fn unknown_granularity_is_unsatisfiable() {
        let mut req = request();
        req.granularity = Some("hourly".to_string());
        let filter = Filter::build(&ReportQuery::normalize(&req), Level::Site);
        assert!(filter.is_unsatisfiable());
    }

    #[test]
    fn inverted_range_is_unsatisfiable() {
        let mut req = request();
        req.start_time = Some("2015-07-01T00:00:00Z".to_string());
        let filter = Filter::build(&ReportQuery::normalize(&req), Level::Site);
        assert!(filter.is_unsatisfiable());
    }

    #[test]
    fn fixed_constraints_always_applied() {
        let filter = Filter::build(&ReportQuery::normalize(&request()), Level::Site);
        assert_eq!(filter.infrastructure, "Production");
        assert_eq!(filter.certification, "Certified");
        assert_eq!(filter.production, Flag::Y);
        assert_eq!(filter.monitored, Flag::Y);

        let mut id = identity("ST01", "NGI_A");
        id.production = Flag::N;
        assert!(!filter.matches(&id, 20_150_622));
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut req = request();
        req.infrastructure = Some("Test".to_string());
        req.production = Some("false".to_string());
        let filter = Filter::build(&ReportQuery::normalize(&req), Level::Site);
        assert_eq!(filter.infrastructure, "Test");
        assert_eq!(filter.production, Flag::N);
    }

    #[test]
    fn optional_sets_are_unconstrained_when_absent() {
        let filter = Filter::build(&ReportQuery::normalize(&request()), Level::Group);
        assert!(filter.namespaces.is_none());
        assert!(filter.groups.is_none());
        assert!(filter.matches(&identity("ST09", "ANY_NGI"), 20_150_622));
    }

    #[test]
    fn group_names_follow_level() {
        let mut req = request();
        req.group_name = Some("GROUP_A, NGI_B".to_string());
        let query = ReportQuery::normalize(&req);

        let group_filter = Filter::build(&query, Level::Group);
        assert!(group_filter.groups.is_some());
        assert!(group_filter.supergroups.is_none());

        let super_filter = Filter::build(&query, Level::Supergroup);
        assert!(super_filter.groups.is_none());
        assert!(super_filter.matches(&identity("ST01", "NGI_X"), 20_150_622));
    }

    #[test]
    fn normalization_ignores_order_and_defaults() {
        let mut a = request();
        a.profile = Some("ap2,ap1".to_string());
        let mut b = request();
        b.profile = Some(" ap1 , ap2".to_string());
        b.production = Some("true".to_string());
        b.infrastructure = Some("Production".to_string());
        assert_eq!(ReportQuery::normalize(&a), ReportQuery::normalize(&b));
    }

    #[test]
    fn missing_profile_matches_nothing() {
        let mut req = request();
        req.profile = None;
        let filter = Filter::build(&ReportQuery::normalize(&req), Level::Site);
        assert!(filter.is_unsatisfiable());
    }

    fn pairs(query: &[(&str, &str)]) -> Vec<(String, String)> {
        query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn repeated_list_params_accumulate() {
        let req = ReportRequest::from_pairs(pairs(&[
            ("group_name", "GROUP_B"),
            ("availability_profile", "ap1"),
            ("group_name", "GROUP_A,GROUP_C"),
            ("format", "json"),
            ("format", "xml"),
        ]));
        let query = ReportQuery::normalize(&req);
        let groups: Vec<_> = query.group_names.iter().map(String::as_str).collect();
        assert_eq!(groups, vec!["GROUP_A", "GROUP_B", "GROUP_C"]);
        assert_eq!(query.profiles.len(), 1);
        assert_eq!(query.format, OutputFormat::Json);
    }

    #[test]
    fn repeated_and_comma_forms_normalize_equal() {
        let repeated = ReportRequest::from_pairs(pairs(&[("group_name", "A"), ("group_name", "B")]));
        let comma = ReportRequest::from_pairs(pairs(&[("group_name", "B,A"), ("colour", "red")]));
        assert_eq!(ReportQuery::normalize(&repeated), ReportQuery::normalize(&comma));
    }
}
