//! Lowering of typed stages into the document-store JSON pipeline dialect
//!
//! For stores that execute `$match` / `$project` / `$group` / `$sort`
//! pipelines natively. Field names follow `MetricSample`'s serde names.

use serde_json::{json, Map, Value};

use crate::formula::EPSILON;
use crate::query::pipeline::IDENTITY_DIMENSIONS;
use crate::query::{Filter, Grouping, Projection, SortKey, Stage};
use crate::types::Granularity;

/// Lower a whole pipeline.
pub fn lower(stages: &[Stage]) -> Value {
    Value::Array(stages.iter().map(lower_stage).collect())
}

pub fn lower_stage(stage: &Stage) -> Value {
    match stage {
        Stage::Match(filter) => json!({ "$match": lower_filter(filter) }),
        Stage::Project(projection) => json!({ "$project": lower_projection(projection) }),
        Stage::Group(grouping) => json!({ "$group": lower_grouping(grouping) }),
        Stage::Sort(keys) => json!({ "$sort": lower_sort(keys) }),
    }
}

fn lower_filter(filter: &Filter) -> Value {
    let mut doc = Map::new();

    match filter.range {
        // Stored dates are full days; widen month bounds to cover them
        Some(range) if !range.is_empty() => {
            let (start, end) = match range.granularity {
                Granularity::Daily => (u64::from(range.start), u64::from(range.end)),
                Granularity::Monthly => (
                    u64::from(range.start) * 100 + 1,
                    u64::from(range.end) * 100 + 31,
                ),
            };
            doc.insert("date".into(), json!({ "$gte": start, "$lte": end }));
        }
        // Unsatisfiable: an empty range no document can fall into
        _ => {
            doc.insert("date".into(), json!({ "$gte": 1, "$lte": 0 }));
        }
    }

    doc.insert("profile".into(), json!({ "$in": filter.profiles }));
    if let Some(namespaces) = &filter.namespaces {
        doc.insert("namespace".into(), json!({ "$in": namespaces }));
    }
    if let Some(groups) = &filter.groups {
        doc.insert("group".into(), json!({ "$in": groups }));
    }
    if let Some(supergroups) = &filter.supergroups {
        doc.insert("supergroup".into(), json!({ "$in": supergroups }));
    }
    doc.insert("infrastructure".into(), json!(filter.infrastructure));
    doc.insert("certification".into(), json!(filter.certification));
    doc.insert("production".into(), json!(filter.production.as_str()));
    doc.insert("monitored".into(), json!(filter.monitored.as_str()));

    Value::Object(doc)
}

fn lower_projection(projection: &Projection) -> Value {
    let mut doc = Map::new();
    match *projection {
        Projection::TruncateDate { digits } => {
            doc.insert("date".into(), json!({ "$substr": ["$date", 0, digits] }));
            for dim in IDENTITY_DIMENSIONS {
                doc.insert(dim.field().into(), json!(1));
            }
            for field in [
                "uptime",
                "downtime",
                "unknown",
                "weight",
                "availability",
                "reliability",
            ] {
                doc.insert(field.into(), json!(1));
            }
        }
        Projection::Ratios => {
            doc.insert("date".into(), json!("$_id.date"));
            for dim in IDENTITY_DIMENSIONS {
                doc.insert(dim.field().into(), json!(format!("$_id.{}", dim.field())));
            }
            for field in ["uptime", "downtime", "unknown", "weight"] {
                doc.insert(field.into(), json!(format!("$avg_{field}")));
            }
            let unit = 1.0 + EPSILON;
            let available = json!({ "$subtract": [unit, "$avg_unknown"] });
            doc.insert(
                "availability".into(),
                json!({ "$multiply": [{ "$divide": ["$avg_uptime", available] }, 100] }),
            );
            doc.insert(
                "reliability".into(),
                json!({ "$multiply": [
                    { "$divide": ["$avg_uptime", { "$subtract": [available, "$avg_downtime"] }] },
                    100
                ] }),
            );
        }
    }
    Value::Object(doc)
}

fn lower_grouping(grouping: &Grouping) -> Value {
    let mut id = Map::new();
    id.insert(
        "date".into(),
        json!({ "$substr": ["$date", 0, grouping.bucket_digits] }),
    );
    for dim in &grouping.keys {
        id.insert(dim.field().into(), json!(format!("${}", dim.field())));
    }

    let mut doc = Map::new();
    doc.insert("_id".into(), Value::Object(id));
    for metric in &grouping.averages {
        doc.insert(
            format!("avg_{}", metric.field()),
            json!({ "$avg": format!("${}", metric.field()) }),
        );
    }
    Value::Object(doc)
}

fn lower_sort(keys: &[SortKey]) -> Value {
    let mut doc = Map::new();
    for key in keys {
        doc.insert(
            key.dimension.field().into(),
            json!(if key.ascending { 1 } else { -1 }),
        );
    }
    Value::Object(doc)
}
