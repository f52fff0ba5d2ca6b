//! Response formatting
//!
//! XML shape:
//!
//! ```xml
//! <root>
//!   <group name="GROUP_A" type="GROUP">
//!     <results timestamp="2015-06-22" availability="68.13896116893515" reliability="50.413931144915935"/>
//!   </group>
//! </root>
//! ```
//!
//! Site-level groups also carry a `group` attribute naming their parent.
//! JSON mirrors the same tree under a `root` array. Numbers are written
//! with Rust's shortest round-trip formatting.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::{json, Map, Value};

use crate::types::{OutputFormat, ResultTree, TimestampFormat};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("xml write failed: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("json write failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render `tree` in `format`, stamping buckets with `timestamps`.
pub fn render(
    tree: &ResultTree,
    timestamps: TimestampFormat,
    format: OutputFormat,
) -> Result<Vec<u8>, RenderError> {
    match format {
        OutputFormat::Xml => render_xml(tree, timestamps),
        OutputFormat::Json => render_json(tree, timestamps),
    }
}

fn xml_writer() -> Writer<Cursor<Vec<u8>>> {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

fn render_xml(tree: &ResultTree, timestamps: TimestampFormat) -> Result<Vec<u8>, RenderError> {
    let mut writer = xml_writer();
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("root")))?;

    let type_label = tree.level.type_label();
    for group in tree.groups.iter().filter(|g| !g.results.is_empty()) {
        let mut start = BytesStart::new("group");
        start.push_attribute(("name", group.name.as_str()));
        start.push_attribute(("type", type_label));
        if let Some(parent) = &group.parent {
            start.push_attribute(("group", parent.as_str()));
        }
        writer.write_event(Event::Start(start))?;

        for record in &group.results {
            let timestamp = timestamps.render(record.bucket);
            let availability = record.availability.to_string();
            let reliability = record.reliability.to_string();
            let mut results = BytesStart::new("results");
            results.push_attribute(("timestamp", timestamp.as_str()));
            results.push_attribute(("availability", availability.as_str()));
            results.push_attribute(("reliability", reliability.as_str()));
            writer.write_event(Event::Empty(results))?;
        }

        writer.write_event(Event::End(BytesEnd::new("group")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("root")))?;
    Ok(writer.into_inner().into_inner())
}

fn render_json(tree: &ResultTree, timestamps: TimestampFormat) -> Result<Vec<u8>, RenderError> {
    let type_label = tree.level.type_label();
    let groups: Vec<Value> = tree
        .groups
        .iter()
        .filter(|g| !g.results.is_empty())
        .map(|group| {
            let mut node = Map::new();
            node.insert("name".into(), json!(group.name));
            node.insert("type".into(), json!(type_label));
            if let Some(parent) = &group.parent {
                node.insert("group".into(), json!(parent));
            }
            let results: Vec<Value> = group
                .results
                .iter()
                .map(|r| {
                    json!({
                        "timestamp": timestamps.render(r.bucket),
                        "availability": r.availability.to_string(),
                        "reliability": r.reliability.to_string(),
                    })
                })
                .collect();
            node.insert("results".into(), Value::Array(results));
            Value::Object(node)
        })
        .collect();

    Ok(serde_json::to_vec_pretty(&json!({ "root": groups }))?)
}

/// Error body for a failed request, in the caller's format.
pub fn render_error(message: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_vec_pretty(&json!({
            "root": { "error": message }
        }))?),
        OutputFormat::Xml => {
            let mut writer = xml_writer();
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
            writer.write_event(Event::Start(BytesStart::new("root")))?;
            writer.write_event(Event::Start(BytesStart::new("error")))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new("error")))?;
            writer.write_event(Event::End(BytesEnd::new("root")))?;
            Ok(writer.into_inner().into_inner())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Granularity, GroupNode, Level, ResultRecord};

    fn tree(level: Level, granularity: Granularity, parent: Option<&str>) -> ResultTree {
        let bucket = granularity.bucket(20_150_622);
        ResultTree {
            level,
            groups: vec![
                GroupNode {
                    name: "GROUP_A".to_string(),
                    parent: parent.map(str::to_string),
                    results: vec![ResultRecord {
                        bucket,
                        availability: 68.138_961_168_935_15,
                        reliability: 50.413_931_144_915_935,
                    }],
                },
                GroupNode {
                    name: "GROUP_Z".to_string(),
                    parent: None,
                    results: Vec::new(),
                },
            ],
        }
    }

    fn xml(tree: &ResultTree, granularity: Granularity) -> String {
        let bytes = render(tree, TimestampFormat::for_granularity(granularity), OutputFormat::Xml).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn xml_daily_record() {
        let out = xml(&tree(Level::Supergroup, Granularity::Daily, None), Granularity::Daily);
        assert!(out.contains(r#"<group name="GROUP_A" type="GROUP">"#));
        assert!(out.contains(
            r#"<results timestamp="2015-06-22" availability="68.13896116893515" reliability="50.413931144915935"/>"#
        ));
        assert!(!out.contains("GROUP_Z"));
        assert!(out.trim_end().ends_with("</root>"));
    }

    #[test]
    fn xml_monthly_timestamp_has_no_day() {
        let out = xml(&tree(Level::Group, Granularity::Monthly, None), Granularity::Monthly);
        assert!(out.contains(r#"timestamp="2015-06""#));
        assert!(out.contains(r#"type="NGI""#));
    }

    #[test]
    fn xml_site_nodes_carry_parent_group() {
        let out = xml(&tree(Level::Site, Granularity::Daily, Some("NGI_1")), Granularity::Daily);
        assert!(out.contains(r#"type="SITE" group="NGI_1""#));
    }

    #[test]
    fn xml_attributes_are_escaped() {
        let mut t = tree(Level::Supergroup, Granularity::Daily, None);
        t.groups[0].name = "A&B".to_string();
        let out = xml(&t, Granularity::Daily);
        assert!(out.contains(r#"name="A&amp;B""#));
    }

    #[test]
    fn empty_tree_renders_bare_root() {
        let out = xml(&ResultTree::empty(Level::Site), Granularity::Daily);
        assert!(out.contains("<root>"));
        assert!(!out.contains("<group"));
    }

    #[test]
    fn json_uses_string_values() {
        let t = tree(Level::Supergroup, Granularity::Daily, None);
        let bytes = render(&t, TimestampFormat::for_granularity(Granularity::Daily), OutputFormat::Json).unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        let groups = v["root"].as_array().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["name"], "GROUP_A");
        assert_eq!(groups[0]["type"], "GROUP");
        assert_eq!(groups[0]["results"][0]["timestamp"], "2015-06-22");
        assert_eq!(groups[0]["results"][0]["availability"], "68.13896116893515");
        assert!(groups[0].get("group").is_none());
    }

    #[test]
    fn error_bodies() {
        let xml = String::from_utf8(render_error("store <down>", OutputFormat::Xml).unwrap()).unwrap();
        assert!(xml.contains("<error>store &lt;down&gt;</error>"));

        let json: Value = serde_json::from_slice(&render_error("store down", OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["root"]["error"], "store down");
    }
}
