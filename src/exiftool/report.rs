use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::debug_log::preview;
use crate::error::{NodeError, NodeResult};

pub type TagMap = Map<String, Value>;

const REPORT_WIDTH: usize = 60;
const VALUE_PREVIEW_CHARS: usize = 100;
const UNGROUPED: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    PrettyJson,
    CompactJson,
    HumanReadable,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrettyJson => "Pretty JSON",
            Self::CompactJson => "Compact JSON",
            Self::HumanReadable => "Human Readable",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = NodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(&['-', '_'][..], " ");
        match normalized.as_str() {
            "pretty json" | "pretty" | "json" => Ok(Self::PrettyJson),
            "compact json" | "compact" => Ok(Self::CompactJson),
            "human readable" | "human" | "text" => Ok(Self::HumanReadable),
            _ => Err(NodeError::invalid_input(format!(
                "unknown output format '{value}' (expected Pretty JSON|Compact JSON|Human Readable)"
            ))),
        }
    }
}

pub fn format_tags(tags: &TagMap, format: OutputFormat) -> NodeResult<String> {
    match format {
        OutputFormat::PrettyJson => serde_json::to_string_pretty(tags)
            .map_err(|e| NodeError::json(format!("failed to render metadata: {e}"))),
        OutputFormat::CompactJson => serde_json::to_string(tags)
            .map_err(|e| NodeError::json(format!("failed to render metadata: {e}"))),
        OutputFormat::HumanReadable => Ok(format_human_readable(tags)),
    }
}

/// `group:tag` split at the first colon; ungrouped tags go under "Other".
pub fn split_group(key: &str) -> (&str, &str) {
    key.split_once(':').unwrap_or((UNGROUPED, key))
}

/// Plain text for a tag value: strings unquoted, everything else as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tags grouped by prefix, groups and tags sorted, values cut at 100 chars.
pub fn format_human_readable(tags: &TagMap) -> String {
    let mut groups = BTreeMap::<&str, BTreeMap<&str, &Value>>::new();
    for (key, value) in tags {
        let (group, tag) = split_group(key);
        groups.entry(group).or_default().insert(tag, value);
    }

    let heavy = "=".repeat(REPORT_WIDTH);
    let light = "-".repeat(REPORT_WIDTH);
    let mut lines = vec![
        heavy.clone(),
        String::from("EXIFTOOL METADATA REPORT"),
        heavy.clone(),
        String::new(),
    ];
    for (group, entries) in &groups {
        lines.push(format!("[{group}]"));
        lines.push(light.clone());
        for (tag, value) in entries {
            lines.push(format!(
                "{tag:30} : {}",
                preview(&value_text(value), VALUE_PREVIEW_CHARS)
            ));
        }
        lines.push(String::new());
    }
    lines.push(heavy.clone());
    lines.push(format!("Total: {} metadata fields", tags.len()));
    lines.push(heavy);
    lines.join("\n")
}

/// Field count per group prefix; keys without a prefix are not counted.
pub fn group_counts(tags: &TagMap) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in tags.keys() {
        if let Some((group, _)) = key.split_once(':') {
            *counts.entry(group.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tags(value: Value) -> TagMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn human_readable_groups_and_sorts() {
        let report = format_human_readable(&tags(json!({
            "XMP-dc:Title": "T",
            "IFD0:Make": "Canon",
            "IFD0:Artist": "Ada",
            "Rating": 3
        })));
        let lines = report.lines().collect::<Vec<_>>();

        let ifd0 = lines.iter().position(|l| *l == "[IFD0]").expect("IFD0 group");
        let other = lines.iter().position(|l| *l == "[Other]").expect("Other group");
        let xmp = lines.iter().position(|l| *l == "[XMP-dc]").expect("XMP-dc group");
        assert!(ifd0 < other && other < xmp);
        assert!(lines[ifd0 + 2].starts_with("Artist "));
        assert!(lines[ifd0 + 3].starts_with("Make "));
        assert_eq!(lines[other + 2], format!("{:30} : 3", "Rating"));
        assert_eq!(lines[lines.len() - 2], "Total: 4 metadata fields");
    }

    #[test]
    fn human_readable_truncates_long_values() {
        let long = "x".repeat(150);
        let report = format_human_readable(&tags(json!({ "PNG:Comment": long })));
        let line = report
            .lines()
            .find(|l| l.starts_with("Comment"))
            .expect("comment line");
        assert!(line.ends_with(&format!("{}...", "x".repeat(100))));
    }

    #[test]
    fn json_formats_keep_tag_order() {
        let map = tags(json!({"B:b": 1, "A:a": "two"}));
        assert_eq!(
            format_tags(&map, OutputFormat::CompactJson).expect("compact"),
            r#"{"B:b":1,"A:a":"two"}"#
        );
        let pretty = format_tags(&map, OutputFormat::PrettyJson).expect("pretty");
        assert!(pretty.contains("\n  \"B:b\": 1"));
    }

    #[test]
    fn counts_fields_per_group() {
        let counts = group_counts(&tags(json!({
            "IFD0:Make": "Canon",
            "IFD0:Model": "R5",
            "XMP-xmp:Rating": 3,
            "Warning": "x"
        })));
        assert_eq!(
            counts.into_iter().collect::<Vec<_>>(),
            vec![(String::from("IFD0"), 2), (String::from("XMP-xmp"), 1)]
        );
    }

    #[test]
    fn parses_host_labels() {
        assert_eq!(
            "Human Readable".parse::<OutputFormat>().ok(),
            Some(OutputFormat::HumanReadable)
        );
        assert_eq!(
            "compact_json".parse::<OutputFormat>().ok(),
            Some(OutputFormat::CompactJson)
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
