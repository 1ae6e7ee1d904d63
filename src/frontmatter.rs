//! Front-matter extraction.
//!
//! A document may open with a metadata block fenced by `+++` (TOML) or
//! `---` (YAML). Formats are tried in that fixed order and the first one
//! whose fence appears twice wins. A block that fails to parse yields
//! [`FrontMatter::absent`] so the caller can degrade or skip that single page
//! without aborting the run.

use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::markup::markdown_to_text;
use crate::models::FrontMatter;

const TOML_FENCE: &str = "+++";
const YAML_FENCE: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Yaml,
}

/// Split `raw` into metadata and plain-text body.
///
/// `label` identifies the document in log output (usually its path).
pub fn parse(raw: &str, label: &str) -> FrontMatter {
    for (format, fence) in [(Format::Toml, TOML_FENCE), (Format::Yaml, YAML_FENCE)] {
        let Some((meta_src, body_src)) = split_fenced(raw, fence) else {
            continue;
        };

        let metadata = match format {
            Format::Toml => parse_toml(meta_src),
            Format::Yaml => parse_yaml(meta_src),
        };
        let metadata = match metadata {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    document = label,
                    format = ?format,
                    error = %e,
                    "error parsing front matter, please check syntax"
                );
                return FrontMatter::absent();
            }
        };

        let body = render_body(body_src, &metadata);
        return FrontMatter {
            metadata: Some(metadata),
            body: Some(body),
        };
    }

    debug!(document = label, "no front matter fence found");
    FrontMatter::absent()
}

/// Locate the first two lines consisting solely of `fence` and return the
/// text between them and the text after the second one.
fn split_fenced<'a>(raw: &'a str, fence: &str) -> Option<(&'a str, &'a str)> {
    let mut fences = Vec::with_capacity(2);
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        let content = line.trim_end_matches('\n').trim_end_matches('\r');
        if content == fence {
            fences.push((offset, offset + line.len()));
            if fences.len() == 2 {
                break;
            }
        }
        offset += line.len();
    }

    match fences.as_slice() {
        [(_, open_end), (close_start, close_end)] => {
            Some((&raw[*open_end..*close_start], &raw[*close_end..]))
        }
        _ => None,
    }
}

fn render_body(body_src: &str, metadata: &Map<String, Value>) -> String {
    let text = markdown_to_text(body_src);
    if text.trim().is_empty() {
        // Fall back to the description on otherwise empty pages.
        if let Some(description) = metadata.get("description") {
            return value_as_text(description).trim().to_string();
        }
    }
    text.trim().to_string()
}

/// Render a metadata value as display text; strings are used verbatim.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_toml(src: &str) -> anyhow::Result<Map<String, Value>> {
    let table: toml::Table = toml::from_str(src)?;
    Ok(table
        .into_iter()
        .map(|(k, v)| (k, toml_to_json(v)))
        .collect())
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn parse_yaml(src: &str) -> anyhow::Result<Map<String, Value>> {
    let value: serde_yaml::Value = serde_yaml::from_str(src)?;
    match yaml_to_json(value) {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("front matter is not a mapping (got {})", kind_of(&other)),
    }
}

pub(crate) fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(k, v)| (value_as_text(&yaml_to_json(k)), yaml_to_json(v)))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
