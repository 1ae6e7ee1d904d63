//! Index settings and field mappings.
//!
//! Settings are shared by every index: a single shard plus the `trigram`
//! and `reverse` analyzers the phrase suggester relies on. Mappings differ
//! per content source and ship with the binary; a deployment can replace
//! the mapping with `INDEX_MAPPING_FILE`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SETTINGS: &str = include_str!("../mappings/settings.json");
const DOCS_MAPPINGS: &str = include_str!("../mappings/docs.json");
const BLOG_MAPPINGS: &str = include_str!("../mappings/blog.json");

/// Settings and mappings applied when an index is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub settings: Value,
    pub mappings: Value,
}

impl IndexSchema {
    /// Schema for documentation pages.
    pub fn docs() -> Self {
        Self::bundled(DOCS_MAPPINGS)
    }

    /// Schema for blog posts.
    pub fn blog() -> Self {
        Self::bundled(BLOG_MAPPINGS)
    }

    /// Read a schema from a JSON file.
    ///
    /// The file is either `{"settings": ..., "mappings": ...}` (settings
    /// optional) or a bare mappings object; missing settings fall back to
    /// the shared defaults.
    pub fn from_mapping_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read index mapping {}", path.display()))?;
        let mut value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("index mapping {} is not valid JSON", path.display()))?;
        let Some(object) = value.as_object_mut() else {
            anyhow::bail!("index mapping {} must be a JSON object", path.display());
        };
        if let Some(mappings) = object.remove("mappings") {
            let settings = object.remove("settings").unwrap_or_else(shared_settings);
            return Ok(Self { settings, mappings });
        }
        Ok(Self {
            settings: shared_settings(),
            mappings: value,
        })
    }

    /// Request body for index creation.
    pub fn to_body(&self) -> Value {
        json!({
            "settings": self.settings,
            "mappings": self.mappings,
        })
    }

    // Bundled files are covered by tests; a broken one degrades to an empty
    // object rather than aborting at runtime.
    fn bundled(mappings: &str) -> Self {
        Self {
            settings: shared_settings(),
            mappings: serde_json::from_str(mappings).unwrap_or_else(|_| json!({})),
        }
    }
}

fn shared_settings() -> Value {
    serde_json::from_str(SETTINGS).unwrap_or_else(|_| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bundled_files_parse() {
        for raw in [SETTINGS, DOCS_MAPPINGS, BLOG_MAPPINGS] {
            serde_json::from_str::<Value>(raw).unwrap();
        }
    }

    #[test]
    fn test_shared_settings() {
        let schema = IndexSchema::docs();
        let index = &schema.settings["index"];
        assert_eq!(index["number_of_shards"], 1);
        assert_eq!(index["analysis"]["filter"]["shingle"]["min_shingle_size"], 2);
        assert_eq!(index["analysis"]["filter"]["shingle"]["max_shingle_size"], 3);
        assert!(index["analysis"]["analyzer"]["trigram"].is_object());
        assert!(index["analysis"]["analyzer"]["reverse"].is_object());
        assert_eq!(IndexSchema::blog().settings, schema.settings);
    }

    #[test]
    fn test_mappings_differ_per_source() {
        assert_eq!(IndexSchema::docs().mappings["properties"]["uri"]["type"], "keyword");
        assert!(IndexSchema::blog().mappings["properties"]["image_uri"].is_object());
        assert_ne!(IndexSchema::docs().mappings, IndexSchema::blog().mappings);
    }

    #[test]
    fn test_mapping_file_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"properties": {{"uri": {{"type": "text"}}}}}}"#).unwrap();
        let schema = IndexSchema::from_mapping_file(file.path()).unwrap();
        assert_eq!(schema.mappings["properties"]["uri"]["type"], "text");
        assert_eq!(schema.settings, IndexSchema::docs().settings);
        assert!(schema.to_body()["settings"]["index"].is_object());
    }

    #[test]
    fn test_mapping_file_with_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"settings": {{"index": {{"number_of_shards": 3}}}}, "mappings": {{"properties": {{}}}}}}"#
        )
        .unwrap();
        let schema = IndexSchema::from_mapping_file(file.path()).unwrap();
        assert_eq!(schema.settings["index"]["number_of_shards"], 3);
        assert!(schema.mappings["properties"].is_object());
    }

    #[test]
    fn test_mapping_file_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(IndexSchema::from_mapping_file(file.path()).is_err());
    }
}
