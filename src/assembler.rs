//! Document assembly.
//!
//! Merges a page's front matter with its computed URI, breadcrumb and
//! last-modified date into one [`Document`]. Pure: no I/O.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

use crate::frontmatter::value_as_text;
use crate::models::{default_date, Document, FrontMatter, PageRecord};

/// Last-modified timestamps keyed by repository-relative path.
pub type LastModified = HashMap<String, DateTime<Utc>>;

/// Build the canonical document for one page.
///
/// Pages without usable front matter are still assembled, with empty
/// metadata and no body.
pub fn assemble(page: &PageRecord, front_matter: &FrontMatter, last_modified: &LastModified) -> Document {
    let mut metadata = match &front_matter.metadata {
        Some(m) => m.clone(),
        None => {
            warn!(
                path = %page.source.path.display(),
                uri = %page.uri,
                "page did not provide parseable front matter"
            );
            Default::default()
        }
    };

    let title = metadata
        .remove("title")
        .map(|v| value_as_text(&v))
        .unwrap_or_default();
    // Positional breadcrumb fields are owned by the assembler.
    metadata.retain(|key, _| !key.starts_with("breadcrumb_"));

    let date = last_modified
        .get(&page.source.relative)
        .copied()
        .unwrap_or_else(default_date);

    let text = catch_all_text(&title, front_matter.body.as_deref(), &page.uri, &page.path_segments);

    Document {
        id: page.uri.clone(),
        uri: page.uri.clone(),
        title,
        breadcrumb: page.path_segments.clone(),
        body: front_matter.body.clone(),
        text,
        date,
        image_uri: None,
        extra: metadata,
    }
}

/// Title, body, URI and breadcrumb segments, space-joined in that order.
/// An absent body contributes nothing, not even its separator.
pub fn catch_all_text(title: &str, body: Option<&str>, uri: &str, breadcrumb: &[String]) -> String {
    let mut text = title.to_string();
    if let Some(body) = body {
        text.push(' ');
        text.push_str(body);
    }
    text.push(' ');
    text.push_str(uri);
    text.push(' ');
    text.push_str(&breadcrumb.join(" "));
    text
}
