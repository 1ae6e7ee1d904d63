//! Markup-to-plain-text conversion.
//!
//! Markdown is rendered to HTML with `pulldown-cmark` and then reduced to its
//! text nodes with `scraper`, so both Markdown documents and HTML fragments
//! from APIs pass through the same text extraction.

use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use scraper::Html;

/// Runs of three or more hyphens, as left behind by Markdown table rules.
static HYPHEN_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{3,}").expect("valid regex"));

/// Return the concatenated text nodes of an HTML document or fragment.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document.root_element().text().collect()
}

/// Convert Markdown to plain text.
///
/// Tables are not an enabled extension, so their cells survive as plain
/// paragraphs; cell separators are replaced by single spaces and rule lines
/// collapse to a single hyphen.
pub fn markdown_to_text(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::empty());
    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);

    let text = html_to_text(&rendered).replace(" | ", " ");
    HYPHEN_RUN.replace_all(&text, "-").into_owned()
}
