//! Flat summaries of Crossref work records.
//!
//! The paginator yields raw JSON. This module picks out DOI, title, journal,
//! authors, publication date and abstract for tabular output.

use crate::paginate::Record;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("space pattern is valid"));

/// CSV column order for work summaries
pub const SUMMARY_COLUMNS: &[&str] = &[
    "doi", "title", "journal", "authors", "date", "work_type", "abstract_text",
];

/// One row of flattened work metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WorkSummary {
    /// DOI
    pub doi: String,
    /// First title
    pub title: String,
    /// Journal name
    pub journal: String,
    /// Authors (comma-separated)
    pub authors: String,
    /// Publication date (YYYY-MM-DD or partial)
    pub date: String,
    /// Crossref work type, e.g. journal-article
    pub work_type: String,
    /// Article abstract (JATS/HTML tags stripped)
    pub abstract_text: String,
}

impl WorkSummary {
    /// Flatten a raw record. Missing or odd fields become empty strings.
    pub fn from_record(record: &Record) -> Self {
        let item: CrossrefItem = serde_json::from_value(record.clone()).unwrap_or_default();
        parse_crossref_item(item)
    }
}

// === Crossref work shape ===

#[derive(Debug, Deserialize, Default)]
struct CrossrefItem {
    #[serde(rename = "DOI", default)]
    doi: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CrossrefAuthor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(default)]
    published: Option<CrossrefPublished>,
    #[serde(rename = "published-print", default)]
    published_print: Option<CrossrefPublished>,
    #[serde(rename = "type", default)]
    work_type: String,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    #[serde(default)]
    given: String,
    #[serde(default)]
    family: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CrossrefPublished {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

fn parse_crossref_item(item: CrossrefItem) -> WorkSummary {
    // Authors; organisations only carry `name`
    let authors = item
        .author
        .iter()
        .map(|a| {
            let person = format!("{} {}", a.given, a.family).trim().to_string();
            if person.is_empty() {
                a.name.trim().to_string()
            } else {
                person
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let date = item
        .published
        .or(item.published_print)
        .and_then(|p| p.date_parts.into_iter().next())
        .map(|parts| {
            parts
                .iter()
                .flatten()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join("-")
        })
        .unwrap_or_default();

    let journal = item.container_title.into_iter().next().unwrap_or_default();

    let abstract_text = item
        .abstract_text
        .map(|s| strip_html_tags(&s))
        .unwrap_or_default();

    let title = item.title.into_iter().next().unwrap_or_default();

    WorkSummary {
        doi: item.doi,
        title,
        journal,
        authors,
        date,
        work_type: item.work_type,
        abstract_text,
    }
}

/// Strip markup tags and collapse whitespace
fn strip_html_tags(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, " ");
    SPACE_RE.replace_all(stripped.trim(), " ").to_string()
}
