use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::crawler::task::{ContentRef, NOTE_ID_LENGTH};

/// How many rejected identifiers are spelled out in a warning
const INVALID_PREVIEW: usize = 5;

/// Refs pulled out of one search-result export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub refs: Vec<ContentRef>,
    pub invalid_ids: Vec<String>,
}

impl Extraction {
    /// Append another extraction, keeping input order
    pub fn merge(&mut self, other: Extraction) {
        self.refs.extend(other.refs);
        self.invalid_ids.extend(other.invalid_ids);
    }
}

/// Whether `id` has the platform's fixed identifier length
pub fn is_valid_id(id: &str) -> bool {
    id.chars().count() == NOTE_ID_LENGTH
}

/// Pull `(id, xsec_token)` pairs out of a `{"data": {"items": [...]}}` export.
///
/// Items without an id or a non-empty token are skipped. Ids of the wrong
/// length are collected in `invalid_ids` instead of failing the document.
pub fn extract(raw_export: &Value) -> Extraction {
    let mut extraction = Extraction::default();

    let items = match raw_export.pointer("/data/items").and_then(Value::as_array) {
        Some(items) => items,
        None => return extraction,
    };

    for item in items {
        let id = match item.get("id") {
            Some(Value::Null) | None => continue,
            Some(id) => id,
        };

        let token = match item.get("xsec_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => token,
            _ => continue,
        };

        match id.as_str() {
            Some(id) if is_valid_id(id) => extraction.refs.push(ContentRef::new(id, token)),
            Some(id) => extraction.invalid_ids.push(id.to_string()),
            None => extraction.invalid_ids.push(id.to_string()),
        }
    }

    extraction
}

/// Drop repeated ids, keeping the first occurrence of each
pub fn dedupe_first_wins<I>(refs: I) -> Vec<ContentRef>
where
    I: IntoIterator<Item = ContentRef>,
{
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|content| seen.insert(content.id.clone()))
        .collect()
}

/// Log rejected identifiers, listing only the first few
pub fn report_invalid(source: &str, invalid_ids: &[String]) {
    if invalid_ids.is_empty() {
        return;
    }

    let preview = invalid_ids.iter()
        .take(INVALID_PREVIEW)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    if invalid_ids.len() > INVALID_PREVIEW {
        warn!(
            "{}: {} invalid ids ({} and {} more)",
            source,
            invalid_ids.len(),
            preview,
            invalid_ids.len() - INVALID_PREVIEW
        );
    } else {
        warn!("{}: {} invalid ids ({})", source, invalid_ids.len(), preview);
    }
}
