use crate::error::Result;
use crate::models::ContentBundle;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Display bound per content category.
pub const MAX_ITEMS_PER_CATEGORY: usize = 3;

/// Raw authored shape of one label's content. Lists are operator-supplied
/// and may contain non-string or blank entries; those are dropped when the
/// table is built.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawContentEntry {
    #[serde(default)]
    texts: Vec<serde_json::Value>,
    #[serde(default)]
    images: Vec<serde_json::Value>,
    #[serde(default)]
    videos: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
struct ContentEntry {
    texts: Vec<String>,
    images: Vec<String>,
    videos: Vec<String>,
}

/// Static label-to-content mapping, normalized once at load. Lookups are
/// exact-match; unmapped labels resolve to an empty bundle rather than an
/// error.
#[derive(Debug, Clone, Default)]
pub struct ContentTable {
    entries: HashMap<String, ContentEntry>,
}

impl ContentTable {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&contents)?;
        log::info!(
            "Loaded content table with {} labels from {}",
            table.entries.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, RawContentEntry> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|(label, entry)| {
                (
                    label,
                    ContentEntry {
                        texts: keep_valid_strings(entry.texts),
                        images: keep_valid_strings(entry.images),
                        videos: keep_valid_strings(entry.videos),
                    },
                )
            })
            .collect();
        Ok(Self { entries })
    }

    /// Resolves the bounded display bundle for one label: the first
    /// `MAX_ITEMS_PER_CATEGORY` valid items per category, in authored order.
    pub fn resolve(&self, label: &str) -> ContentBundle {
        match self.entries.get(label) {
            Some(entry) => ContentBundle {
                texts: take_bounded(&entry.texts),
                images: take_bounded(&entry.images),
                videos: take_bounded(&entry.videos),
            },
            None => ContentBundle::default(),
        }
    }
}

/// Keeps non-empty strings (after trimming), in authored order. Non-string
/// values are discarded, not coerced.
fn keep_valid_strings(values: Vec<serde_json::Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
        .collect()
}

fn take_bounded(items: &[String]) -> Vec<String> {
    items
        .iter()
        .take(MAX_ITEMS_PER_CATEGORY)
        .cloned()
        .collect()
}
